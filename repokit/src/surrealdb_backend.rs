//! SurrealDB connection management
//!
//! Supports runtime protocol selection via URL scheme:
//! - `ws://` / `wss://` - WebSocket connections
//! - `http://` / `https://` - HTTP connections
//! - `mem://` - In-memory database (for testing)

use std::time::Duration;

use crate::config::SurrealDbConfig;
use crate::connection::{sanitize_url, with_retries, RetryPolicy};
use crate::error::{Error, Result};

/// SurrealDB client type alias using the `Any` engine for runtime protocol selection
pub type SurrealClient = surrealdb::Surreal<surrealdb::engine::any::Any>;

/// Create a SurrealDB client with retry logic
///
/// Signs in as root when both credentials are configured, then selects the
/// namespace and database.
pub async fn create_client(config: &SurrealDbConfig) -> Result<SurrealClient> {
    let policy = RetryPolicy {
        max_retries: config.max_retries,
        base_delay: Duration::from_secs(config.retry_delay_secs),
    };
    let client = with_retries("SurrealDB", policy, || try_create_client(config)).await?;

    tracing::info!(
        "SurrealDB connected: url={}, ns={}, db={}",
        sanitize_url(&config.url),
        config.namespace,
        config.database
    );
    Ok(client)
}

/// Attempt to create a client (single try)
async fn try_create_client(config: &SurrealDbConfig) -> Result<SurrealClient> {
    let url_safe = sanitize_url(&config.url);
    tracing::debug!("Connecting to SurrealDB: {}", url_safe);

    let client = surrealdb::engine::any::connect(&config.url).await.map_err(|e| {
        Error::Connection(format!(
            "Failed to connect to SurrealDB at '{}': {}\n\nOriginal error: {}",
            url_safe,
            categorize_surrealdb_error(&e),
            e
        ))
    })?;

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        client
            .signin(surrealdb::opt::auth::Root {
                username,
                password,
            })
            .await
            .map_err(|e| {
                Error::Connection(format!(
                    "Failed to authenticate with SurrealDB at '{}': {}\n\nOriginal error: {}",
                    url_safe,
                    categorize_surrealdb_error(&e),
                    e
                ))
            })?;
    }

    client
        .use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            Error::Connection(format!(
                "Failed to select namespace '{}' / database '{}' on SurrealDB at '{}': {}\n\nOriginal error: {}",
                config.namespace,
                config.database,
                url_safe,
                categorize_surrealdb_error(&e),
                e
            ))
        })?;

    Ok(client)
}

/// Categorize a SurrealDB error for better user guidance
fn categorize_surrealdb_error(err: &surrealdb::Error) -> &'static str {
    let err_str = err.to_string().to_lowercase();

    if err_str.contains("auth") || err_str.contains("credentials") || err_str.contains("signin") {
        "Authentication error - check your credentials"
    } else if err_str.contains("connect")
        || err_str.contains("network")
        || err_str.contains("dns")
        || err_str.contains("refused")
    {
        "Network connection error - check connectivity"
    } else if err_str.contains("permission") || err_str.contains("not allowed") {
        "Permission error - check database permissions"
    } else if err_str.contains("timeout") {
        "Connection timeout - database may be overloaded"
    } else {
        "Connection error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> SurrealDbConfig {
        SurrealDbConfig {
            url: "mem://".to_string(),
            namespace: "test".to_string(),
            database: "test".to_string(),
            username: None,
            password: None,
            max_retries: 0,
            retry_delay_secs: 0,
        }
    }

    #[tokio::test]
    async fn test_create_memory_client() {
        let client = create_client(&memory_config()).await.unwrap();
        let mut response = client.query("RETURN 1 + 1").await.unwrap();
        let two: Option<i64> = response.take(0).unwrap();
        assert_eq!(two, Some(2));
    }

    #[tokio::test]
    async fn test_create_client_bad_scheme_fails() {
        let config = SurrealDbConfig {
            url: "nope://localhost".to_string(),
            ..memory_config()
        };
        let err = create_client(&config).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }
}
