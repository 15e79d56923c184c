//! # repokit
//!
//! Generic repository pattern over relational and document stores.
//! One [`Repository`](repository::Repository) façade exposes uniform CRUD,
//! query and aggregation methods; store adapters translate them for a backend.
//!
//! ## Features
//!
//! - **Filter builder**: ordered `{field: value | (value, operator)}` filters with
//!   OR-grouped keys, rendered with bound parameters only
//! - **Relational store**: sqlx `Any` driver (PostgreSQL, SQLite), feature `database`
//! - **Document store**: SurrealDB (`ws://`, `http://`, `mem://`), feature `surrealdb`
//! - **Aggregation**: grouped counts and match/project/group/limit pipelines
//! - **Structured errors**: operation, kind, entity and every rejection message
//! - **Configuration**: layered Figment config with `REPOKIT_` environment overrides
//!
//! ## Example
//!
//! ```rust,no_run
//! use repokit::prelude::*;
//!
//! #[derive(Debug, sqlx::FromRow)]
//! struct User {
//!     id: i64,
//!     username: String,
//! }
//!
//! impl Model for User {
//!     type Id = i64;
//!     const ENTITY: &'static str = "User";
//!     const SOURCE: &'static str = "users";
//!     const FIELDS: &'static [&'static str] = &["username"];
//!
//!     fn id(&self) -> i64 {
//!         self.id
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let database = config
//!         .database
//!         .as_ref()
//!         .ok_or_else(|| Error::Internal("no [database] section".to_string()))?;
//!     let pool = create_pool(database).await?;
//!     let users = Repository::with_settings(SqlStore::<User>::new(pool), config.repository_settings());
//!
//!     let newest = users
//!         .get_by_order("id", &Filter::new(), OrderDirection::Descending, 10)
//!         .await?;
//!     println!("{} users", newest.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod observability;
pub mod repository;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "surrealdb")]
pub mod surrealdb_backend;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, RepositoryConfig, SurrealDbConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        AggregateStore, Filter, FilterOperator, GroupingStore, Inputs, Model, OrderDirection,
        Pagination, Query, Repository, RepositoryError, RepositoryErrorKind, RepositoryResult,
        RepositorySettings, Store, Value,
    };

    #[cfg(feature = "database")]
    pub use crate::database::create_pool;

    #[cfg(feature = "database")]
    pub use crate::repository::SqlStore;

    #[cfg(feature = "surrealdb")]
    pub use crate::repository::DocumentStore;

    #[cfg(feature = "surrealdb")]
    pub use crate::surrealdb_backend::{create_client, SurrealClient};
}
