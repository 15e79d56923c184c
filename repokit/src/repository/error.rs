//! Repository error types
//!
//! Every repository call fails with a [`RepositoryError`] that records which
//! operation failed, the category of failure, and (when known) the entity
//! involved. Rejected writes additionally carry every violation reported by
//! the store so the caller sees them all at once.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("User", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.entity_id.as_deref(), Some("42"));
//! ```

use std::fmt;

/// Delimiter used when joining store violation messages
pub const VIOLATION_DELIMITER: &str = ". ";

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single record by identity
    FindById,
    /// Finding the first record, optionally filtered
    FindFirst,
    /// Finding multiple records
    FindAll,
    /// Counting records
    Count,
    /// Grouping records by a field
    GroupBy,
    /// Running an aggregation pipeline
    Aggregate,
    /// Creating a new record
    Create,
    /// Updating an existing record
    Update,
    /// Deleting a record
    Delete,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindFirst => write!(f, "find_first"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::GroupBy => write!(f, "group_by"),
            Self::Aggregate => write!(f, "aggregate"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No record matched an `..._or_fail` lookup
    NotFound,
    /// A caller-supplied argument is outside its legal values
    InvalidArgument,
    /// The store refused to persist a new record
    UnsavedRecord,
    /// The store refused to update a record
    UpdateFailed,
    /// The store refused to delete a record
    DeleteFailed,
    /// The operation exists in the contract but is not supported
    Unimplemented,
    /// Failed to reach the store
    ConnectionFailed,
    /// The store call exceeded the configured deadline
    Timeout,
    /// Underlying database error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidArgument => write!(f, "invalid_argument"),
            Self::UnsavedRecord => write!(f, "unsaved_record"),
            Self::UpdateFailed => write!(f, "update_failed"),
            Self::DeleteFailed => write!(f, "delete_failed"),
            Self::Unimplemented => write!(f, "unimplemented"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use repokit::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
///
/// let error = RepositoryError::rejected(
///     RepositoryOperation::Create,
///     "User",
///     vec!["username is required".to_string(), "text is too long".to_string()],
/// );
/// assert_eq!(error.kind, RepositoryErrorKind::UnsavedRecord);
/// assert!(error.message.contains("username is required. text is too long"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Post")
    pub entity_type: Option<String>,
    /// The identity of the entity involved
    pub entity_id: Option<String>,
    /// Every violation reported by the store for a rejected write
    pub violations: Vec<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
            violations: Vec::new(),
        }
    }

    /// Create a "not found" error for an identity lookup
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::FindById,
            kind: RepositoryErrorKind::NotFound,
            message: "Model not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            violations: Vec::new(),
        }
    }

    /// Create a "not found" error for a lookup that matched no record
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{RepositoryError, RepositoryOperation};
    ///
    /// let error = RepositoryError::no_match(RepositoryOperation::FindFirst, "User");
    /// assert!(error.entity_id.is_none());
    /// ```
    pub fn no_match(operation: RepositoryOperation, entity_type: impl Into<String>) -> Self {
        Self {
            operation,
            kind: RepositoryErrorKind::NotFound,
            message: "No model found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: None,
            violations: Vec::new(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::InvalidArgument, message)
    }

    /// Create an error for a write the store refused
    ///
    /// The kind follows the operation: `Create` maps to `UnsavedRecord`,
    /// `Delete` to `DeleteFailed`, anything else to `UpdateFailed`.
    pub fn rejected(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        violations: Vec<String>,
    ) -> Self {
        let (kind, verb) = match operation {
            RepositoryOperation::Create => (RepositoryErrorKind::UnsavedRecord, "saved"),
            RepositoryOperation::Delete => (RepositoryErrorKind::DeleteFailed, "deleted"),
            _ => (RepositoryErrorKind::UpdateFailed, "updated"),
        };
        let message = format!(
            "Model cannot be {}. Error messages: {}",
            verb,
            violations.join(VIOLATION_DELIMITER)
        );
        Self {
            operation,
            kind,
            message,
            entity_type: Some(entity_type.into()),
            entity_id: None,
            violations,
        }
    }

    /// Create an error for an operation outside the supported contract
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
    ///
    /// let error = RepositoryError::unimplemented(RepositoryOperation::Delete, "truncate");
    /// assert_eq!(error.kind, RepositoryErrorKind::Unimplemented);
    /// ```
    pub fn unimplemented(operation: RepositoryOperation, method: &str) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Unimplemented,
            format!("{} is not supported", method),
        )
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindAll,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a database error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is transient (the same call may succeed later)
    ///
    /// The repository itself never retries; this is a hint for callers.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }

    /// Whether this error reports no matching record
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{}: {}]", entity_type, entity_id)?,
            (Some(entity_type), None) => write!(f, " [{}]", entity_type)?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

/// Failure of a store write
///
/// Stores separate "the write was refused" (validation messages, constraint
/// violations) from "the store could not be asked" so the repository can
/// raise `UnsavedRecord` / `UpdateFailed` / `DeleteFailed` for the former and
/// propagate the latter untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The store refused the write and reported these messages
    Rejected(Vec<String>),
    /// The store call itself failed
    Failed(RepositoryError),
}

impl WriteError {
    /// Convert into a repository error for the given operation
    pub fn into_repository_error(
        self,
        operation: RepositoryOperation,
        entity_type: &str,
    ) -> RepositoryError {
        match self {
            Self::Rejected(violations) => {
                RepositoryError::rejected(operation, entity_type, violations)
            }
            Self::Failed(error) => error.with_operation(operation),
        }
    }
}

impl From<RepositoryError> for WriteError {
    fn from(err: RepositoryError) -> Self {
        Self::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindFirst), "find_first");
        assert_eq!(format!("{}", RepositoryOperation::FindAll), "find_all");
        assert_eq!(format!("{}", RepositoryOperation::Count), "count");
        assert_eq!(format!("{}", RepositoryOperation::GroupBy), "group_by");
        assert_eq!(format!("{}", RepositoryOperation::Aggregate), "aggregate");
        assert_eq!(format!("{}", RepositoryOperation::Create), "create");
        assert_eq!(format!("{}", RepositoryOperation::Update), "update");
        assert_eq!(format!("{}", RepositoryOperation::Delete), "delete");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidArgument),
            "invalid_argument"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnsavedRecord),
            "unsaved_record"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::UpdateFailed),
            "update_failed"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::DeleteFailed),
            "delete_failed"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::Unimplemented),
            "unimplemented"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Timeout), "timeout");
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("User", "7");
        assert_eq!(error.operation, RepositoryOperation::FindById);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_type, Some("User".to_string()));
        assert_eq!(error.entity_id, Some("7".to_string()));
        assert!(error.is_not_found());
    }

    #[test]
    fn test_rejected_kind_follows_operation() {
        let create = RepositoryError::rejected(RepositoryOperation::Create, "User", vec![]);
        let update = RepositoryError::rejected(RepositoryOperation::Update, "User", vec![]);
        let delete = RepositoryError::rejected(RepositoryOperation::Delete, "User", vec![]);

        assert_eq!(create.kind, RepositoryErrorKind::UnsavedRecord);
        assert_eq!(update.kind, RepositoryErrorKind::UpdateFailed);
        assert_eq!(delete.kind, RepositoryErrorKind::DeleteFailed);
        assert!(create.message.starts_with("Model cannot be saved"));
        assert!(delete.message.starts_with("Model cannot be deleted"));
    }

    #[test]
    fn test_rejected_joins_all_violations() {
        let error = RepositoryError::rejected(
            RepositoryOperation::Update,
            "User",
            vec!["first".to_string(), "second".to_string()],
        );
        assert!(error.message.ends_with("first. second"));
        assert_eq!(error.violations.len(), 2);
    }

    #[test]
    fn test_write_error_conversion() {
        let rejected = WriteError::Rejected(vec!["username must be unique".to_string()])
            .into_repository_error(RepositoryOperation::Create, "User");
        assert_eq!(rejected.kind, RepositoryErrorKind::UnsavedRecord);
        assert_eq!(rejected.entity_type.as_deref(), Some("User"));

        let failed = WriteError::from(RepositoryError::connection_failed("refused"))
            .into_repository_error(RepositoryOperation::Delete, "User");
        assert_eq!(failed.kind, RepositoryErrorKind::ConnectionFailed);
        assert_eq!(failed.operation, RepositoryOperation::Delete);
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::FindAll, "slow").is_retriable());
        assert!(!RepositoryError::not_found("User", "1").is_retriable());
        assert!(
            !RepositoryError::invalid_argument(RepositoryOperation::FindAll, "bad").is_retriable()
        );
        assert!(!RepositoryError::unimplemented(RepositoryOperation::Delete, "truncate")
            .is_retriable());
    }

    #[test]
    fn test_display_with_entity() {
        let error = RepositoryError::not_found("User", "42");
        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("find_by_id"));
        assert!(display.contains("[User: 42]"));
    }

    #[test]
    fn test_display_with_entity_type_only() {
        let error = RepositoryError::no_match(RepositoryOperation::FindFirst, "User");
        assert!(format!("{}", error).ends_with("[User]"));
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::database_error(RepositoryOperation::Count, "syntax error");
        let display = format!("{}", error);
        assert!(display.contains("database_error"));
        assert!(!display.contains('['));
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("User", "1"));
        assert!(error.to_string().contains("not_found"));
    }
}
