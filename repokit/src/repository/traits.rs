//! Store and model trait definitions
//!
//! This module provides the traits the generic [`Repository`](super::Repository)
//! is built on, using RPITIT (Return Position Impl Trait In Traits), available
//! since Rust 1.75.
//!
//! # Overview
//!
//! - [`Model`]: Static description of a persisted record type
//! - [`Store`]: Backend adapter executing queries and writes for one model
//! - [`GroupingStore`]: Stores that can count records per distinct field value
//! - [`AggregateStore`]: Stores that can run aggregation [`Pipeline`]s
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{Model, Query, Store, RepositoryResult};
//!
//! #[derive(sqlx::FromRow)]
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
//! ```

use std::fmt;
use std::future::Future;

use super::aggregate::Pipeline;
use super::error::{RepositoryError, WriteError};
use super::inputs::Inputs;
use super::query::{Filter, Query};
use super::value::Value;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// A persisted record type
///
/// Records are opaque to the repository: it only needs the entity name for
/// errors and logs, the collection to read from, the primary key, the
/// writable fields and a way to get a record's identity.
pub trait Model: Send + Sync + Unpin + Sized + 'static {
    /// Identity type
    type Id: Clone + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Entity name used in errors and logs (e.g., "User")
    const ENTITY: &'static str;

    /// Table or collection name
    const SOURCE: &'static str;

    /// Primary key column
    const PRIMARY_KEY: &'static str = "id";

    /// Writable fields; inputs naming anything else are rejected
    const FIELDS: &'static [&'static str];

    /// Identity of this record
    fn id(&self) -> Self::Id;

    /// Validation hook run on inputs before every write
    ///
    /// Every returned message is reported; an empty list accepts the inputs.
    fn validate(_inputs: &Inputs) -> Vec<String> {
        Vec::new()
    }
}

/// Backend adapter for one model
///
/// Reads return `Ok(None)` / an empty list for "nothing matched"; writes
/// separate refusals ([`WriteError::Rejected`]) from failures so the
/// repository can report them with the right error kind.
pub trait Store: Send + Sync {
    /// Record type this store persists
    type Record: Model;

    /// Fetch every record matching the query
    fn fetch(
        &self,
        query: &Query,
    ) -> impl Future<Output = RepositoryResult<Vec<Self::Record>>> + Send;

    /// Fetch a record by identity
    fn fetch_by_id(
        &self,
        id: &<Self::Record as Model>::Id,
    ) -> impl Future<Output = RepositoryResult<Option<Self::Record>>> + Send;

    /// Count records matching the filter
    fn count(&self, filter: &Filter) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Build a new record from the inputs and persist it
    ///
    /// Returns the stored record including any generated identity.
    fn insert(
        &self,
        inputs: &Inputs,
    ) -> impl Future<Output = Result<Self::Record, WriteError>> + Send;

    /// Assign the inputs to an existing record and persist it
    fn update(
        &self,
        record: &Self::Record,
        inputs: &Inputs,
    ) -> impl Future<Output = Result<Self::Record, WriteError>> + Send;

    /// Delete a record, returning whether anything was removed
    fn delete(&self, record: &Self::Record) -> impl Future<Output = Result<bool, WriteError>> + Send;
}

/// One distinct value of a grouped field
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// The grouped field's value
    pub value: Value,
    /// Number of records with that value, when requested
    pub count: Option<u64>,
}

/// Stores that can group records by a field
pub trait GroupingStore: Store {
    /// Distinct values of `field` among records matching `filter`, ascending
    fn group_count(
        &self,
        field: &str,
        filter: &Filter,
        with_count: bool,
    ) -> impl Future<Output = RepositoryResult<Vec<Group>>> + Send;
}

/// Stores that can execute aggregation pipelines
pub trait AggregateStore: Store {
    /// Run the pipeline and return the materialized rows
    fn aggregate(
        &self,
        pipeline: &Pipeline,
    ) -> impl Future<Output = RepositoryResult<Vec<serde_json::Value>>> + Send;
}
