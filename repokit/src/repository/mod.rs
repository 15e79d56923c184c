//! Generic repository over relational and document stores
//!
//! This module provides one [`Repository`] façade with uniform CRUD, query
//! and aggregation methods, parameterized by a [`Store`] adapter that knows
//! how to talk to one backend.
//!
//! # Features
//!
//! - **Uniform methods**: `find`, `first_by`, `get_by_order`, `get_in`,
//!   `get_by_page`, `create`, `update_by_id`, `destroy`, `count_by` and more
//! - **Filter builder**: [`Filter`] expressions with OR-grouped keys
//!   (`"username%OR%text"`) rendered by a backend [`Dialect`]
//! - **Relational store**: [`SqlStore`] over the sqlx `Any` driver (feature `database`)
//! - **Document store**: [`DocumentStore`] over SurrealDB (feature `surrealdb`)
//! - **Aggregation**: grouped counts ([`GroupingStore`]) and pipelines ([`AggregateStore`])
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{Filter, FilterOperator, Inputs, OrderDirection, Repository, SqlStore};
//!
//! let users = Repository::new(SqlStore::<User>::new(pool));
//!
//! let created = users
//!     .create(&Inputs::new().set("username", "User 1").set("text", "Long Text 1"))
//!     .await?;
//!
//! let matches = users
//!     .get_by(&Filter::new().with("username%OR%text", "%Long%", FilterOperator::Like))
//!     .await?;
//!
//! let page = users
//!     .get_by_page(2, 10, &Filter::new(), Some("id"), OrderDirection::Ascending)
//!     .await?;
//!
//! users.destroy(&created.id).await?;
//! ```

mod aggregate;
mod error;
mod filter;
mod inputs;
mod query;
mod repo;
mod traits;
mod value;

#[cfg(feature = "database")]
mod sql;

#[cfg(feature = "surrealdb")]
mod document;

// Re-export all public types
pub use aggregate::{Accumulator, AccumulatorFn, GroupSpec, Pipeline, Projection, Stage};
pub use error::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, WriteError, VIOLATION_DELIMITER,
};
pub use filter::{
    build, validate_identifier, BindSet, Dialect, FilterBuilder, SqlDialect, SurrealDialect,
};
pub use inputs::Inputs;
pub use query::{
    split_or_group, Criterion, Filter, FilterOperator, Membership, OrderDirection, Pagination,
    Query, DEFAULT_PAGE, DEFAULT_PAGE_SIZE, OR_SEPARATOR,
};
pub use repo::{Repository, RepositorySettings};
pub use traits::{AggregateStore, Group, GroupingStore, Model, RepositoryResult, Store};
pub use value::{values, Value};

#[cfg(feature = "database")]
pub use sql::SqlStore;

#[cfg(feature = "surrealdb")]
pub use document::DocumentStore;
