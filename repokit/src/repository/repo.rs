//! Generic repository façade
//!
//! [`Repository`] translates caller-level parameters (filters, orderings,
//! pages, inputs) into [`Query`]s and store calls, and wraps store outcomes
//! into [`RepositoryError`]s. It holds nothing but the store handle and its
//! [`RepositorySettings`]; every method is one round trip to the store, or
//! two for lookup-then-mutate.

use std::future::Future;
use std::time::Duration;

use super::aggregate::{GroupSpec, Pipeline, Projection};
use super::error::{RepositoryError, RepositoryOperation, WriteError};
use super::inputs::Inputs;
use super::query::{Filter, OrderDirection, Pagination, Query};
use super::traits::{AggregateStore, Group, GroupingStore, Model, RepositoryResult, Store};
use super::value::Value;

/// Per-repository settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepositorySettings {
    /// Deadline for every store call; `None` waits indefinitely
    pub query_timeout: Option<Duration>,
}

impl RepositorySettings {
    /// Settings with a store call deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            query_timeout: Some(timeout),
        }
    }
}

/// Uniform CRUD and query methods over a [`Store`]
///
/// # Example
///
/// ```rust,ignore
/// use repokit::repository::{Filter, OrderDirection, Repository, SqlStore};
///
/// let users = Repository::new(SqlStore::<User>::new(pool));
///
/// let newest = users
///     .get_by_order("id", &Filter::new(), OrderDirection::Descending, 2)
///     .await?;
/// let user = users.first_or_fail_by(&Filter::new().eq("username", "User 1")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Repository<S> {
    store: S,
    settings: RepositorySettings,
}

type Record<S> = <S as Store>::Record;
type RecordId<S> = <<S as Store>::Record as Model>::Id;

impl<S: Store> Repository<S> {
    /// Create a repository with default settings
    pub fn new(store: S) -> Self {
        Self {
            store,
            settings: RepositorySettings::default(),
        }
    }

    /// Create a repository with explicit settings
    pub fn with_settings(store: S, settings: RepositorySettings) -> Self {
        Self { store, settings }
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current settings
    pub fn settings(&self) -> RepositorySettings {
        self.settings
    }

    /// Run one store call under the configured deadline
    async fn run<T, E, F>(&self, operation: RepositoryOperation, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<RepositoryError>,
    {
        tracing::debug!(
            entity = <Record<S> as Model>::ENTITY,
            operation = %operation,
            "Repository call"
        );
        match self.settings.query_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                E::from(RepositoryError::timeout(
                    operation,
                    format!("store call exceeded {}ms", limit.as_millis()),
                ))
            })?,
            None => call.await,
        }
    }

    async fn read<T, F>(&self, operation: RepositoryOperation, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        self.run(operation, call)
            .await
            .map_err(|e| e.with_operation(operation))
    }

    fn write_failure(&self, operation: RepositoryOperation, error: WriteError) -> RepositoryError {
        if let WriteError::Rejected(violations) = &error {
            tracing::warn!(
                entity = <Record<S> as Model>::ENTITY,
                operation = %operation,
                violations = ?violations,
                "Store rejected write"
            );
        }
        error.into_repository_error(operation, <Record<S> as Model>::ENTITY)
    }

    fn reject_inputs(&self, operation: RepositoryOperation, inputs: &Inputs) -> RepositoryResult<()> {
        let violations = inputs.violations::<Record<S>>();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(self.write_failure(operation, WriteError::Rejected(violations)))
        }
    }

    // Read path

    /// Every record
    pub async fn all(&self) -> RepositoryResult<Vec<Record<S>>> {
        self.read(RepositoryOperation::FindAll, self.store.fetch(&Query::all()))
            .await
    }

    /// Record by identity, if present
    pub async fn find(&self, id: &RecordId<S>) -> RepositoryResult<Option<Record<S>>> {
        self.read(RepositoryOperation::FindById, self.store.fetch_by_id(id))
            .await
    }

    /// Record by identity
    ///
    /// # Errors
    ///
    /// `NotFound` carrying the entity type and identity when no record exists.
    pub async fn find_or_fail(&self, id: &RecordId<S>) -> RepositoryResult<Record<S>> {
        self.find(id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(<Record<S> as Model>::ENTITY, id.to_string()))
    }

    /// First record in store order, if any
    pub async fn first(&self) -> RepositoryResult<Option<Record<S>>> {
        self.first_by(&Filter::new()).await
    }

    /// First record in store order
    pub async fn first_or_fail(&self) -> RepositoryResult<Record<S>> {
        self.first_or_fail_by(&Filter::new()).await
    }

    /// First record matching `filter`, if any
    pub async fn first_by(&self, filter: &Filter) -> RepositoryResult<Option<Record<S>>> {
        let query = Query::filtered(filter.clone()).paginate(Pagination::first_page(1));
        let records = self
            .read(RepositoryOperation::FindFirst, self.store.fetch(&query))
            .await?;
        Ok(records.into_iter().next())
    }

    /// First record matching `filter`
    ///
    /// # Errors
    ///
    /// `NotFound` when nothing matches.
    pub async fn first_or_fail_by(&self, filter: &Filter) -> RepositoryResult<Record<S>> {
        self.first_by(filter).await?.ok_or_else(|| {
            RepositoryError::no_match(RepositoryOperation::FindFirst, <Record<S> as Model>::ENTITY)
        })
    }

    /// Every record matching `filter`
    pub async fn get_by(&self, filter: &Filter) -> RepositoryResult<Vec<Record<S>>> {
        self.read(
            RepositoryOperation::FindAll,
            self.store.fetch(&Query::filtered(filter.clone())),
        )
        .await
    }

    /// At most `limit` records matching `filter`; zero is unbounded
    pub async fn get_by_limit(&self, limit: u64, filter: &Filter) -> RepositoryResult<Vec<Record<S>>> {
        let query = Query::filtered(filter.clone()).paginate_opt(Pagination::limited(limit));
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    /// Records matching `filter` ordered by `field`, at most `limit` (zero is unbounded)
    pub async fn get_by_order(
        &self,
        field: &str,
        filter: &Filter,
        direction: OrderDirection,
        limit: u64,
    ) -> RepositoryResult<Vec<Record<S>>> {
        let query = Query::filtered(filter.clone())
            .order_by(field, direction)
            .paginate_opt(Pagination::limited(limit));
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    /// Records whose `key` is one of `values`
    ///
    /// An empty `values` matches nothing.
    pub async fn get_in(
        &self,
        key: &str,
        values: Vec<Value>,
        order_by: Option<&str>,
        direction: OrderDirection,
        limit: u64,
    ) -> RepositoryResult<Vec<Record<S>>> {
        let query = ordered(Query::all().within(key, values), order_by, direction)
            .paginate_opt(Pagination::limited(limit));
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    /// Records whose `key` is none of `values`
    ///
    /// An empty `values` matches everything.
    pub async fn get_not_in(
        &self,
        key: &str,
        values: Vec<Value>,
        order_by: Option<&str>,
        direction: OrderDirection,
        limit: u64,
    ) -> RepositoryResult<Vec<Record<S>>> {
        let query = ordered(Query::all().excluding(key, values), order_by, direction)
            .paginate_opt(Pagination::limited(limit));
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    /// One page of records matching `filter`
    ///
    /// Pages are 1-based and start at `limit * (page - 1)`; a zero `limit`
    /// disables pagination.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for page zero.
    pub async fn get_by_page(
        &self,
        page: u64,
        limit: u64,
        filter: &Filter,
        order_by: Option<&str>,
        direction: OrderDirection,
    ) -> RepositoryResult<Vec<Record<S>>> {
        let window = page_window(page, limit)?;
        let query = ordered(Query::filtered(filter.clone()), order_by, direction).paginate_opt(window);
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    /// One page of records matching both `filter` and the membership test
    #[allow(clippy::too_many_arguments)]
    pub async fn get_in_and_where_by_page(
        &self,
        page: u64,
        limit: u64,
        in_key: &str,
        in_values: Vec<Value>,
        filter: &Filter,
        order_by: Option<&str>,
        direction: OrderDirection,
    ) -> RepositoryResult<Vec<Record<S>>> {
        let window = page_window(page, limit)?;
        let query = ordered(
            Query::filtered(filter.clone()).within(in_key, in_values),
            order_by,
            direction,
        )
        .paginate_opt(window);
        self.read(RepositoryOperation::FindAll, self.store.fetch(&query))
            .await
    }

    // Write path

    /// Build and persist a new record
    ///
    /// # Errors
    ///
    /// `UnsavedRecord` with every validation message when the inputs are
    /// refused, before or by the store.
    pub async fn create(&self, inputs: &Inputs) -> RepositoryResult<Record<S>> {
        let operation = RepositoryOperation::Create;
        self.reject_inputs(operation, inputs)?;
        self.run(operation, self.store.insert(inputs))
            .await
            .map_err(|e| self.write_failure(operation, e))
    }

    /// Update the record with identity `id`
    ///
    /// Keys starting with `_` are dropped from the inputs first.
    ///
    /// # Errors
    ///
    /// `NotFound` when the record is missing, `UpdateFailed` when the write is
    /// refused.
    pub async fn update_by_id(&self, id: &RecordId<S>, inputs: &Inputs) -> RepositoryResult<Record<S>> {
        let record = self.find_or_fail(id).await?;
        self.update_record(record, inputs).await
    }

    /// Update the first record matching `filter`
    pub async fn update_first_by(&self, filter: &Filter, inputs: &Inputs) -> RepositoryResult<Record<S>> {
        let record = self.first_or_fail_by(filter).await?;
        self.update_record(record, inputs).await
    }

    async fn update_record(&self, record: Record<S>, inputs: &Inputs) -> RepositoryResult<Record<S>> {
        let operation = RepositoryOperation::Update;
        let inputs = inputs.purified();
        let id = record.id().to_string();
        self.reject_inputs(operation, &inputs)
            .map_err(|e| e.with_entity(<Record<S> as Model>::ENTITY, id.clone()))?;
        self.run(operation, self.store.update(&record, &inputs))
            .await
            .map_err(|e| {
                self.write_failure(operation, e)
                    .with_entity(<Record<S> as Model>::ENTITY, id)
            })
    }

    /// Delete the record with identity `id`
    ///
    /// # Errors
    ///
    /// `NotFound` when the record is missing, `DeleteFailed` when the delete
    /// is refused.
    pub async fn destroy(&self, id: &RecordId<S>) -> RepositoryResult<bool> {
        let record = self.find_or_fail(id).await?;
        self.delete_record(record).await
    }

    /// Delete the first record matching `filter`
    pub async fn destroy_first_by(&self, filter: &Filter) -> RepositoryResult<bool> {
        let record = self.first_or_fail_by(filter).await?;
        self.delete_record(record).await
    }

    async fn delete_record(&self, record: Record<S>) -> RepositoryResult<bool> {
        let operation = RepositoryOperation::Delete;
        let id = record.id().to_string();
        self.run(operation, self.store.delete(&record))
            .await
            .map_err(|e| {
                self.write_failure(operation, e)
                    .with_entity(<Record<S> as Model>::ENTITY, id)
            })
    }

    // Aggregation

    /// Number of records
    pub async fn count(&self) -> RepositoryResult<u64> {
        self.count_by(&Filter::new()).await
    }

    /// Number of records matching `filter`
    pub async fn count_by(&self, filter: &Filter) -> RepositoryResult<u64> {
        self.read(RepositoryOperation::Count, self.store.count(filter))
            .await
    }

    // Outside the supported contract

    /// Records having a related record; not supported
    pub async fn get_has(
        &self,
        _relation: &str,
        _limit: u64,
        _order_by: Option<&str>,
        _direction: OrderDirection,
    ) -> RepositoryResult<Vec<Record<S>>> {
        Err(RepositoryError::unimplemented(RepositoryOperation::FindAll, "get_has"))
    }

    /// First record having a related record; not supported
    pub async fn has_first(&self, _relation: &str) -> RepositoryResult<Option<Record<S>>> {
        Err(RepositoryError::unimplemented(RepositoryOperation::FindFirst, "has_first"))
    }

    /// First record having a related record, or fail; not supported
    pub async fn has_first_or_fail(&self, _relation: &str) -> RepositoryResult<Record<S>> {
        Err(RepositoryError::unimplemented(
            RepositoryOperation::FindFirst,
            "has_first_or_fail",
        ))
    }

    /// Records whose relation matches `filter`; not supported
    pub async fn where_has(&self, _relation: &str, _filter: &Filter) -> RepositoryResult<Vec<Record<S>>> {
        Err(RepositoryError::unimplemented(RepositoryOperation::FindAll, "where_has"))
    }

    /// Assign inputs to every record; not supported
    pub async fn update_all(&self, _inputs: &Inputs) -> RepositoryResult<u64> {
        Err(RepositoryError::unimplemented(RepositoryOperation::Update, "update_all"))
    }

    /// Assign inputs to every record matching `filter`; not supported
    pub async fn update_by(&self, _filter: &Filter, _inputs: &Inputs) -> RepositoryResult<u64> {
        Err(RepositoryError::unimplemented(RepositoryOperation::Update, "update_by"))
    }

    /// Update the match or create a record; not supported
    pub async fn update_or_create_by(&self, _filter: &Filter, _inputs: &Inputs) -> RepositoryResult<Record<S>> {
        Err(RepositoryError::unimplemented(
            RepositoryOperation::Update,
            "update_or_create_by",
        ))
    }

    /// Delete every record matching `filter`; not supported
    pub async fn destroy_by(&self, _filter: &Filter) -> RepositoryResult<u64> {
        Err(RepositoryError::unimplemented(RepositoryOperation::Delete, "destroy_by"))
    }

    /// Delete every record; not supported
    pub async fn truncate(&self) -> RepositoryResult<()> {
        Err(RepositoryError::unimplemented(RepositoryOperation::Delete, "truncate"))
    }

    /// Count records whose relation matches `filter`; not supported
    pub async fn count_where_has(&self, _relation: &str, _filter: &Filter) -> RepositoryResult<u64> {
        Err(RepositoryError::unimplemented(RepositoryOperation::Count, "count_where_has"))
    }
}

impl<S: GroupingStore> Repository<S> {
    /// Distinct values of `field` among records matching `filter`
    ///
    /// Ordered by the grouped value; counts are filled in when `with_count`.
    pub async fn get_by_group_by(
        &self,
        field: &str,
        filter: &Filter,
        with_count: bool,
    ) -> RepositoryResult<Vec<Group>> {
        self.read(
            RepositoryOperation::GroupBy,
            self.store.group_count(field, filter, with_count),
        )
        .await
    }
}

impl<S: AggregateStore> Repository<S> {
    /// Run a match, project, group, limit pipeline
    ///
    /// Empty stages are left out; see [`Pipeline::from_parts`].
    pub async fn get_aggregate(
        &self,
        matching: Filter,
        project: Vec<Projection>,
        group: Option<GroupSpec>,
        limit: u64,
    ) -> RepositoryResult<Vec<serde_json::Value>> {
        self.aggregate(&Pipeline::from_parts(matching, project, group, limit))
            .await
    }

    /// Run an arbitrary pipeline
    pub async fn aggregate(&self, pipeline: &Pipeline) -> RepositoryResult<Vec<serde_json::Value>> {
        self.read(RepositoryOperation::Aggregate, self.store.aggregate(pipeline))
            .await
    }
}

fn ordered(query: Query, order_by: Option<&str>, direction: OrderDirection) -> Query {
    match order_by {
        Some(field) => query.order_by(field, direction),
        None => query,
    }
}

fn page_window(page: u64, limit: u64) -> RepositoryResult<Option<Pagination>> {
    if page == 0 {
        return Err(RepositoryError::invalid_argument(
            RepositoryOperation::FindAll,
            "page numbers start at 1",
        ));
    }
    if limit == 0 {
        return Ok(None);
    }
    Pagination::checked_page(page, limit).map(Some).ok_or_else(|| {
        RepositoryError::invalid_argument(
            RepositoryOperation::FindAll,
            format!("page {} of size {} is out of range", page, limit),
        )
    })
}
