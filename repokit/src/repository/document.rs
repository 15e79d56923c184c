//! Document store over SurrealDB
//!
//! [`DocumentStore`] renders [`Query`]s and [`Pipeline`]s as SurrealQL with
//! field-named parameters (`$username`) and runs them on a [`SurrealClient`].
//! Internal parameters use a `__` prefix (`$__limit`, `$__data`) so they never
//! collide with field names.
//!
//! Counting runs the pipeline `match -> count`, so a filter that matches
//! nothing yields an empty result set, reported as zero.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use surrealdb::opt::QueryResult;
use surrealdb::RecordId;

use super::aggregate::{Accumulator, AccumulatorFn, GroupSpec, Pipeline, Projection, Stage};
use super::error::{RepositoryError, RepositoryOperation, WriteError};
use super::filter::{validate_identifier, BindSet, Dialect, FilterBuilder, SurrealDialect};
use super::inputs::Inputs;
use super::query::{Filter, Membership, Query};
use super::traits::{AggregateStore, Model, RepositoryResult, Store};
use super::value::Value;
use crate::surrealdb_backend::SurrealClient;

/// Alias of the single row produced by a count pipeline
const COUNT_ALIAS: &str = "number";

#[derive(Deserialize)]
struct CountRow {
    number: u64,
}

/// Store persisting `M` in the table [`Model::SOURCE`]
#[derive(Debug)]
pub struct DocumentStore<M> {
    client: Arc<SurrealClient>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for DocumentStore<M> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            _model: PhantomData,
        }
    }
}

impl<M> DocumentStore<M>
where
    M: Model<Id = RecordId> + DeserializeOwned,
{
    /// Create a store on a connected client
    pub fn new(client: Arc<SurrealClient>) -> Self {
        Self {
            client,
            _model: PhantomData,
        }
    }

    /// The underlying client
    pub fn client(&self) -> &SurrealClient {
        &self.client
    }

    fn table() -> RepositoryResult<&'static str> {
        validate_identifier(M::SOURCE)?;
        Ok(M::SOURCE)
    }

    /// Render `SELECT * ...` for a query
    pub fn select_sql(query: &Query) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        let mut builder = FilterBuilder::new(SurrealDialect);
        let mut sql = format!("SELECT * FROM {}", table);

        let mut clauses = Vec::new();
        let predicate = builder.build(&query.filter)?;
        if !predicate.is_empty() {
            clauses.push(predicate);
        }
        if let Some(membership) = &query.membership {
            clauses.push(membership_clause(&mut builder, membership)?);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Some((field, direction)) = &query.order {
            validate_identifier(field)?;
            sql.push_str(&format!(" ORDER BY {} {}", field, direction.as_sql()));
        }

        if let Some(pagination) = query.pagination {
            let limit = builder.bind_internal("__limit", to_i64(pagination.limit)?)?;
            let start = builder.bind_internal("__start", to_i64(pagination.offset)?)?;
            sql.push_str(&format!(" LIMIT {} START {}", limit, start));
        }

        Ok((sql, builder.into_binds()))
    }

    /// Render a pipeline as nested selects, innermost stage first
    pub fn pipeline_sql(pipeline: &Pipeline) -> RepositoryResult<(String, BindSet)> {
        let mut source = Self::table()?.to_string();
        let mut builder = FilterBuilder::new(SurrealDialect);
        let mut sql = format!("SELECT * FROM {}", source);

        for stage in pipeline.stages() {
            sql = match stage {
                Stage::Match(filter) => {
                    let predicate = builder.build(filter)?;
                    if predicate.is_empty() {
                        format!("SELECT * FROM {}", source)
                    } else {
                        format!("SELECT * FROM {} WHERE {}", source, predicate)
                    }
                }
                Stage::Project(fields) => {
                    format!("SELECT {} FROM {}", projection_list(fields)?, source)
                }
                Stage::Group(group) => group_select(group, &source)?,
                Stage::Limit(limit) => format!("SELECT * FROM {} LIMIT {}", source, limit),
                Stage::Count(alias) => {
                    validate_identifier(alias)?;
                    format!("SELECT count() AS {} FROM {} GROUP ALL", alias, source)
                }
            };
            source = format!("({})", sql);
        }

        Ok((sql, builder.into_binds()))
    }

    async fn run<T>(&self, sql: &str, binds: BindSet) -> Result<T, surrealdb::Error>
    where
        T: DeserializeOwned,
        usize: QueryResult<T>,
    {
        tracing::trace!(sql = %sql, binds = binds.len(), "SurrealQL query");
        let mut request = self.client.query(sql);
        for (placeholder, value) in binds {
            request = request.bind((placeholder.trim_start_matches('$').to_string(), value));
        }
        let mut response = request.await?;
        response.take(0)
    }
}

impl<M> Store for DocumentStore<M>
where
    M: Model<Id = RecordId> + DeserializeOwned,
{
    type Record = M;

    async fn fetch(&self, query: &Query) -> RepositoryResult<Vec<M>> {
        let (sql, binds) = Self::select_sql(query)?;
        self.run(&sql, binds)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::FindAll))
    }

    async fn fetch_by_id(&self, id: &RecordId) -> RepositoryResult<Option<M>> {
        self.client
            .select(id.clone())
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::FindById))
    }

    async fn count(&self, filter: &Filter) -> RepositoryResult<u64> {
        let pipeline = Pipeline::count_matching(filter.clone(), COUNT_ALIAS);
        let (sql, binds) = Self::pipeline_sql(&pipeline)?;
        let row: Option<CountRow> = self
            .run(&sql, binds)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Count))?;
        Ok(row.map_or(0, |r| r.number))
    }

    async fn insert(&self, inputs: &Inputs) -> Result<M, WriteError> {
        let table = Self::table()?;
        let created: Option<M> = self
            .client
            .query("CREATE type::table($__table) CONTENT $__data")
            .bind(("__table", table))
            .bind(("__data", inputs.clone()))
            .await
            .and_then(|mut response| response.take(0))
            .map_err(|e| write_error(e, RepositoryOperation::Create))?;
        created.ok_or_else(|| WriteError::Rejected(vec!["no record was created".to_string()]))
    }

    async fn update(&self, record: &M, inputs: &Inputs) -> Result<M, WriteError> {
        let id = record.id();
        let updated: Option<M> = self
            .client
            .query("UPDATE $__id MERGE $__data")
            .bind(("__id", id.clone()))
            .bind(("__data", inputs.clone()))
            .await
            .and_then(|mut response| response.take(0))
            .map_err(|e| write_error(e, RepositoryOperation::Update))?;
        updated.ok_or_else(|| {
            WriteError::Failed(
                RepositoryError::not_found(M::ENTITY, id.to_string())
                    .with_operation(RepositoryOperation::Update),
            )
        })
    }

    async fn delete(&self, record: &M) -> Result<bool, WriteError> {
        let deleted: Option<M> = self
            .client
            .query("DELETE $__id RETURN BEFORE")
            .bind(("__id", record.id()))
            .await
            .and_then(|mut response| response.take(0))
            .map_err(|e| write_error(e, RepositoryOperation::Delete))?;
        Ok(deleted.is_some())
    }
}

impl<M> AggregateStore for DocumentStore<M>
where
    M: Model<Id = RecordId> + DeserializeOwned,
{
    async fn aggregate(&self, pipeline: &Pipeline) -> RepositoryResult<Vec<serde_json::Value>> {
        let (sql, binds) = Self::pipeline_sql(pipeline)?;
        self.run(&sql, binds)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Aggregate))
    }
}

fn membership_clause(builder: &mut FilterBuilder<SurrealDialect>, membership: &Membership) -> RepositoryResult<String> {
    validate_identifier(&membership.key)?;
    if membership.values.is_empty() {
        return Ok(if membership.negated { "1 = 1" } else { "1 = 0" }.to_string());
    }
    let placeholders = membership
        .values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let placeholder = builder.bind_internal(&format!("__in_{}", i), value.clone())?;
            Ok(SurrealDialect.bound_expr(&placeholder, value))
        })
        .collect::<RepositoryResult<Vec<_>>>()?;
    Ok(format!(
        "{} {}INSIDE [{}]",
        membership.key,
        if membership.negated { "NOT " } else { "" },
        placeholders.join(", ")
    ))
}

fn projection_list(fields: &[Projection]) -> RepositoryResult<String> {
    fields
        .iter()
        .map(|projection| {
            validate_identifier(&projection.field)?;
            match &projection.alias {
                Some(alias) => {
                    validate_identifier(alias)?;
                    Ok(format!("{} AS {}", projection.field, alias))
                }
                None => Ok(projection.field.clone()),
            }
        })
        .collect::<RepositoryResult<Vec<_>>>()
        .map(|list| list.join(", "))
}

fn accumulator_expr(accumulator: &Accumulator) -> RepositoryResult<String> {
    validate_identifier(&accumulator.alias)?;
    let function = match accumulator.function {
        AccumulatorFn::Count => return Ok(format!("count() AS {}", accumulator.alias)),
        AccumulatorFn::Sum => "math::sum",
        AccumulatorFn::Avg => "math::mean",
        AccumulatorFn::Min => "math::min",
        AccumulatorFn::Max => "math::max",
    };
    let field = accumulator.field.as_deref().ok_or_else(|| {
        RepositoryError::invalid_argument(
            RepositoryOperation::Aggregate,
            format!("aggregate '{}' needs an input field", accumulator.alias),
        )
    })?;
    validate_identifier(field)?;
    Ok(format!("{}({}) AS {}", function, field, accumulator.alias))
}

fn group_select(group: &GroupSpec, source: &str) -> RepositoryResult<String> {
    for key in &group.keys {
        validate_identifier(key)?;
    }
    let mut columns: Vec<String> = group.keys.clone();
    for accumulator in &group.accumulators {
        columns.push(accumulator_expr(accumulator)?);
    }
    let grouping = if group.keys.is_empty() {
        "GROUP ALL".to_string()
    } else {
        format!("GROUP BY {}", group.keys.join(", "))
    };
    Ok(format!("SELECT {} FROM {} {}", columns.join(", "), source, grouping))
}

fn to_i64(n: u64) -> RepositoryResult<Value> {
    i64::try_from(n).map(Value::Integer).map_err(|_| {
        RepositoryError::invalid_argument(RepositoryOperation::FindAll, format!("{} is out of range", n))
    })
}

/// Index and assertion failures are refusals; everything else is a failure
fn write_error(err: surrealdb::Error, operation: RepositoryOperation) -> WriteError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("already contains")
        || lowered.contains("unique")
        || lowered.contains("must conform")
        || lowered.contains("assert")
    {
        WriteError::Rejected(vec![message])
    } else {
        WriteError::Failed(RepositoryError::from(err).with_operation(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{values, FilterOperator, OrderDirection, Repository, RepositoryErrorKind};

    #[derive(Debug, Clone, Deserialize)]
    struct User {
        id: RecordId,
        username: String,
        text: String,
        rank: i64,
    }

    impl Model for User {
        type Id = RecordId;
        const ENTITY: &'static str = "User";
        const SOURCE: &'static str = "users";
        const FIELDS: &'static [&'static str] = &["username", "text", "rank"];

        fn id(&self) -> RecordId {
            self.id.clone()
        }
    }

    async fn seeded() -> Repository<DocumentStore<User>> {
        let client = surrealdb::engine::any::connect("mem://").await.unwrap();
        client.use_ns("test").use_db("test").await.unwrap();
        client
            .query("DEFINE INDEX unique_username ON users FIELDS username UNIQUE")
            .await
            .unwrap()
            .check()
            .unwrap();

        let repo = Repository::new(DocumentStore::new(Arc::new(client)));
        for i in 1..=2 {
            repo.create(
                &Inputs::new()
                    .set("username", format!("User {}", i))
                    .set("text", format!("Long Text {}", i))
                    .set("rank", i),
            )
            .await
            .unwrap();
        }
        repo.create(
            &Inputs::new()
                .set("username", "Unique Username ")
                .set("text", "Particular text ")
                .set("rank", 3),
        )
        .await
        .unwrap();
        repo
    }

    fn ranks(users: &[User]) -> Vec<i64> {
        users.iter().map(|u| u.rank).collect()
    }

    #[test]
    fn test_select_sql_rendering() {
        let query = Query::filtered(
            Filter::new()
                .with("username%OR%text", "%Unique%", FilterOperator::Like)
                .eq("deleted_at", Value::Null),
        )
        .within("rank", values([2, 3]))
        .order_by("rank", OrderDirection::Descending)
        .paginate(crate::repository::Pagination::page(2, 5));

        let (sql, binds) = DocumentStore::<User>::select_sql(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE \
             ((type::is::string(username) AND string::matches(username, $username)) \
             OR (type::is::string(text) AND string::matches(text, $text))) \
             AND (deleted_at = NONE OR deleted_at = NULL) \
             AND rank INSIDE [$__in_0, $__in_1] \
             ORDER BY rank DESC LIMIT $__limit START $__start"
        );
        assert_eq!(binds.get("$__start"), Some(&Value::Integer(5)));
        assert_eq!(binds.len(), 6);
    }

    #[test]
    fn test_select_sql_field_named_like_internal_param() {
        let query = Query::filtered(Filter::new().eq("__limit", 1))
            .within("id", vec![Value::record("users:one")])
            .paginate(crate::repository::Pagination::first_page(2));

        let (sql, binds) = DocumentStore::<User>::select_sql(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE (__limit = $__limit) \
             AND id INSIDE [type::thing($__in_0)] LIMIT $__limit_2 START $__start"
        );
        assert_eq!(binds.get("$__limit"), Some(&Value::Integer(1)));
        assert_eq!(binds.get("$__limit_2"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_pipeline_sql_rendering() {
        let pipeline = Pipeline::from_parts(
            Filter::new().eq("username", "User 1"),
            vec![Projection::new("text"), Projection::aliased("rank", "points")],
            Some(GroupSpec::by(["text"]).with(Accumulator::sum("points", "total"))),
            10,
        );
        let (sql, binds) = DocumentStore::<User>::pipeline_sql(&pipeline).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM (SELECT text, math::sum(points) AS total FROM \
             (SELECT text, rank AS points FROM \
             (SELECT * FROM users WHERE (username = $username))) GROUP BY text) LIMIT 10"
        );
        assert_eq!(binds.get("$username"), Some(&Value::from("User 1")));
    }

    #[test]
    fn test_count_pipeline_sql() {
        let pipeline = Pipeline::count_matching(Filter::new(), COUNT_ALIAS);
        let (sql, _) = DocumentStore::<User>::pipeline_sql(&pipeline).unwrap();
        assert_eq!(sql, "SELECT count() AS number FROM users GROUP ALL");
    }

    #[tokio::test]
    async fn test_or_group_like_query() {
        let repo = seeded().await;
        let by_name = Filter::new().with("username%OR%text", "%Unique%", FilterOperator::Like);
        let by_text = Filter::new().with("username%OR%text", "%Particular%", FilterOperator::Like);

        assert_eq!(ranks(&repo.get_by(&by_name).await.unwrap()), vec![3]);
        assert_eq!(ranks(&repo.get_by(&by_text).await.unwrap()), vec![3]);
    }

    #[tokio::test]
    async fn test_find_by_record_id() {
        let repo = seeded().await;
        let user = repo
            .first_or_fail_by(&Filter::new().eq("username", "User 2"))
            .await
            .unwrap();
        let found = repo.find_or_fail(&user.id).await.unwrap();
        assert_eq!(found.text, "Long Text 2");
    }

    #[tokio::test]
    async fn test_get_by_order_and_page() {
        let repo = seeded().await;
        let users = repo
            .get_by_order("rank", &Filter::new(), OrderDirection::Descending, 2)
            .await
            .unwrap();
        assert_eq!(ranks(&users), vec![3, 2]);

        let page = repo
            .get_by_page(2, 1, &Filter::new(), Some("rank"), OrderDirection::Ascending)
            .await
            .unwrap();
        assert_eq!(ranks(&page), vec![2]);
    }

    #[tokio::test]
    async fn test_get_in_and_not_in() {
        let repo = seeded().await;
        let inside = repo
            .get_in("rank", values([2, 3]), Some("rank"), OrderDirection::Ascending, 0)
            .await
            .unwrap();
        assert_eq!(ranks(&inside), vec![2, 3]);

        let outside = repo
            .get_not_in("rank", values([2, 3]), None, OrderDirection::Descending, 0)
            .await
            .unwrap();
        assert_eq!(ranks(&outside), vec![1]);
    }

    async fn by_rank(repo: &Repository<DocumentStore<User>>) -> Vec<User> {
        repo.get_by_order("rank", &Filter::new(), OrderDirection::Ascending, 0)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_in_by_record_id() {
        let repo = seeded().await;
        let users = by_rank(&repo).await;
        let wanted = values([users[0].id.clone(), users[1].id.clone()]);

        let inside = repo
            .get_in("id", wanted.clone(), Some("rank"), OrderDirection::Ascending, 0)
            .await
            .unwrap();
        assert_eq!(ranks(&inside), vec![1, 2]);

        let outside = repo
            .get_not_in("id", wanted, None, OrderDirection::Descending, 0)
            .await
            .unwrap();
        assert_eq!(ranks(&outside), vec![3]);

        let first = repo
            .first_or_fail_by(&Filter::new().eq("id", &users[2].id))
            .await
            .unwrap();
        assert_eq!(first.rank, 3);
    }

    #[tokio::test]
    async fn test_get_in_and_where_by_page() {
        let repo = seeded().await;
        let users = by_rank(&repo).await;
        let filter = Filter::new().with("text", "Long%", FilterOperator::Like);

        let page = repo
            .get_in_and_where_by_page(
                1,
                10,
                "id",
                values([users[1].id.clone(), users[2].id.clone()]),
                &filter,
                None,
                OrderDirection::Descending,
            )
            .await
            .unwrap();
        assert_eq!(ranks(&page), vec![2]);
    }

    #[tokio::test]
    async fn test_get_by_page_limit_zero_is_unpaginated() {
        let repo = seeded().await;
        let everything = repo
            .get_by_page(3, 0, &Filter::new(), Some("rank"), OrderDirection::Ascending)
            .await
            .unwrap();
        assert_eq!(ranks(&everything), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_null_filter_matches_missing_fields() {
        let repo = seeded().await;
        assert_eq!(repo.count_by(&Filter::new().is_null("deleted_at")).await.unwrap(), 3);
        assert_eq!(repo.count_by(&Filter::new().is_not_null("deleted_at")).await.unwrap(), 0);
        assert_eq!(
            repo.get_by(&Filter::new().eq("nickname%OR%deleted_at", Value::Null))
                .await
                .unwrap()
                .len(),
            3
        );
    }

    #[tokio::test]
    async fn test_count_by() {
        let repo = seeded().await;
        assert_eq!(repo.count().await.unwrap(), 3);
        assert_eq!(repo.count_by(&Filter::new().eq("username", "User 1")).await.unwrap(), 1);
        assert_eq!(repo.count_by(&Filter::new().eq("username", "nobody")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_username() {
        let err = seeded()
            .await
            .create(&Inputs::new().set("username", "User 1").set("text", "x").set("rank", 9))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnsavedRecord);
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn test_update_first_by_and_destroy() {
        let repo = seeded().await;
        let filter = Filter::new().eq("username", "User 1");
        let updated = repo
            .update_first_by(&filter, &Inputs::new().set("text", "changed").set("_token", "t"))
            .await
            .unwrap();
        assert_eq!(updated.text, "changed");
        assert_eq!(updated.rank, 1);

        assert!(repo.destroy(&updated.id).await.unwrap());
        let err = repo.find_or_fail(&updated.id).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);

        assert!(repo
            .destroy_first_by(&Filter::new().eq("username", "User 2"))
            .await
            .unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_aggregate() {
        let repo = seeded().await;
        repo.create(&Inputs::new().set("username", "User 4").set("text", "Long Text 1").set("rank", 4))
            .await
            .unwrap();

        let mut rows = repo
            .get_aggregate(
                Filter::new().with("rank", 1, FilterOperator::GreaterThanOrEqual),
                vec![],
                Some(GroupSpec::by(["text"]).with(Accumulator::count("number"))),
                0,
            )
            .await
            .unwrap();
        rows.sort_by_key(|row| row["text"].as_str().map(str::to_string));

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["text"], "Long Text 1");
        assert_eq!(rows[0]["number"], 2);
    }
}
