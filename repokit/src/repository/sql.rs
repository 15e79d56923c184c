//! Relational store over the sqlx `Any` driver
//!
//! [`SqlStore`] renders [`Query`]s as SQL with positional `$N` placeholders,
//! which both PostgreSQL and SQLite accept, and binds every value through
//! [`AnyArguments`]. Identifiers (table, fields, order and membership keys)
//! are validated before they are interpolated.
//!
//! # Example
//!
//! ```rust,ignore
//! use repokit::repository::{Filter, Repository, SqlStore};
//!
//! let pool = repokit::database::create_pool(&config.database).await?;
//! let users = Repository::new(SqlStore::<User>::new(pool));
//!
//! let count = users.count_by(&Filter::new().eq("username", "User 1")).await?;
//! ```

use std::marker::PhantomData;

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::error::ErrorKind;
use sqlx::{AnyPool, Arguments, FromRow, Row};

use super::error::{RepositoryError, RepositoryOperation, WriteError};
use super::filter::{validate_identifier, BindSet, FilterBuilder, SqlDialect};
use super::inputs::Inputs;
use super::query::{Filter, Membership, Query};
use super::traits::{Group, GroupingStore, Model, RepositoryResult, Store};
use super::value::Value;

/// Store persisting `M` in the table [`Model::SOURCE`]
#[derive(Debug)]
pub struct SqlStore<M> {
    pool: AnyPool,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for SqlStore<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _model: PhantomData,
        }
    }
}

impl<M> SqlStore<M>
where
    M: Model + for<'r> FromRow<'r, AnyRow>,
    M::Id: Into<Value>,
{
    /// Create a store on an existing pool
    pub fn new(pool: AnyPool) -> Self {
        Self {
            pool,
            _model: PhantomData,
        }
    }

    /// The underlying pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    fn table() -> RepositoryResult<&'static str> {
        validate_identifier(M::SOURCE)?;
        validate_identifier(M::PRIMARY_KEY)?;
        Ok(M::SOURCE)
    }

    /// Render `SELECT * ...` for a query
    pub fn select_sql(query: &Query) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        let mut builder = FilterBuilder::new(SqlDialect::new());
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
            let offset = builder.bind_internal("__offset", to_i64(pagination.offset)?)?;
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }

        Ok((sql, builder.into_binds()))
    }

    /// Render `SELECT COUNT(*) ...` for a filter
    pub fn count_sql(filter: &Filter) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        let mut builder = FilterBuilder::new(SqlDialect::new());
        let predicate = builder.build(filter)?;
        let sql = format!("SELECT COUNT(*) AS number FROM {}{}", table, where_clause(&predicate));
        Ok((sql, builder.into_binds()))
    }

    /// Render the grouped count for `field`
    pub fn group_sql(field: &str, filter: &Filter) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        validate_identifier(field)?;
        let mut builder = FilterBuilder::new(SqlDialect::new());
        let predicate = builder.build(filter)?;
        let sql = format!(
            "SELECT {field} AS grouped, COUNT(*) AS number FROM {table}{} GROUP BY {field} ORDER BY {field} ASC",
            where_clause(&predicate)
        );
        Ok((sql, builder.into_binds()))
    }

    /// Render `INSERT ... RETURNING *`
    pub fn insert_sql(inputs: &Inputs) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        if inputs.is_empty() {
            return Ok((
                format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table),
                BindSet::new(),
            ));
        }

        let mut builder = FilterBuilder::new(SqlDialect::new());
        let mut columns = Vec::with_capacity(inputs.len());
        let mut values = Vec::with_capacity(inputs.len());
        for (field, value) in inputs.iter() {
            validate_identifier(field)?;
            columns.push(field);
            values.push(assignment_value(&mut builder, field, value)?);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            columns.join(", "),
            values.join(", ")
        );
        Ok((sql, builder.into_binds()))
    }

    /// Render `UPDATE ... RETURNING *` for the record with identity `id`
    pub fn update_sql(id: &M::Id, inputs: &Inputs) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        let mut builder = FilterBuilder::new(SqlDialect::new());
        let mut assignments = Vec::with_capacity(inputs.len());
        for (field, value) in inputs.iter() {
            validate_identifier(field)?;
            let rendered = assignment_value(&mut builder, field, value)?;
            assignments.push(format!("{} = {}", field, rendered));
        }
        let key = builder.bind_internal(M::PRIMARY_KEY, id.clone().into())?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {} RETURNING *",
            table,
            assignments.join(", "),
            M::PRIMARY_KEY,
            key
        );
        Ok((sql, builder.into_binds()))
    }

    fn by_id_sql(verb: &str, id: &M::Id) -> RepositoryResult<(String, BindSet)> {
        let table = Self::table()?;
        let mut builder = FilterBuilder::new(SqlDialect::new());
        let key = builder.bind_internal(M::PRIMARY_KEY, id.clone().into())?;
        let sql = format!("{} FROM {} WHERE {} = {}", verb, table, M::PRIMARY_KEY, key);
        Ok((sql, builder.into_binds()))
    }

    async fn fetch_optional(&self, sql: &str, binds: BindSet, operation: RepositoryOperation) -> RepositoryResult<Option<M>> {
        sqlx::query_as_with::<_, M, _>(sql, arguments(binds, operation)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(operation))
    }
}

impl<M> Store for SqlStore<M>
where
    M: Model + for<'r> FromRow<'r, AnyRow>,
    M::Id: Into<Value>,
{
    type Record = M;

    async fn fetch(&self, query: &Query) -> RepositoryResult<Vec<M>> {
        let (sql, binds) = Self::select_sql(query)?;
        tracing::trace!(sql = %sql, binds = binds.len(), "SQL fetch");
        sqlx::query_as_with::<_, M, _>(&sql, arguments(binds, RepositoryOperation::FindAll)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::FindAll))
    }

    async fn fetch_by_id(&self, id: &M::Id) -> RepositoryResult<Option<M>> {
        let (sql, binds) = Self::by_id_sql("SELECT *", id)?;
        self.fetch_optional(&sql, binds, RepositoryOperation::FindById)
            .await
    }

    async fn count(&self, filter: &Filter) -> RepositoryResult<u64> {
        let (sql, binds) = Self::count_sql(filter)?;
        let number: i64 = sqlx::query_scalar_with(&sql, arguments(binds, RepositoryOperation::Count)?)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Count))?;
        Ok(u64::try_from(number).unwrap_or_default())
    }

    async fn insert(&self, inputs: &Inputs) -> Result<M, WriteError> {
        let (sql, binds) = Self::insert_sql(inputs)?;
        sqlx::query_as_with::<_, M, _>(&sql, arguments(binds, RepositoryOperation::Create)?)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| write_error(e, RepositoryOperation::Create))
    }

    async fn update(&self, record: &M, inputs: &Inputs) -> Result<M, WriteError> {
        let id = record.id();
        let (sql, binds) = if inputs.is_empty() {
            Self::by_id_sql("SELECT *", &id)?
        } else {
            Self::update_sql(&id, inputs)?
        };
        let updated = sqlx::query_as_with::<_, M, _>(&sql, arguments(binds, RepositoryOperation::Update)?)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, RepositoryOperation::Update))?;
        updated.ok_or_else(|| {
            WriteError::Failed(
                RepositoryError::not_found(M::ENTITY, id.to_string())
                    .with_operation(RepositoryOperation::Update),
            )
        })
    }

    async fn delete(&self, record: &M) -> Result<bool, WriteError> {
        let (sql, binds) = Self::by_id_sql("DELETE", &record.id())?;
        let result = sqlx::query_with(&sql, arguments(binds, RepositoryOperation::Delete)?)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, RepositoryOperation::Delete))?;
        Ok(result.rows_affected() > 0)
    }
}

impl<M> GroupingStore for SqlStore<M>
where
    M: Model + for<'r> FromRow<'r, AnyRow>,
    M::Id: Into<Value>,
{
    async fn group_count(&self, field: &str, filter: &Filter, with_count: bool) -> RepositoryResult<Vec<Group>> {
        let (sql, binds) = Self::group_sql(field, filter)?;
        let rows = sqlx::query_with(&sql, arguments(binds, RepositoryOperation::GroupBy)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::GroupBy))?;

        rows.iter()
            .map(|row| {
                let number: i64 = row
                    .try_get("number")
                    .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::GroupBy))?;
                Ok(Group {
                    value: decode_value(row, "grouped"),
                    count: with_count.then(|| u64::try_from(number).unwrap_or_default()),
                })
            })
            .collect()
    }
}

fn where_clause(predicate: &str) -> String {
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicate)
    }
}

fn membership_clause(builder: &mut FilterBuilder<SqlDialect>, membership: &Membership) -> RepositoryResult<String> {
    validate_identifier(&membership.key)?;
    if membership.values.is_empty() {
        return Ok(if membership.negated { "1 = 1" } else { "1 = 0" }.to_string());
    }
    let placeholders = membership
        .values
        .iter()
        .map(|value| builder.bind_internal(&membership.key, value.clone()))
        .collect::<RepositoryResult<Vec<_>>>()?;
    Ok(format!(
        "{} {}IN ({})",
        membership.key,
        if membership.negated { "NOT " } else { "" },
        placeholders.join(", ")
    ))
}

/// Nulls are written as literals so no driver has to type an untyped bind
fn assignment_value(builder: &mut FilterBuilder<SqlDialect>, field: &str, value: &Value) -> RepositoryResult<String> {
    if value.is_null() {
        Ok("NULL".to_string())
    } else {
        builder.bind(field, value.clone())
    }
}

fn to_i64(n: u64) -> RepositoryResult<Value> {
    i64::try_from(n).map(Value::Integer).map_err(|_| {
        RepositoryError::invalid_argument(RepositoryOperation::FindAll, format!("{} is out of range", n))
    })
}

fn arguments<'q>(binds: BindSet, operation: RepositoryOperation) -> RepositoryResult<AnyArguments<'q>> {
    let mut args = AnyArguments::default();
    for (_, value) in binds {
        let added = match value {
            Value::Null => args.add(Option::<String>::None),
            Value::Boolean(b) => args.add(b),
            Value::Integer(n) => args.add(n),
            Value::Float(n) => args.add(n),
            Value::String(s) | Value::Record(s) => args.add(s),
        };
        added.map_err(|e| RepositoryError::serialization_error(operation, e.to_string()))?;
    }
    Ok(args)
}

fn decode_value(row: &AnyRow, column: &str) -> Value {
    if let Ok(n) = row.try_get::<Option<i64>, _>(column) {
        return n.map_or(Value::Null, Value::Integer);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(column) {
        return Value::Float(n);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(column) {
        return Value::String(s);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(column) {
        return Value::Boolean(b);
    }
    Value::Null
}

/// Constraint violations are refusals; everything else is a failure
fn write_error(err: sqlx::Error, operation: RepositoryOperation) -> WriteError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(
            db_err.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ) {
            return WriteError::Rejected(vec![db_err.message().to_string()]);
        }
    }
    WriteError::Failed(RepositoryError::from(err).with_operation(operation))
}
