//! Filter builder
//!
//! Translates a [`Filter`] into a predicate string plus a [`BindSet`]. The
//! predicate only ever contains validated identifiers, operators and
//! placeholders; every value travels in the bind set.
//!
//! The placeholder strategy belongs to the [`Dialect`]:
//!
//! - [`SqlDialect`] numbers binds with a monotonic counter (`$1`, `$2`, ...),
//!   so the members of an OR-group bind to distinct placeholders.
//! - [`SurrealDialect`] names binds after the field (`$username`), so the
//!   members of an OR-group each get their own field-named bind carrying the
//!   shared value. Binding the same field twice in one query is rejected;
//!   a different field or internal parameter whose name is already taken
//!   gets a numeric suffix (`$a_b_2`).
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{Filter, FilterBuilder, FilterOperator, SqlDialect, Value};
//!
//! let filter = Filter::new()
//!     .eq("a", 1)
//!     .with("b%OR%c", "x", FilterOperator::Like)
//!     .eq("d", Value::Null);
//!
//! let mut builder = FilterBuilder::new(SqlDialect::new());
//! let predicate = builder.build(&filter).unwrap();
//! assert_eq!(predicate, "(a = $1) AND (b LIKE $2 OR c LIKE $3) AND d IS NULL");
//! assert_eq!(builder.binds().len(), 3);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{RepositoryError, RepositoryOperation};
use super::query::{split_or_group, Filter, FilterOperator};
use super::traits::RepositoryResult;
use super::value::Value;

/// Plain or dot-separated identifiers
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("identifier regex is valid")
});

/// Check that a field name is safe to interpolate into query text
///
/// Identifiers are letters, digits and underscores, not starting with a
/// digit, optionally dot-separated for nested fields.
///
/// # Example
///
/// ```rust
/// use repokit::repository::validate_identifier;
///
/// assert!(validate_identifier("address.city").is_ok());
/// assert!(validate_identifier("id; DROP TABLE users").is_err());
/// ```
pub fn validate_identifier(name: &str) -> RepositoryResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(RepositoryError::invalid_argument(
            RepositoryOperation::FindAll,
            format!("'{}' is not a valid field name", name),
        ))
    }
}

/// Placeholder name to value, in bind order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindSet {
    entries: Vec<(String, Value)>,
}

impl BindSet {
    /// Create an empty bind set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bind; placeholder names are unique within one query
    pub fn insert(&mut self, placeholder: impl Into<String>, value: Value) -> RepositoryResult<()> {
        let placeholder = placeholder.into();
        if self.get(&placeholder).is_some() {
            return Err(RepositoryError::invalid_argument(
                RepositoryOperation::FindAll,
                format!("placeholder {} is bound more than once", placeholder),
            ));
        }
        self.entries.push((placeholder, value));
        Ok(())
    }

    /// Value bound to `placeholder`
    pub fn get(&self, placeholder: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(name, _)| name == placeholder)
            .map(|(_, value)| value)
    }

    /// Number of binds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate binds in the order they were emitted
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl IntoIterator for BindSet {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Backend-specific rendering of placeholders and comparisons
pub trait Dialect {
    /// Placeholder text for the next bind of `field`
    fn placeholder(&mut self, field: &str) -> String;

    /// Render `field <operator> placeholder`
    fn comparison(&self, field: &str, operator: FilterOperator, placeholder: &str) -> String {
        format!("{} {} {}", field, operator, placeholder)
    }

    /// Render a comparison against the null literal
    fn null_comparison(&self, field: &str, operator: FilterOperator) -> String {
        format!("{} {} NULL", field, operator)
    }

    /// Value actually bound for `operator`
    fn bound_value(&self, _operator: FilterOperator, value: &Value) -> Value {
        value.clone()
    }

    /// Expression standing for a bound `value` inside the query text
    fn bound_expr(&self, placeholder: &str, _value: &Value) -> String {
        placeholder.to_string()
    }
}

/// Positional placeholders for relational stores
#[derive(Debug, Clone, Default)]
pub struct SqlDialect {
    counter: usize,
}

impl SqlDialect {
    /// Start numbering at `$1`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dialect for SqlDialect {
    fn placeholder(&mut self, _field: &str) -> String {
        self.counter += 1;
        format!("${}", self.counter)
    }

    /// `IS` / `IS NOT` against a bound value render as `=` / `!=`
    fn comparison(&self, field: &str, operator: FilterOperator, placeholder: &str) -> String {
        let operator = match operator {
            FilterOperator::Is => FilterOperator::Equal,
            FilterOperator::IsNot => FilterOperator::NotEqual,
            other => other,
        };
        format!("{} {} {}", field, operator, placeholder)
    }
}

/// Parameter names SurrealDB reserves for itself
const PROTECTED_PARAMS: &[&str] = &[
    "access", "after", "auth", "before", "event", "input", "parent", "scope", "session",
    "this", "token", "value",
];

/// Field-named placeholders and SurrealQL comparisons for document stores
#[derive(Debug, Clone, Copy, Default)]
pub struct SurrealDialect;

impl SurrealDialect {
    /// Translate a LIKE pattern into an anchored regular expression
    pub fn like_to_regex(pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len() + 2);
        out.push('^');
        let mut literal = String::new();
        for ch in pattern.chars() {
            match ch {
                '%' | '_' => {
                    out.push_str(&regex::escape(&literal));
                    literal.clear();
                    out.push_str(if ch == '%' { ".*" } else { "." });
                }
                _ => literal.push(ch),
            }
        }
        out.push_str(&regex::escape(&literal));
        out.push('$');
        out
    }
}

impl Dialect for SurrealDialect {
    fn placeholder(&mut self, field: &str) -> String {
        let name = field.replace('.', "_");
        if PROTECTED_PARAMS.contains(&name.as_str()) {
            format!("${}_", name)
        } else {
            format!("${}", name)
        }
    }

    fn comparison(&self, field: &str, operator: FilterOperator, placeholder: &str) -> String {
        let matches = format!(
            "type::is::string({field}) AND string::matches({field}, {placeholder})"
        );
        match operator {
            FilterOperator::Like => format!("({})", matches),
            FilterOperator::NotLike => format!("!({})", matches),
            FilterOperator::Is => format!("{} = {}", field, placeholder),
            FilterOperator::IsNot => format!("{} != {}", field, placeholder),
            other => format!("{} {} {}", field, other, placeholder),
        }
    }

    fn null_comparison(&self, field: &str, operator: FilterOperator) -> String {
        match operator {
            FilterOperator::Is | FilterOperator::Equal => {
                format!("({field} = NONE OR {field} = NULL)")
            }
            FilterOperator::IsNot | FilterOperator::NotEqual => {
                format!("({field} != NONE AND {field} != NULL)")
            }
            other => format!("{} {} NULL", field, other),
        }
    }

    fn bound_value(&self, operator: FilterOperator, value: &Value) -> Value {
        match (operator, value) {
            (FilterOperator::Like | FilterOperator::NotLike, Value::String(pattern)) => {
                Value::String(Self::like_to_regex(pattern))
            }
            _ => value.clone(),
        }
    }

    fn bound_expr(&self, placeholder: &str, value: &Value) -> String {
        match value {
            Value::Record(_) => format!("type::thing({})", placeholder),
            _ => placeholder.to_string(),
        }
    }
}

/// Builds predicates and accumulates their binds for one query
///
/// A builder lives for exactly one query so that placeholder numbering and
/// uniqueness hold across the filter, the membership test and the window.
#[derive(Debug)]
pub struct FilterBuilder<D> {
    dialect: D,
    binds: BindSet,
    // placeholder -> field it was bound for; `None` for internal parameters
    owners: HashMap<String, Option<String>>,
}

impl<D: Dialect> FilterBuilder<D> {
    /// Start a query with an empty bind set
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            binds: BindSet::new(),
            owners: HashMap::new(),
        }
    }

    /// Bind `value` for `field` and return the placeholder to embed
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the dialect already bound `field` under the
    /// same name in this query.
    pub fn bind(&mut self, field: &str, value: Value) -> RepositoryResult<String> {
        self.bind_as(Some(field), field, value)
    }

    /// Bind an internal parameter (`__limit`, `__in_0`)
    ///
    /// Never collides with field binds: a taken name gets a numeric suffix.
    pub fn bind_internal(&mut self, name: &str, value: Value) -> RepositoryResult<String> {
        self.bind_as(None, name, value)
    }

    /// Bind `value` for `field` and return the expression to embed
    pub fn bind_expr(&mut self, field: &str, value: Value) -> RepositoryResult<String> {
        let placeholder = self.bind(field, value.clone())?;
        Ok(self.dialect.bound_expr(&placeholder, &value))
    }

    fn bind_as(&mut self, owner: Option<&str>, name: &str, value: Value) -> RepositoryResult<String> {
        let base = self.dialect.placeholder(name);
        let mut placeholder = base.clone();
        let mut suffix = 1;
        while let Some(taken_by) = self.owners.get(&placeholder) {
            if owner.is_some() && taken_by.as_deref() == owner {
                return Err(RepositoryError::invalid_argument(
                    RepositoryOperation::FindAll,
                    format!("field '{}' is bound more than once as {}", name, base),
                ));
            }
            suffix += 1;
            placeholder = format!("{}_{}", base, suffix);
        }
        self.owners.insert(placeholder.clone(), owner.map(str::to_string));
        self.binds.insert(placeholder.clone(), value)?;
        Ok(placeholder)
    }

    /// Render a filter; an empty filter renders as an empty string
    pub fn build(&mut self, filter: &Filter) -> RepositoryResult<String> {
        let mut groups = Vec::with_capacity(filter.len());

        for (key, criterion) in filter.iter() {
            let operator = criterion.effective_operator();
            let members: Vec<&str> = split_or_group(key).collect();
            for field in &members {
                validate_identifier(field)?;
            }

            if criterion.value.is_null() {
                // null entries never bind, one comparison per member
                let rendered: Vec<String> = members
                    .iter()
                    .map(|field| self.dialect.null_comparison(field, operator))
                    .collect();
                groups.push(if rendered.len() == 1 {
                    rendered.concat()
                } else {
                    format!("({})", rendered.join(" OR "))
                });
                continue;
            }

            let value = self.dialect.bound_value(operator, &criterion.value);
            let mut rendered = Vec::with_capacity(members.len());
            for field in members {
                let expr = self.bind_expr(field, value.clone())?;
                rendered.push(self.dialect.comparison(field, operator, &expr));
            }
            groups.push(format!("({})", rendered.join(" OR ")));
        }

        Ok(groups.join(" AND "))
    }

    /// Binds emitted so far
    pub fn binds(&self) -> &BindSet {
        &self.binds
    }

    /// Finish the query and take its binds
    pub fn into_binds(self) -> BindSet {
        self.binds
    }
}

/// Render a filter in one step
pub fn build<D: Dialect>(dialect: D, filter: &Filter) -> RepositoryResult<(String, BindSet)> {
    let mut builder = FilterBuilder::new(dialect);
    let predicate = builder.build(filter)?;
    Ok((predicate, builder.into_binds()))
}
