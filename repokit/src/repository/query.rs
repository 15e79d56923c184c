//! Query specification types
//!
//! A [`Query`] is the backend-neutral description of a read: a [`Filter`]
//! expression, an optional membership test, an optional ordering and an
//! optional [`Pagination`] window. Stores translate it into their own query
//! language.
//!
//! # Example
//!
//! ```rust
//! use repokit::repository::{Filter, FilterOperator, OrderDirection, Pagination, Query};
//!
//! let filter = Filter::new()
//!     .eq("status", "active")
//!     .with("username%OR%text", "%smith%", FilterOperator::Like);
//!
//! let query = Query::filtered(filter)
//!     .order_by("id", OrderDirection::Descending)
//!     .paginate(Pagination::page(2, 10));
//!
//! assert_eq!(query.pagination.map(|p| p.offset), Some(10));
//! ```

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use super::error::{RepositoryError, RepositoryOperation};
use super::value::Value;

/// Separator joining physical field names inside one OR-grouped filter key
pub const OR_SEPARATOR: &str = "%OR%";

/// Default page number for paginated reads
pub const DEFAULT_PAGE: u64 = 1;

/// Default page size for paginated reads
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Direction for ordering results
///
/// The textual form is exactly `asc` or `desc`; parsing anything else fails
/// with an invalid argument error instead of falling back to a default.
///
/// # Example
///
/// ```rust
/// use repokit::repository::OrderDirection;
///
/// let desc: OrderDirection = "desc".parse().unwrap();
/// assert_eq!(desc, OrderDirection::Descending);
/// assert!("DESC".parse::<OrderDirection>().is_err());
/// assert_eq!(OrderDirection::default(), OrderDirection::Descending);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    #[default]
    Descending,
}

impl OrderDirection {
    /// Keyword used in `ORDER BY` clauses
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Ascending),
            "desc" => Ok(Self::Descending),
            other => Err(RepositoryError::invalid_argument(
                RepositoryOperation::FindAll,
                format!("order must be desc or asc, got '{}'", other),
            )),
        }
    }
}

/// Pagination window for limiting query results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    /// Create new pagination parameters
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Take at most `limit` results from the start
    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Window for a 1-indexed page number
    ///
    /// The offset saturates at `u64::MAX`; use [`Pagination::checked_page`]
    /// to detect overflow.
    ///
    /// # Example
    ///
    /// ```rust
    /// use repokit::repository::Pagination;
    ///
    /// let page3 = Pagination::page(3, 20);
    /// assert_eq!(page3.offset, 40);
    /// assert_eq!(page3.limit, 20);
    /// ```
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }

    /// Window for a 1-indexed page number, `None` when the offset overflows
    ///
    /// ```rust
    /// use repokit::repository::Pagination;
    ///
    /// assert_eq!(Pagination::checked_page(2, 10), Some(Pagination::new(10, 10)));
    /// assert_eq!(Pagination::checked_page(u64::MAX, 2), None);
    /// ```
    #[must_use]
    pub const fn checked_page(page_number: u64, page_size: u64) -> Option<Self> {
        match page_number.saturating_sub(1).checked_mul(page_size) {
            Some(offset) => Some(Self {
                offset,
                limit: page_size,
            }),
            None => None,
        }
    }

    /// Window for `limit`, where zero means unbounded
    #[must_use]
    pub const fn limited(limit: u64) -> Option<Self> {
        if limit == 0 {
            None
        } else {
            Some(Self::first_page(limit))
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Comparison operators for filter entries
///
/// # Example
///
/// ```rust
/// use repokit::repository::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::Like), "LIKE");
/// assert_eq!("not like".parse::<FilterOperator>().unwrap(), FilterOperator::NotLike);
/// assert!("~~".parse::<FilterOperator>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching with `%` and `_` wildcards (LIKE)
    Like,
    /// Negated pattern matching (NOT LIKE)
    NotLike,
    /// Identity comparison, mostly against NULL (IS)
    Is,
    /// Negated identity comparison (IS NOT)
    IsNot,
}

impl FilterOperator {
    /// Operator used when the caller gives a bare value
    pub(crate) fn default_for(value: &Value) -> Self {
        if value.is_null() {
            Self::Is
        } else {
            Self::Equal
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::NotLike => write!(f, "NOT LIKE"),
            Self::Is => write!(f, "IS"),
            Self::IsNot => write!(f, "IS NOT"),
        }
    }
}

impl FromStr for FilterOperator {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "LIKE" => Ok(Self::Like),
            "NOT LIKE" => Ok(Self::NotLike),
            "IS" => Ok(Self::Is),
            "IS NOT" => Ok(Self::IsNot),
            _ => Err(RepositoryError::invalid_argument(
                RepositoryOperation::FindAll,
                format!("unknown comparison operator '{}'", s),
            )),
        }
    }
}

/// Right-hand side of one filter entry
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    /// The value to compare against
    pub value: Value,
    /// Explicit operator; `None` means `IS` for null and `=` otherwise
    pub operator: Option<FilterOperator>,
}

impl Criterion {
    /// The operator this criterion compares with
    pub fn effective_operator(&self) -> FilterOperator {
        self.operator
            .unwrap_or_else(|| FilterOperator::default_for(&self.value))
    }
}

impl<V: Into<Value>> From<V> for Criterion {
    fn from(value: V) -> Self {
        Self {
            value: value.into(),
            operator: None,
        }
    }
}

/// Ordered filter expression: field key to criterion
///
/// Keys are unique; inserting an existing key replaces its criterion but
/// keeps its position. A key may name several fields joined by
/// [`OR_SEPARATOR`], in which case any of them matching satisfies the entry.
///
/// # Example
///
/// ```rust
/// use repokit::repository::{Filter, FilterOperator};
///
/// let filter = Filter::new()
///     .eq("username", "User 1")
///     .with("age", 18, FilterOperator::GreaterThanOrEqual)
///     .is_null("deleted_at");
///
/// assert_eq!(filter.len(), 3);
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: IndexMap<String, Criterion>,
}

impl Filter {
    /// Create an empty filter (matches every record)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry with the default operator for the value
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into(), None);
        self
    }

    /// Add an entry with an explicit operator
    #[must_use]
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        operator: FilterOperator,
    ) -> Self {
        self.insert(key, value.into(), Some(operator));
        self
    }

    /// Add an `IS NULL` entry
    #[must_use]
    pub fn is_null(mut self, key: impl Into<String>) -> Self {
        self.insert(key, Value::Null, Some(FilterOperator::Is));
        self
    }

    /// Add an `IS NOT NULL` entry
    #[must_use]
    pub fn is_not_null(mut self, key: impl Into<String>) -> Self {
        self.insert(key, Value::Null, Some(FilterOperator::IsNot));
        self
    }

    /// Insert or replace an entry
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: Value,
        operator: Option<FilterOperator>,
    ) {
        self.entries.insert(key.into(), Criterion { value, operator });
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the filter has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.entries.iter().map(|(k, c)| (k.as_str(), c))
    }

    /// Every physical field named by the filter, in order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().flat_map(|key| split_or_group(key))
    }
}

impl<K, V> FromIterator<(K, V)> for Filter
where
    K: Into<String>,
    V: Into<Criterion>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split an OR-grouped key into its physical field names
pub fn split_or_group(key: &str) -> impl Iterator<Item = &str> {
    key.split(OR_SEPARATOR)
}

/// Membership test: `key IN (values)` or `key NOT IN (values)`
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    /// Field tested for membership
    pub key: String,
    /// Candidate values
    pub values: Vec<Value>,
    /// `true` for NOT IN
    pub negated: bool,
}

/// Backend-neutral read specification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Filter expression (empty matches every record)
    pub filter: Filter,
    /// Optional membership test AND-ed with the filter
    pub membership: Option<Membership>,
    /// Optional ordering field and direction
    pub order: Option<(String, OrderDirection)>,
    /// Optional result window
    pub pagination: Option<Pagination>,
}

impl Query {
    /// Query matching every record
    pub fn all() -> Self {
        Self::default()
    }

    /// Query matching the given filter
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Restrict to records whose `key` is one of `values`
    #[must_use]
    pub fn within(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.membership = Some(Membership {
            key: key.into(),
            values,
            negated: false,
        });
        self
    }

    /// Restrict to records whose `key` is none of `values`
    #[must_use]
    pub fn excluding(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.membership = Some(Membership {
            key: key.into(),
            values,
            negated: true,
        });
        self
    }

    /// Order results by `field`
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    /// Apply a result window
    #[must_use]
    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Apply an optional result window
    #[must_use]
    pub fn paginate_opt(mut self, pagination: Option<Pagination>) -> Self {
        self.pagination = pagination;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_direction_display() {
        assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
        assert_eq!(format!("{}", OrderDirection::Descending), "desc");
    }

    #[test]
    fn test_order_direction_default_is_descending() {
        assert_eq!(OrderDirection::default(), OrderDirection::Descending);
    }

    #[test]
    fn test_order_direction_parse_is_case_sensitive() {
        assert_eq!("asc".parse::<OrderDirection>().unwrap(), OrderDirection::Ascending);
        assert_eq!("desc".parse::<OrderDirection>().unwrap(), OrderDirection::Descending);

        for bad in ["ASC", "Desc", "ascending", "", " asc"] {
            let err = bad.parse::<OrderDirection>().unwrap_err();
            assert_eq!(err.kind, crate::repository::RepositoryErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_pagination_page() {
        assert_eq!(Pagination::page(1, 20), Pagination::new(0, 20));
        assert_eq!(Pagination::page(3, 20), Pagination::new(40, 20));
        assert_eq!(Pagination::page(2, 1), Pagination::new(1, 1));
        assert_eq!(Pagination::page(u64::MAX, 2).offset, u64::MAX);
        assert_eq!(Pagination::checked_page(u64::MAX, 2), None);
        assert_eq!(Pagination::checked_page(u64::MAX, 1), Some(Pagination::new(u64::MAX - 1, 1)));
    }

    #[test]
    fn test_pagination_limited() {
        assert_eq!(Pagination::limited(0), None);
        assert_eq!(Pagination::limited(5), Some(Pagination::new(0, 5)));
    }

    #[test]
    fn test_pagination_default() {
        let pagination = Pagination::default();
        assert_eq!(pagination.offset, 0);
        assert_eq!(pagination.limit, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_filter_operator_display() {
        assert_eq!(format!("{}", FilterOperator::Equal), "=");
        assert_eq!(format!("{}", FilterOperator::NotEqual), "!=");
        assert_eq!(format!("{}", FilterOperator::GreaterThan), ">");
        assert_eq!(format!("{}", FilterOperator::GreaterThanOrEqual), ">=");
        assert_eq!(format!("{}", FilterOperator::LessThan), "<");
        assert_eq!(format!("{}", FilterOperator::LessThanOrEqual), "<=");
        assert_eq!(format!("{}", FilterOperator::Like), "LIKE");
        assert_eq!(format!("{}", FilterOperator::NotLike), "NOT LIKE");
        assert_eq!(format!("{}", FilterOperator::Is), "IS");
        assert_eq!(format!("{}", FilterOperator::IsNot), "IS NOT");
    }

    #[test]
    fn test_filter_operator_parse() {
        assert_eq!("like".parse::<FilterOperator>().unwrap(), FilterOperator::Like);
        assert_eq!("<>".parse::<FilterOperator>().unwrap(), FilterOperator::NotEqual);
        assert_eq!("is  not".parse::<FilterOperator>().unwrap(), FilterOperator::IsNot);
        assert!("BETWEEN".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn test_criterion_default_operator() {
        let plain = Criterion::from("x");
        assert_eq!(plain.effective_operator(), FilterOperator::Equal);

        let null = Criterion::from(Value::Null);
        assert_eq!(null.effective_operator(), FilterOperator::Is);

        let explicit = Criterion {
            value: Value::Null,
            operator: Some(FilterOperator::IsNot),
        };
        assert_eq!(explicit.effective_operator(), FilterOperator::IsNot);
    }

    #[test]
    fn test_filter_keeps_insertion_order_and_replaces() {
        let filter = Filter::new()
            .eq("b", 1)
            .eq("a", 2)
            .eq("b", 3);

        let keys: Vec<_> = filter.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(filter.iter().next().unwrap().1.value, Value::Integer(3));
    }

    #[test]
    fn test_filter_from_iterator() {
        let filter: Filter = [("username", "User 1"), ("text", "Long Text 1")]
            .into_iter()
            .collect();
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_filter_fields_splits_or_groups() {
        let filter = Filter::new()
            .with("username%OR%text", "%x%", FilterOperator::Like)
            .eq("id", 1);
        let fields: Vec<_> = filter.fields().collect();
        assert_eq!(fields, vec!["username", "text", "id"]);
    }

    #[test]
    fn test_query_builders() {
        let query = Query::all()
            .within("id", vec![Value::Integer(2)])
            .order_by("id", OrderDirection::Ascending)
            .paginate(Pagination::first_page(1));

        let membership = query.membership.unwrap();
        assert!(!membership.negated);
        assert_eq!(membership.key, "id");
        assert_eq!(query.order, Some(("id".to_string(), OrderDirection::Ascending)));
        assert_eq!(query.pagination, Some(Pagination::new(0, 1)));

        let excluded = Query::all().excluding("id", vec![]);
        assert!(excluded.membership.unwrap().negated);
    }
}
