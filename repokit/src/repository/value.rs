//! Scalar values used in filters, membership lists and record inputs

use std::fmt;

use serde::{Deserialize, Serialize};

/// A literal value bound into a query
///
/// Values are never interpolated into query text; they travel in the bind
/// set next to the predicate.
///
/// # Example
///
/// ```rust
/// use repokit::repository::Value;
///
/// let name: Value = "User 1".into();
/// let id: Value = 42_i64.into();
/// let missing: Value = Option::<i64>::None.into();
///
/// assert_eq!(name, Value::String("User 1".to_string()));
/// assert_eq!(id, Value::Integer(42));
/// assert!(missing.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value (`NULL` / `NONE`)
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// String value
    String(String),
    /// Record identity in `table:id` form
    ///
    /// Relational stores bind it as text; document stores compare it as a
    /// record link, so `id` filters and membership tests match.
    Record(String),
}

impl Value {
    /// Record identity value
    pub fn record(id: impl fmt::Display) -> Self {
        Self::Record(id.to_string())
    }

    /// Whether this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the string content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::String(s) | Self::Record(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

#[cfg(feature = "surrealdb")]
impl From<surrealdb::RecordId> for Value {
    fn from(id: surrealdb::RecordId) -> Self {
        Self::record(id)
    }
}

#[cfg(feature = "surrealdb")]
impl From<&surrealdb::RecordId> for Value {
    fn from(id: &surrealdb::RecordId) -> Self {
        Self::record(id)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Collect anything convertible into a list of values
///
/// # Example
///
/// ```rust
/// use repokit::repository::{values, Value};
///
/// assert_eq!(values([2, 3]), vec![Value::Integer(2), Value::Integer(3)]);
/// ```
pub fn values<I, V>(items: I) -> Vec<Value>
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    items.into_iter().map(Into::into).collect()
}
