//! Field assignments for create and update

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::filter::validate_identifier;
use super::traits::Model;
use super::value::Value;

/// Ordered field name to value assignments
///
/// Inputs are checked against the model before any store call: every key must
/// be a declared field (see [`Model::FIELDS`]) and the model's own
/// [`Model::validate`] hook must report nothing.
///
/// # Example
///
/// ```rust
/// use repokit::repository::Inputs;
///
/// let inputs = Inputs::new()
///     .set("username", "User 1")
///     .set("_token", "csrf");
///
/// let purified = inputs.purified();
/// assert!(purified.get("username").is_some());
/// assert!(purified.get("_token").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inputs {
    fields: IndexMap<String, Value>,
}

impl Inputs {
    /// Create empty inputs
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style assignment
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    /// Assign a field, replacing any earlier value
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Value assigned to `field`
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Number of assignments
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether nothing is assigned
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate assignments in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy without keys starting with `_` (form tokens, method overrides)
    #[must_use]
    pub fn purified(&self) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Every reason these inputs cannot be written for `M`
    ///
    /// An empty [`Model::FIELDS`] accepts any identifier-shaped key.
    pub fn violations<M: Model>(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for field in self.fields.keys() {
            if validate_identifier(field).is_err() {
                violations.push(format!("{} is not a valid field name", field));
            } else if !M::FIELDS.is_empty() && !M::FIELDS.contains(&field.as_str()) {
                violations.push(format!("{} is not a field of {}", field, M::ENTITY));
            }
        }
        violations.extend(M::validate(self));
        violations
    }
}

impl<K, V> FromIterator<(K, V)> for Inputs
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note;

    impl Model for Note {
        type Id = i64;
        const ENTITY: &'static str = "Note";
        const SOURCE: &'static str = "notes";
        const FIELDS: &'static [&'static str] = &["title", "body"];

        fn id(&self) -> i64 {
            0
        }

        fn validate(inputs: &Inputs) -> Vec<String> {
            match inputs.get("title") {
                Some(Value::String(title)) if title.is_empty() => {
                    vec!["title must not be empty".to_string()]
                }
                _ => Vec::new(),
            }
        }
    }

    #[test]
    fn test_purified_drops_underscored_keys() {
        let inputs = Inputs::new()
            .set("_method", "PUT")
            .set("title", "a")
            .set("_token", "t");
        let purified = inputs.purified();
        assert_eq!(purified.len(), 1);
        assert_eq!(purified.iter().next().unwrap().0, "title");
    }

    #[test]
    fn test_violations_unknown_field() {
        let inputs = Inputs::new().set("title", "a").set("colour", "red");
        assert_eq!(inputs.violations::<Note>(), vec!["colour is not a field of Note"]);
    }

    #[test]
    fn test_violations_include_model_hook() {
        let inputs = Inputs::new().set("title", "");
        assert_eq!(inputs.violations::<Note>(), vec!["title must not be empty"]);
    }

    #[test]
    fn test_violations_reject_bad_identifiers() {
        let inputs: Inputs = [("title) VALUES (1", "x")].into_iter().collect();
        assert_eq!(inputs.violations::<Note>().len(), 1);
    }

    #[test]
    fn test_serializes_as_object() {
        let inputs = Inputs::new().set("title", "a").set("body", Value::Null);
        let json = serde_json::to_string(&inputs).unwrap();
        assert_eq!(json, r#"{"title":"a","body":null}"#);
    }
}
