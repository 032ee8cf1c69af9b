//! Composable metadata predicates.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Metadata value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StringArray(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Ordering between comparable values; numbers compare across int/float.
    fn compare(&self, other: &MetadataValue) -> Option<Ordering> {
        match (self, other) {
            (MetadataValue::String(a), MetadataValue::String(b)) => Some(a.cmp(b)),
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }

    fn loosely_equals(&self, other: &MetadataValue) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(f: f64) -> Self {
        MetadataValue::Float(f)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(v: Vec<String>) -> Self {
        MetadataValue::StringArray(v)
    }
}

/// Metadata filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Equals
    Equals(String, MetadataValue),
    /// Not equals
    NotEquals(String, MetadataValue),
    /// Greater than
    GreaterThan(String, MetadataValue),
    /// Less than
    LessThan(String, MetadataValue),
    /// Greater than or equal
    GreaterOrEqual(String, MetadataValue),
    /// Less than or equal
    LessOrEqual(String, MetadataValue),
    /// In set
    In(String, Vec<MetadataValue>),
    /// Not in set
    NotIn(String, Vec<MetadataValue>),
    /// Substring for strings, membership for arrays
    Contains(String, MetadataValue),
    StartsWith(String, String),
    EndsWith(String, String),
    /// Field is present
    Exists(String),
    /// Field is absent
    NotExists(String),
    /// And combination
    And(Vec<Filter>),
    /// Or combination
    Or(Vec<Filter>),
    /// Negation
    Not(Box<Filter>),
}

impl Filter {
    pub fn equals(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Filter::Equals(field.into(), value.into())
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        Filter::NotEquals(field.into(), value.into())
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists(field.into())
    }

    pub fn negate(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::And(mut left), Filter::And(right)) => {
                left.extend(right);
                Filter::And(left)
            }
            (Filter::And(mut left), other) => {
                left.push(other);
                Filter::And(left)
            }
            (this, Filter::And(mut right)) => {
                right.insert(0, this);
                Filter::And(right)
            }
            (this, other) => Filter::And(vec![this, other]),
        }
    }

    /// Evaluate against an item's metadata.
    ///
    /// Negative predicates (`NotEquals`, `NotIn`) hold for missing fields.
    pub fn matches(&self, metadata: &HashMap<String, MetadataValue>) -> bool {
        match self {
            Filter::Equals(field, value) => metadata
                .get(field)
                .map(|v| v.loosely_equals(value))
                .unwrap_or(false),
            Filter::NotEquals(field, value) => !metadata
                .get(field)
                .map(|v| v.loosely_equals(value))
                .unwrap_or(false),
            Filter::GreaterThan(field, value) => {
                compare_field(metadata, field, value, |o| o == Ordering::Greater)
            }
            Filter::LessThan(field, value) => {
                compare_field(metadata, field, value, |o| o == Ordering::Less)
            }
            Filter::GreaterOrEqual(field, value) => {
                compare_field(metadata, field, value, |o| o != Ordering::Less)
            }
            Filter::LessOrEqual(field, value) => {
                compare_field(metadata, field, value, |o| o != Ordering::Greater)
            }
            Filter::In(field, values) => metadata
                .get(field)
                .map(|v| values.iter().any(|candidate| v.loosely_equals(candidate)))
                .unwrap_or(false),
            Filter::NotIn(field, values) => !metadata
                .get(field)
                .map(|v| values.iter().any(|candidate| v.loosely_equals(candidate)))
                .unwrap_or(false),
            Filter::Contains(field, needle) => match (metadata.get(field), needle) {
                (Some(MetadataValue::String(s)), MetadataValue::String(n)) => {
                    s.contains(n.as_str())
                }
                (Some(MetadataValue::StringArray(items)), MetadataValue::String(n)) => {
                    items.iter().any(|item| item == n)
                }
                _ => false,
            },
            Filter::StartsWith(field, prefix) => metadata
                .get(field)
                .and_then(MetadataValue::as_str)
                .map(|s| s.starts_with(prefix.as_str()))
                .unwrap_or(false),
            Filter::EndsWith(field, suffix) => metadata
                .get(field)
                .and_then(MetadataValue::as_str)
                .map(|s| s.ends_with(suffix.as_str()))
                .unwrap_or(false),
            Filter::Exists(field) => metadata.contains_key(field),
            Filter::NotExists(field) => !metadata.contains_key(field),
            Filter::And(filters) => filters.iter().all(|f| f.matches(metadata)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(metadata)),
            Filter::Not(filter) => !filter.matches(metadata),
        }
    }
}

fn compare_field(
    metadata: &HashMap<String, MetadataValue>,
    field: &str,
    value: &MetadataValue,
    accept: fn(Ordering) -> bool,
) -> bool {
    metadata
        .get(field)
        .and_then(|v| v.compare(value))
        .map(accept)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> HashMap<String, MetadataValue> {
        let mut m = HashMap::new();
        m.insert("lang".to_string(), "en".into());
        m.insert("pages".to_string(), 12i64.into());
        m.insert("score".to_string(), 0.75f64.into());
        m.insert("title".to_string(), "Quarterly report".into());
        m.insert(
            "tags".to_string(),
            vec!["finance".to_string(), "q3".to_string()].into(),
        );
        m
    }

    #[test]
    fn test_comparisons() {
        let m = meta();
        assert!(Filter::equals("lang", "en").matches(&m));
        assert!(!Filter::equals("lang", "de").matches(&m));
        assert!(Filter::GreaterThan("pages".into(), 10i64.into()).matches(&m));
        assert!(Filter::LessOrEqual("pages".into(), 12.0f64.into()).matches(&m));
        assert!(!Filter::LessThan("score".into(), 0.5f64.into()).matches(&m));
        // Mixed types never compare
        assert!(!Filter::GreaterThan("lang".into(), 1i64.into()).matches(&m));
    }

    #[test]
    fn test_sets_and_strings() {
        let m = meta();
        assert!(Filter::In("lang".into(), vec!["fr".into(), "en".into()]).matches(&m));
        assert!(Filter::NotIn("lang".into(), vec!["fr".into()]).matches(&m));
        assert!(Filter::Contains("title".into(), "report".into()).matches(&m));
        assert!(Filter::Contains("tags".into(), "q3".into()).matches(&m));
        assert!(Filter::StartsWith("title".into(), "Quarter".into()).matches(&m));
        assert!(Filter::EndsWith("title".into(), "report".into()).matches(&m));
    }

    #[test]
    fn test_missing_fields() {
        let m = meta();
        assert!(Filter::NotExists("author".into()).matches(&m));
        assert!(Filter::not_equals("author", "bob").matches(&m));
        assert!(!Filter::equals("author", "bob").matches(&m));
        assert!(Filter::exists("lang").matches(&m));
    }

    #[test]
    fn test_combinators() {
        let m = meta();
        let f = Filter::equals("lang", "en").and(Filter::negate(Filter::equals("pages", 3i64)));
        assert!(f.matches(&m));
        assert!(Filter::Or(vec![Filter::equals("lang", "de"), Filter::exists("tags")]).matches(&m));
        assert!(Filter::And(vec![]).matches(&m));
        assert!(!Filter::Or(vec![]).matches(&m));
    }

    #[test]
    fn test_and_flattens() {
        let a = Filter::exists("a");
        let b = Filter::exists("b");
        let c = Filter::exists("c");
        let combined = Filter::And(vec![a.clone(), b.clone()]).and(c.clone());
        assert_eq!(combined, Filter::And(vec![a, b, c]));
    }
}
