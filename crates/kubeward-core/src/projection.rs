//! Flat, comparison-friendly view of the fields a manager owns
//!
//! A [`Projection`] maps rendered field paths to canonically serialized
//! values. Two projections computed from the same inputs are byte-identical
//! once serialized, which is what makes them safe to diff.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::path::FieldPath;

/// Owned fields of a live object, keyed by rendered path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Projection {
    fields: BTreeMap<String, String>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, serializing `value` canonically
    pub fn insert(&mut self, path: &FieldPath, value: &Value) {
        self.fields.insert(path.to_string(), canonical_value(value));
    }

    /// Look up a field by rendered path
    pub fn get(&self, path: &str) -> Option<&str> {
        self.fields.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rendered paths in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Projection {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Serialize a value canonically
///
/// Strings are emitted verbatim, every other value as compact JSON with
/// object keys sorted, regardless of how the source map was ordered.
pub fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => {
            let mut out = String::new();
            write_canonical_json(other, &mut out);
            out
        }
    }
}

fn write_canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&quote(s)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&quote(key));
                out.push(':');
                write_canonical_json(item, out);
            }
            out.push('}');
        }
    }
}

fn quote(s: &str) -> String {
    // Serializing a str into JSON cannot fail
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_scalars() {
        assert_eq!(canonical_value(&json!("hello")), "hello");
        assert_eq!(canonical_value(&json!(3)), "3");
        assert_eq!(canonical_value(&json!(1.5)), "1.5");
        assert_eq!(canonical_value(&json!(true)), "true");
        assert_eq!(canonical_value(&json!(null)), "null");
    }

    #[test]
    fn test_canonical_objects_sort_keys() {
        let a = json!({"b": 1, "a": {"z": [1, "x"], "y": false}});
        let b = json!({"a": {"y": false, "z": [1, "x"]}, "b": 1});
        assert_eq!(canonical_value(&a), canonical_value(&b));
        assert_eq!(
            canonical_value(&a),
            r#"{"a":{"y":false,"z":[1,"x"]},"b":1}"#
        );
    }

    #[test]
    fn test_projection_serializes_in_path_order() {
        let mut projection = Projection::new();
        projection.insert(&FieldPath::fields(["spec", "replicas"]), &json!(3));
        projection.insert(&FieldPath::fields(["data", "key"]), &json!("v"));

        let json = serde_json::to_string(&projection).unwrap();
        assert_eq!(json, r#"{"data.key":"v","spec.replicas":"3"}"#);
        assert_eq!(projection.get("spec.replicas"), Some("3"));
        assert_eq!(projection.len(), 2);
    }
}
