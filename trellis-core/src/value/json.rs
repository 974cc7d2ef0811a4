//! JSON interop for [`Value`].

use std::collections::HashSet;

use super::{Object, ObjectData, ObjectId, Value};
use crate::error::{Result, StateError};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Object(Object::from_values(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => Value::Object(Object::from_fields(
                fields.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Value {
    /// Parse a JSON document into a fresh value tree.
    pub fn from_json_str(src: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(src)?;
        Ok(json.into())
    }

    /// Export the value tree as JSON.
    ///
    /// Shared sub-objects are exported once per reference. A reference cycle
    /// fails with [`StateError::Cycle`]. Non-finite floats become `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut path = HashSet::new();
        to_json_inner(self, &mut path)
    }
}

fn to_json_inner(value: &Value, path: &mut HashSet<ObjectId>) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Object(obj) => {
            if !path.insert(obj.id()) {
                return Err(StateError::Cycle(obj.id()));
            }
            // Snapshot children first so no lock is held while recursing.
            let out = match &*obj.read() {
                ObjectData::Record(fields) => Children::Record(
                    fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
                ),
                ObjectData::Sequence(items) => Children::Sequence(items.clone()),
            };
            let json = match out {
                Children::Record(fields) => {
                    let mut map = serde_json::Map::with_capacity(fields.len());
                    for (k, v) in fields {
                        map.insert(k, to_json_inner(&v, path)?);
                    }
                    serde_json::Value::Object(map)
                }
                Children::Sequence(items) => serde_json::Value::Array(
                    items
                        .iter()
                        .map(|v| to_json_inner(v, path))
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            path.remove(&obj.id());
            json
        }
    })
}

enum Children {
    Record(Vec<(String, Value)>),
    Sequence(Vec<Value>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_types() {
        let src = json!({"b": 1, "a": [true, null, 2.5, "x"]});
        let value = Value::from(src.clone());
        let obj = value.as_object().unwrap();
        assert_eq!(obj.field("b"), Some(Value::Int(1)));
        assert_eq!(value.to_json().unwrap(), src);
    }

    #[test]
    fn shared_children_export_twice() {
        let shared = Object::from_values([1]);
        let root = Object::from_fields([("x", shared.clone()), ("y", shared)]);
        let out = Value::from(root).to_json().unwrap();
        assert_eq!(out, json!({"x": [1], "y": [1]}));
    }

    #[test]
    fn cycles_are_reported() {
        let root = Object::record();
        root.insert("self", root.clone()).unwrap();
        let err = Value::from(root.clone()).to_json().unwrap_err();
        assert!(matches!(err, StateError::Cycle(id) if id == root.id()));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(Value::from_json_str("{"), Err(StateError::Json(_))));
    }
}
