//! Configuration values shared by flow definitions, project configs and stages.
//!
//! Dependencies are strings, lists of strings or nested maps of those; values
//! may additionally carry booleans and numbers. Every deep transform goes
//! through `map_strings` so the three container shapes are handled in one place.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Map of names to values, as found in `values`/`dependencies` blocks.
pub type ValueMap = BTreeMap<String, Value>;

/// A dependency path, option or nested structure of those.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(ValueMap),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Text form of a scalar, used when splicing into strings and argv.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Value::Str(text) => Some(text.clone()),
            Value::Bool(flag) => Some(if *flag { "True" } else { "False" }.to_string()),
            Value::Int(number) => Some(number.to_string()),
            Value::Float(number) => Some(number.to_string()),
            Value::Null | Value::List(_) | Value::Map(_) => None,
        }
    }

    /// Rebuild the value with every string replaced by `f(string)`.
    ///
    /// `f` may return any value, which is how a string fans out into a list.
    pub fn map_strings<F>(&self, f: &mut F) -> Value
    where
        F: FnMut(&str) -> Value,
    {
        match self {
            Value::Str(text) => f(text),
            Value::List(items) => Value::List(items.iter().map(|item| item.map_strings(f)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(key, item)| (key.clone(), item.map_strings(f)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// All strings contained in the value, depth first.
    pub fn strings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::Str(text) => out.push(text),
            Value::List(items) => items.iter().for_each(|item| item.collect_strings(out)),
            Value::Map(map) => map.values().for_each(|item| item.collect_strings(out)),
            _ => {}
        }
    }

    /// Flatten into command-line words: lists expand, scalars render as text.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items.iter().flat_map(Value::to_args).collect(),
            Value::Map(map) => map.values().flat_map(Value::to_args).collect(),
            scalar => scalar.scalar_text().into_iter().collect(),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Str(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Str(text)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::Str).collect())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Str(text) => write!(f, "{text}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (index, (key, item)) in map.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                write!(f, "}}")
            }
            scalar => write!(f, "{}", scalar.scalar_text().unwrap_or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_keeps_shapes() {
        let value: Value =
            serde_json::from_str(r#"{"a": "x", "b": ["y", 2], "c": true, "d": null}"#)
                .expect("parse value");
        let map = value.as_map().expect("map");
        assert_eq!(map["a"], Value::from("x"));
        assert_eq!(
            map["b"],
            Value::List(vec![Value::from("y"), Value::Int(2)])
        );
        assert_eq!(map["c"], Value::Bool(true));
        assert!(map["d"].is_null());
    }

    #[test]
    fn map_strings_visits_nested_strings() {
        let value: Value = serde_json::from_str(r#"{"k": ["a", {"n": "b"}], "z": 3}"#)
            .expect("parse value");
        let upper = value.map_strings(&mut |text| Value::from(text.to_uppercase()));
        assert_eq!(upper.strings(), vec!["A", "B"]);
        assert_eq!(upper.as_map().expect("map")["z"], Value::Int(3));
    }

    #[test]
    fn to_args_flattens_lists_and_scalars() {
        let value = Value::List(vec![Value::from("--x"), Value::Int(4), Value::Null]);
        assert_eq!(value.to_args(), vec!["--x".to_string(), "4".to_string()]);
    }
}
