use serde::de::Deserializer;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Value Model - JSON-like value tree
// ============================================================================
//
// The payload type for all commands, events and actor state. Values are
// self-describing trees (maps, lists, scalars) with structural equality,
// cheap cloning and path-based navigation.
//
// Maps preserve insertion order; the case file relies on that when it
// serializes item contents back to callers.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn empty_map() -> Self {
        Value::Map(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a direct field of a map value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or overwrite a direct field; turns `Null` into a map first.
    pub fn set_field(&mut self, name: &str, value: Value) {
        if self.is_null() {
            *self = Value::empty_map();
        }
        if let Value::Map(entries) = self {
            match entries.iter_mut().find(|(k, _)| k == name) {
                Some((_, slot)) => *slot = value,
                None => entries.push((name.to_string(), value)),
            }
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        if let Value::Map(entries) = self {
            if let Some(pos) = entries.iter().position(|(k, _)| k == name) {
                return Some(entries.remove(pos).1);
            }
        }
        None
    }

    /// Navigate to the value at `path`, if present.
    pub fn read(&self, path: &ValuePath) -> Option<&Value> {
        let mut current = self;
        for element in path.elements() {
            current = current.field(&element.name)?;
            if let Some(index) = element.index {
                match current {
                    Value::List(items) => current = items.get(index)?,
                    _ => return None,
                }
            }
        }
        Some(current)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Long(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// ============================================================================
// Interchange with serde_json
// ============================================================================

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Long(i),
                None => Value::Double(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => {
                Value::Map(entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Long(n) => serde_json::Value::from(*n),
            Value::Double(d) => serde_json::Value::from(*d),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Long(n) => serializer.serialize_i64(*n),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Value::from(json))
    }
}

// ============================================================================
// Value Paths
// ============================================================================

/// A parsed path into a value tree, e.g. `Greeting/Message` or `Items[2]/Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValuePath {
    elements: Vec<PathElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathElement {
    pub name: String,
    pub index: Option<usize>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("Path must not be empty")]
    Empty,

    #[error("Path contains an empty segment")]
    EmptySegment,

    #[error("Invalid index in path segment '{0}'")]
    InvalidIndex(String),
}

impl ValuePath {
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let mut elements = Vec::new();
        for segment in trimmed.split('/') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment);
            }
            let element = match segment.find('[') {
                Some(open) => {
                    let close = segment
                        .rfind(']')
                        .filter(|close| *close == segment.len() - 1 && *close > open)
                        .ok_or_else(|| PathError::InvalidIndex(segment.to_string()))?;
                    let name = &segment[..open];
                    if name.is_empty() {
                        return Err(PathError::EmptySegment);
                    }
                    let index = segment[open + 1..close]
                        .parse::<usize>()
                        .map_err(|_| PathError::InvalidIndex(segment.to_string()))?;
                    PathElement {
                        name: name.to_string(),
                        index: Some(index),
                    }
                }
                None => PathElement {
                    name: segment.to_string(),
                    index: None,
                },
            };
            elements.push(element);
        }

        Ok(Self { elements })
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn depth(&self) -> usize {
        self.elements.len()
    }

    /// Name of the last segment.
    pub fn leaf(&self) -> &str {
        &self.elements[self.elements.len() - 1].name
    }

    /// The path one level up, if this is not a root path.
    pub fn parent(&self) -> Option<ValuePath> {
        if self.elements.len() <= 1 {
            return None;
        }
        Some(ValuePath {
            elements: self.elements[..self.elements.len() - 1].to_vec(),
        })
    }

    /// Extend this path with a child segment.
    pub fn child(&self, name: &str) -> ValuePath {
        let mut elements = self.elements.clone();
        elements.push(PathElement {
            name: name.to_string(),
            index: None,
        });
        ValuePath { elements }
    }

    /// True when `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &ValuePath) -> bool {
        other.elements.len() > self.elements.len()
            && other.elements[..self.elements.len()] == self.elements[..]
    }
}

impl fmt::Display for ValuePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&element.name)?;
            if let Some(index) = element.index {
                write!(f, "[{}]", index)?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for ValuePath {
    type Error = PathError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        ValuePath::parse(&text)
    }
}

impl From<ValuePath> for String {
    fn from(path: ValuePath) -> Self {
        path.to_string()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
