//! The Node type - a persistent, structurally shared value tree.
//!
//! Composite nodes live behind `Rc`, so cloning a `Node` is cheap and two
//! trees can share every subtree that a write did not touch. `Node::same`
//! exposes that sharing as an identity test.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::Error;

/// A value stored in the content tree.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic child ordering
/// - Composites are reference counted; writers rebuild only the spine they
///   touch and share the rest
/// - Numbers keep their `serde_json` representation so integers round-trip
#[derive(Clone, Debug, Default)]
pub enum Node {
    /// Absence of a value.
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Rc<Vec<Node>>),
    Map(Rc<BTreeMap<String, Node>>),
}

impl Node {
    /// Create an empty map.
    pub fn map() -> Self {
        Node::Map(Rc::new(BTreeMap::new()))
    }

    /// Build a map node from entries.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Node)>,
    {
        Node::Map(Rc::new(entries.into_iter().collect()))
    }

    /// Convert anything serializable into a node.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Node::from)
            .map_err(|e| Error::Serialization {
                message: e.to_string(),
            })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Node::Map(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Node::Array(_))
    }

    /// Maps and arrays are composites; everything else is a scalar.
    pub fn is_composite(&self) -> bool {
        matches!(self, Node::Map(_) | Node::Array(_))
    }

    /// A map or array with no children.
    pub fn is_empty_composite(&self) -> bool {
        match self {
            Node::Map(map) => map.is_empty(),
            Node::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Look up a direct child. Arrays are indexed by decimal keys.
    pub fn get_child(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(map) => map.get(key),
            Node::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Direct children as `(key, node)` pairs. Scalars have none.
    pub fn children(&self) -> Vec<(String, Node)> {
        match self {
            Node::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Node::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Keys of the direct children.
    pub fn child_keys(&self) -> Vec<String> {
        match self {
            Node::Map(map) => map.keys().cloned().collect(),
            Node::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Number of direct children.
    pub fn num_children(&self) -> usize {
        match self {
            Node::Map(map) => map.len(),
            Node::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Identity comparison: composites must be the same allocation, scalars
    /// must be equal.
    pub fn same(a: &Node, b: &Node) -> bool {
        match (a, b) {
            (Node::Map(x), Node::Map(y)) => Rc::ptr_eq(x, y),
            (Node::Array(x), Node::Array(y)) => Rc::ptr_eq(x, y),
            (x, y) if !x.is_composite() && !y.is_composite() => x == y,
            _ => false,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Node::Null => 0,
            Node::Bool(_) => 1,
            Node::Number(_) => 2,
            Node::String(_) => 3,
            Node::Array(_) => 4,
            Node::Map(_) => 5,
        }
    }

    /// Total order over heterogeneous values.
    ///
    /// `null` sorts first. Values of the same kind compare natively; values
    /// of different kinds order as `null < bool < number < string <
    /// array < map`. Composites of the same kind compare equal.
    pub fn compare(&self, other: &Node) -> Ordering {
        match (self, other) {
            (Node::Bool(a), Node::Bool(b)) => a.cmp(b),
            (Node::Number(a), Node::Number(b)) => {
                let a = a.as_f64().unwrap_or(0.0);
                let b = b.as_f64().unwrap_or(0.0);
                a.total_cmp(&b)
            }
            (Node::String(a), Node::String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    /// The text used when a scalar is compared against keys.
    pub fn to_key_string(&self) -> String {
        match self {
            Node::String(s) => s.clone(),
            Node::Number(n) => n.to_string(),
            Node::Bool(b) => b.to_string(),
            Node::Null => "null".to_string(),
            composite => composite.to_json().to_string(),
        }
    }

    /// Deep copy into a caller-owned JSON value.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Node::Null => JsonValue::Null,
            Node::Bool(b) => JsonValue::Bool(*b),
            Node::Number(n) => JsonValue::Number(n.clone()),
            Node::String(s) => JsonValue::String(s.clone()),
            Node::Array(items) => JsonValue::Array(items.iter().map(Node::to_json).collect()),
            Node::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<JsonMap<String, JsonValue>>(),
            ),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Number(a), Node::Number(b)) => a.as_f64() == b.as_f64(),
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => Rc::ptr_eq(a, b) || a == b,
            (Node::Map(a), Node::Map(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl From<JsonValue> for Node {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Node::Null,
            JsonValue::Bool(b) => Node::Bool(b),
            JsonValue::Number(n) => Node::Number(n),
            JsonValue::String(s) => Node::String(s),
            JsonValue::Array(items) => {
                Node::Array(Rc::new(items.into_iter().map(Node::from).collect()))
            }
            JsonValue::Object(map) => Node::Map(Rc::new(
                map.into_iter().map(|(k, v)| (k, Node::from(v))).collect(),
            )),
        }
    }
}

impl From<&JsonValue> for Node {
    fn from(value: &JsonValue) -> Self {
        Node::from(value.clone())
    }
}

impl From<Node> for JsonValue {
    fn from(node: Node) -> Self {
        node.to_json()
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Node::Number(n.into())
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Number(n.into())
    }
}

impl From<f64> for Node {
    /// Non-finite numbers have no JSON form and become `null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Node::Number).unwrap_or(Node::Null)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => n.serialize(serializer),
            Node::String(s) => serializer.serialize_str(s),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Node::from)
    }
}
