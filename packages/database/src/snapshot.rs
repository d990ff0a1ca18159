use std::fmt;

use mockbase_core::{Error, Node, Path};
use mockbase_json_store::value_utils;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};

use crate::reference::Query;

/// An immutable view of one location at one moment.
///
/// The snapshot keeps the whole content tree it was taken from, so it is
/// unaffected by later writes.
#[derive(Clone)]
pub struct DataSnapshot {
    content: Node,
    query: Query,
}

impl DataSnapshot {
    pub(crate) fn new(content: Node, query: Query) -> Self {
        Self { content, query }
    }

    fn node(&self) -> Option<&Node> {
        value_utils::get(&self.content, self.query.path())
    }

    fn pairs(&self) -> Vec<(String, Node)> {
        self.query.core.pairs(&self.content)
    }

    fn is_queried(&self) -> bool {
        !self.query.spec().is_empty()
    }

    pub fn key(&self) -> Option<&str> {
        self.query.key()
    }

    /// The query this snapshot was produced for.
    pub fn reference(&self) -> Query {
        self.query.clone()
    }

    pub fn exists(&self) -> bool {
        value_utils::has(&self.content, self.query.path())
    }

    /// A deep copy of the value, `null` when absent.
    ///
    /// A snapshot of a query holds only the matching children, in query
    /// order. It is always an object, `{}` when nothing matches, even at
    /// an absent location.
    pub fn val(&self) -> JsonValue {
        if self.is_queried() {
            let map: Map<String, JsonValue> = self
                .pairs()
                .into_iter()
                .map(|(key, child)| (key, child.to_json()))
                .collect();
            return JsonValue::Object(map);
        }
        self.node().map(Node::to_json).unwrap_or(JsonValue::Null)
    }

    /// Deserialize the value into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.val())?)
    }

    /// The snapshot of a descendant path. Not validated.
    pub fn child(&self, path: &str) -> DataSnapshot {
        DataSnapshot::new(
            self.content.clone(),
            self.query.core.descendant(&Path::parse(path)),
        )
    }

    pub fn has_child(&self, path: &str) -> bool {
        self.child(path).exists()
    }

    pub fn has_children(&self) -> bool {
        self.num_children() > 0
    }

    pub fn num_children(&self) -> usize {
        if self.is_queried() {
            self.pairs().len()
        } else {
            self.node().map_or(0, Node::num_children)
        }
    }

    /// Visit children in query order until `action` returns true.
    ///
    /// Returns true when iteration was cancelled.
    pub fn for_each(&self, mut action: impl FnMut(DataSnapshot) -> bool) -> bool {
        for (key, _) in self.pairs() {
            if action(self.child(&key)) {
                return true;
            }
        }
        false
    }

    pub fn export_val(&self) -> Result<JsonValue, Error> {
        Err(Error::unsupported("exportVal"))
    }

    pub fn priority(&self) -> Result<JsonValue, Error> {
        Err(Error::unsupported("getPriority"))
    }
}

impl fmt::Debug for DataSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSnapshot")
            .field("path", self.query.path())
            .field("value", &self.val())
            .finish()
    }
}
