use std::fmt;

use mockbase_core::{Error, Node, Path};
use mockbase_json_store::value_utils;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::collection::Query;
use crate::document::DocumentReference;

/// Snapshots are always read from local, committed content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub from_cache: bool,
    pub has_pending_writes: bool,
}

/// One document at one moment.
#[derive(Clone)]
pub struct DocumentSnapshot {
    content: Node,
    reference: DocumentReference,
}

impl DocumentSnapshot {
    pub(crate) fn new(content: Node, reference: DocumentReference) -> Self {
        Self { content, reference }
    }

    fn data_node(&self) -> Option<&Node> {
        value_utils::get(&self.content, &self.reference.data_path()).filter(|data| data.is_map())
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }

    pub fn reference(&self) -> &DocumentReference {
        &self.reference
    }

    pub fn exists(&self) -> bool {
        self.data_node().is_some()
    }

    /// A deep copy of the document's fields, `None` when it does not exist.
    pub fn data(&self) -> Option<JsonValue> {
        self.data_node().map(Node::to_json)
    }

    /// A deep copy of one field, given as a dotted path.
    pub fn get(&self, field: &str) -> Option<JsonValue> {
        let data = self.data_node()?;
        value_utils::get(data, &Path::parse_field(field)).map(Node::to_json)
    }

    /// Deserialize the fields into `T`, `None` when the document does not
    /// exist.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Option<T>, Error> {
        match self.data() {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::default()
    }
}

impl fmt::Debug for DocumentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSnapshot")
            .field("path", self.reference.path())
            .field("data", &self.data())
            .finish()
    }
}

/// The documents matching a query at one moment.
#[derive(Clone)]
pub struct QuerySnapshot {
    query: Query,
    docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub(crate) fn new(content: Node, query: Query, references: Vec<DocumentReference>) -> Self {
        let docs = references
            .into_iter()
            .map(|reference| DocumentSnapshot::new(content.clone(), reference))
            .collect();
        Self { query, docs }
    }

    pub fn docs(&self) -> &[DocumentSnapshot] {
        &self.docs
    }

    pub fn size(&self) -> usize {
        self.docs.len()
    }

    pub fn empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn for_each(&self, action: impl FnMut(&DocumentSnapshot)) {
        self.docs.iter().for_each(action);
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::default()
    }

    pub fn doc_changes(&self) -> Result<Vec<DocumentSnapshot>, Error> {
        Err(Error::unsupported("docChanges"))
    }
}

impl fmt::Debug for QuerySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySnapshot")
            .field("query", &self.query)
            .field("size", &self.docs.len())
            .finish()
    }
}
