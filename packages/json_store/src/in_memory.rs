//! The mutable content cell behind a store.

use mockbase_core::{Node, Path};
use serde_json::Value as JsonValue;

use crate::value_utils;

/// Holds the current content tree of one store.
///
/// Every write swaps in a new tree built with the copy-on-write utilities
/// and hands back the previous one, so callers can diff the two.
///
/// # Example
///
/// ```rust
/// use mockbase_json_store::InMemoryStore;
/// use mockbase_core::{Node, path};
///
/// let mut store = InMemoryStore::new();
/// let previous = store.write(&path!("name"), Node::from("Alice"));
///
/// assert_eq!(store.read(&path!("name")), Some(Node::from("Alice")));
/// assert_eq!(previous.to_json(), serde_json::json!({}));
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    root: Node,
}

impl InMemoryStore {
    /// Create a store holding an empty map.
    pub fn new() -> Self {
        Self { root: Node::map() }
    }

    /// Create a store with initial data. `null` becomes an empty map.
    pub fn with_data(root: Node) -> Self {
        if root.is_null() {
            Self::new()
        } else {
            Self { root }
        }
    }

    pub fn from_json(value: JsonValue) -> Self {
        Self::with_data(Node::from(value))
    }

    /// The current tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The node at `path`, sharing structure with the store.
    pub fn read(&self, path: &Path) -> Option<Node> {
        value_utils::get(&self.root, path).cloned()
    }

    /// Swap in `root`, returning the previous tree.
    pub fn replace(&mut self, root: Node) -> Node {
        std::mem::replace(&mut self.root, root)
    }

    /// Set `value` at `path`, returning the previous tree.
    pub fn write(&mut self, path: &Path, value: Node) -> Node {
        let next = value_utils::set(&self.root, path, value);
        log::debug!("write /{}", path);
        self.replace(next)
    }

    /// Remove the node at `path` and prune emptied ancestors, returning the
    /// previous tree. Deleting the root leaves an empty map; deleting a path
    /// that holds nothing leaves the tree untouched.
    pub fn delete(&mut self, path: &Path) -> Node {
        let next = if path.is_empty() {
            Node::map()
        } else if !value_utils::has(&self.root, path) {
            self.root.clone()
        } else {
            let mut next = value_utils::remove(&self.root, path);
            value_utils::prune(&mut next, path);
            next
        };
        log::debug!("delete /{}", path);
        self.replace(next)
    }

    /// Write fixture data as JSON, returning the previous tree.
    pub fn inject(&mut self, path: &Path, value: JsonValue) -> Node {
        log::debug!("inject /{}", path);
        let next = value_utils::set(&self.root, path, Node::from(value));
        self.replace(next)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockbase_core::path;
    use serde_json::json;

    #[test]
    fn starts_as_empty_map() {
        let store = InMemoryStore::new();
        assert_eq!(store.root().to_json(), json!({}));
        assert_eq!(InMemoryStore::from_json(JsonValue::Null).root().to_json(), json!({}));
    }

    #[test]
    fn write_returns_previous_tree() {
        let mut store = InMemoryStore::from_json(json!({"a": 1}));
        let before = store.root().clone();
        let previous = store.write(&path!("b"), Node::from(2));

        assert!(Node::same(&before, &previous));
        assert_eq!(store.root().to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn noop_write_keeps_identity() {
        let mut store = InMemoryStore::from_json(json!({"a": 1}));
        let previous = store.write(&path!("a"), Node::from(1));
        assert!(Node::same(&previous, store.root()));
    }

    #[test]
    fn nested_write_read() {
        let mut store = InMemoryStore::new();
        store.write(&path!("users/alice"), Node::from("Alice"));
        assert_eq!(store.read(&path!("users/alice")), Some(Node::from("Alice")));
        assert_eq!(store.read(&path!("users/bob")), None);
    }

    #[test]
    fn delete_prunes_empty_parents() {
        let mut store = InMemoryStore::from_json(json!({"a": {"b": {"c": 1}}, "d": 2}));
        store.delete(&path!("a/b/c"));
        assert_eq!(store.root().to_json(), json!({"d": 2}));
    }

    #[test]
    fn delete_missing_path_keeps_identity() {
        let mut store = InMemoryStore::from_json(json!({"a": {}}));
        let previous = store.delete(&path!("a/b"));
        assert!(Node::same(&previous, store.root()));
        assert_eq!(store.root().to_json(), json!({"a": {}}));
    }

    #[test]
    fn delete_root_leaves_empty_map() {
        let mut store = InMemoryStore::from_json(json!({"a": 1}));
        let previous = store.delete(&Path::root());
        assert_eq!(previous.to_json(), json!({"a": 1}));
        assert_eq!(store.root().to_json(), json!({}));
    }

    #[test]
    fn inject_writes_reserved_keys() {
        let mut store = InMemoryStore::new();
        store.inject(&path!("a/.error"), json!("Boom!"));
        assert_eq!(store.read(&path!("a/.error")), Some(Node::from("Boom!")));
    }
}
