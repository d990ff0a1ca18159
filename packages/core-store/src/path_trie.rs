//! Values keyed by path, stored as a tree of path components.
//!
//! Both stores keep their listeners in a `PathTrie` and walk it alongside
//! the content tree when a write lands, so only the branches that hold
//! listeners are ever visited.

use crate::Path;
use std::collections::BTreeMap;

/// A prefix trie keyed by path components.
///
/// # Example
///
/// ```rust
/// use mockbase_core::{path, PathTrie};
///
/// let mut listeners: PathTrie<Vec<&str>> = PathTrie::new();
/// listeners.get_or_insert_with(&path!("users/ada"), Vec::new).push("value");
///
/// assert_eq!(listeners.get(&path!("users/ada")), Some(&vec!["value"]));
/// assert!(listeners.get(&path!("users")).is_none());
///
/// listeners.remove(&path!("users/ada"));
/// assert!(listeners.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct PathTrie<T> {
    value: Option<T>,
    children: BTreeMap<String, PathTrie<T>>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<T> PathTrie<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn descend(&self, path: &Path) -> Option<&PathTrie<T>> {
        path.components
            .iter()
            .try_fold(self, |node, component| node.children.get(component))
    }

    fn descend_mut(&mut self, path: &Path) -> Option<&mut PathTrie<T>> {
        path.components
            .iter()
            .try_fold(self, |node, component| node.children.get_mut(component))
    }

    /// The value at `path`, created with `init` when missing.
    pub fn get_or_insert_with(&mut self, path: &Path, init: impl FnOnce() -> T) -> &mut T {
        let node = path.components.iter().fold(self, |node, component| {
            node.children.entry(component.clone()).or_default()
        });
        node.value.get_or_insert_with(init)
    }

    pub fn get(&self, path: &Path) -> Option<&T> {
        self.descend(path)?.value.as_ref()
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut T> {
        self.descend_mut(path)?.value.as_mut()
    }

    /// Take the value at `path`.
    ///
    /// Values below `path` stay. Branches left holding nothing are cut.
    pub fn remove(&mut self, path: &Path) -> Option<T> {
        let taken = self.descend_mut(path)?.value.take();
        self.cut_empty(&path.components);
        taken
    }

    fn cut_empty(&mut self, components: &[String]) {
        let Some((head, tail)) = components.split_first() else {
            return;
        };
        let Some(child) = self.children.get_mut(head) else {
            return;
        };
        child.cut_empty(tail);
        if child.value.is_none() && child.children.is_empty() {
            self.children.remove(head);
        }
    }

    /// The value stored on this node.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Immediate subtries, in component order.
    pub fn children(&self) -> impl Iterator<Item = (&String, &PathTrie<T>)> {
        self.children.iter()
    }

    /// True when no path holds a value.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.values().all(PathTrie::is_empty)
    }
}
