//! Copy-on-write utilities for `Node` trees.
//!
//! None of these functions mutate their input. Writers rebuild only the
//! ancestors of the target path and share every other subtree with the
//! tree they were given, so callers can compare subtrees by identity
//! (`Node::same`) to learn what a write touched.

use std::collections::BTreeMap;
use std::rc::Rc;

use mockbase_core::{Node, Path};
use serde_json::Value as JsonValue;

/// Get a reference to a sub-tree at the given path.
///
/// Maps are traversed by key and arrays by decimal index. Scalars have no
/// children.
pub fn get<'a>(tree: &'a Node, path: &Path) -> Option<&'a Node> {
    let mut cursor = tree;
    for component in path.iter() {
        cursor = cursor.get_child(component)?;
    }
    Some(cursor)
}

/// True if something (including `null`) is stored at the path.
pub fn has(tree: &Node, path: &Path) -> bool {
    get(tree, path).is_some()
}

/// Return a tree with `value` installed at `path`.
///
/// If the path already holds a scalar equal to `value` the input tree
/// itself is returned. Scalars and missing nodes along the way are replaced
/// by maps.
pub fn set(tree: &Node, path: &Path, value: Node) -> Node {
    set_in(tree, &path.components, value)
}

fn set_in(node: &Node, components: &[String], value: Node) -> Node {
    let Some((key, rest)) = components.split_first() else {
        if !node.is_composite() && !value.is_composite() && *node == value {
            return node.clone();
        }
        return value;
    };

    match node.get_child(key) {
        Some(child) => {
            let updated = set_in(child, rest, value);
            if Node::same(child, &updated) {
                node.clone()
            } else {
                with_child(node, key, updated)
            }
        }
        None => with_child(node, key, set_in(&Node::Null, rest, value)),
    }
}

/// Return a tree without the node at `path`.
///
/// The input tree itself is returned when nothing is stored there. Removing
/// the root yields `null`.
pub fn remove(tree: &Node, path: &Path) -> Node {
    if path.is_empty() {
        return Node::Null;
    }
    remove_in(tree, &path.components).unwrap_or_else(|| tree.clone())
}

fn remove_in(node: &Node, components: &[String]) -> Option<Node> {
    let (key, rest) = components.split_first()?;
    let child = node.get_child(key)?;
    if rest.is_empty() {
        Some(without_child(node, key))
    } else {
        let updated = remove_in(child, rest)?;
        Some(with_child(node, key, updated))
    }
}

/// Remove every now-empty composite from `path` upwards.
///
/// Walks from the node at `path` towards the root (exclusive). Absent and
/// null nodes are skipped; the walk stops at the first node that is neither
/// absent, null, nor an empty map or array.
pub fn prune(tree: &mut Node, path: &Path) {
    let mut current = Some(path.clone());
    while let Some(candidate) = current.filter(|p| !p.is_empty()) {
        let empty = match get(tree, &candidate) {
            None | Some(Node::Null) => None,
            Some(node) => Some(node.is_empty_composite()),
        };
        match empty {
            Some(true) => *tree = remove(tree, &candidate),
            Some(false) => return,
            None => {}
        }
        current = candidate.parent();
    }
}

/// Deep copy into a caller-owned JSON value.
pub fn clone_value(node: &Node) -> JsonValue {
    node.to_json()
}

/// A shallow copy of `parent` with `key` set to `child`.
fn with_child(parent: &Node, key: &str, child: Node) -> Node {
    match parent {
        Node::Map(map) => {
            let mut map = BTreeMap::clone(map);
            map.insert(key.to_string(), child);
            Node::Map(Rc::new(map))
        }
        Node::Array(items) => match key.parse::<usize>() {
            Ok(index) if index < items.len() => {
                let mut items = Vec::clone(items);
                items[index] = child;
                Node::Array(Rc::new(items))
            }
            Ok(index) if index == items.len() => {
                let mut items = Vec::clone(items);
                items.push(child);
                Node::Array(Rc::new(items))
            }
            _ => {
                let mut map = index_keyed(items);
                map.insert(key.to_string(), child);
                Node::Map(Rc::new(map))
            }
        },
        _ => Node::from_entries([(key.to_string(), child)]),
    }
}

/// A shallow copy of `parent` without `key`.
fn without_child(parent: &Node, key: &str) -> Node {
    match parent {
        Node::Map(map) => {
            let mut map = BTreeMap::clone(map);
            map.remove(key);
            Node::Map(Rc::new(map))
        }
        Node::Array(items) => {
            if key.parse::<usize>().ok() == items.len().checked_sub(1) {
                let mut items = Vec::clone(items);
                items.pop();
                Node::Array(Rc::new(items))
            } else {
                let mut map = index_keyed(items);
                map.remove(key);
                Node::Map(Rc::new(map))
            }
        }
        other => other.clone(),
    }
}

fn index_keyed(items: &[Node]) -> BTreeMap<String, Node> {
    items
        .iter()
        .enumerate()
        .map(|(i, v)| (i.to_string(), v.clone()))
        .collect()
}
