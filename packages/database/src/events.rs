//! Event types and change detection.
//!
//! Every mutation produces one (previous, current) pair of content trees.
//! [`diff`] turns that pair into the events a listener at one path would
//! observe; the per-reference query logic lives in `reference`.

use std::fmt;
use std::str::FromStr;

use mockbase_core::{Error, Node, Path};
use mockbase_json_store::value_utils;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    Value,
    ChildAdded,
    ChildChanged,
    ChildMoved,
    ChildRemoved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Value => "value",
            EventType::ChildAdded => "child_added",
            EventType::ChildChanged => "child_changed",
            EventType::ChildMoved => "child_moved",
            EventType::ChildRemoved => "child_removed",
        }
    }

    pub fn is_child_event(&self) -> bool {
        !matches!(self, EventType::Value)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "value" => Ok(EventType::Value),
            "child_added" => Ok(EventType::ChildAdded),
            "child_changed" => Ok(EventType::ChildChanged),
            "child_moved" => Ok(EventType::ChildMoved),
            "child_removed" => Ok(EventType::ChildRemoved),
            other => Err(Error::query(format!("Unknown event type: {}", other))),
        }
    }
}

/// Handle identifying one registered callback, returned by `on`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Listener {
    pub(crate) id: usize,
    pub(crate) event: EventType,
}

impl Listener {
    pub fn event(&self) -> EventType {
        self.event
    }
}

/// Number of bindings per event type on one reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefStats {
    pub child_added: usize,
    pub child_changed: usize,
    pub child_moved: usize,
    pub child_removed: usize,
    pub value: usize,
    pub total: usize,
}

impl RefStats {
    pub(crate) fn count(&mut self, event: EventType) {
        match event {
            EventType::Value => self.value += 1,
            EventType::ChildAdded => self.child_added += 1,
            EventType::ChildChanged => self.child_changed += 1,
            EventType::ChildMoved => self.child_moved += 1,
            EventType::ChildRemoved => self.child_removed += 1,
        }
        self.total += 1;
    }
}

/// What changed at one path between two content trees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// The node at the path is not the same node as before.
    pub value_changed: bool,
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub changed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        !self.value_changed
            && self.removed.is_empty()
            && self.added.is_empty()
            && self.changed.is_empty()
    }

    /// Events in delivery order: value, removals, additions, changes.
    pub fn events(&self) -> Vec<(EventType, Option<&str>)> {
        let mut events = Vec::new();
        if self.value_changed {
            events.push((EventType::Value, None));
        }
        let children = [
            (EventType::ChildRemoved, &self.removed),
            (EventType::ChildAdded, &self.added),
            (EventType::ChildChanged, &self.changed),
        ];
        for (event, keys) in children {
            events.extend(keys.iter().map(|k| (event, Some(k.as_str()))));
        }
        events
    }
}

/// Compare the nodes at `path` in two content trees.
pub fn diff(previous: &Node, current: &Node, path: &Path) -> ChangeSet {
    let before = value_utils::get(previous, path).cloned().unwrap_or_default();
    let after = value_utils::get(current, path).cloned().unwrap_or_default();
    diff_nodes(&before, &after)
}

/// Compare two nodes, treating `null` as an empty map for child events.
pub fn diff_nodes(before: &Node, after: &Node) -> ChangeSet {
    let mut changes = ChangeSet {
        value_changed: !Node::same(before, after),
        ..ChangeSet::default()
    };

    let has_children = |node: &Node| node.is_null() || node.is_composite();
    if !changes.value_changed || !has_children(before) || !has_children(after) {
        return changes;
    }

    for (key, old) in before.children() {
        match after.get_child(&key) {
            None => changes.removed.push(key),
            Some(new) if !Node::same(&old, new) => changes.changed.push(key),
            Some(_) => {}
        }
    }
    for key in after.child_keys() {
        if before.get_child(&key).is_none() {
            changes.added.push(key);
        }
    }
    changes
}
