//! The collection store container and its shared state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use mockbase_core::{Error, KeyGenerator, Node, Path, PathTrie, PushKeys, Scheduler};
use mockbase_json_store::{find_error, value_utils, InMemoryStore};
use serde_json::Value as JsonValue;

use crate::collection::CollectionReference;
use crate::document::DocumentReference;
use crate::paths;

type Notify = Rc<dyn Fn(&Node)>;

struct Watch {
    id: usize,
    notify: Notify,
}

/// State shared by every handle of one collection store.
pub(crate) struct FirestoreState {
    pub(crate) scheduler: Scheduler,
    store: RefCell<InMemoryStore>,
    /// Snapshot listeners, keyed by the content path they watch.
    watches: RefCell<PathTrie<Vec<Watch>>>,
    keys: RefCell<Box<dyn KeyGenerator>>,
    next_id: Cell<usize>,
}

impl FirestoreState {
    pub(crate) fn content(&self) -> Node {
        self.store.borrow().root().clone()
    }

    pub(crate) fn next_key(&self) -> String {
        self.keys.borrow_mut().next_key()
    }

    pub(crate) fn content_has(&self, path: &Path) -> bool {
        value_utils::has(self.store.borrow().root(), path)
    }

    /// Fail with the forced error covering `path`, if any.
    pub(crate) fn check(&self, path: &Path) -> Result<(), Error> {
        match find_error(self.store.borrow().root(), path) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Apply `mutate` to the content cell, then notify changed watches.
    pub(crate) fn commit(&self, mutate: impl FnOnce(&mut InMemoryStore) -> Node) {
        let previous = mutate(&mut self.store.borrow_mut());
        let current = self.content();

        let mut fired = Vec::new();
        collect_watches(&self.watches.borrow(), &previous, &current, &mut fired);
        log::trace!("{} snapshot listener(s) notified", fired.len());
        for notify in fired {
            notify(&current);
        }
    }

    /// Watch the subtree at `path`. The initial call is deferred.
    pub(crate) fn watch(self: &Rc<Self>, path: Path, notify: Notify) -> ListenerRegistration {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.watches
            .borrow_mut()
            .get_or_insert_with(&path, Vec::new)
            .push(Watch {
                id,
                notify: notify.clone(),
            });

        let (state, watched) = (Rc::downgrade(self), path.clone());
        self.scheduler.schedule(move || {
            if let Some(state) = state.upgrade() {
                if state.is_watching(&watched, id) {
                    notify(&state.content());
                }
            }
        });
        ListenerRegistration {
            state: Rc::downgrade(self),
            path,
            id,
        }
    }

    fn is_watching(&self, path: &Path, id: usize) -> bool {
        self.watches
            .borrow()
            .get(path)
            .is_some_and(|watches| watches.iter().any(|w| w.id == id))
    }

    fn unwatch(&self, path: &Path, id: usize) {
        let mut watches = self.watches.borrow_mut();
        let empty = match watches.get_mut(path) {
            Some(list) => {
                list.retain(|w| w.id != id);
                list.is_empty()
            }
            None => false,
        };
        if empty {
            watches.remove(path);
        }
    }
}

fn collect_watches(
    watches: &PathTrie<Vec<Watch>>,
    before: &Node,
    after: &Node,
    out: &mut Vec<Notify>,
) {
    if Node::same(before, after) {
        return;
    }
    if let Some(list) = watches.value() {
        out.extend(list.iter().map(|w| w.notify.clone()));
    }
    for (key, child) in watches.children() {
        let child_before = before.get_child(key).cloned().unwrap_or_default();
        let child_after = after.get_child(key).cloned().unwrap_or_default();
        collect_watches(child, &child_before, &child_after, out);
    }
}

/// Handle returned by `on_snapshot`; `remove` stops further deliveries.
#[derive(Clone, Debug)]
pub struct ListenerRegistration {
    state: Weak<FirestoreState>,
    path: Path,
    id: usize,
}

impl ListenerRegistration {
    pub fn remove(&self) {
        if let Some(state) = self.state.upgrade() {
            state.unwatch(&self.path, self.id);
        }
    }
}

/// An in-memory document and collection store.
///
/// # Example
///
/// ```rust
/// use mockbase_core::Scheduler;
/// use mockbase_firestore::Firestore;
/// use serde_json::json;
///
/// let firestore = Firestore::new(json!({}), &Scheduler::new());
/// let ada = firestore.doc("users/ada").unwrap();
/// ada.set(json!({"age": 36})).wait().unwrap();
///
/// let snapshot = firestore.collection("users").unwrap().get().wait().unwrap();
/// assert_eq!(snapshot.size(), 1);
/// ```
#[derive(Clone)]
pub struct Firestore {
    pub(crate) state: Rc<FirestoreState>,
}

impl Firestore {
    /// Create a store holding `content`, driven by `scheduler`.
    pub fn new(content: JsonValue, scheduler: &Scheduler) -> Self {
        log::debug!("collection store created");
        Self {
            state: Rc::new(FirestoreState {
                scheduler: scheduler.clone(),
                store: RefCell::new(InMemoryStore::from_json(content)),
                watches: RefCell::new(PathTrie::new()),
                keys: RefCell::new(Box::new(PushKeys::new())),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Replace the generator used for automatic document ids.
    pub fn set_key_generator(&self, generator: impl KeyGenerator + 'static) {
        *self.state.keys.borrow_mut() = Box::new(generator);
    }

    pub fn collection(&self, path: &str) -> Result<CollectionReference, Error> {
        let path = paths::collection_path(path)?;
        Ok(CollectionReference::new(&self.state, path))
    }

    pub fn doc(&self, path: &str) -> Result<DocumentReference, Error> {
        let path = paths::document_path(path)?;
        Ok(DocumentReference::new(&self.state, path))
    }

    pub fn batch(&self) -> Result<(), Error> {
        Err(Error::unsupported("batch"))
    }

    pub fn run_transaction(&self) -> Result<(), Error> {
        Err(Error::unsupported("runTransaction"))
    }

    /// A deep copy of the whole content.
    pub fn content(&self) -> JsonValue {
        self.state.content().to_json()
    }

    pub fn flush(&self) {
        self.state.scheduler.flush();
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.state.scheduler
    }
}

impl fmt::Debug for Firestore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Firestore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_are_checked() {
        let fs = Firestore::new(json!({}), &Scheduler::new());
        assert!(fs.collection("users").is_ok());
        assert!(fs.collection("users/ada").is_err());
        assert!(fs.doc("users").is_err());
        assert!(fs.doc("users/..").is_err());
    }

    #[test]
    fn null_content_starts_empty() {
        let fs = Firestore::new(JsonValue::Null, &Scheduler::new());
        assert_eq!(fs.content(), json!({}));
    }

    #[test]
    fn unsupported_operations() {
        let fs = Firestore::new(json!({}), &Scheduler::new());
        assert_eq!(fs.batch().unwrap_err().code(), "mock/unsupported");
        assert_eq!(fs.run_transaction().unwrap_err().code(), "mock/unsupported");
    }

    #[test]
    fn watches_fire_on_changed_subtrees_only() {
        let fs = Firestore::new(json!({"a": {"x": 1}, "b": {"y": 1}}), &Scheduler::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let registration = fs
            .state
            .watch(Path::parse("a"), Rc::new(move |_| h.set(h.get() + 1)));
        fs.flush();
        assert_eq!(hits.get(), 1);

        fs.state.commit(|store| store.write(&Path::parse("b/y"), Node::from(2i64)));
        assert_eq!(hits.get(), 1);
        fs.state.commit(|store| store.write(&Path::parse("a/x"), Node::from(2i64)));
        assert_eq!(hits.get(), 2);

        registration.remove();
        fs.state.commit(|store| store.write(&Path::parse("a/x"), Node::from(3i64)));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn removed_before_flush_gets_nothing() {
        let fs = Firestore::new(json!({}), &Scheduler::new());
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        fs.state
            .watch(Path::parse("a"), Rc::new(move |_| h.set(h.get() + 1)))
            .remove();
        fs.flush();
        assert_eq!(hits.get(), 0);
    }
}
