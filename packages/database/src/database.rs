//! The database container and its shared state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use mockbase_core::{Error, KeyGenerator, Node, Path, PathTrie, PushKeys, Scheduler};
use mockbase_json_store::{find_error, InMemoryStore};
use serde_json::{json, Value as JsonValue};

use crate::events::{diff_nodes, ChangeSet};
use crate::reference::{Reference, RefCore};
use crate::validation::{self, INFO_SEGMENT};

type Channels = PathTrie<Vec<Rc<RefCore>>>;

/// State shared by every reference of one database.
pub(crate) struct DatabaseState {
    pub(crate) url: String,
    pub(crate) scheduler: Scheduler,
    store: RefCell<InMemoryStore>,
    /// Listening references, keyed by the path they listen on.
    channels: RefCell<Channels>,
    keys: RefCell<Box<dyn KeyGenerator>>,
    next_id: Cell<usize>,
}

impl DatabaseState {
    /// The current content tree.
    pub(crate) fn content(&self) -> Node {
        self.store.borrow().root().clone()
    }

    pub(crate) fn next_id(&self) -> usize {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    pub(crate) fn next_key(&self) -> String {
        self.keys.borrow_mut().next_key()
    }

    /// Apply `mutate` to the content cell, then broadcast once.
    ///
    /// `mutate` returns the tree it replaced.
    pub(crate) fn commit(&self, mutate: impl FnOnce(&mut InMemoryStore) -> Node) {
        let previous = mutate(&mut self.store.borrow_mut());
        self.broadcast(&previous);
    }

    pub(crate) fn apply_set(&self, path: &Path, value: Node) -> Result<(), Error> {
        validation::validate_set_keys(&value)?;
        self.check(path)?;
        self.commit(|store| store.write(path, value));
        Ok(())
    }

    pub(crate) fn apply_remove(&self, path: &Path) -> Result<(), Error> {
        self.check(path)?;
        self.commit(|store| store.delete(path));
        Ok(())
    }

    /// Write every field of `fields` relative to `path`; `null` removes.
    ///
    /// All targets are checked before anything is written.
    pub(crate) fn apply_update(&self, path: &Path, fields: Node) -> Result<(), Error> {
        let Some(map) = fields.as_map() else {
            return Err(Error::Serialization {
                message: "update expects an object".to_string(),
            });
        };
        validation::validate_update_keys(&fields)?;

        let targets: Vec<(Path, Node)> = map
            .iter()
            .map(|(key, value)| (path.child(key), value.clone()))
            .collect();
        for (target, _) in &targets {
            self.check(target)?;
        }

        self.commit(|store| {
            let previous = store.root().clone();
            for (target, value) in targets {
                if value.is_null() {
                    store.delete(&target);
                } else {
                    store.write(&target, value);
                }
            }
            previous
        });
        Ok(())
    }

    /// Fail with the forced error covering `path`, if any.
    pub(crate) fn check(&self, path: &Path) -> Result<(), Error> {
        match find_error(self.store.borrow().root(), path) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Notify every listening reference whose location changed.
    fn broadcast(&self, previous: &Node) {
        let current = self.content();
        let mut deliveries = Vec::new();
        collect_deliveries(&self.channels.borrow(), previous, &current, &mut deliveries);

        for (refs, changes) in deliveries {
            for (event, key) in changes.events() {
                for core in &refs {
                    core.deliver(event, key, previous, &current);
                }
            }
        }
    }

    pub(crate) fn pin(&self, core: &Rc<RefCore>) {
        log::trace!("listening on /{}", core.path);
        self.channels
            .borrow_mut()
            .get_or_insert_with(&core.path, Vec::new)
            .push(core.clone());
    }

    pub(crate) fn unpin(&self, core: &Rc<RefCore>) {
        log::trace!("stopped listening on /{}", core.path);
        let mut channels = self.channels.borrow_mut();
        let empty = match channels.get_mut(&core.path) {
            Some(refs) => {
                refs.retain(|r| !Rc::ptr_eq(r, core));
                refs.is_empty()
            }
            None => false,
        };
        if empty {
            channels.remove(&core.path);
        }
    }

    fn seed_info(&self) {
        let info = Path::parse(INFO_SEGMENT);
        let mut store = self.store.borrow_mut();
        if store.read(&info).is_none() {
            store.inject(&info, json!({"connected": true, "serverTimeOffset": 0}));
        }
    }
}

/// Walk the channel trie alongside both trees, skipping identical subtrees.
fn collect_deliveries(
    channels: &Channels,
    before: &Node,
    after: &Node,
    out: &mut Vec<(Vec<Rc<RefCore>>, ChangeSet)>,
) {
    if Node::same(before, after) {
        return;
    }
    if let Some(refs) = channels.value().filter(|refs| !refs.is_empty()) {
        out.push((refs.clone(), diff_nodes(before, after)));
    }
    for (key, child) in channels.children() {
        let child_before = before.get_child(key).cloned().unwrap_or_default();
        let child_after = after.get_child(key).cloned().unwrap_or_default();
        collect_deliveries(child, &child_before, &child_after, out);
    }
}

/// An in-memory tree database.
///
/// Cloning a `Database` yields another handle to the same content.
///
/// # Example
///
/// ```rust
/// use mockbase_core::Scheduler;
/// use mockbase_database::Database;
/// use serde_json::json;
///
/// let db = Database::new("https://mock.example.com", json!({"a": 1}), &Scheduler::new());
/// let snapshot = db.reference("a").unwrap().get().wait().unwrap();
/// assert_eq!(snapshot.val(), json!(1));
/// ```
#[derive(Clone)]
pub struct Database {
    state: Rc<DatabaseState>,
}

impl Database {
    /// Create a database holding `content`, driven by `scheduler`.
    pub fn new(url: impl Into<String>, content: JsonValue, scheduler: &Scheduler) -> Self {
        let url = url.into();
        log::debug!("database created for {:?}", url);
        Self {
            state: Rc::new(DatabaseState {
                url,
                scheduler: scheduler.clone(),
                store: RefCell::new(InMemoryStore::from_json(content)),
                channels: RefCell::new(PathTrie::new()),
                keys: RefCell::new(Box::new(PushKeys::new())),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Replace the generator used for `push` keys.
    pub fn set_key_generator(&self, generator: impl KeyGenerator + 'static) {
        *self.state.keys.borrow_mut() = Box::new(generator);
    }

    pub fn url(&self) -> &str {
        &self.state.url
    }

    /// A reference to `path`.
    ///
    /// Paths may not contain `. $ [ ] #`, except below `.info`, which is
    /// seeded with connection info on first use.
    pub fn reference(&self, path: &str) -> Result<Reference, Error> {
        let path = validation::parse_ref_path(path)?;
        if path.components.first().map(String::as_str) == Some(INFO_SEGMENT) {
            self.state.seed_info();
        }
        Ok(Reference::new(&self.state, path))
    }

    /// A reference to the root.
    pub fn root(&self) -> Reference {
        Reference::new(&self.state, Path::root())
    }

    /// A reference from a full URL; the scheme and host are ignored.
    pub fn reference_from_url(&self, url: &str) -> Result<Reference, Error> {
        self.reference(validation::strip_origin(url))
    }

    /// Write fixture data immediately, bypassing validation.
    ///
    /// This is how forced errors are planted: `inject("a/.error", "Boom!")`.
    pub fn inject(&self, path: &str, value: JsonValue) {
        let path = Path::parse(path);
        self.state.commit(|store| store.inject(&path, value));
    }

    /// A deep copy of the whole content.
    pub fn content(&self) -> JsonValue {
        self.state.content().to_json()
    }

    /// Run every deferred action and delivery.
    pub fn flush(&self) {
        self.state.scheduler.flush();
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.state.scheduler
    }

    pub fn go_offline(&self) -> Result<(), Error> {
        Err(Error::unsupported("goOffline"))
    }

    pub fn go_online(&self) -> Result<(), Error> {
        Err(Error::unsupported("goOnline"))
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.state.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockbase_core::path;

    fn db(content: JsonValue) -> Database {
        Database::new("https://mock.example.com/", content, &Scheduler::new())
    }

    #[test]
    fn references_validate_paths() {
        let db = db(json!({}));
        assert!(db.reference("users/ada").is_ok());
        assert_eq!(
            db.reference("users/a.b").unwrap_err().code(),
            "database/illegal-path"
        );
    }

    #[test]
    fn info_is_seeded_on_demand() {
        let db = db(json!({}));
        assert_eq!(db.content(), json!({}));
        db.reference(".info/connected").unwrap();
        assert_eq!(
            db.content(),
            json!({".info": {"connected": true, "serverTimeOffset": 0}})
        );
    }

    #[test]
    fn reference_from_url_strips_origin() {
        let db = db(json!({}));
        let r = db
            .reference_from_url("https://mock.example.com/users/ada")
            .unwrap();
        assert_eq!(r.path(), &path!("users/ada"));
        assert_eq!(r.to_string(), "https://mock.example.com/users/ada");
    }

    #[test]
    fn inject_is_immediate() {
        let db = db(json!({"a": 1}));
        db.inject("a/.error", json!("Boom!"));
        assert_eq!(db.content(), json!({"a": {".error": "Boom!"}}));
    }

    #[test]
    fn update_checks_every_target_before_writing() {
        let db = db(json!({"ok": 1, "bad": {".error": "Boom!"}}));
        let err = db
            .state
            .apply_update(&Path::root(), Node::from(json!({"ok": 2, "bad/x": 3})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Boom!");
        assert_eq!(db.content()["ok"], json!(1));
    }

    #[test]
    fn update_with_null_removes_and_prunes() {
        let db = db(json!({"a": {"b": {"c": 1}}, "d": 1}));
        db.state
            .apply_update(&Path::root(), Node::from(json!({"a/b/c": null, "d": 2})))
            .unwrap();
        assert_eq!(db.content(), json!({"d": 2}));
    }

    #[test]
    fn unsupported_connection_controls() {
        let db = db(json!({}));
        assert_eq!(db.go_offline().unwrap_err().code(), "mock/unsupported");
        assert_eq!(db.go_online().unwrap_err().code(), "mock/unsupported");
    }
}
