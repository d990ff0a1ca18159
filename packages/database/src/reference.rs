//! References, queries and listener delivery.
//!
//! A [`Query`] addresses a location plus a [`QuerySpec`]; it can read and
//! listen. A [`Reference`] is a query with an empty spec that can also
//! write, and dereferences to its `Query`.
//!
//! Every reference owns a dispatch queue. Writes and initial listener
//! deliveries are queued there and run when the scheduler flushes, initial
//! `child_added` deliveries first, then initial `value` deliveries, then the
//! writes in the order they were made.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::ops::Deref;
use std::rc::Rc;

use mockbase_core::{Completion, Error, Node, Path};
use mockbase_json_store::{find_error, value_utils};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::database::DatabaseState;
use crate::events::{EventType, Listener, RefStats};
use crate::query::{Bound, Limit, OrderBy, QuerySpec};
use crate::snapshot::DataSnapshot;
use crate::validation;

type EventCallback = Rc<dyn Fn(DataSnapshot, Option<String>)>;
type ErrorCallback = Rc<dyn Fn(Error)>;
type Action = Box<dyn FnOnce()>;

#[derive(Clone, Copy)]
enum Phase {
    InitChildAdded,
    InitValue,
    Write,
}

#[derive(Default)]
struct ActionQueue {
    init_child_added: Vec<Action>,
    init_value: Vec<Action>,
    writes: Vec<Action>,
}

impl ActionQueue {
    fn is_empty(&self) -> bool {
        self.init_child_added.is_empty() && self.init_value.is_empty() && self.writes.is_empty()
    }

    fn push(&mut self, phase: Phase, action: Action) {
        match phase {
            Phase::InitChildAdded => self.init_child_added.push(action),
            Phase::InitValue => self.init_value.push(action),
            Phase::Write => self.writes.push(action),
        }
    }
}

struct Binding {
    listener: Listener,
    on_event: EventCallback,
    on_error: Option<ErrorCallback>,
}

/// The shared body of every handle to one reference.
pub(crate) struct RefCore {
    pub(crate) db: Rc<DatabaseState>,
    pub(crate) path: Path,
    pub(crate) spec: QuerySpec,
    queue: RefCell<ActionQueue>,
    bindings: RefCell<Vec<Binding>>,
}

impl RefCore {
    fn new(db: &Rc<DatabaseState>, path: Path, spec: QuerySpec) -> Rc<Self> {
        Rc::new(Self {
            db: db.clone(),
            path,
            spec,
            queue: RefCell::new(ActionQueue::default()),
            bindings: RefCell::new(Vec::new()),
        })
    }

    /// An unqueried reference below this one. No validation.
    pub(crate) fn descendant(&self, relative: &Path) -> Query {
        Query {
            core: RefCore::new(&self.db, self.path.join(relative), QuerySpec::default()),
        }
    }

    fn child_snapshot(&self, content: &Node, key: &str) -> DataSnapshot {
        DataSnapshot::new(content.clone(), self.descendant(&Path::root().push(key)))
    }

    /// Query-ordered children of this location in `content`.
    pub(crate) fn pairs(&self, content: &Node) -> Vec<(String, Node)> {
        match value_utils::get(content, &self.path) {
            Some(node) => self.spec.evaluate(node),
            None => Vec::new(),
        }
    }

    fn enqueue(self: &Rc<Self>, phase: Phase, action: impl FnOnce() + 'static) {
        let schedule = {
            let mut queue = self.queue.borrow_mut();
            let was_empty = queue.is_empty();
            queue.push(phase, Box::new(action));
            was_empty
        };
        if schedule {
            let core = self.clone();
            self.db.scheduler.schedule(move || core.drain());
        }
    }

    fn drain(&self) {
        let queue = mem::take(&mut *self.queue.borrow_mut());
        log::trace!(
            "draining /{}: {} child_added, {} value, {} write(s)",
            self.path,
            queue.init_child_added.len(),
            queue.init_value.len(),
            queue.writes.len()
        );
        let phases = [queue.init_child_added, queue.init_value, queue.writes];
        for action in phases.into_iter().flatten() {
            action();
        }
    }

    fn callbacks(&self, listener: &Listener) -> Option<(EventCallback, Option<ErrorCallback>)> {
        self.bindings
            .borrow()
            .iter()
            .find(|b| b.listener == *listener)
            .map(|b| (b.on_event.clone(), b.on_error.clone()))
    }

    fn add_binding(self: &Rc<Self>, binding: Binding) {
        let listener = binding.listener.clone();
        let first = {
            let mut bindings = self.bindings.borrow_mut();
            bindings.push(binding);
            bindings.len() == 1
        };
        if first {
            self.db.pin(self);
        }

        let core = self.clone();
        match listener.event {
            EventType::ChildAdded => {
                self.enqueue(Phase::InitChildAdded, move || core.replay_child_added(&listener))
            }
            EventType::Value => self.enqueue(Phase::InitValue, move || core.replay_value(&listener)),
            _ => {}
        }
    }

    fn remove_bindings(self: &Rc<Self>, keep: impl Fn(&Binding) -> bool) {
        let (removed, emptied) = {
            let mut bindings = self.bindings.borrow_mut();
            let had_any = !bindings.is_empty();
            let (kept, removed): (Vec<Binding>, Vec<Binding>) =
                mem::take(&mut *bindings).into_iter().partition(|b| keep(b));
            *bindings = kept;
            (removed, had_any && bindings.is_empty())
        };
        if emptied {
            self.db.unpin(self);
        }
        drop(removed);
    }

    fn replay_value(self: &Rc<Self>, listener: &Listener) {
        let Some((on_event, on_error)) = self.callbacks(listener) else {
            return;
        };
        let content = self.db.content();
        match find_error(&content, &self.path) {
            Some(error) => {
                if let Some(on_error) = on_error {
                    on_error(error);
                }
            }
            None => on_event(
                DataSnapshot::new(content, Query { core: self.clone() }),
                None,
            ),
        }
    }

    fn replay_child_added(self: &Rc<Self>, listener: &Listener) {
        let content = self.db.content();
        if let Some(error) = find_error(&content, &self.path) {
            if let Some((_, Some(on_error))) = self.callbacks(listener) {
                on_error(error);
            }
            return;
        }
        let mut previous_key = None;
        for (key, _) in self.pairs(&content) {
            // Stop as soon as the listener goes away, e.g. after `once`
            let Some((on_event, _)) = self.callbacks(listener) else {
                return;
            };
            on_event(self.child_snapshot(&content, &key), previous_key.take());
            previous_key = Some(key);
        }
    }

    /// Deliver one channel event, re-deriving it through this reference's
    /// query.
    pub(crate) fn deliver(
        self: &Rc<Self>,
        event: EventType,
        key: Option<&str>,
        previous: &Node,
        current: &Node,
    ) {
        if self.bindings.borrow().is_empty() {
            return;
        }
        if let Some(error) = find_error(current, &self.path) {
            log::warn!("{} on /{} suppressed: {}", event, self.path, error);
            self.emit_error(event, error);
            return;
        }

        let Some(key) = key else {
            let snapshot = DataSnapshot::new(current.clone(), Query { core: self.clone() });
            self.emit(event, snapshot, None);
            return;
        };

        let before = self.pairs(previous);
        let after = self.pairs(current);
        let position = |pairs: &[(String, Node)], key: &str| pairs.iter().position(|(k, _)| k == key);
        let key_before = |pairs: &[(String, Node)], index: usize| {
            index.checked_sub(1).map(|i| pairs[i].0.clone())
        };

        let index = position(&after, key);
        let limited = self.spec.is_limited();

        if limited && matches!(event, EventType::ChildAdded | EventType::ChildChanged) {
            let dropped = before
                .iter()
                .filter(|(k, _)| position(&after, k.as_str()).is_none());
            for (dropped, _) in dropped {
                self.emit(
                    EventType::ChildRemoved,
                    self.child_snapshot(previous, dropped),
                    None,
                );
            }
        }

        if index.is_some() || position(&before, key).is_some() {
            let snapshot = if event == EventType::ChildRemoved {
                self.child_snapshot(previous, key)
            } else {
                self.child_snapshot(current, key)
            };
            self.emit(event, snapshot, index.and_then(|i| key_before(&after, i)));
        }

        if limited && matches!(event, EventType::ChildChanged | EventType::ChildRemoved) {
            for (i, (entered, _)) in after.iter().enumerate() {
                if position(&before, entered.as_str()).is_none() {
                    self.emit(
                        EventType::ChildAdded,
                        self.child_snapshot(current, entered),
                        key_before(&after, i),
                    );
                }
            }
        }
    }

    fn emit(&self, event: EventType, snapshot: DataSnapshot, previous_key: Option<String>) {
        let callbacks: Vec<EventCallback> = self
            .bindings
            .borrow()
            .iter()
            .filter(|b| b.listener.event == event)
            .map(|b| b.on_event.clone())
            .collect();
        log::trace!("{} on /{} to {} listener(s)", event, self.path, callbacks.len());
        for callback in callbacks {
            callback(snapshot.clone(), previous_key.clone());
        }
    }

    fn emit_error(&self, event: EventType, error: Error) {
        let callbacks: Vec<ErrorCallback> = self
            .bindings
            .borrow()
            .iter()
            .filter(|b| b.listener.event == event)
            .filter_map(|b| b.on_error.clone())
            .collect();
        for callback in callbacks {
            callback(error.clone());
        }
    }
}

/// A location plus query constraints. Reads and listens.
#[derive(Clone)]
pub struct Query {
    pub(crate) core: Rc<RefCore>,
}

impl Query {
    fn with_spec(&self, spec: QuerySpec) -> Query {
        Query {
            core: RefCore::new(&self.core.db, self.core.path.clone(), spec),
        }
    }

    fn plain(&self, path: Path) -> Reference {
        Reference::new(&self.core.db, path)
    }

    /// The last path component, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.core.path.key()
    }

    pub fn path(&self) -> &Path {
        &self.core.path
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.core.spec
    }

    pub fn parent(&self) -> Option<Reference> {
        self.core.path.parent().map(|p| self.plain(p))
    }

    pub fn root(&self) -> Reference {
        self.plain(Path::root())
    }

    /// The unqueried reference at this location.
    pub fn reference(&self) -> Reference {
        self.plain(self.core.path.clone())
    }

    /// Same database, same location and same constraints.
    pub fn is_equal(&self, other: &Query) -> bool {
        Rc::ptr_eq(&self.core.db, &other.core.db)
            && self.core.path == other.core.path
            && self.core.spec == other.core.spec
    }

    pub fn order_by_key(&self) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_order(OrderBy::Key)?))
    }

    /// Order by a child field given as a `/` or `.` separated path.
    pub fn order_by_child(&self, field: &str) -> Result<Query, Error> {
        let order = OrderBy::Child(Path::parse_field(field));
        Ok(self.with_spec(self.core.spec.with_order(order)?))
    }

    pub fn order_by_value(&self) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_order(OrderBy::Value)?))
    }

    pub fn order_by_priority(&self) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_order(OrderBy::Priority)?))
    }

    pub fn start_at(&self, value: impl Into<Node>) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_start_at(Bound::new(value))?))
    }

    pub fn start_at_with_key(&self, value: impl Into<Node>, key: &str) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_start_at(Bound::with_key(value, key))?))
    }

    pub fn end_at(&self, value: impl Into<Node>) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_end_at(Bound::new(value))?))
    }

    pub fn end_at_with_key(&self, value: impl Into<Node>, key: &str) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_end_at(Bound::with_key(value, key))?))
    }

    pub fn equal_to(&self, value: impl Into<Node>) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_equal_to(Bound::new(value))?))
    }

    pub fn equal_to_with_key(&self, value: impl Into<Node>, key: &str) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_equal_to(Bound::with_key(value, key))?))
    }

    pub fn limit_to_first(&self, limit: usize) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_limit(Limit::First(limit))?))
    }

    pub fn limit_to_last(&self, limit: usize) -> Result<Query, Error> {
        Ok(self.with_spec(self.core.spec.with_limit(Limit::Last(limit))?))
    }

    /// Register `callback` for `event`. Errors are ignored.
    pub fn on<F>(&self, event: EventType, callback: F) -> Listener
    where
        F: Fn(DataSnapshot, Option<String>) + 'static,
    {
        self.bind(event, Rc::new(callback), None)
    }

    /// Register `callback` for `event` and `on_error` for forced errors.
    pub fn on_with_error<F, E>(&self, event: EventType, callback: F, on_error: E) -> Listener
    where
        F: Fn(DataSnapshot, Option<String>) + 'static,
        E: Fn(Error) + 'static,
    {
        self.bind(event, Rc::new(callback), Some(Rc::new(on_error)))
    }

    fn bind(
        &self,
        event: EventType,
        on_event: EventCallback,
        on_error: Option<ErrorCallback>,
    ) -> Listener {
        let listener = Listener {
            id: self.core.db.next_id(),
            event,
        };
        self.core.add_binding(Binding {
            listener: listener.clone(),
            on_event,
            on_error,
        });
        listener
    }

    /// Remove one listener, every listener of one event type, or all.
    ///
    /// A listener removed before its queued initial delivery runs gets
    /// nothing.
    pub fn off(&self, event: Option<EventType>, listener: Option<&Listener>) {
        match (event, listener) {
            (_, Some(listener)) => self.core.remove_bindings(|b| b.listener != *listener),
            (Some(event), None) => self.core.remove_bindings(|b| b.listener.event != event),
            (None, None) => self.core.remove_bindings(|_| false),
        }
    }

    /// The first delivery of `event`, or the error that replaced it.
    ///
    /// Dropping every handle to the returned completion before it settles
    /// removes the listener.
    pub fn once(&self, event: EventType) -> Completion<DataSnapshot> {
        let completion = Completion::new(&self.core.db.scheduler);
        let listener = Listener {
            id: self.core.db.next_id(),
            event,
        };

        let (weak, id) = (Rc::downgrade(&self.core), listener.clone());
        let target = completion.downgrade();
        let on_event: EventCallback = Rc::new(move |snapshot, _| {
            if let Some(core) = weak.upgrade() {
                core.remove_bindings(|b| b.listener != id);
            }
            if let Some(target) = target.upgrade() {
                target.resolve(snapshot);
            }
        });
        let (weak, id) = (Rc::downgrade(&self.core), listener.clone());
        let target = completion.downgrade();
        let on_error: ErrorCallback = Rc::new(move |error| {
            if let Some(core) = weak.upgrade() {
                core.remove_bindings(|b| b.listener != id);
            }
            if let Some(target) = target.upgrade() {
                target.reject(error);
            }
        });
        let (weak, id) = (Rc::downgrade(&self.core), listener.clone());
        completion.on_abandoned(move || {
            if let Some(core) = weak.upgrade() {
                log::trace!("once({}) on /{} abandoned", id.event, core.path);
                core.remove_bindings(|b| b.listener != id);
            }
        });

        self.core.add_binding(Binding {
            listener,
            on_event,
            on_error: Some(on_error),
        });
        completion
    }

    /// The current value, as `once(Value)`.
    pub fn get(&self) -> Completion<DataSnapshot> {
        self.once(EventType::Value)
    }

    pub fn stats(&self) -> RefStats {
        let mut stats = RefStats::default();
        for binding in self.core.bindings.borrow().iter() {
            stats.count(binding.listener.event);
        }
        stats
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.core.db.url.trim_end_matches('/'), self.core.path)
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("path", &self.core.path)
            .field("spec", &self.core.spec)
            .finish()
    }
}

/// Outcome of [`Reference::transaction`].
#[derive(Clone, Debug)]
pub struct TransactionResult {
    pub committed: bool,
    pub snapshot: DataSnapshot,
}

/// A plain location that can be written.
#[derive(Clone)]
pub struct Reference {
    query: Query,
}

impl Deref for Reference {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl Reference {
    pub(crate) fn new(db: &Rc<DatabaseState>, path: Path) -> Self {
        Self {
            query: Query {
                core: RefCore::new(db, path, QuerySpec::default()),
            },
        }
    }

    pub fn as_query(&self) -> &Query {
        &self.query
    }

    /// A reference to a path relative to this one.
    pub fn child(&self, path: &str) -> Result<Reference, Error> {
        let full = self.core.path.join(&Path::parse(path));
        let checked = validation::parse_ref_path(&full.to_string())?;
        Ok(Reference::new(&self.core.db, checked))
    }

    fn pending(&self) -> Completion<()> {
        Completion::new(&self.core.db.scheduler)
    }

    /// Replace the value at this location. `null` removes it.
    pub fn set<V: Serialize>(&self, value: V) -> Completion<()> {
        let node = match Node::from_serialize(&value) {
            Ok(node) => node,
            Err(error) => return Completion::settled(&self.core.db.scheduler, Err(error)),
        };
        if node.is_null() {
            return self.remove();
        }
        let completion = self.pending();
        let (db, path, target) = (self.core.db.clone(), self.core.path.clone(), completion.clone());
        self.core.enqueue(Phase::Write, move || {
            target.settle(db.apply_set(&path, node));
        });
        completion
    }

    /// Write several fields relative to this location. Keys may be relative
    /// paths; `null` values remove.
    pub fn update<V: Serialize>(&self, fields: V) -> Completion<()> {
        let node = match Node::from_serialize(&fields) {
            Ok(node) => node,
            Err(error) => return Completion::settled(&self.core.db.scheduler, Err(error)),
        };
        let completion = self.pending();
        let (db, path, target) = (self.core.db.clone(), self.core.path.clone(), completion.clone());
        self.core.enqueue(Phase::Write, move || {
            target.settle(db.apply_update(&path, node));
        });
        completion
    }

    /// Remove this location. At the root this empties the database.
    pub fn remove(&self) -> Completion<()> {
        let completion = self.pending();
        let (db, path, target) = (self.core.db.clone(), self.core.path.clone(), completion.clone());
        self.core.enqueue(Phase::Write, move || {
            target.settle(db.apply_remove(&path));
        });
        completion
    }

    /// A new child with a generated key. Nothing is written.
    pub fn push(&self) -> ThenableReference {
        let child = self.pushed_child();
        let completion = Completion::settled(&self.core.db.scheduler, Ok(child.clone()));
        ThenableReference {
            reference: child,
            completion,
        }
    }

    /// A new child with a generated key, holding `value`.
    pub fn push_with<V: Serialize>(&self, value: V) -> ThenableReference {
        let child = self.pushed_child();
        let resolved = child.clone();
        let completion = child.set(value).map(move |_| resolved);
        ThenableReference {
            reference: child,
            completion,
        }
    }

    fn pushed_child(&self) -> Reference {
        let key = self.core.db.next_key();
        Reference::new(&self.core.db, self.core.path.push(&key))
    }

    /// Read, transform and write the value at this location.
    ///
    /// `update` receives a copy of the current value (`null` when absent)
    /// and returns the new value, or `None` to abort.
    pub fn transaction<F>(&self, update: F) -> Completion<TransactionResult>
    where
        F: FnOnce(JsonValue) -> Option<JsonValue> + 'static,
    {
        let completion = Completion::new(&self.core.db.scheduler);
        let (core, target) = (self.core.clone(), completion.clone());
        self.core.enqueue(Phase::Write, move || {
            target.settle(run_transaction(&core, update));
        });
        completion
    }

    pub fn set_priority<V: Serialize>(&self, _priority: V) -> Result<Completion<()>, Error> {
        Err(Error::unsupported("setPriority"))
    }

    pub fn set_with_priority<V: Serialize, P: Serialize>(
        &self,
        _value: V,
        _priority: P,
    ) -> Result<Completion<()>, Error> {
        Err(Error::unsupported("setWithPriority"))
    }

    pub fn on_disconnect(&self) -> Result<(), Error> {
        Err(Error::unsupported("onDisconnect"))
    }
}

fn run_transaction<F>(core: &Rc<RefCore>, update: F) -> Result<TransactionResult, Error>
where
    F: FnOnce(JsonValue) -> Option<JsonValue>,
{
    let db = &core.db;
    db.check(&core.path)?;
    let current = value_utils::get(&db.content(), &core.path)
        .map(Node::to_json)
        .unwrap_or(JsonValue::Null);

    let committed = match update(current) {
        None => false,
        Some(value) => {
            let node = Node::from(value);
            if node.is_null() {
                db.apply_remove(&core.path)?;
            } else {
                db.apply_set(&core.path, node)?;
            }
            true
        }
    };
    log::debug!("transaction on /{} committed: {}", core.path, committed);
    Ok(TransactionResult {
        committed,
        snapshot: DataSnapshot::new(db.content(), Query { core: core.clone() }),
    })
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.query.fmt(f)
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("path", &self.core.path)
            .finish()
    }
}

/// The child created by `push`, together with the completion of its write.
#[derive(Clone, Debug)]
pub struct ThenableReference {
    reference: Reference,
    completion: Completion<Reference>,
}

impl ThenableReference {
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn completion(&self) -> &Completion<Reference> {
        &self.completion
    }

    /// Flush and return the pushed reference once its write settled.
    pub fn wait(&self) -> Result<Reference, Error> {
        self.completion.wait()
    }
}

impl Deref for ThenableReference {
    type Target = Reference;

    fn deref(&self) -> &Reference {
        &self.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use mockbase_core::{path, KeyGenerator, Scheduler};
    use serde_json::json;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    fn db(content: JsonValue) -> Database {
        Database::new("https://mock.example.com", content, &Scheduler::new())
    }

    fn recorder(log: &Log, label: &'static str) -> impl Fn(DataSnapshot, Option<String>) {
        let log = log.clone();
        move |snapshot, previous| {
            log.borrow_mut().push(format!(
                "{} {} {} prev={}",
                label,
                snapshot.key().unwrap_or("<root>"),
                snapshot.val(),
                previous.as_deref().unwrap_or("-")
            ))
        }
    }

    struct Counter(usize);

    impl KeyGenerator for Counter {
        fn next_key(&mut self) -> String {
            self.0 += 1;
            format!("k{:03}", self.0)
        }
    }

    #[test]
    fn navigation() {
        let db = db(json!({}));
        let r = db.reference("a/b").unwrap();
        assert_eq!(r.key(), Some("b"));
        assert_eq!(r.parent().unwrap().path(), &path!("a"));
        assert!(r.root().key().is_none());
        assert!(r.root().parent().is_none());
        assert_eq!(r.child("c/d").unwrap().path(), &path!("a/b/c/d"));
        assert!(r.child("c.d").is_err());
        assert_eq!(r.to_string(), "https://mock.example.com/a/b");
    }

    #[test]
    fn writes_are_deferred_until_flush() {
        let db = db(json!({}));
        let done = db.reference("a").unwrap().set(1);
        assert_eq!(db.content(), json!({}));
        assert!(!done.is_settled());
        assert_eq!(done.wait(), Ok(()));
        assert_eq!(db.content(), json!({"a": 1}));
    }

    #[test]
    fn set_null_removes() {
        let db = db(json!({"a": {"b": 1}, "c": 1}));
        db.reference("a/b").unwrap().set(JsonValue::Null).wait().unwrap();
        assert_eq!(db.content(), json!({"c": 1}));
    }

    #[test]
    fn set_rejects_illegal_keys_without_writing() {
        let db = db(json!({}));
        let err = db
            .reference("a")
            .unwrap()
            .set(json!({"b.c": 1}))
            .wait()
            .unwrap_err();
        assert_eq!(err.code(), "database/illegal-key");
        assert_eq!(db.content(), json!({}));
    }

    #[test]
    fn forced_error_rejects_writes() {
        let db = db(json!({"locked": {".error": {"code": "permission-denied", "message": "no"}}}));
        let err = db
            .reference("locked/x")
            .unwrap()
            .set(1)
            .wait()
            .unwrap_err();
        assert_eq!(err.code(), "permission-denied");
        assert!(db.reference("locked").unwrap().remove().wait().is_err());
    }

    #[test]
    fn remove_root_empties_database() {
        let db = db(json!({"a": 1}));
        db.root().remove().wait().unwrap();
        assert_eq!(db.content(), json!({}));
    }

    #[test]
    fn update_writes_relative_paths() {
        let db = db(json!({"u": {"name": "ada", "age": 36}}));
        db.reference("u")
            .unwrap()
            .update(json!({"age": 37, "address/city": "London", "name": null}))
            .wait()
            .unwrap();
        assert_eq!(
            db.content(),
            json!({"u": {"age": 37, "address": {"city": "London"}}})
        );
    }

    #[test]
    fn update_keeps_nested_slash_keys_literal() {
        let db = db(json!({}));
        let u = db.reference("u").unwrap();
        u.update(json!({"a/b": {"c/d": 1}})).wait().unwrap();
        assert_eq!(db.content(), json!({"u": {"a": {"b": {"c/d": 1}}}}));

        assert!(u.update(json!({"x": {"y.z": 1}})).wait().is_err());
        assert_eq!(db.content(), json!({"u": {"a": {"b": {"c/d": 1}}}}));
    }

    #[test]
    fn update_requires_an_object() {
        let db = db(json!({}));
        let err = db.reference("u").unwrap().update(5).wait().unwrap_err();
        assert_eq!(err.code(), "mock/serialization");
    }

    #[test]
    fn push_generates_keys() {
        let db = db(json!({}));
        db.set_key_generator(Counter(0));
        let list = db.reference("list").unwrap();

        let first = list.push_with("a");
        let second = list.push();
        assert_eq!(first.key(), Some("k001"));
        assert_eq!(second.key(), Some("k002"));

        assert_eq!(first.wait().unwrap().path(), &path!("list/k001"));
        assert_eq!(second.wait().unwrap().key(), Some("k002"));
        assert_eq!(db.content(), json!({"list": {"k001": "a"}}));
    }

    #[test]
    fn transaction_commits_and_aborts() {
        let db = db(json!({"count": 1}));
        let count = db.reference("count").unwrap();

        let result = count
            .transaction(|v| Some(json!(v.as_i64().unwrap_or(0) + 1)))
            .wait()
            .unwrap();
        assert!(result.committed);
        assert_eq!(result.snapshot.val(), json!(2));

        let result = count.transaction(|_| None).wait().unwrap();
        assert!(!result.committed);
        assert_eq!(result.snapshot.val(), json!(2));
        assert_eq!(db.content(), json!({"count": 2}));
    }

    #[test]
    fn transaction_sees_null_for_missing_and_copy_is_owned() {
        let db = db(json!({"obj": {"a": 1}}));
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        db.reference("missing")
            .unwrap()
            .transaction(move |v| {
                *s.borrow_mut() = Some(v);
                None
            })
            .wait()
            .unwrap();
        assert_eq!(*seen.borrow(), Some(JsonValue::Null));

        db.reference("obj")
            .unwrap()
            .transaction(|mut v| {
                v["a"] = json!(99);
                None
            })
            .wait()
            .unwrap();
        assert_eq!(db.content(), json!({"obj": {"a": 1}}));
    }

    #[test]
    fn transaction_honours_forced_errors() {
        let db = db(json!({"a": {".error": "Boom!"}}));
        let err = db
            .reference("a/b")
            .unwrap()
            .transaction(|_| Some(json!(1)))
            .wait()
            .unwrap_err();
        assert_eq!(err.to_string(), "Boom!");
    }

    #[test]
    fn value_listener_gets_initial_and_changes() {
        let db = db(json!({"a": 1}));
        let log: Log = Rc::default();
        let a = db.reference("a").unwrap();
        a.on(EventType::Value, recorder(&log, "value"));
        db.flush();
        a.set(2);
        db.flush();
        assert_eq!(
            *log.borrow(),
            vec!["value a 1 prev=-", "value a 2 prev=-"]
        );
    }

    #[test]
    fn unrelated_writes_do_not_notify() {
        let db = db(json!({"a": 1, "b": 1}));
        let log: Log = Rc::default();
        db.reference("a").unwrap().on(EventType::Value, recorder(&log, "value"));
        db.flush();
        db.reference("b").unwrap().set(2).wait().unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn child_events_in_order() {
        let db = db(json!({"l": {"a": 1, "b": 2}}));
        let log: Log = Rc::default();
        let l = db.reference("l").unwrap();
        for (event, label) in [
            (EventType::ChildAdded, "added"),
            (EventType::ChildChanged, "changed"),
            (EventType::ChildRemoved, "removed"),
        ] {
            l.on(event, recorder(&log, label));
        }
        db.flush();
        log.borrow_mut().clear();

        l.set(json!({"b": 3, "c": 4})).wait().unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "removed a 1 prev=-",
                "added c 4 prev=b",
                "changed b 3 prev=-",
            ]
        );
    }

    #[test]
    fn child_added_replays_before_value() {
        let db = db(json!({"l": {"a": 1, "b": 2}}));
        let log: Log = Rc::default();
        let l = db.reference("l").unwrap();
        l.on(EventType::Value, recorder(&log, "value"));
        l.on(EventType::ChildAdded, recorder(&log, "added"));
        db.flush();
        assert_eq!(
            *log.borrow(),
            vec![
                "added a 1 prev=-",
                "added b 2 prev=a",
                r#"value l {"a":1,"b":2} prev=-"#,
            ]
        );
    }

    #[test]
    fn off_before_flush_suppresses_initial_delivery() {
        let db = db(json!({"a": 1}));
        let log: Log = Rc::default();
        let a = db.reference("a").unwrap();
        let listener = a.on(EventType::Value, recorder(&log, "value"));
        a.off(None, Some(&listener));
        db.flush();
        assert!(log.borrow().is_empty());
        assert_eq!(a.stats().total, 0);
    }

    #[test]
    fn off_by_event_type_and_all() {
        let db = db(json!({}));
        let a = db.reference("a").unwrap();
        a.on(EventType::Value, |_, _| {});
        a.on(EventType::Value, |_, _| {});
        a.on(EventType::ChildAdded, |_, _| {});
        assert_eq!(a.stats().value, 2);
        assert_eq!(a.stats().total, 3);

        a.off(Some(EventType::Value), None);
        assert_eq!(a.stats().value, 0);
        assert_eq!(a.stats().child_added, 1);

        a.off(None, None);
        assert_eq!(a.stats(), RefStats::default());
    }

    #[test]
    fn once_resolves_and_unbinds() {
        let db = db(json!({"a": 1}));
        let a = db.reference("a").unwrap();
        let snapshot = a.once(EventType::Value).wait().unwrap();
        assert_eq!(snapshot.val(), json!(1));
        assert_eq!(a.stats().total, 0);
    }

    #[test]
    fn once_child_added_on_empty_location_never_settles() {
        let db = db(json!({}));
        let empty = db.reference("empty").unwrap();
        let pending = empty.once(EventType::ChildAdded);
        assert_eq!(pending.wait().unwrap_err(), Error::Unsettled);
        assert_eq!(empty.stats().child_added, 1);
    }

    #[test]
    fn dropping_an_unsettled_once_releases_the_listener() {
        let db = db(json!({}));
        let empty = db.reference("empty").unwrap();
        let weak = Rc::downgrade(&empty.core);
        let pending = empty.once(EventType::ChildAdded);
        let copy = pending.clone();
        db.flush();

        drop(pending);
        assert_eq!(empty.stats().child_added, 1);
        drop(copy);
        assert_eq!(empty.stats().total, 0);

        drop(empty);
        assert!(weak.upgrade().is_none());
        db.reference("empty/a").unwrap().set(1).wait().unwrap();
    }

    #[test]
    fn forced_error_goes_to_error_callbacks() {
        let db = db(json!({"a": {".error": "Boom!"}}));
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        db.reference("a/b").unwrap().on_with_error(
            EventType::Value,
            |_, _| panic!("no value expected"),
            move |error| e.borrow_mut().push(error.to_string()),
        );
        db.flush();
        assert_eq!(*errors.borrow(), vec!["Boom!"]);

        let err = db.reference("a").unwrap().get().wait().unwrap_err();
        assert_eq!(err.code(), "unknown/code");
    }

    #[test]
    fn injected_error_suppresses_live_events() {
        let db = db(json!({"a": {"x": 1}}));
        let errors = Rc::new(RefCell::new(0));
        let e = errors.clone();
        let a = db.reference("a").unwrap();
        a.on_with_error(EventType::ChildAdded, |_, _| {}, move |_| *e.borrow_mut() += 1);
        db.flush();

        db.inject("a/.error", json!("Boom!"));
        assert_eq!(*errors.borrow(), 1);
    }

    #[test]
    fn limit_window_migration() {
        let db = db(json!({"l": {"a": 1, "b": 2, "c": 3}}));
        let log: Log = Rc::default();
        let q = db.reference("l").unwrap().limit_to_first(2).unwrap();
        q.on(EventType::ChildAdded, recorder(&log, "added"));
        q.on(EventType::ChildRemoved, recorder(&log, "removed"));
        db.flush();
        assert_eq!(*log.borrow(), vec!["added a 1 prev=-", "added b 2 prev=a"]);
        log.borrow_mut().clear();

        db.reference("l/a").unwrap().remove().wait().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["removed a 1 prev=-", "added c 3 prev=b"]
        );
    }

    #[test]
    fn last_window_follows_child_ordering() {
        let db = db(json!({"l": {"a": {"s": 1}, "b": {"s": 2}, "c": {"s": 3}}}));
        let log: Log = Rc::default();
        let q = db
            .reference("l")
            .unwrap()
            .order_by_child("s")
            .unwrap()
            .limit_to_last(2)
            .unwrap();
        q.on(EventType::ChildAdded, recorder(&log, "added"));
        q.on(EventType::ChildChanged, recorder(&log, "changed"));
        q.on(EventType::ChildRemoved, recorder(&log, "removed"));
        db.flush();
        log.borrow_mut().clear();

        db.reference("l/a/s").unwrap().set(9).wait().unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                r#"removed b {"s":2} prev=-"#,
                r#"changed a {"s":9} prev=c"#,
                r#"added a {"s":9} prev=c"#,
            ]
        );
        log.borrow_mut().clear();

        db.reference("l/c").unwrap().remove().wait().unwrap();
        assert_eq!(
            *log.borrow(),
            vec![r#"removed c {"s":3} prev=-"#, r#"added b {"s":2} prev=-"#]
        );
    }

    #[test]
    fn limit_window_evicts_on_insert() {
        let db = db(json!({"l": {"b": 2, "c": 3}}));
        let log: Log = Rc::default();
        let q = db.reference("l").unwrap().limit_to_first(2).unwrap();
        q.on(EventType::ChildAdded, recorder(&log, "added"));
        q.on(EventType::ChildRemoved, recorder(&log, "removed"));
        db.flush();
        log.borrow_mut().clear();

        db.reference("l/a").unwrap().set(1).wait().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["removed c 3 prev=-", "added a 1 prev=-"]
        );
    }

    #[test]
    fn child_events_outside_the_query_are_dropped() {
        let db = db(json!({"l": {"a": 1, "b": 2}}));
        let log: Log = Rc::default();
        let q = db.reference("l").unwrap().start_at("b").unwrap();
        q.on(EventType::ChildChanged, recorder(&log, "changed"));
        db.flush();

        db.reference("l/a").unwrap().set(10).wait().unwrap();
        assert!(log.borrow().is_empty());
        db.reference("l/b").unwrap().set(20).wait().unwrap();
        assert_eq!(*log.borrow(), vec!["changed b 20 prev=-"]);
    }

    #[test]
    fn queried_value_events_are_filtered() {
        let db = db(json!({"l": {"a": 1, "b": 2, "c": 3}}));
        let q = db.reference("l").unwrap().order_by_key().unwrap().start_at("b").unwrap();
        let snapshot = q.get().wait().unwrap();
        assert_eq!(snapshot.val(), json!({"b": 2, "c": 3}));
        assert_eq!(snapshot.num_children(), 2);
    }

    #[test]
    fn builders_and_equality() {
        let db = db(json!({}));
        let r = db.reference("l").unwrap();
        let q1 = r.order_by_child("score").unwrap().limit_to_last(2).unwrap();
        let q2 = r.order_by_child("score").unwrap().limit_to_last(2).unwrap();
        assert!(q1.is_equal(&q2));
        assert!(!q1.is_equal(&r));
        assert!(r.is_equal(&q1.reference()));
        assert!(q1.order_by_value().is_err());
        assert_eq!(r.order_by_priority().unwrap_err().code(), "mock/unsupported");
    }

    #[test]
    fn unsupported_operations() {
        let db = db(json!({}));
        let r = db.reference("a").unwrap();
        assert!(r.set_priority(1).is_err());
        assert!(r.set_with_priority(1, 2).is_err());
        assert_eq!(r.on_disconnect().unwrap_err().code(), "mock/unsupported");
    }

    #[test]
    fn listening_refs_are_released_after_off() {
        let db = db(json!({}));
        let a = db.reference("a").unwrap();
        let weak = Rc::downgrade(&a.core);
        a.on(EventType::Value, |_, _| {});
        db.flush();
        a.off(None, None);
        drop(a);
        assert!(weak.upgrade().is_none());
    }
}
