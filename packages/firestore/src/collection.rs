//! Collection references and queries.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use mockbase_core::{Completion, Error, Node, Path};
use mockbase_json_store::{find_error, value_utils};
use serde::Serialize;

use crate::document::DocumentReference;
use crate::firestore::{FirestoreState, ListenerRegistration};
use crate::paths;
use crate::query::{Direction, Limit, QueryConstraints, WhereOp};
use crate::snapshot::QuerySnapshot;

/// The documents of one collection that satisfy a set of constraints.
#[derive(Clone)]
pub struct Query {
    pub(crate) state: Rc<FirestoreState>,
    pub(crate) path: Path,
    pub(crate) json_path: Path,
    pub(crate) constraints: QueryConstraints,
}

impl Query {
    fn with(&self, constraints: QueryConstraints) -> Query {
        Query {
            constraints,
            ..self.clone()
        }
    }

    pub fn constraints(&self) -> &QueryConstraints {
        &self.constraints
    }

    /// Keep documents whose `field` satisfies `op` against `value`.
    ///
    /// `field` may be a dotted path into nested maps.
    pub fn where_field(
        &self,
        field: &str,
        op: WhereOp,
        value: impl Into<Node>,
    ) -> Result<Query, Error> {
        Ok(self.with(self.constraints.with_filter(field, op, value.into())?))
    }

    pub fn order_by(&self, field: &str, direction: Direction) -> Result<Query, Error> {
        Ok(self.with(self.constraints.with_order(field, direction)?))
    }

    pub fn limit(&self, limit: usize) -> Result<Query, Error> {
        Ok(self.with(self.constraints.with_limit(Limit::First(limit))?))
    }

    pub fn limit_to_last(&self, limit: usize) -> Result<Query, Error> {
        Ok(self.with(self.constraints.with_limit(Limit::Last(limit))?))
    }

    pub fn start_at<V: Into<Node>>(&self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(self.constraints.with_start(collect(values), true))
    }

    pub fn start_after<V: Into<Node>>(&self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(self.constraints.with_start(collect(values), false))
    }

    pub fn end_at<V: Into<Node>>(&self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(self.constraints.with_end(collect(values), true))
    }

    pub fn end_before<V: Into<Node>>(&self, values: impl IntoIterator<Item = V>) -> Query {
        self.with(self.constraints.with_end(collect(values), false))
    }

    /// Same store, same collection and same constraints.
    pub fn is_equal(&self, other: &Query) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
            && self.json_path == other.json_path
            && self.constraints == other.constraints
    }

    pub(crate) fn snapshot(&self, content: &Node) -> Result<QuerySnapshot, Error> {
        if let Some(error) = find_error(content, &self.json_path) {
            return Err(error);
        }
        let docs = match value_utils::get(content, &self.json_path) {
            Some(collection) => self.constraints.evaluate(collection),
            None => Vec::new(),
        };
        let docs = docs
            .into_iter()
            .map(|(id, _)| DocumentReference::new(&self.state, self.path.push(&id)))
            .collect();
        Ok(QuerySnapshot::new(content.clone(), self.clone(), docs))
    }

    /// The matching documents, read when the scheduler runs.
    pub fn get(&self) -> Completion<QuerySnapshot> {
        let completion = Completion::new(&self.state.scheduler);
        let (query, target) = (self.clone(), completion.clone());
        self.state.scheduler.schedule(move || {
            target.settle(query.snapshot(&query.state.content()));
        });
        completion
    }

    /// Deliver a snapshot now (deferred) and after every change to the
    /// collection.
    pub fn on_snapshot<F, E>(&self, next: F, error: E) -> ListenerRegistration
    where
        F: Fn(QuerySnapshot) + 'static,
        E: Fn(Error) + 'static,
    {
        let query = self.clone();
        self.state.watch(
            self.json_path.clone(),
            Rc::new(move |content: &Node| match query.snapshot(content) {
                Ok(snapshot) => next(snapshot),
                Err(e) => {
                    log::warn!("snapshot of {} suppressed: {}", query.path, e);
                    error(e)
                }
            }),
        )
    }
}

fn collect<V: Into<Node>>(values: impl IntoIterator<Item = V>) -> Vec<Node> {
    values.into_iter().map(Into::into).collect()
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("path", &self.path)
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// A collection: a query with no constraints that can create documents.
#[derive(Clone)]
pub struct CollectionReference {
    query: Query,
}

impl Deref for CollectionReference {
    type Target = Query;

    fn deref(&self) -> &Query {
        &self.query
    }
}

impl CollectionReference {
    pub(crate) fn new(state: &Rc<FirestoreState>, path: Path) -> Self {
        let json_path = paths::to_json_path(&path);
        Self {
            query: Query {
                state: state.clone(),
                path,
                json_path,
                constraints: QueryConstraints::default(),
            },
        }
    }

    pub fn id(&self) -> &str {
        self.query.path.key().unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.query.path
    }

    /// The owning document, `None` for root collections.
    pub fn parent(&self) -> Option<DocumentReference> {
        self.query
            .path
            .parent()
            .filter(|p| !p.is_empty())
            .map(|p| DocumentReference::new(&self.state, p))
    }

    /// The document at a path relative to this collection.
    pub fn doc(&self, path: &str) -> Result<DocumentReference, Error> {
        let full = format!("{}/{}", self.query.path, path);
        Ok(DocumentReference::new(&self.state, paths::document_path(&full)?))
    }

    /// A document with a generated id. Nothing is written.
    pub fn doc_auto(&self) -> DocumentReference {
        let id = self.state.next_key();
        DocumentReference::new(&self.state, self.query.path.push(&id))
    }

    /// Create a document with a generated id holding `data`.
    pub fn add<V: Serialize>(&self, data: V) -> Completion<DocumentReference> {
        let document = self.doc_auto();
        let created = document.clone();
        document.set(data).map(move |_| created)
    }

    pub fn as_query(&self) -> &Query {
        &self.query
    }
}

impl fmt::Debug for CollectionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionReference")
            .field("path", &self.query.path)
            .finish()
    }
}
