//! Document references and writes.

use std::fmt;
use std::rc::Rc;

use mockbase_core::{Completion, Error, Node, Path};
use mockbase_json_store::find_error;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::collection::CollectionReference;
use crate::firestore::{FirestoreState, ListenerRegistration};
use crate::paths;
use crate::snapshot::DocumentSnapshot;

/// A field value in an [`UpdateData`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Value(Node),
    /// Remove the field.
    Delete,
}

macro_rules! field_value_from {
    ($($source:ty),*) => {
        $(
            impl From<$source> for FieldValue {
                fn from(value: $source) -> Self {
                    FieldValue::Value(Node::from(value))
                }
            }
        )*
    };
}

field_value_from!(Node, JsonValue, bool, i32, i64, f64, &str, String);

/// Field writes keyed by dotted field paths.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateData {
    fields: Vec<(Path, FieldValue)>,
}

impl UpdateData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `field` (dotted path) to `value`.
    pub fn field(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((Path::parse_field(field), value.into()));
        self
    }

    /// Remove `field` (dotted path).
    pub fn delete(self, field: &str) -> Self {
        self.field(field, FieldValue::Delete)
    }

    /// Every top-level key of a serializable map becomes a field.
    pub fn from_value<V: Serialize>(value: &V) -> Result<Self, Error> {
        let node = Node::from_serialize(value)?;
        let Some(map) = node.as_map() else {
            return Err(document_data_error());
        };
        Ok(map
            .iter()
            .fold(Self::new(), |data, (key, value)| data.field(key, value.clone())))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Options for [`DocumentReference::set_with_options`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge the given fields into existing data instead of replacing it.
    pub merge: bool,
}

fn document_data_error() -> Error {
    Error::Serialization {
        message: "document data must be an object".to_string(),
    }
}

/// A single document location.
#[derive(Clone)]
pub struct DocumentReference {
    state: Rc<FirestoreState>,
    path: Path,
    json_path: Path,
}

impl DocumentReference {
    pub(crate) fn new(state: &Rc<FirestoreState>, path: Path) -> Self {
        let json_path = paths::to_json_path(&path);
        Self {
            state: state.clone(),
            path,
            json_path,
        }
    }

    pub fn id(&self) -> &str {
        self.path.key().unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn data_path(&self) -> Path {
        paths::data_path(&self.path)
    }

    pub fn parent(&self) -> CollectionReference {
        CollectionReference::new(&self.state, self.path.parent().unwrap_or_default())
    }

    /// A sub-collection at a path relative to this document.
    pub fn collection(&self, path: &str) -> Result<CollectionReference, Error> {
        let full = format!("{}/{}", self.path, path);
        Ok(CollectionReference::new(
            &self.state,
            paths::collection_path(&full)?,
        ))
    }

    pub fn is_equal(&self, other: &DocumentReference) -> bool {
        Rc::ptr_eq(&self.state, &other.state) && self.path == other.path
    }

    pub(crate) fn snapshot(&self, content: &Node) -> Result<DocumentSnapshot, Error> {
        match find_error(content, &self.json_path) {
            Some(error) => Err(error),
            None => Ok(DocumentSnapshot::new(content.clone(), self.clone())),
        }
    }

    /// The document, read when the scheduler runs.
    pub fn get(&self) -> Completion<DocumentSnapshot> {
        let completion = Completion::new(&self.state.scheduler);
        let (document, target) = (self.clone(), completion.clone());
        self.state.scheduler.schedule(move || {
            target.settle(document.snapshot(&document.state.content()));
        });
        completion
    }

    /// Run `apply` as a deferred task after checking forced errors.
    fn write(
        &self,
        apply: impl FnOnce(&DocumentReference) -> Result<(), Error> + 'static,
    ) -> Completion<()> {
        let completion = Completion::new(&self.state.scheduler);
        let (document, target) = (self.clone(), completion.clone());
        self.state.scheduler.schedule(move || {
            let result = document
                .state
                .check(&document.json_path)
                .and_then(|_| apply(&document));
            target.settle(result);
        });
        completion
    }

    /// Replace the document's data.
    pub fn set<V: Serialize>(&self, data: V) -> Completion<()> {
        self.set_with_options(data, SetOptions::default())
    }

    /// Write the document's data, replacing it or merging into it.
    pub fn set_with_options<V: Serialize>(&self, data: V, options: SetOptions) -> Completion<()> {
        let node = match Node::from_serialize(&data) {
            Ok(node) if node.is_map() => node,
            Ok(_) => return Completion::settled(&self.state.scheduler, Err(document_data_error())),
            Err(error) => return Completion::settled(&self.state.scheduler, Err(error)),
        };
        self.write(move |document| {
            let data_path = document.data_path();
            if options.merge {
                let fields = node.as_map().into_iter().flatten();
                let update = fields.fold(UpdateData::new(), |update, (key, value)| {
                    update.field(key, value.clone())
                });
                document.merge(update)
            } else {
                log::debug!("set document {}", document.path);
                document
                    .state
                    .commit(|store| store.write(&data_path, node));
                Ok(())
            }
        })
    }

    /// Write individual fields. Fails when the document has no data.
    pub fn update(&self, data: UpdateData) -> Completion<()> {
        self.write(move |document| {
            if !document.state.content_has(&document.data_path()) {
                return Err(Error::NotFound {
                    path: document.path.to_string(),
                });
            }
            document.merge(data)
        })
    }

    fn merge(&self, data: UpdateData) -> Result<(), Error> {
        let data_path = self.data_path();
        let targets: Vec<(Path, FieldValue)> = data
            .fields
            .into_iter()
            .map(|(field, value)| (data_path.join(&field), value))
            .collect();
        for (target, _) in &targets {
            self.state.check(target)?;
        }

        log::debug!("update document {} ({} field(s))", self.path, targets.len());
        self.state.commit(|store| {
            let previous = store.root().clone();
            for (target, value) in targets {
                match value {
                    FieldValue::Value(node) => {
                        store.write(&target, node);
                    }
                    FieldValue::Delete => {
                        store.delete(&target);
                    }
                }
            }
            previous
        });
        Ok(())
    }

    /// Remove the document's data. Sub-collections are kept.
    pub fn delete(&self) -> Completion<()> {
        self.write(|document| {
            log::debug!("delete document {}", document.path);
            let data_path = document.data_path();
            document.state.commit(|store| store.delete(&data_path));
            Ok(())
        })
    }

    /// Deliver a snapshot now (deferred) and after every change to the
    /// document's data.
    pub fn on_snapshot<F, E>(&self, next: F, error: E) -> ListenerRegistration
    where
        F: Fn(DocumentSnapshot) + 'static,
        E: Fn(Error) + 'static,
    {
        let document = self.clone();
        self.state.watch(
            self.data_path(),
            Rc::new(move |content: &Node| match document.snapshot(content) {
                Ok(snapshot) => next(snapshot),
                Err(e) => {
                    log::warn!("snapshot of {} suppressed: {}", document.path, e);
                    error(e)
                }
            }),
        )
    }
}

impl fmt::Debug for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentReference")
            .field("path", &self.path)
            .finish()
    }
}
