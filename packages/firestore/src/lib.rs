//! In-memory document and collection store
//!
//! - `Firestore`: container and path entry points
//! - `CollectionReference` / `Query`: filters, ordering, cursors, limits
//! - `DocumentReference`: document reads and writes
//! - `DocumentSnapshot` / `QuerySnapshot`: immutable views
//!
//! Documents live in the content tree as
//! `{collection: {id: {"data": {...}, "collections": {...}}}}`. Writes and
//! snapshot deliveries are deferred onto the store's [`Scheduler`].
//!
//! # Example
//!
//! ```rust
//! use mockbase_core::Scheduler;
//! use mockbase_firestore::{Direction, Firestore, WhereOp};
//! use serde_json::json;
//!
//! let firestore = Firestore::new(
//!     json!({"users": {
//!         "ada": {"data": {"age": 36}},
//!         "bob": {"data": {"age": 30}}
//!     }}),
//!     &Scheduler::new(),
//! );
//! let adults = firestore
//!     .collection("users").unwrap()
//!     .where_field("age", WhereOp::Greater, 32i64).unwrap()
//!     .order_by("age", Direction::Desc).unwrap();
//!
//! let snapshot = adults.get().wait().unwrap();
//! assert_eq!(snapshot.docs()[0].id(), "ada");
//! ```

mod collection;
mod document;
mod firestore;
mod paths;
mod query;
mod snapshot;

pub use collection::{CollectionReference, Query};
pub use document::{DocumentReference, FieldValue, SetOptions, UpdateData};
pub use firestore::{Firestore, ListenerRegistration};
pub use paths::{collection_path, document_path, to_json_path};
pub use query::{Cursor, Direction, Filter, Limit, QueryConstraints, WhereOp};
pub use snapshot::{DocumentSnapshot, QuerySnapshot, SnapshotMetadata};

pub use mockbase_core::{Completion, Error, Node, Path, Scheduler};
