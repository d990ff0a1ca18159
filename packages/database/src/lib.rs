//! In-memory realtime tree database
//!
//! - `Database`: content container, reference factory and change broadcast
//! - `Reference` / `Query`: locations, query constraints, writes and listeners
//! - `DataSnapshot`: immutable view of one location at one moment
//! - `QuerySpec`: ordering, range and limit evaluation
//!
//! Writes and listener deliveries are deferred onto the database's
//! [`Scheduler`] and run when it is flushed.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use mockbase_core::Scheduler;
//! use mockbase_database::{Database, EventType};
//! use serde_json::json;
//!
//! let db = Database::new("https://mock.example.com", json!({}), &Scheduler::new());
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let users = db.reference("users").unwrap();
//! users.on(EventType::ChildAdded, move |snapshot, _| {
//!     sink.borrow_mut().push(snapshot.key().unwrap_or_default().to_string());
//! });
//!
//! users.child("ada").unwrap().set(json!({"age": 36})).wait().unwrap();
//! assert_eq!(*seen.borrow(), vec!["ada"]);
//! ```

mod database;
mod events;
mod query;
mod reference;
mod snapshot;
mod validation;

pub use database::Database;
pub use events::{diff, diff_nodes, ChangeSet, EventType, Listener, RefStats};
pub use query::{Bound, Limit, OrderBy, QuerySpec};
pub use reference::{Query, Reference, ThenableReference, TransactionResult};
pub use snapshot::DataSnapshot;
pub use validation::{parse_ref_path, strip_origin};

pub use mockbase_core::{Completion, Error, Node, Path, Scheduler};
