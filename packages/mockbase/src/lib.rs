//! An in-memory stand-in for a realtime database and a document store.
//!
//! A [`Mock`] creates named [`App`]s. Each app owns one [`Database`] and one
//! [`Firestore`], seeded from [`MockOptions`] and driven by one shared
//! [`Scheduler`]: writes and listener deliveries are deferred until the
//! scheduler is flushed, either explicitly or by waiting on a
//! [`Completion`].
//!
//! ```rust
//! use mockbase::{AppSettings, EventType, Mock, MockOptions};
//! use serde_json::json;
//!
//! let options = MockOptions::from_json_str(r#"{"database": {"content": {"a": 1}}}"#).unwrap();
//! let mock = Mock::new(options);
//! let app = mock.initialize_app(AppSettings::default(), None).unwrap();
//!
//! let a = app.database().reference("a").unwrap();
//! assert_eq!(a.once(EventType::Value).wait().unwrap().val(), json!(1));
//! ```

mod app;
mod mock;
mod options;

pub use app::{App, DEFAULT_DATABASE_URL};
pub use mock::{Mock, DEFAULT_APP_NAME};
pub use options::{AppOptions, AppSettings, ContentOptions, MockOptions};

pub use mockbase_core::{Completion, Error, KeyGenerator, Node, Path, PushKeys, Scheduler};
pub use mockbase_database::{
    DataSnapshot, Database, EventType, Listener, Query, Reference, ThenableReference,
    TransactionResult,
};
pub use mockbase_firestore::{
    CollectionReference, Direction, DocumentReference, DocumentSnapshot, FieldValue, Firestore,
    ListenerRegistration, QuerySnapshot, SetOptions, UpdateData, WhereOp,
};
