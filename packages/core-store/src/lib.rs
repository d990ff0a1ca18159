//! Core mockbase: the shared vocabulary of every store
//!
//! - `Path`: slash-delimited address into a content tree
//! - `Node`: persistent value tree with structural sharing
//! - `Error`: error taxonomy with `domain/reason` codes
//! - `PathTrie`: prefix trie keyed by path components
//! - `Scheduler` and `Completion`: deferred execution and its outcomes
//! - `KeyGenerator`: chronologically ordered push keys
//!
//! # Example
//!
//! ```rust
//! use mockbase_core::{path, Node};
//!
//! let tree = Node::from(serde_json::json!({"users": {"ada": {"age": 36}}}));
//! let users = tree.get_child("users").unwrap();
//! assert_eq!(users.child_keys(), vec!["ada"]);
//! assert_eq!(path!("users/ada").to_pointer(), "/users/ada");
//! ```

mod completion;
mod error;
mod key;
mod path;
mod path_trie;
mod scheduler;
mod value;

pub use completion::{Completion, WeakCompletion};
pub use error::Error;
pub use key::{KeyGenerator, PushKeys};
pub use path::Path;
pub use path_trie::PathTrie;
pub use scheduler::Scheduler;
pub use value::Node;
