//! Path-addressed JSON store.
//!
//! - `value_utils`: pure copy-on-write reads and writes over `Node` trees
//! - `forced_error`: the `.error` convention for failures stored as data
//! - `InMemoryStore`: the mutable cell holding a store's current tree

pub mod forced_error;
pub mod in_memory;
pub mod value_utils;

pub use mockbase_core::{Node, Path};

pub use forced_error::find_error;
pub use in_memory::InMemoryStore;
