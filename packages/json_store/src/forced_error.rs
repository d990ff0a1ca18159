//! Errors stored as data.
//!
//! A `.error` entry on a node, or on any of its ancestors, makes every
//! access to that node fail. Fixtures use it to simulate permission and
//! availability failures.

use mockbase_core::{Error, Node, Path};

use crate::value_utils;

/// The reserved key holding a forced error.
pub const ERROR_KEY: &str = ".error";

const UNKNOWN_CODE: &str = "unknown/code";
const UNKNOWN_MESSAGE: &str = "Unknown message.";

/// Find the forced error that applies to `path`, checking the root first
/// and then every prefix of the path.
pub fn find_error(tree: &Node, path: &Path) -> Option<Error> {
    std::iter::once(Path::root())
        .chain(path.prefixes())
        .find_map(|prefix| value_utils::get(tree, &prefix.push(ERROR_KEY)).and_then(to_error))
}

fn to_error(value: &Node) -> Option<Error> {
    match value {
        Node::Null => None,
        Node::String(message) => Some(Error::Forced {
            code: UNKNOWN_CODE.to_string(),
            message: message.clone(),
        }),
        other => {
            let field = |name: &str| {
                other
                    .get_child(name)
                    .and_then(Node::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };
            Some(Error::Forced {
                code: field("code").unwrap_or_else(|| UNKNOWN_CODE.to_string()),
                message: field("message").unwrap_or_else(|| UNKNOWN_MESSAGE.to_string()),
            })
        }
    }
}
