//! Path and key validation.

use lazy_static::lazy_static;
use mockbase_core::{Error, Node, Path};
use regex::Regex;

/// First path segment exempt from path validation.
pub const INFO_SEGMENT: &str = ".info";

lazy_static! {
    static ref ILLEGAL_PATH_CHARS: Regex = Regex::new(r"[.$\[\]#]").unwrap();
    static ref ILLEGAL_KEY_CHARS: Regex = Regex::new(r"[/.$\[\]#]").unwrap();
    static ref URL_ORIGIN: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/]*").unwrap();
}

/// Parse a reference path, rejecting `. $ [ ] #` outside `.info`.
pub fn parse_ref_path(raw: &str) -> Result<Path, Error> {
    let path = Path::parse(raw.trim());
    if path.components.first().map(String::as_str) == Some(INFO_SEGMENT) {
        return Ok(path);
    }
    if path.iter().any(|c| ILLEGAL_PATH_CHARS.is_match(c)) {
        return Err(Error::illegal_path(path.to_string()));
    }
    Ok(path)
}

/// Drop a leading `scheme://host` from a URL.
pub fn strip_origin(url: &str) -> &str {
    match URL_ORIGIN.find(url.trim()) {
        Some(origin) => &url.trim()[origin.end()..],
        None => url.trim(),
    }
}

/// Keys of a value written with `set`: `/ . $ [ ] #` are illegal at any depth.
pub fn validate_set_keys(value: &Node) -> Result<(), Error> {
    walk_keys(value, &|key| {
        if ILLEGAL_KEY_CHARS.is_match(key) {
            Err(illegal_key("Key", key))
        } else {
            Ok(())
        }
    })
}

/// Keys of an `update`: `. $ [ ] #` are illegal at any depth, `/` is not.
///
/// Top-level keys are relative paths. A nested key holding `/` is stored
/// as a single literal key.
pub fn validate_update_keys(fields: &Node) -> Result<(), Error> {
    walk_keys(fields, &|key| {
        if ILLEGAL_PATH_CHARS.is_match(key) {
            Err(illegal_key("Key/path", key))
        } else {
            Ok(())
        }
    })
}

fn walk_keys(value: &Node, check: &dyn Fn(&str) -> Result<(), Error>) -> Result<(), Error> {
    if let Some(map) = value.as_map() {
        for (key, child) in map.iter() {
            check(key)?;
            walk_keys(child, check)?;
        }
    } else if value.is_array() {
        for (_, child) in value.children() {
            walk_keys(&child, check)?;
        }
    }
    Ok(())
}

fn illegal_key(subject: &str, key: &str) -> Error {
    Error::IllegalKey {
        subject: subject.to_string(),
        key: key.to_string(),
    }
}
