//! Document and collection paths.
//!
//! Collection paths have an odd number of segments, document paths an even
//! number. In the content tree the sub-collections of a document live under
//! its `collections` key and its fields under `data`, so `a/b/c/d` is stored
//! at `a/b/collections/c/d`.

use lazy_static::lazy_static;
use mockbase_core::{Error, Path};
use regex::Regex;

pub(crate) const COLLECTIONS_KEY: &str = "collections";
pub(crate) const DATA_KEY: &str = "data";

lazy_static! {
    /// `.`, `..` and `__reserved__` segments.
    static ref ILLEGAL_SEGMENT: Regex = Regex::new(r"^(\.{1,2}|__.*__)$").unwrap();
}

/// Split and validate a slash-delimited path.
pub fn parse_segments(raw: &str) -> Result<Path, Error> {
    let path = Path::parse(raw.trim());
    if path.iter().any(|segment| ILLEGAL_SEGMENT.is_match(segment)) {
        return Err(Error::invalid_path(raw));
    }
    Ok(path)
}

/// Parse a collection path: an odd number of segments.
pub fn collection_path(raw: &str) -> Result<Path, Error> {
    let path = parse_segments(raw)?;
    if path.len() % 2 == 1 {
        Ok(path)
    } else {
        Err(Error::invalid_path(raw))
    }
}

/// Parse a document path: a non-zero even number of segments.
pub fn document_path(raw: &str) -> Result<Path, Error> {
    let path = parse_segments(raw)?;
    if !path.is_empty() && path.len() % 2 == 0 {
        Ok(path)
    } else {
        Err(Error::invalid_path(raw))
    }
}

/// Where a document or collection lives in the content tree.
pub fn to_json_path(path: &Path) -> Path {
    let mut components = Vec::with_capacity(path.len() * 3 / 2);
    for (i, segment) in path.iter().enumerate() {
        if i >= 2 && i % 2 == 0 {
            components.push(COLLECTIONS_KEY.to_string());
        }
        components.push(segment.clone());
    }
    Path { components }
}

/// Where the fields of a document live in the content tree.
pub fn data_path(document: &Path) -> Path {
    to_json_path(document).push(DATA_KEY)
}
