//! Slash-delimited paths into the content tree.

use std::fmt;

/// A normalized path into a content tree.
///
/// Components may hold any text. Which characters are legal depends on the
/// store receiving the path, so validation lives with the stores.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub components: Vec<String>,
}

fn split_on(s: &str, separators: &[char]) -> Vec<String> {
    s.split(separators)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

impl Path {
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a `/`-separated path. Empty components are dropped, so
    /// `"/a//b/"` and `"a/b"` are the same path.
    ///
    /// ```rust
    /// use mockbase_core::Path;
    ///
    /// assert_eq!(Path::parse("/users//ada/"), Path::parse("users/ada"));
    /// assert_eq!(Path::parse("users/ada").len(), 2);
    /// ```
    pub fn parse(s: &str) -> Self {
        Path {
            components: split_on(s, &['/']),
        }
    }

    /// Parse a document field path, where `.` also separates components.
    pub fn parse_field(s: &str) -> Self {
        Path {
            components: split_on(s, &['/', '.']),
        }
    }

    /// True at the root.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// The last component, `None` at the root.
    pub fn key(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    /// `None` at the root.
    pub fn parent(&self) -> Option<Path> {
        let (_, init) = self.components.split_last()?;
        Some(Path {
            components: init.to_vec(),
        })
    }

    #[must_use]
    pub fn join(&self, other: &Path) -> Path {
        Path {
            components: self
                .components
                .iter()
                .chain(&other.components)
                .cloned()
                .collect(),
        }
    }

    /// This path extended by a relative path string.
    #[must_use]
    pub fn child(&self, relative: &str) -> Path {
        self.join(&Path::parse(relative))
    }

    /// This path extended by one component, taken verbatim even if it
    /// contains `/`.
    #[must_use]
    pub fn push(&self, component: &str) -> Path {
        let mut pushed = self.clone();
        pushed.components.push(component.to_string());
        pushed
    }

    /// `a`, `a/b`, `a/b/c` for `a/b/c`. The root is not included.
    pub fn prefixes(&self) -> impl Iterator<Item = Path> + '_ {
        (1..=self.len()).map(move |end| Path {
            components: self.components[..end].to_vec(),
        })
    }

    /// JSON-pointer form: `""` at the root, `/a/b` otherwise.
    pub fn to_pointer(&self) -> String {
        self.components
            .iter()
            .fold(String::new(), |pointer, c| pointer + "/" + c)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("/"))
    }
}

/// Shorthand for [`Path::parse`].
///
/// ```rust
/// use mockbase_core::path;
///
/// assert_eq!(path!("users/ada").key(), Some("ada"));
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s)
    };
}
