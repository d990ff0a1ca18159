//! Error taxonomy shared by every mockbase crate.

/// Errors raised by the mock stores.
///
/// Every variant carries a `domain/reason` code (see [`Error::code`]) next to
/// its human readable message, mirroring the errors a real backend reports.
/// Errors are plain data so they can be cloned into every pending completion
/// and error callback that observes them.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A path contains characters the store does not accept.
    #[error("Illegal characters in path: {path}")]
    IllegalPath { path: String },

    /// A document or collection path is malformed or has the wrong parity.
    #[error("Invalid document or collection path: {path}")]
    InvalidPath { path: String },

    /// A key inside written data contains an illegal character.
    #[error("{subject} ('{key}') contains illegal character.")]
    IllegalKey { subject: String, key: String },

    /// A query constraint contradicts one that is already set.
    #[error("{message}")]
    Query { message: String },

    /// The operation exists on the real client but not on the mock.
    #[error("{message}")]
    Unsupported { message: String },

    /// A failure forced by a reserved `.error` entry in the content.
    #[error("{message}")]
    Forced { code: String, message: String },

    /// App registry failures.
    #[error("{message}")]
    App { code: String, message: String },

    /// A document update targeted a document with no data.
    #[error("No document to update: {path}")]
    NotFound { path: String },

    /// A value could not be converted to or from the content tree.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Options could not be loaded.
    #[error("config error: {message}")]
    Config { message: String },

    /// A completion was waited on but nothing settled it.
    #[error("completion was never settled")]
    Unsettled,
}

impl Error {
    /// The `domain/reason` code of this error.
    pub fn code(&self) -> &str {
        match self {
            Error::IllegalPath { .. } => "database/illegal-path",
            Error::InvalidPath { .. } => "firestore/invalid-argument",
            Error::IllegalKey { .. } => "database/illegal-key",
            Error::Query { .. } => "database/query",
            Error::Unsupported { .. } => "mock/unsupported",
            Error::Forced { code, .. } => code,
            Error::App { code, .. } => code,
            Error::NotFound { .. } => "firestore/not-found",
            Error::Serialization { .. } => "mock/serialization",
            Error::Config { .. } => "mock/config",
            Error::Unsettled => "mock/unsettled",
        }
    }

    pub fn illegal_path(path: impl Into<String>) -> Self {
        Error::IllegalPath { path: path.into() }
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Error::InvalidPath { path: path.into() }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Error::Query {
            message: message.into(),
        }
    }

    /// An unsupported-operation error naming the operation.
    pub fn unsupported(operation: &str) -> Self {
        Error::Unsupported {
            message: format!("{} is not supported.", operation),
        }
    }

    pub fn app(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::App {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            message: e.to_string(),
        }
    }
}
