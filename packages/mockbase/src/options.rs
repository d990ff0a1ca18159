//! Initialization options.
//!
//! ```json
//! {
//!   "database": {"content": {"users": {"ada": {"age": 36}}}},
//!   "firestore": {"content": {"users": {"ada": {"data": {"age": 36}}}}},
//!   "identities": [{"email": "ada@example.com", "password": "secret"}],
//!   "apps": {"other": {"database": {"content": {}}}}
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path as FsPath;

use mockbase_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Initial content of one store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentOptions {
    pub content: JsonValue,
}

/// Seed data for one named app.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<ContentOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firestore: Option<ContentOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<JsonValue>>,
}

/// Seed data for every app a [`crate::Mock`] creates.
///
/// Apps named in `apps` take their seed from there; every other app uses
/// the top-level `database`, `firestore` and `identities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MockOptions {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub apps: BTreeMap<String, AppOptions>,
    pub database: ContentOptions,
    pub firestore: ContentOptions,
    /// Opaque; carried to the app untouched.
    pub identities: Vec<JsonValue>,
}

impl MockOptions {
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
        })
    }

    pub fn from_json_file(path: impl AsRef<FsPath>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json_str(&text)
    }

    /// The seed for the app called `name`.
    pub fn seed_for(&self, name: &str) -> AppOptions {
        match self.apps.get(name) {
            Some(app) => AppOptions {
                database: Some(app.database.clone().unwrap_or_default()),
                firestore: Some(app.firestore.clone().unwrap_or_default()),
                identities: Some(app.identities.clone().unwrap_or_default()),
            },
            None => AppOptions {
                database: Some(self.database.clone()),
                firestore: Some(self.firestore.clone()),
                identities: Some(self.identities.clone()),
            },
        }
    }
}

/// Settings passed to `initialize_app`. Only `database_url` is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
    #[serde(rename = "databaseURL", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,
}
