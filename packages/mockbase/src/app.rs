//! Apps: one database and one collection store sharing a scheduler.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use mockbase_core::{Error, Scheduler};
use mockbase_database::Database;
use mockbase_firestore::Firestore;
use serde_json::Value as JsonValue;

use crate::options::{AppOptions, AppSettings};

/// Used when `AppSettings::database_url` is not given.
pub const DEFAULT_DATABASE_URL: &str = "https://mockbase.firebaseio.com";

pub(crate) type Registry = Rc<RefCell<Vec<App>>>;

struct AppInner {
    name: String,
    settings: AppSettings,
    identities: Vec<JsonValue>,
    scheduler: Scheduler,
    database: Database,
    firestore: Firestore,
    registry: Weak<RefCell<Vec<App>>>,
}

/// A named app. Cloning yields another handle to the same app.
#[derive(Clone)]
pub struct App {
    inner: Rc<AppInner>,
}

impl App {
    pub(crate) fn new(
        name: &str,
        settings: AppSettings,
        seed: AppOptions,
        registry: &Registry,
    ) -> Self {
        let scheduler = Scheduler::new();
        let url = settings
            .database_url
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let database_content = seed.database.map(|d| d.content).unwrap_or_default();
        let firestore_content = seed.firestore.map(|f| f.content).unwrap_or_default();

        log::debug!("initializing app {:?}", name);
        Self {
            inner: Rc::new(AppInner {
                name: name.to_string(),
                settings,
                identities: seed.identities.unwrap_or_default(),
                database: Database::new(url, database_content, &scheduler),
                firestore: Firestore::new(firestore_content, &scheduler),
                scheduler,
                registry: Rc::downgrade(registry),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn settings(&self) -> &AppSettings {
        &self.inner.settings
    }

    /// The identities this app was seeded with, uninterpreted.
    pub fn identities(&self) -> &[JsonValue] {
        &self.inner.identities
    }

    pub fn database(&self) -> Database {
        self.inner.database.clone()
    }

    pub fn firestore(&self) -> Firestore {
        self.inner.firestore.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Run every deferred write and delivery of both stores.
    pub fn flush(&self) {
        self.inner.scheduler.flush();
    }

    pub fn is_same(&self, other: &App) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Remove this app from its registry so its name can be reused.
    pub fn delete(&self) -> Result<(), Error> {
        let removed = self.inner.registry.upgrade().is_some_and(|registry| {
            let mut apps = registry.borrow_mut();
            let before = apps.len();
            apps.retain(|app| !app.is_same(self));
            apps.len() < before
        });
        if !removed {
            return Err(Error::app(
                "app/app-deleted",
                format!("App {} has already been deleted.", self.inner.name),
            ));
        }
        log::debug!("deleted app {:?}", self.inner.name);
        Ok(())
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.name)
            .field("settings", &self.inner.settings)
            .finish()
    }
}
