//! The app registry.

use std::cell::RefCell;
use std::rc::Rc;

use mockbase_core::Error;
use mockbase_database::Database;
use mockbase_firestore::Firestore;

use crate::app::{App, Registry};
use crate::options::{AppSettings, MockOptions};

pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

/// Creates and tracks apps seeded from [`MockOptions`].
#[derive(Debug, Default)]
pub struct Mock {
    options: MockOptions,
    apps: Registry,
}

impl Mock {
    pub fn new(options: MockOptions) -> Self {
        Self {
            options,
            apps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn options(&self) -> &MockOptions {
        &self.options
    }

    /// Create an app. `None` names the default app.
    pub fn initialize_app(&self, settings: AppSettings, name: Option<&str>) -> Result<App, Error> {
        let name = name.unwrap_or(DEFAULT_APP_NAME);
        if self.apps.borrow().iter().any(|app| app.name() == name) {
            return Err(Error::app(
                "app/name-already-in-use",
                "App name already exists.",
            ));
        }
        let app = App::new(name, settings, self.options.seed_for(name), &self.apps);
        self.apps.borrow_mut().push(app.clone());
        Ok(app)
    }

    /// The app called `name`, or the default app.
    pub fn app(&self, name: Option<&str>) -> Result<App, Error> {
        let name = name.unwrap_or(DEFAULT_APP_NAME);
        self.apps
            .borrow()
            .iter()
            .find(|app| app.name() == name)
            .cloned()
            .ok_or_else(|| Error::app("app/invalid-name", "App not found."))
    }

    /// Every live app, in creation order.
    pub fn apps(&self) -> Vec<App> {
        self.apps.borrow().clone()
    }

    /// The database of `app`, or of the default app.
    pub fn database(&self, app: Option<&App>) -> Result<Database, Error> {
        match app {
            Some(app) => Ok(app.database()),
            None => Ok(self.app(None)?.database()),
        }
    }

    /// The collection store of `app`, or of the default app.
    pub fn firestore(&self, app: Option<&App>) -> Result<Firestore, Error> {
        match app {
            Some(app) => Ok(app.firestore()),
            None => Ok(self.app(None)?.firestore()),
        }
    }

    pub fn sdk_version(&self) -> &'static str {
        "mock"
    }
}
