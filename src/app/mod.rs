//! App lifecycle.
//!
//! A [`Firebase`] value owns a registry of named [`FirebaseApp`]s. It is an ordinary value:
//! create one per process (or per test), clone it freely, and pass it to whatever needs to
//! initialize or look up apps. The registry lives as long as the last clone.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use firebase_kit::app::{Firebase, FirebaseOptions};
//! # fn run() -> Result<(), firebase_kit::app::AppError> {
//! let firebase = Firebase::new();
//! let app = firebase.initialize_app(FirebaseOptions {
//!     project_id: Some("my-project".to_string()),
//!     ..Default::default()
//! });
//!
//! assert_eq!(app.name(), "[DEFAULT]");
//! assert!(firebase.app()?.delete());
//! # Ok(())
//! # }
//! ```

pub mod options;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

pub use options::FirebaseOptions;

#[cfg(any(feature = "messaging", feature = "storage"))]
use crate::core::middleware::AuthMiddleware;
#[cfg(feature = "messaging")]
use crate::messaging::{token::MessagingState, FirebaseMessaging, MessagingError};
#[cfg(feature = "storage")]
use crate::storage::{location::StorageLocation, FirebaseStorage, StorageError};

/// Registry key of the app created without an explicit name.
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";


/// Errors raised by app lifecycle operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// An argument was blank or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// No app is registered under the requested name.
    #[error("FirebaseApp({0}) is not initialized")]
    NotInitialized(String),
    /// The app handle was deleted and can no longer create service clients.
    #[error("FirebaseApp({0}) was deleted")]
    Deleted(String),
    /// The options carry no project ID.
    #[error("Project ID is missing from the app options")]
    ProjectIdMissing,
    /// Options could not be found in the environment.
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

type AppList = Mutex<Vec<FirebaseApp>>;

/// Registry of initialized apps.
#[derive(Clone, Default)]
pub struct Firebase {
    apps: Arc<AppList>,
}

impl Firebase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the default app, or returns it if it already exists.
    ///
    /// When an app is already registered the existing record wins and `options` is ignored.
    pub fn initialize_app(&self, options: FirebaseOptions) -> FirebaseApp {
        self.get_or_insert(DEFAULT_APP_NAME, options)
    }

    /// Initializes an app under `name`, or returns the one already registered under it.
    pub fn initialize_app_with_name(
        &self,
        options: FirebaseOptions,
        name: &str,
    ) -> Result<FirebaseApp, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidArgument("app name must not be blank".to_string()));
        }
        Ok(self.get_or_insert(name, options))
    }

    /// Returns the default app, initializing it from `FIREBASE_CONFIG` when it does not exist yet.
    pub fn initialize_app_from_env(&self) -> Result<FirebaseApp, AppError> {
        if let Some(app) = self.find(DEFAULT_APP_NAME) {
            return Ok(app);
        }
        let options = FirebaseOptions::from_env()?;
        Ok(self.initialize_app(options))
    }

    /// Returns the default app.
    pub fn app(&self) -> Result<FirebaseApp, AppError> {
        self.app_named(DEFAULT_APP_NAME)
    }

    /// Returns the app registered under `name`.
    pub fn app_named(&self, name: &str) -> Result<FirebaseApp, AppError> {
        self.find(name)
            .ok_or_else(|| AppError::NotInitialized(name.to_string()))
    }

    /// Snapshot of every registered app, in initialization order.
    pub fn apps(&self) -> Vec<FirebaseApp> {
        self.apps.lock().clone()
    }

    fn find(&self, name: &str) -> Option<FirebaseApp> {
        self.apps.lock().iter().find(|app| app.name() == name).cloned()
    }

    fn get_or_insert(&self, name: &str, options: FirebaseOptions) -> FirebaseApp {
        let mut apps = self.apps.lock();

        if let Some(existing) = apps.iter().find(|app| app.name() == name) {
            if existing.options() != &options {
                warn!(app = name, "app already initialized with different options; keeping the existing ones");
            }
            return existing.clone();
        }

        let app = FirebaseApp::new(name.to_string(), options, Arc::downgrade(&self.apps));
        apps.push(app.clone());
        debug!(app = name, "initialized firebase app");
        app
    }
}

struct AppInner {
    name: String,
    options: FirebaseOptions,
    data_collection_default_enabled: Mutex<Option<bool>>,
    automatic_resource_management_enabled: AtomicBool,
    deleted: AtomicBool,
    registry: Weak<AppList>,
    #[cfg(feature = "messaging")]
    messaging: Arc<MessagingState>,
}

/// Handle to one configured Firebase project context.
///
/// Clones share the same record, so flags set through one handle are visible through all.
#[derive(Clone)]
pub struct FirebaseApp {
    inner: Arc<AppInner>,
}

impl FirebaseApp {
    fn new(name: String, options: FirebaseOptions, registry: Weak<AppList>) -> Self {
        Self {
            inner: Arc::new(AppInner {
                name,
                options,
                data_collection_default_enabled: Mutex::new(None),
                automatic_resource_management_enabled: AtomicBool::new(false),
                deleted: AtomicBool::new(false),
                registry,
                #[cfg(feature = "messaging")]
                messaging: Arc::new(MessagingState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &FirebaseOptions {
        &self.inner.options
    }

    /// `None` until a value is set explicitly.
    pub fn data_collection_default_enabled(&self) -> Option<bool> {
        *self.inner.data_collection_default_enabled.lock()
    }

    pub fn set_data_collection_default_enabled(&self, enabled: Option<bool>) {
        *self.inner.data_collection_default_enabled.lock() = enabled;
    }

    pub fn automatic_resource_management_enabled(&self) -> bool {
        self.inner
            .automatic_resource_management_enabled
            .load(Ordering::SeqCst)
    }

    pub fn set_automatic_resource_management_enabled(&self, enabled: bool) {
        self.inner
            .automatic_resource_management_enabled
            .store(enabled, Ordering::SeqCst);
    }

    /// Key under which per-app state may be persisted by the host.
    pub fn persistence_key(&self) -> String {
        format!("{}+{}", self.inner.name, self.inner.options.application_id)
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::SeqCst)
    }

    /// Removes the app from its registry.
    ///
    /// Returns `true` when this call removed the entry. The handle is unusable afterwards.
    pub fn delete(&self) -> bool {
        let removed = match self.inner.registry.upgrade() {
            Some(apps) => {
                let mut apps = apps.lock();
                let before = apps.len();
                apps.retain(|app| !Arc::ptr_eq(&app.inner, &self.inner));
                apps.len() != before
            }
            None => false,
        };
        self.inner.deleted.store(true, Ordering::SeqCst);

        if removed {
            debug!(app = %self.inner.name, "deleted firebase app");
        }
        removed
    }

    fn ensure_live(&self) -> Result<(), AppError> {
        if self.is_deleted() {
            return Err(AppError::Deleted(self.inner.name.clone()));
        }
        Ok(())
    }

    /// Creates a Cloud Messaging client for this app.
    ///
    /// Fails when the app was deleted or its options carry no project ID.
    #[cfg(feature = "messaging")]
    pub fn messaging(&self) -> Result<FirebaseMessaging, MessagingError> {
        self.ensure_live()?;
        let project_id = self
            .inner
            .options
            .project_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AppError::ProjectIdMissing)?;

        Ok(FirebaseMessaging::new(
            AuthMiddleware::new(self.inner.options.credentials()),
            project_id,
            self.inner.messaging.clone(),
        ))
    }

    /// Creates a Cloud Storage client bound to the default bucket.
    ///
    /// The bucket comes from `storage_bucket`, falling back to `<project_id>.appspot.com`.
    #[cfg(feature = "storage")]
    pub fn storage(&self) -> Result<FirebaseStorage, StorageError> {
        self.ensure_live()?;
        let options = &self.inner.options;

        let bucket = match (&options.storage_bucket, &options.project_id) {
            (Some(bucket), _) if !bucket.trim().is_empty() => {
                bucket.trim().trim_start_matches("gs://").trim_end_matches('/').to_string()
            }
            (_, Some(project_id)) if !project_id.trim().is_empty() => {
                format!("{}.appspot.com", project_id.trim())
            }
            _ => return Err(StorageError::NoDefaultBucket),
        };

        Ok(FirebaseStorage::new(
            AuthMiddleware::new(options.credentials()),
            StorageLocation::new(&bucket, None)?,
        ))
    }

    /// Creates a Cloud Storage client bound to the bucket named by `url`.
    ///
    /// `url` must point at a bucket root, e.g. `gs://my-bucket`.
    #[cfg(feature = "storage")]
    pub fn storage_with_url(&self, url: &str) -> Result<FirebaseStorage, StorageError> {
        self.ensure_live()?;
        let location = StorageLocation::parse(url)?;
        if location.path().is_some() {
            return Err(StorageError::InvalidArgument(format!(
                "storage URL must point to a bucket root: {}",
                url
            )));
        }

        Ok(FirebaseStorage::new(
            AuthMiddleware::new(self.inner.options.credentials()),
            location,
        ))
    }
}

impl std::fmt::Debug for FirebaseApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseApp")
            .field("name", &self.inner.name)
            .field("project_id", &self.inner.options.project_id)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}
