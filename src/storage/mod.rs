//! Cloud Storage for Firebase module.
//!
//! A [`FirebaseStorage`] is bound to one bucket. References are resolved from a path
//! relative to that bucket, or from any of the URL forms [`StorageLocation::parse`] accepts:
//!
//! - `gs://<bucket>/<path>`
//! - `https://firebasestorage.googleapis.com/v0/b/<bucket>/o/<encoded path>`
//! - `https://storage.googleapis.com/<bucket>/<path>`
//!
//! # Examples
//!
//! ```rust,no_run
//! # use firebase_kit::app::FirebaseApp;
//! # async fn run(app: FirebaseApp) -> Result<(), firebase_kit::storage::StorageError> {
//! let storage = app.storage()?;
//! let avatar = storage.reference_with_path("users/42").child("avatar.png");
//!
//! avatar.put_bytes(b"...".to_vec()).await?;
//! let url = avatar.get_download_url().await?;
//! # Ok(())
//! # }
//! ```

pub mod download_url;
pub mod location;
pub mod reference;

use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use tracing::debug;

use crate::app::AppError;
use crate::core::middleware::AuthMiddleware;
use crate::core::{authorized_client, emulator_client};
pub use download_url::download_url;
pub use location::{child_path, StorageLocation};
pub use reference::{ObjectMetadata, StorageReference};

const STORAGE_API_ORIGIN: &str = "https://storage.googleapis.com";

/// Errors that can occur during Storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Cloud Storage API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The owning app is unusable.
    #[error(transparent)]
    App(#[from] AppError),
    /// The input is not one of the accepted storage URL forms.
    #[error("Unsupported storage URL format: {0}")]
    UnsupportedUrl(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Object operations are meaningless on the bucket root.
    #[error("Operation '{0}' cannot be performed on the root reference")]
    InvalidRootOperation(&'static str),
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    /// The object is larger than the caller's download limit.
    #[error("Object exceeds the maximum download size of {max_size} bytes")]
    ObjectTooLarge { max_size: u64 },
    /// Neither a storage bucket nor a project ID is configured.
    #[error("No default bucket: set storage_bucket or project_id in the app options")]
    NoDefaultBucket,
}

/// Client for interacting with Cloud Storage for Firebase.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: ClientWithMiddleware,
    base_url: String,
    root: StorageLocation,
    emulated: bool,
}

impl FirebaseStorage {
    /// Creates a client for the bucket of `root`.
    ///
    /// This is typically called via `FirebaseApp::storage()`.
    pub fn new(middleware: AuthMiddleware, root: StorageLocation) -> Self {
        Self {
            client: authorized_client(middleware),
            base_url: STORAGE_API_ORIGIN.to_string(),
            root: root.root(),
            emulated: false,
        }
    }

    /// Creates a client with a custom HTTP client and base URL.
    /// Internal use only, primarily for testing.
    #[allow(dead_code)]
    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        root: StorageLocation,
    ) -> Self {
        Self {
            client,
            base_url,
            root: root.root(),
            emulated: false,
        }
    }

    pub fn bucket(&self) -> &str {
        self.root.bucket()
    }

    /// Points this instance at a local Storage emulator.
    ///
    /// Call it before creating references: existing references keep talking to the
    /// endpoint they were created with. The emulator client is owned by this instance and
    /// released with it.
    pub fn use_emulator(&mut self, host: &str, port: u16) -> Result<(), StorageError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(StorageError::InvalidArgument("emulator host must not be blank".to_string()));
        }

        self.client = emulator_client()?;
        self.base_url = format!("http://{}:{}", host, port);
        self.emulated = true;
        debug!(host, port, "using storage emulator");

        Ok(())
    }

    /// Reference to the bucket root.
    pub fn reference(&self) -> StorageReference {
        StorageReference::new(
            self.client.clone(),
            self.base_url.clone(),
            self.emulated,
            self.root.clone(),
        )
    }

    /// Reference to `path` relative to the bucket root.
    pub fn reference_with_path(&self, path: &str) -> StorageReference {
        self.reference().child(path)
    }

    /// Reference to the location named by a `gs://` or HTTPS URL.
    ///
    /// The URL must name this instance's bucket.
    pub fn reference_from_url(&self, url: &str) -> Result<StorageReference, StorageError> {
        let location = StorageLocation::parse(url)?;
        if location.bucket() != self.bucket() {
            return Err(StorageError::InvalidArgument(format!(
                "URL bucket {} does not match the storage bucket {}",
                location.bucket(),
                self.bucket()
            )));
        }
        Ok(StorageReference::new(
            self.client.clone(),
            self.base_url.clone(),
            self.emulated,
            location,
        ))
    }
}

#[cfg(test)]
mod tests;
