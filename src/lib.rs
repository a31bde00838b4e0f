//! Client-side Firebase toolkit: app lifecycle, Cloud Messaging and Cloud Storage.
//!
//! Start from a [`Firebase`] registry, initialize an app with its [`FirebaseOptions`],
//! then ask the app for the service clients enabled by the crate features.

pub mod app;
pub mod core;
#[cfg(feature = "messaging")]
pub mod messaging;
#[cfg(feature = "storage")]
pub mod storage;

pub use app::{AppError, Firebase, FirebaseApp, FirebaseOptions, DEFAULT_APP_NAME};
pub use crate::core::middleware::Credentials;
#[cfg(feature = "messaging")]
pub use messaging::{FirebaseMessaging, MessagingError};
#[cfg(feature = "storage")]
pub use storage::{FirebaseStorage, StorageError, StorageReference};
