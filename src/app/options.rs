use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::AppError;
use crate::core::middleware::Credentials;

/// Environment variable holding the options either as inline JSON or as a path to a JSON file.
pub const FIREBASE_CONFIG_ENV: &str = "FIREBASE_CONFIG";

/// Configuration of a Firebase project, as registered with an app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirebaseOptions {
    /// The Google App ID that uniquely identifies an instance of an app.
    #[serde(alias = "appId")]
    pub application_id: String,

    /// API key used to identify the app to Google servers.
    pub api_key: String,

    /// The Realtime Database root URL, e.g. `https://abc-xyz-123.firebaseio.com`.
    #[serde(rename = "databaseURL", alias = "databaseUrl", skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Google Analytics tracking ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ga_tracking_id: Option<String>,

    /// Default Cloud Storage bucket, e.g. `abc-xyz-123.appspot.com`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_bucket: Option<String>,

    /// Google Cloud project ID, e.g. `my-project-1234`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Project number, used as the Cloud Messaging sender ID.
    #[serde(alias = "messagingSenderId", skip_serializing_if = "Option::is_none")]
    pub gcm_sender_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,

    /// Path to a service account JSON file. When unset, `GOOGLE_APPLICATION_CREDENTIALS` is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<PathBuf>,
}

impl FirebaseOptions {
    /// Loads options from `FIREBASE_CONFIG`.
    ///
    /// A value starting with `{` is parsed as JSON; anything else is treated as a file path.
    pub fn from_env() -> Result<Self, AppError> {
        let raw = std::env::var(FIREBASE_CONFIG_ENV).map_err(|_| {
            AppError::MissingConfiguration(format!(
                "{} is not set; pass FirebaseOptions explicitly",
                FIREBASE_CONFIG_ENV
            ))
        })?;
        Self::from_config_value(&raw)
    }

    pub(crate) fn from_config_value(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::MissingConfiguration(format!("{} is empty", FIREBASE_CONFIG_ENV)));
        }

        if raw.starts_with('{') {
            return Ok(serde_json::from_str(raw)?);
        }

        let contents = std::fs::read_to_string(raw).map_err(|e| {
            AppError::MissingConfiguration(format!("failed to read {}: {}", raw, e))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub(crate) fn credentials(&self) -> Credentials {
        match &self.service_account_path {
            Some(path) => Credentials::ServiceAccountFile(path.clone()),
            None => Credentials::ApplicationDefault,
        }
    }
}
