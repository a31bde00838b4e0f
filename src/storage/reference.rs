use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::parse_error_response;
use crate::storage::download_url::{download_url, download_url_with_origins};
use crate::storage::location::{encode_segment, StorageLocation};
use crate::storage::StorageError;

/// Custom metadata key holding the comma separated download tokens of an object.
pub const DOWNLOAD_TOKENS_METADATA_KEY: &str = "firebaseStorageDownloadTokens";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata for a Google Cloud Storage object.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: Option<String>,
    pub bucket: Option<String>,
    pub generation: Option<String>,
    pub metageneration: Option<String>,
    pub content_type: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub size: Option<String>,
    pub md5_hash: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
    pub etag: Option<String>,
}

impl ObjectMetadata {
    /// Size in bytes, when the server reported a parseable one.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    /// First download token attached to the object, if any.
    pub fn download_token(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .get(DOWNLOAD_TOKENS_METADATA_KEY)?
            .split(',')
            .map(str::trim)
            .find(|token| !token.is_empty())
    }
}

/// A navigable pointer to an object (or prefix) in a bucket.
///
/// Navigation is local; only the `async` methods talk to the server.
#[derive(Clone)]
pub struct StorageReference {
    client: ClientWithMiddleware,
    base_url: String,
    emulated: bool,
    location: StorageLocation,
}

impl StorageReference {
    pub(crate) fn new(
        client: ClientWithMiddleware,
        base_url: String,
        emulated: bool,
        location: StorageLocation,
    ) -> Self {
        Self {
            client,
            base_url,
            emulated,
            location,
        }
    }

    pub fn bucket(&self) -> &str {
        self.location.bucket()
    }

    /// Object path relative to the bucket root; empty for the root reference.
    pub fn full_path(&self) -> &str {
        self.location.full_path()
    }

    /// Last segment of the path; empty for the root reference.
    pub fn name(&self) -> &str {
        self.location.name()
    }

    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Returns a reference to `path` below this one.
    pub fn child(&self, path: &str) -> StorageReference {
        self.with_location(self.location.child(path))
    }

    /// `None` for the root reference.
    pub fn parent(&self) -> Option<StorageReference> {
        self.location.parent().map(|location| self.with_location(location))
    }

    pub fn root(&self) -> StorageReference {
        self.with_location(self.location.root())
    }

    fn with_location(&self, location: StorageLocation) -> StorageReference {
        Self::new(self.client.clone(), self.base_url.clone(), self.emulated, location)
    }

    fn object_path(&self, operation: &'static str) -> Result<&str, StorageError> {
        self.location
            .path()
            .ok_or(StorageError::InvalidRootOperation(operation))
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            encode_segment(self.bucket()),
            encode_segment(path)
        )
    }

    async fn check(
        &self,
        response: reqwest::Response,
        action: &str,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StorageError::ObjectNotFound(self.location.to_string()));
        }
        Err(StorageError::ApiError(
            parse_error_response(response, &format!("{} failed", action)).await,
        ))
    }

    /// Uploads `bytes`, replacing the object if it exists.
    pub async fn put_bytes(&self, bytes: impl Into<Bytes>) -> Result<ObjectMetadata, StorageError> {
        self.put_bytes_with_content_type(bytes, DEFAULT_CONTENT_TYPE).await
    }

    /// Uploads `bytes` with the given MIME type using the simple media upload.
    pub async fn put_bytes_with_content_type(
        &self,
        bytes: impl Into<Bytes>,
        content_type: &str,
    ) -> Result<ObjectMetadata, StorageError> {
        let path = self.object_path("put_bytes")?;
        let bytes = bytes.into();
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.base_url,
            encode_segment(self.bucket())
        );

        debug!(object = %self.location, size = bytes.len(), "uploading object");
        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", path)])
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let response = self.check(response, "Upload").await?;
        Ok(response.json().await?)
    }

    /// Downloads the object, failing once more than `max_size` bytes would be held in memory.
    pub async fn get_bytes(&self, max_size: u64) -> Result<Bytes, StorageError> {
        let path = self.object_path("get_bytes")?;

        let response = self
            .client
            .get(self.object_url(path))
            .query(&[("alt", "media")])
            .send()
            .await?;
        let mut response = self.check(response, "Download").await?;

        if response.content_length().is_some_and(|len| len > max_size) {
            return Err(StorageError::ObjectTooLarge { max_size });
        }

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if (buffer.len() + chunk.len()) as u64 > max_size {
                return Err(StorageError::ObjectTooLarge { max_size });
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }

    pub async fn get_metadata(&self) -> Result<ObjectMetadata, StorageError> {
        let path = self.object_path("get_metadata")?;

        let response = self.client.get(self.object_url(path)).send().await?;
        let response = self.check(response, "Get metadata").await?;

        Ok(response.json().await?)
    }

    /// Returns a URL that serves the object's content.
    ///
    /// Uses the object's first download token when it has one, the public URL otherwise.
    pub async fn get_download_url(&self) -> Result<String, StorageError> {
        let path = self.object_path("get_download_url")?;
        let metadata = self.get_metadata().await?;
        let token = metadata.download_token();

        if self.emulated {
            return Ok(download_url_with_origins(
                &self.base_url,
                &self.base_url,
                self.bucket(),
                path,
                token,
            ));
        }
        Ok(download_url(self.bucket(), path, token))
    }

    pub async fn delete(&self) -> Result<(), StorageError> {
        let path = self.object_path("delete")?;

        debug!(object = %self.location, "deleting object");
        let response = self.client.delete(self.object_url(path)).send().await?;
        self.check(response, "Delete").await?;

        Ok(())
    }
}

impl std::fmt::Debug for StorageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageReference")
            .field("location", &self.location.to_string())
            .field("emulated", &self.emulated)
            .finish()
    }
}
