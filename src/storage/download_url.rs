//! Sharable download URLs for stored objects.

use crate::storage::location::encode_segment;

pub(crate) const FIREBASE_STORAGE_ORIGIN: &str = "https://firebasestorage.googleapis.com";
pub(crate) const CLOUD_STORAGE_ORIGIN: &str = "https://storage.googleapis.com";

/// Builds the download URL of `object_path` in `bucket`.
///
/// With an access token the Firebase Storage REST form is used
/// (`/v0/b/<bucket>/o/<encoded path>?alt=media&token=<token>`); without one, the public
/// Cloud Storage form, where every path segment is encoded on its own.
pub fn download_url(bucket: &str, object_path: &str, token: Option<&str>) -> String {
    download_url_with_origins(
        FIREBASE_STORAGE_ORIGIN,
        CLOUD_STORAGE_ORIGIN,
        bucket,
        object_path,
        token,
    )
}

pub(crate) fn download_url_with_origins(
    firebase_origin: &str,
    public_origin: &str,
    bucket: &str,
    object_path: &str,
    token: Option<&str>,
) -> String {
    match token.map(str::trim).filter(|t| !t.is_empty()) {
        Some(token) => format!(
            "{}/v0/b/{}/o/{}?alt=media&token={}",
            firebase_origin,
            encode_segment(bucket),
            encode_segment(object_path),
            encode_segment(token)
        ),
        None => {
            let segments = object_path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(encode_segment)
                .collect::<Vec<_>>()
                .join("/");
            format!("{}/{}/{}", public_origin, encode_segment(bucket), segments)
        }
    }
}
