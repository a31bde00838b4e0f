//! Bucket/object locations and the URL forms that resolve to them.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::storage::StorageError;

/// Hosts containing this marker serve the Firebase Storage REST API (`/v0/b/<bucket>/o/<path>`).
pub(crate) const FIREBASE_STORAGE_HOST_MARKER: &str = "firebasestorage";
/// Host of the public Cloud Storage endpoint (`/<bucket>/<path>`).
pub(crate) const CLOUD_STORAGE_HOST: &str = "storage.googleapis.com";

// RFC 3986 unreserved characters stay literal; everything else, `/` and space included, is escaped.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes `value` as a single URL path segment. Spaces become `%20`.
pub(crate) fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// A bucket and an optional object path inside it. `None` is the bucket root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    bucket: String,
    path: Option<String>,
}

impl StorageLocation {
    pub fn new(bucket: &str, path: Option<&str>) -> Result<Self, StorageError> {
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StorageError::InvalidArgument(format!(
                "invalid bucket name: {:?}",
                bucket
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            path: path.map(|p| child_path("", p)).filter(|p| !p.is_empty()),
        })
    }

    /// Resolves `gs://bucket/path`, a Firebase Storage download URL, or a
    /// `https://storage.googleapis.com/bucket/path` URL.
    ///
    /// Any other input fails with [`StorageError::UnsupportedUrl`].
    pub fn parse(input: &str) -> Result<Self, StorageError> {
        let trimmed = input.trim();

        if let Some(rest) = trimmed.strip_prefix("gs://") {
            let (bucket, path) = match rest.split_once('/') {
                Some((bucket, path)) => (bucket, Some(path)),
                None => (rest, None),
            };
            return Self::new(bucket, path).map_err(|_| unsupported(input));
        }

        let url = Url::parse(trimmed).map_err(|_| unsupported(input))?;
        if url.scheme() != "https" {
            return Err(unsupported(input));
        }

        let host = url.host_str().unwrap_or_default();
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();

        let resolved = if host.contains(FIREBASE_STORAGE_HOST_MARKER) {
            firebase_segments(&segments)
        } else if host == CLOUD_STORAGE_HOST {
            cloud_segments(&segments)
        } else {
            None
        };
        let (bucket, encoded_path) = resolved.ok_or_else(|| unsupported(input))?;

        let path = percent_decode_str(&encoded_path)
            .decode_utf8()
            .map_err(|_| unsupported(input))?;

        Self::new(bucket, Some(&path)).map_err(|_| unsupported(input))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object path without leading or trailing slashes; `None` at the bucket root.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Object path, or an empty string at the bucket root.
    pub fn full_path(&self) -> &str {
        self.path.as_deref().unwrap_or_default()
    }

    /// Last path segment, or an empty string at the bucket root.
    pub fn name(&self) -> &str {
        self.full_path().rsplit('/').next().unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_none()
    }

    pub fn child(&self, path: &str) -> Self {
        let joined = child_path(self.full_path(), path);
        Self {
            bucket: self.bucket.clone(),
            path: Some(joined).filter(|p| !p.is_empty()),
        }
    }

    /// `None` at the bucket root.
    pub fn parent(&self) -> Option<Self> {
        let path = self.path.as_deref()?;
        Some(Self {
            bucket: self.bucket.clone(),
            path: path.rsplit_once('/').map(|(parent, _)| parent.to_string()),
        })
    }

    pub fn root(&self) -> Self {
        Self {
            bucket: self.bucket.clone(),
            path: None,
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "gs://{}/{}", self.bucket, path),
            None => write!(f, "gs://{}", self.bucket),
        }
    }
}

/// Joins `child` under `parent` with a single `/`.
///
/// Leading and trailing slashes on both sides are dropped, as are empty segments in `child`.
pub fn child_path(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches('/');
    let child = child
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    if parent.is_empty() {
        return child;
    }
    if child.is_empty() {
        return parent.to_string();
    }
    format!("{}/{}", parent, child)
}

fn unsupported(input: &str) -> StorageError {
    StorageError::UnsupportedUrl(input.to_string())
}

// `/<version>/b/<bucket>/o[/<encoded path>]`
fn firebase_segments<'a>(segments: &[&'a str]) -> Option<(&'a str, String)> {
    let b = segments.iter().position(|s| *s == "b")?;
    let bucket = *segments.get(b + 1)?;
    match segments.get(b + 2) {
        Some(&"o") => Some((bucket, segments[b + 3..].join("/"))),
        None => Some((bucket, String::new())),
        Some(_) => None,
    }
}

// `/<bucket>[/<path>]`
fn cloud_segments<'a>(segments: &[&'a str]) -> Option<(&'a str, String)> {
    let (bucket, rest) = segments.split_first()?;
    Some((bucket, rest.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gs_urls() {
        let location = StorageLocation::parse("gs://bucket/a/b").unwrap();
        assert_eq!(location.bucket(), "bucket");
        assert_eq!(location.path(), Some("a/b"));
        assert_eq!(location.name(), "b");

        let root = StorageLocation::parse("gs://bucket").unwrap();
        assert_eq!(root.bucket(), "bucket");
        assert_eq!(root.path(), None);
        assert!(root.is_root());

        let trailing = StorageLocation::parse("gs://bucket/").unwrap();
        assert!(trailing.is_root());
    }

    #[test]
    fn parses_firebase_download_urls() {
        let location = StorageLocation::parse(
            "https://firebasestorage.googleapis.com/v0/b/my-app.appspot.com/o/images%2Fmy%20photo.png?alt=media&token=abc",
        )
        .unwrap();
        assert_eq!(location.bucket(), "my-app.appspot.com");
        assert_eq!(location.path(), Some("images/my photo.png"));

        let root = StorageLocation::parse("https://firebasestorage.googleapis.com/v0/b/my-app.appspot.com/o")
            .unwrap();
        assert!(root.is_root());
    }

    #[test]
    fn firebase_url_round_trips_an_encoded_child_path() {
        let original = StorageLocation::new("bucket", None)
            .unwrap()
            .child("reports/2024 q1/summary+notes.pdf");
        let url = format!(
            "https://firebasestorage.googleapis.com/v0/b/{}/o/{}",
            original.bucket(),
            encode_segment(original.full_path())
        );

        assert_eq!(StorageLocation::parse(&url).unwrap(), original);
    }

    #[test]
    fn parses_cloud_storage_urls() {
        let location =
            StorageLocation::parse("https://storage.googleapis.com/bucket/docs/read%20me.txt").unwrap();
        assert_eq!(location.bucket(), "bucket");
        assert_eq!(location.path(), Some("docs/read me.txt"));
    }

    #[test]
    fn rejects_unsupported_urls() {
        for input in [
            "ftp://x",
            "http://storage.googleapis.com/bucket/a",
            "https://example.com/bucket/a",
            "https://firebasestorage.googleapis.com/v0/nothing-here",
            "gs://",
            "bucket/a",
        ] {
            match StorageLocation::parse(input) {
                Err(StorageError::UnsupportedUrl(url)) => assert_eq!(url, input),
                other => panic!("expected unsupported url for {input}, got {other:?}"),
            }
        }
    }

    #[test]
    fn child_trims_and_joins() {
        assert_eq!(child_path("a/", "/b"), "a/b");
        assert_eq!(child_path("a", "b"), "a/b");
        assert_eq!(child_path("", "b"), "b");
        assert_eq!(child_path("a", ""), "a");
        assert_eq!(child_path("a", "//b//c/"), "a/b/c");
    }

    #[test]
    fn navigates_parent_and_root() {
        let location = StorageLocation::parse("gs://bucket/a/b/c").unwrap();

        let parent = location.parent().unwrap();
        assert_eq!(parent.full_path(), "a/b");
        assert_eq!(parent.parent().unwrap().parent().unwrap(), location.root());
        assert!(location.root().parent().is_none());
        assert_eq!(location.to_string(), "gs://bucket/a/b/c");
    }

    #[test]
    fn encodes_segments() {
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_segment("file-1_2.~x"), "file-1_2.~x");
    }
}
