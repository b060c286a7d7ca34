//! Upload preparation for the blob store.
//!
//! Validates an image upload and derives the blob paths it will occupy: the
//! original plus the medium and thumbnail variants produced downstream. All
//! three paths are tracked so a later delete removes every variant.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use midrash_core::Error;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/gif", "image/webp", "image/svg+xml", "image/avif"];

const MEDIUM_DIR: &str = "medium";
const THUMBNAIL_DIR: &str = "thumbs";

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Blob paths of one uploaded image and its derived variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariants {
    pub original: String,
    pub medium: String,
    pub thumbnail: String,
}

impl ImageVariants {
    /// Variants live in sibling folders: `a/b.jpg` becomes `a/medium/b.jpg` and
    /// `a/thumbs/b.jpg`.
    pub fn for_path(path: &str) -> Self {
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (format!("{dir}/"), file),
            None => (String::new(), path),
        };
        Self {
            original: path.to_string(),
            medium: format!("{dir}{MEDIUM_DIR}/{file}"),
            thumbnail: format!("{dir}{THUMBNAIL_DIR}/{file}"),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.original, &self.medium, &self.thumbnail]
    }
}

/// A validated upload, ready for `put(path, bytes, content_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub path: String,
    pub content_type: String,
    pub variants: ImageVariants,
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`.
///
/// Directory components are dropped, runs of other characters become a
/// single `_`, and leading dots are stripped so the result is never hidden
/// or empty.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned = UNSAFE_CHARS.replace_all(base.trim(), "_");
    let cleaned = cleaned.trim_start_matches(['.', '_']).trim_end_matches('_');
    if cleaned.is_empty() { "upload".to_string() } else { cleaned.to_string() }
}

/// Validate an upload and compute its storage path
/// `<folder>/<unix-millis>_<sanitized-name>`.
///
/// # Errors
///
/// Returns `Error::InvalidInput` for a non-image content type, an empty file,
/// or a file larger than [`MAX_UPLOAD_BYTES`].
pub fn prepare_upload(
    folder: &str, filename: &str, content_type: &str, size: u64, at: DateTime<Utc>,
) -> Result<UploadTarget, Error> {
    let content_type = content_type.trim().to_ascii_lowercase();
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(Error::InvalidInput(format!("unsupported content type: {content_type}")));
    }
    if size == 0 {
        return Err(Error::InvalidInput("empty file".into()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::InvalidInput(format!("{size} bytes exceeds the {MAX_UPLOAD_BYTES} byte limit")));
    }

    let folder = folder.trim_matches('/');
    let name = format!("{}_{}", at.timestamp_millis(), sanitize_filename(filename));
    let path = if folder.is_empty() { name } else { format!("{folder}/{name}") };

    tracing::debug!(%path, %content_type, size, "prepared upload");

    Ok(UploadTarget { variants: ImageVariants::for_path(&path), path, content_type })
}
