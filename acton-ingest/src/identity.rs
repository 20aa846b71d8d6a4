//! Storage identity: secure names, sanitized paths and content checksums
//!
//! The caller's filename is never used as a storage key. It contributes only
//! its extension; the rest of the name is a timestamp plus random hex.
//!
//! # Examples
//!
//! ```rust
//! use acton_ingest::identity::{checksum_hex, sanitize_path};
//!
//! assert_eq!(sanitize_path("../../etc/passwd"), "/etc/passwd");
//! assert_eq!(sanitize_path("projects//2024 report/"), "projects/2024_report/");
//!
//! assert_eq!(
//!     checksum_hex(b"abc"),
//!     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
//! );
//! ```

use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::validation::ValidatedUpload;

// Literal patterns, covered by the tests below
static DISALLOWED_PATH_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9/_-]").expect("valid path character pattern"));

static REPEATED_SLASHES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/+").expect("valid slash pattern"));

/// Name, path and checksum under which a validated file is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageIdentity {
    /// Collision-resistant storage name (`{millis}_{8 hex}.{ext}`)
    pub secure_name: String,

    /// Sanitized destination path
    pub path: String,

    /// Hex-encoded SHA-256 of the exact validated bytes
    pub checksum: String,
}

impl StorageIdentity {
    /// Derives the storage identity of a validated upload
    #[must_use]
    pub fn derive(upload: &ValidatedUpload, destination: &str) -> Self {
        let candidate = upload.candidate();
        Self {
            secure_name: secure_filename(candidate.filename()),
            path: sanitize_path(destination),
            checksum: checksum_hex(candidate.content()),
        }
    }
}

/// Generates a storage name from a wall-clock timestamp and 8 random hex chars
///
/// Only the final dot-segment of `original_name` is kept, as the extension.
#[must_use]
pub fn secure_filename(original_name: &str) -> String {
    let extension = original_name.rsplit('.').next().unwrap_or_default();
    let timestamp = Utc::now().timestamp_millis();
    let random: u32 = rand::thread_rng().gen();
    format!("{timestamp}_{random:08x}.{extension}")
}

/// Sanitizes a caller-supplied destination path
///
/// Removes every `..`, replaces any character outside `[A-Za-z0-9/_-]` with
/// `_` and collapses repeated `/`. The result contains no `.` at all, so it is
/// a fixed point: `sanitize_path(&sanitize_path(p)) == sanitize_path(p)`.
#[must_use]
pub fn sanitize_path(path: &str) -> String {
    let without_traversal = path.replace("..", "");
    let replaced = DISALLOWED_PATH_CHARS.replace_all(&without_traversal, "_");
    REPEATED_SLASHES.replace_all(&replaced, "/").into_owned()
}

/// Hex-encoded SHA-256 digest of `content`
#[must_use]
pub fn checksum_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}
