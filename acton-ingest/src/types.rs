//! Core types for file ingestion

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Display metadata of a candidate file
///
/// This is the part of an [`UploadCandidate`] that is safe to copy into
/// records and snapshots: everything except the content itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMetadata {
    /// Filename as supplied by the caller (display and extension only)
    pub filename: String,

    /// MIME type as declared by the caller
    pub mime_type: String,

    /// Content length in bytes
    pub length: u64,
}

impl CandidateMetadata {
    /// Returns the final dot-segment of the filename, lower-cased
    ///
    /// A filename without any dot yields the whole name, so `README` gives
    /// `readme` and is rejected by the extension allow-list.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_ingest::types::CandidateMetadata;
    ///
    /// let meta = CandidateMetadata {
    ///     filename: "Holiday.Photo.JPG".to_string(),
    ///     mime_type: "image/jpeg".to_string(),
    ///     length: 0,
    /// };
    /// assert_eq!(meta.extension(), "jpg");
    /// ```
    #[must_use]
    pub fn extension(&self) -> String {
        self.filename
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Formats the length for display (`0 Bytes`, `1.5 KB`, `100 MB`)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_ingest::types::CandidateMetadata;
    ///
    /// let meta = CandidateMetadata {
    ///     filename: "a.zip".to_string(),
    ///     mime_type: "application/zip".to_string(),
    ///     length: 1536,
    /// };
    /// assert_eq!(meta.display_size(), "1.5 KB");
    /// ```
    #[must_use]
    pub fn display_size(&self) -> String {
        format_size(self.length)
    }
}

/// Formats a byte count with base-1024 units and at most two decimals
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// A caller-submitted file awaiting a verdict
///
/// The content is an owned, immutable [`Bytes`] buffer and the length is
/// derived from it. Validation and checksumming both read this same buffer,
/// so the bytes that pass the gate are exactly the bytes that get hashed and
/// transmitted.
///
/// # Examples
///
/// ```rust
/// use acton_ingest::types::UploadCandidate;
///
/// let candidate = UploadCandidate::new(
///     "notes.txt",
///     "text/plain",
///     b"meeting notes".to_vec(),
/// );
/// assert_eq!(candidate.length(), 13);
/// ```
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    metadata: CandidateMetadata,
    content: Bytes,
}

impl UploadCandidate {
    /// Creates a candidate from its declared filename, declared MIME type and content
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        let content = content.into();
        Self {
            metadata: CandidateMetadata {
                filename: filename.into(),
                mime_type: mime_type.into(),
                length: content.len() as u64,
            },
            content,
        }
    }

    /// Returns the candidate metadata
    #[must_use]
    pub const fn metadata(&self) -> &CandidateMetadata {
        &self.metadata
    }

    /// Returns the declared filename
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.metadata.filename
    }

    /// Returns the declared MIME type
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.metadata.mime_type
    }

    /// Returns the content length in bytes
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.metadata.length
    }

    /// Returns the content
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }
}

/// Reason a candidate was rejected by the validation gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailureKind {
    /// Content exceeds the size limit
    TooLarge,
    /// Declared MIME type is not on the allow-list
    TypeNotAllowed,
    /// Filename extension is not on the allow-list
    ExtensionNotAllowed,
    /// Leading bytes do not match the declared type
    SignatureMismatch,
    /// Text content contains a blocked pattern
    MaliciousContentDetected,
}

impl ValidationFailureKind {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::TooLarge => "too_large",
            Self::TypeNotAllowed => "type_not_allowed",
            Self::ExtensionNotAllowed => "extension_not_allowed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::MaliciousContentDetected => "malicious_content_detected",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::TooLarge => "File is too large",
            Self::TypeNotAllowed => "File type is not allowed",
            Self::ExtensionNotAllowed => "File extension is not allowed",
            Self::SignatureMismatch => "File content does not match its declared type",
            Self::MaliciousContentDetected => "Potentially dangerous content detected",
        };
        f.write_str(message)
    }
}

/// Outcome of running the validation gate on one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    /// Every check passed
    Valid,

    /// The first failing check
    Invalid {
        /// Which check failed
        kind: ValidationFailureKind,
        /// Human-readable detail naming the offending value
        detail: String,
    },
}

impl ValidationVerdict {
    /// Creates an `Invalid` verdict
    #[must_use]
    pub fn invalid(kind: ValidationFailureKind, detail: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            detail: detail.into(),
        }
    }

    /// Returns true for `Valid`
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns the failure kind for `Invalid`
    #[must_use]
    pub const fn failure_kind(&self) -> Option<ValidationFailureKind> {
        match self {
            Self::Valid => None,
            Self::Invalid { kind, .. } => Some(*kind),
        }
    }
}

/// Reason a transmission to the storage collaborator failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionFailureKind {
    /// The request never completed (connection, DNS, reset, ...)
    NetworkError,
    /// The collaborator answered with a rejection
    ServerRejected,
}

impl TransmissionFailureKind {
    /// Stable machine-readable code
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::ServerRejected => "server_rejected",
        }
    }
}

impl fmt::Display for TransmissionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError => f.write_str("Upload failed due to a network error"),
            Self::ServerRejected => f.write_str("Upload was rejected by the server"),
        }
    }
}

/// Error returned by a storage collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct TransmissionError {
    /// Failure category
    pub kind: TransmissionFailureKind,
    /// Transport-specific detail
    pub detail: String,
}

impl TransmissionError {
    /// Creates a `NetworkError`
    #[must_use]
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: TransmissionFailureKind::NetworkError,
            detail: detail.into(),
        }
    }

    /// Creates a `ServerRejected` error
    #[must_use]
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            kind: TransmissionFailureKind::ServerRejected,
            detail: detail.into(),
        }
    }
}

/// Why a record ended in the `Error` state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadFailure {
    /// Rejected by the validation gate; nothing was transmitted
    #[error("{kind}: {detail}")]
    Validation {
        /// Failed check
        kind: ValidationFailureKind,
        /// Offending value
        detail: String,
    },

    /// The storage collaborator failed
    #[error("{kind}: {detail}")]
    Transmission {
        /// Failure category
        kind: TransmissionFailureKind,
        /// Transport detail
        detail: String,
    },

    /// The record's worker stopped before reaching a verdict or a reply
    #[error("Upload interrupted: {0}")]
    Interrupted(String),
}

impl UploadFailure {
    /// Stable machine-readable code of the failure
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { kind, .. } => kind.code(),
            Self::Transmission { kind, .. } => kind.code(),
            Self::Interrupted(_) => "interrupted",
        }
    }

    /// Returns the validation kind if the gate rejected the file
    #[must_use]
    pub const fn validation_kind(&self) -> Option<ValidationFailureKind> {
        match self {
            Self::Validation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the transmission kind if the collaborator failed
    #[must_use]
    pub const fn transmission_kind(&self) -> Option<TransmissionFailureKind> {
        match self {
            Self::Transmission { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<TransmissionError> for UploadFailure {
    fn from(error: TransmissionError) -> Self {
        Self::Transmission {
            kind: error.kind,
            detail: error.detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(filename: &str) -> CandidateMetadata {
        CandidateMetadata {
            filename: filename.to_string(),
            mime_type: "text/plain".to_string(),
            length: 0,
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(meta("document.PDF").extension(), "pdf");
        assert_eq!(meta("archive.tar.gz").extension(), "gz");
        assert_eq!(meta("README").extension(), "readme");
        assert_eq!(meta("trailing.").extension(), "");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(512), "512 Bytes");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(100 * 1024 * 1024), "100 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn test_candidate_length_follows_content() {
        let candidate = UploadCandidate::new("a.txt", "text/plain", vec![1, 2, 3]);
        assert_eq!(candidate.length(), 3);
        assert_eq!(candidate.content().as_ref(), &[1, 2, 3]);
        assert_eq!(candidate.metadata().filename, "a.txt");
    }

    #[test]
    fn test_verdict_helpers() {
        assert!(ValidationVerdict::Valid.is_valid());
        let verdict = ValidationVerdict::invalid(ValidationFailureKind::TooLarge, "too big");
        assert!(!verdict.is_valid());
        assert_eq!(verdict.failure_kind(), Some(ValidationFailureKind::TooLarge));
    }

    #[test]
    fn test_failure_display_is_human_readable() {
        let failure = UploadFailure::Validation {
            kind: ValidationFailureKind::ExtensionNotAllowed,
            detail: "extension .exe is not allowed".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "File extension is not allowed: extension .exe is not allowed"
        );
        assert_eq!(failure.code(), "extension_not_allowed");
    }

    #[test]
    fn test_transmission_error_conversion() {
        let failure: UploadFailure = TransmissionError::rejected("HTTP 413").into();
        assert_eq!(
            failure.transmission_kind(),
            Some(TransmissionFailureKind::ServerRejected)
        );
        assert_eq!(failure.validation_kind(), None);
        assert_eq!(failure.code(), "server_rejected");
    }
}
