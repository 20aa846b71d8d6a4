//! Validation gate with magic number checking
//!
//! Decides, before any byte leaves the caller's control, whether a candidate
//! is safe and well-formed to store. Checks run in a fixed order and the first
//! failure wins:
//!
//! 1. Size (metadata only)
//! 2. Declared MIME type against the allow-list (metadata only)
//! 3. Filename extension against the allow-list (metadata only)
//! 4. Leading-byte signature for types that have one (reads 4 bytes)
//! 5. Blocked-pattern scan for `text/*` types (reads the whole content)
//!
//! Cheap metadata checks come first so that obviously invalid submissions are
//! rejected without touching their content.
//!
//! # Security
//!
//! **Never trust the declared MIME type alone!** A client can send any header
//! it likes. The signature check compares the declared type against the real
//! leading bytes, so a PDF renamed to `photo.png` is rejected.
//!
//! # Examples
//!
//! ```rust
//! use acton_ingest::types::{UploadCandidate, ValidationFailureKind};
//! use acton_ingest::validation::UploadValidator;
//!
//! let validator = UploadValidator::new();
//!
//! let png = UploadCandidate::new("photo.png", "image/png", vec![0x89, 0x50, 0x4E, 0x47]);
//! assert!(validator.validate(&png).is_valid());
//!
//! // Declared PNG, but the content starts with "%PDF"
//! let forged = UploadCandidate::new("photo.png", "image/png", b"%PDF-1.7".to_vec());
//! assert_eq!(
//!     validator.validate(&forged).failure_kind(),
//!     Some(ValidationFailureKind::SignatureMismatch)
//! );
//! ```

use bytes::Bytes;
use std::ops::Range;

use crate::signatures::{self, MAX_FILE_SIZE, SIGNATURE_LENGTH};
use crate::types::{
    format_size, CandidateMetadata, UploadCandidate, ValidationFailureKind, ValidationVerdict,
};

/// Random-access reader over a candidate's content
///
/// The gate only ever reads through this trait, which keeps it free of any
/// I/O other than reading the file's own bytes.
pub trait ByteRangeReader {
    /// Returns the bytes in `range`, clamped to the content length
    fn read_range(&self, range: Range<u64>) -> Bytes;
}

impl ByteRangeReader for Bytes {
    fn read_range(&self, range: Range<u64>) -> Bytes {
        let len = self.len();
        let start = usize::try_from(range.start).map_or(len, |start| start.min(len));
        let end = usize::try_from(range.end).map_or(len, |end| end.min(len));
        self.slice(start..end.max(start))
    }
}

/// A candidate that passed every check
///
/// Only [`UploadValidator::admit`] constructs this type, which makes "no
/// transmission without a `Valid` verdict" a property of the type system.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    candidate: UploadCandidate,
}

impl ValidatedUpload {
    /// Returns the validated candidate
    #[must_use]
    pub const fn candidate(&self) -> &UploadCandidate {
        &self.candidate
    }

    /// Consumes the wrapper, returning the candidate
    #[must_use]
    pub fn into_candidate(self) -> UploadCandidate {
        self.candidate
    }
}

/// Validation gate
///
/// Stateless and deterministic: the same candidate always yields the same
/// verdict, and independent candidates can be validated concurrently.
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadValidator;

impl UploadValidator {
    /// Creates a new validator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Runs every check against an owned candidate
    #[must_use]
    pub fn validate(&self, candidate: &UploadCandidate) -> ValidationVerdict {
        self.validate_parts(candidate.metadata(), candidate.content())
    }

    /// Validates a candidate and, on success, wraps it for transmission
    ///
    /// # Errors
    ///
    /// Returns the failing kind and its detail if any check fails.
    pub fn admit(
        &self,
        candidate: UploadCandidate,
    ) -> Result<ValidatedUpload, (ValidationFailureKind, String)> {
        match self.validate(&candidate) {
            ValidationVerdict::Valid => Ok(ValidatedUpload { candidate }),
            ValidationVerdict::Invalid { kind, detail } => Err((kind, detail)),
        }
    }

    /// Runs every check given metadata and a reader over the content
    #[must_use]
    pub fn validate_parts<R>(&self, metadata: &CandidateMetadata, reader: &R) -> ValidationVerdict
    where
        R: ByteRangeReader + ?Sized,
    {
        if metadata.length > MAX_FILE_SIZE {
            return ValidationVerdict::invalid(
                ValidationFailureKind::TooLarge,
                format!(
                    "file size {} exceeds the maximum of {}",
                    format_size(metadata.length),
                    format_size(MAX_FILE_SIZE)
                ),
            );
        }

        if !signatures::is_allowed_mime_type(&metadata.mime_type) {
            return ValidationVerdict::invalid(
                ValidationFailureKind::TypeNotAllowed,
                format!("file type '{}' is not allowed", metadata.mime_type),
            );
        }

        let extension = metadata.extension();
        if !signatures::is_allowed_extension(&extension) {
            return ValidationVerdict::invalid(
                ValidationFailureKind::ExtensionNotAllowed,
                format!("extension '.{extension}' is not allowed"),
            );
        }

        if let Some(expected) = signatures::signatures_for(&metadata.mime_type) {
            let head = reader.read_range(0..SIGNATURE_LENGTH as u64);
            let observed = hex::encode(&head);
            if !expected.iter().any(|sig| observed.starts_with(sig)) {
                let detected = infer::get(&head).map_or_else(String::new, |kind| {
                    format!(", content looks like {}", kind.mime_type())
                });
                return ValidationVerdict::invalid(
                    ValidationFailureKind::SignatureMismatch,
                    format!(
                        "declared '{}' but leading bytes are '{observed}'{detected}",
                        metadata.mime_type
                    ),
                );
            }
        }

        if metadata.mime_type.starts_with("text/") {
            let content = reader.read_range(0..metadata.length);
            let text = String::from_utf8_lossy(&content);
            if let Some(pattern) = signatures::find_malicious_pattern(&text) {
                return ValidationVerdict::invalid(
                    ValidationFailureKind::MaliciousContentDetected,
                    format!("content contains blocked pattern '{pattern}'"),
                );
            }
        }

        ValidationVerdict::Valid
    }
}
