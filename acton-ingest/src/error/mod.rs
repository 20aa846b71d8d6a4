//! Error types and error handling
//!
//! Per-file outcomes (rejections, transmission failures) are never errors of
//! this kind: they are recorded on the file's [`UploadRecord`] as an
//! [`UploadFailure`]. [`IngestError`] covers setup and misuse only.
//!
//! [`UploadRecord`]: crate::coordinator::UploadRecord
//! [`UploadFailure`]: crate::types::UploadFailure

use thiserror::Error;

use crate::coordinator::RecordId;

/// Crate error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// An endpoint URL could not be parsed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// No record with this identifier is tracked
    #[error("Upload record not found: {0}")]
    RecordNotFound(RecordId),
}

impl From<figment::Error> for IngestError {
    fn from(error: figment::Error) -> Self {
        Self::Config(error.to_string())
    }
}
