//! acton-ingest: secure file ingestion for untrusted uploads
//!
//! Decides, before any byte leaves the caller's control, whether a
//! user-supplied file is safe and well-formed to store, then tracks many
//! concurrent uploads without letting one file's failure touch another's
//! record.
//!
//! # Pipeline
//!
//! ```text
//! submit ─► Pending ─► Validating ─┬─► Error               (rejected, never transmitted)
//!                                  └─► Uploading ─┬─► Success
//!                                                 └─► Error
//! ```
//!
//! - [`signatures`]: compiled-in allow-lists, magic numbers and blocked patterns
//! - [`validation`]: the ordered, fail-fast validation gate
//! - [`identity`]: secure storage names, sanitized paths, SHA-256 checksums
//! - [`transport`]: the storage collaborator seam and its HTTP implementation
//! - [`security_log`]: non-blocking audit events for rejections and failures
//! - [`coordinator`]: per-file state machine and batch tracking
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use acton_ingest::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     acton_ingest::observability::init()?;
//!
//!     let config = IngestConfig::load_for_service("cloud-spaces")?;
//!     let coordinator = UploadCoordinator::from_config("projects/2024", &config)?;
//!
//!     let bytes = std::fs::read("report.pdf")?;
//!     let id = coordinator.submit(UploadCandidate::new("report.pdf", "application/pdf", bytes));
//!
//!     match coordinator.wait_for_record(id).await.map(|r| r.status().clone()) {
//!         Some(UploadStatus::Success { remote_location }) => println!("stored at {remote_location}"),
//!         Some(UploadStatus::Error { failure }) => eprintln!("{failure}"),
//!         _ => {}
//!     }
//!     Ok(())
//! }
//! ```

// Lint configuration is handled at the workspace level in Cargo.toml
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod identity;
pub mod observability;
pub mod security_log;
pub mod signatures;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod types;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use acton_ingest::prelude::*;
    //! ```

    pub use crate::config::IngestConfig;
    pub use crate::coordinator::{
        BatchSnapshot, BatchSummary, RecordId, Removal, UploadCoordinator, UploadRecord,
        UploadStatus,
    };
    pub use crate::error::IngestError;
    pub use crate::identity::StorageIdentity;
    pub use crate::security_log::{
        SecurityEvent, SecurityEventCollector, SecurityEventKind, SecurityEventLogger,
    };
    pub use crate::transport::{
        HttpStorageCollaborator, ProgressReporter, StorageCollaborator, TransferProgress,
        TransmitRequest,
    };
    pub use crate::types::{
        TransmissionError, TransmissionFailureKind, UploadCandidate, UploadFailure,
        ValidationFailureKind, ValidationVerdict,
    };
    pub use crate::validation::{UploadValidator, ValidatedUpload};
}
