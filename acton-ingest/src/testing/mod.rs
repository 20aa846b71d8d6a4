//! Testing utilities
//!
//! In-memory collaborators for exercising an [`UploadCoordinator`] without a
//! network.
//!
//! [`UploadCoordinator`]: crate::coordinator::UploadCoordinator

#[cfg(test)]
pub(crate) mod http;
mod security_log;
mod storage;

pub use security_log::RecordingSecurityCollector;
pub use storage::RecordingStorage;
