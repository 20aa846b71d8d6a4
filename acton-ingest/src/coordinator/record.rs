//! Upload record state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{CandidateMetadata, UploadFailure};

/// Unique identifier of an upload record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a new random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of one upload
///
/// `Pending -> Validating -> {Error | (Uploading -> {Success | Error})}`.
/// `Success` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadStatus {
    /// Record created, worker not started yet
    #[default]
    Pending,

    /// Validation gate is running
    Validating,

    /// Validated; bytes are being transmitted
    Uploading {
        /// Transmission progress, 0 to 100
        progress_percent: u8,
    },

    /// Stored by the collaborator
    Success {
        /// Where the collaborator stored the file
        remote_location: String,
    },

    /// Rejected or failed
    Error {
        /// What went wrong
        failure: UploadFailure,
    },
}

impl UploadStatus {
    /// Check if the record is in a terminal state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Error { .. })
    }

    /// Get a short status name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Uploading { .. } => "uploading",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }

    /// Progress in percent
    ///
    /// 0 before the upload starts, the reported value while uploading, 100
    /// after success and `None` after an error.
    #[must_use]
    pub const fn progress_percent(&self) -> Option<u8> {
        match self {
            Self::Pending | Self::Validating => Some(0),
            Self::Uploading { progress_percent } => Some(*progress_percent),
            Self::Success { .. } => Some(100),
            Self::Error { .. } => None,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Step requested by the coordinator's worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    BeginValidation,
    BeginUpload,
    Progress(u8),
    Succeed(String),
    Fail(UploadFailure),
}

impl Transition {
    const fn name(&self) -> &'static str {
        match self {
            Self::BeginValidation => "begin_validation",
            Self::BeginUpload => "begin_upload",
            Self::Progress(_) => "progress",
            Self::Succeed(_) => "succeed",
            Self::Fail(_) => "fail",
        }
    }
}

/// A transition that would move a record backwards or out of a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply '{transition}' to a record in state '{from}'")]
pub struct InvalidTransition {
    /// State the record was in
    pub from: &'static str,
    /// Rejected transition
    pub transition: &'static str,
}

/// Tracked lifecycle of one submitted candidate
///
/// Records are read-only outside the coordinator; callers observe them
/// through [`BatchSnapshot`](super::BatchSnapshot)s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    id: RecordId,
    metadata: CandidateMetadata,
    status: UploadStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub(crate) fn new(id: RecordId, metadata: CandidateMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            metadata,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record identifier
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Display metadata of the submitted file
    #[must_use]
    pub const fn metadata(&self) -> &CandidateMetadata {
        &self.metadata
    }

    /// Current state
    #[must_use]
    pub const fn status(&self) -> &UploadStatus {
        &self.status
    }

    /// Progress in percent, see [`UploadStatus::progress_percent`]
    #[must_use]
    pub const fn progress_percent(&self) -> Option<u8> {
        self.status.progress_percent()
    }

    /// Remote location after success
    #[must_use]
    pub fn remote_location(&self) -> Option<&str> {
        match &self.status {
            UploadStatus::Success { remote_location } => Some(remote_location),
            _ => None,
        }
    }

    /// Failure after an error
    #[must_use]
    pub const fn failure(&self) -> Option<&UploadFailure> {
        match &self.status {
            UploadStatus::Error { failure } => Some(failure),
            _ => None,
        }
    }

    /// Human-readable failure reason after an error
    #[must_use]
    pub fn error_detail(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }

    /// When the record was created
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the record last changed
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies a transition
    ///
    /// Returns `Ok(false)` for progress that would not move the bar forward.
    pub(crate) fn advance(&mut self, transition: Transition) -> Result<bool, InvalidTransition> {
        let next = match (&self.status, transition) {
            (UploadStatus::Pending, Transition::BeginValidation) => UploadStatus::Validating,
            (UploadStatus::Validating, Transition::BeginUpload) => UploadStatus::Uploading {
                progress_percent: 0,
            },
            (UploadStatus::Uploading { progress_percent }, Transition::Progress(percent)) => {
                let percent = percent.min(100);
                if percent <= *progress_percent {
                    return Ok(false);
                }
                UploadStatus::Uploading {
                    progress_percent: percent,
                }
            }
            (UploadStatus::Uploading { .. }, Transition::Succeed(remote_location)) => {
                UploadStatus::Success { remote_location }
            }
            (
                UploadStatus::Validating | UploadStatus::Uploading { .. },
                Transition::Fail(failure),
            ) => UploadStatus::Error { failure },
            (status, transition) => {
                return Err(InvalidTransition {
                    from: status.name(),
                    transition: transition.name(),
                })
            }
        };

        self.status = next;
        self.updated_at = Utc::now();
        Ok(true)
    }
}
