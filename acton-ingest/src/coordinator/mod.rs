//! Upload coordinator
//!
//! Owns every [`UploadRecord`] and drives each one through
//! `Pending -> Validating -> Uploading -> Success`, or into `Error`, on its own
//! Tokio task. Records never wait for each other except for the transfer
//! limit: a failing file only ever marks its own record.
//!
//! The batch is published as an immutable [`BatchSnapshot`] through a `watch`
//! channel. Every transition replaces the whole snapshot, so concurrent
//! completions of different records cannot interleave.
//!
//! # Removal
//!
//! [`UploadCoordinator::remove`] takes a [`Removal`] mode:
//!
//! - [`Removal::Detach`] drops the record from the batch and ignores anything
//!   that happens to it afterwards. The transfer itself runs to completion.
//! - [`Removal::Abort`] also aborts the record's task, dropping the in-flight
//!   transfer.
//!
//! # Examples
//!
//! ```rust,no_run
//! use acton_ingest::config::IngestConfig;
//! use acton_ingest::coordinator::UploadCoordinator;
//! use acton_ingest::types::UploadCandidate;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IngestConfig::load_for_service("cloud-spaces")?;
//! let coordinator = UploadCoordinator::from_config("team/reports", &config)?;
//!
//! coordinator.submit(UploadCandidate::new("q1.txt", "text/plain", b"numbers".to_vec()));
//!
//! let batch = coordinator.settled().await;
//! for location in batch.remote_locations() {
//!     println!("stored at {location}");
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
mod record;

pub use batch::{BatchSnapshot, BatchSummary};
pub use record::{InvalidTransition, RecordId, UploadRecord, UploadStatus};

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::identity::StorageIdentity;
use crate::security_log::{SecurityEventKind, SecurityEventLogger};
use crate::transport::{
    HttpStorageCollaborator, ProgressReporter, StorageCollaborator, TransmitRequest,
};
use crate::types::{CandidateMetadata, UploadCandidate, UploadFailure};
use crate::validation::UploadValidator;
use record::Transition;

/// Default number of records allowed to transmit at once
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 4;

/// How [`UploadCoordinator::remove`] treats a record that is still in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Removal {
    /// Stop tracking the record; an in-flight transfer continues
    #[default]
    Detach,
    /// Stop tracking the record and abort its in-flight transfer
    Abort,
}

struct Inner {
    destination: String,
    storage: Arc<dyn StorageCollaborator>,
    logger: SecurityEventLogger,
    validator: UploadValidator,
    transfers: Semaphore,
    batch: watch::Sender<BatchSnapshot>,
    tasks: Mutex<HashMap<RecordId, AbortHandle>>,
}

/// Builder for [`UploadCoordinator`]
pub struct UploadCoordinatorBuilder {
    destination: String,
    storage: Arc<dyn StorageCollaborator>,
    logger: SecurityEventLogger,
    max_concurrent_transfers: usize,
}

impl UploadCoordinatorBuilder {
    /// Sets the security event logger (defaults to local logging only)
    #[must_use]
    pub fn security_logger(mut self, logger: SecurityEventLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Sets how many records may transmit at once (minimum 1)
    #[must_use]
    pub const fn max_concurrent_transfers(mut self, limit: usize) -> Self {
        self.max_concurrent_transfers = limit;
        self
    }

    /// Builds the coordinator
    #[must_use]
    pub fn build(self) -> UploadCoordinator {
        let (batch, _) = watch::channel(BatchSnapshot::default());
        UploadCoordinator {
            inner: Arc::new(Inner {
                destination: self.destination,
                storage: self.storage,
                logger: self.logger,
                validator: UploadValidator::new(),
                transfers: Semaphore::new(
                    self.max_concurrent_transfers.clamp(1, Semaphore::MAX_PERMITS),
                ),
                batch,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Tracks a batch of uploads sharing one destination path
///
/// Cheap to clone; clones share the same batch.
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("destination", &self.inner.destination)
            .field("records", &self.inner.batch.borrow().len())
            .finish_non_exhaustive()
    }
}

impl UploadCoordinator {
    /// Starts building a coordinator for `destination`
    #[must_use]
    pub fn builder(
        destination: impl Into<String>,
        storage: Arc<dyn StorageCollaborator>,
    ) -> UploadCoordinatorBuilder {
        UploadCoordinatorBuilder {
            destination: destination.into(),
            storage,
            logger: SecurityEventLogger::disabled(),
            max_concurrent_transfers: DEFAULT_MAX_CONCURRENT_TRANSFERS,
        }
    }

    /// Creates a coordinator with the default transfer limit
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        storage: Arc<dyn StorageCollaborator>,
        logger: SecurityEventLogger,
    ) -> Self {
        Self::builder(destination, storage)
            .security_logger(logger)
            .build()
    }

    /// Creates a coordinator wired to the HTTP collaborators named in `config`
    ///
    /// Must be called from within a Tokio runtime when security event
    /// forwarding is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint is invalid or an HTTP client cannot be built.
    pub fn from_config(
        destination: impl Into<String>,
        config: &IngestConfig,
    ) -> Result<Self, IngestError> {
        let storage = HttpStorageCollaborator::new(&config.storage.upload_url)?;
        let logger = SecurityEventLogger::from_settings(&config.security_log)?;
        Ok(Self::builder(destination, Arc::new(storage))
            .security_logger(logger)
            .max_concurrent_transfers(config.coordinator.effective_concurrency())
            .build())
    }

    /// Destination path prefix, as supplied (sanitized per file at upload time)
    #[must_use]
    pub fn destination(&self) -> &str {
        &self.inner.destination
    }

    /// Submits one candidate and returns the id of its new record
    ///
    /// The record is visible in the batch as `Pending` before this returns.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, candidate: UploadCandidate) -> RecordId {
        let id = RecordId::new();
        let metadata = candidate.metadata().clone();

        // Held until the handle is stored, so the worker cannot deregister first
        let mut tasks = self.inner.tasks.lock();

        let record = UploadRecord::new(id, metadata.clone());
        self.inner
            .batch
            .send_modify(|snapshot| *snapshot = snapshot.with_record(record));

        debug!(
            "Queued upload {} for '{}' ({})",
            id,
            metadata.filename,
            metadata.display_size()
        );

        let span = info_span!("upload", record_id = %id, file = %metadata.filename);
        let worker = Worker {
            inner: Arc::clone(&self.inner),
            id,
            metadata,
        };
        let handle = tokio::spawn(worker.run(candidate).instrument(span));
        tasks.insert(id, handle.abort_handle());

        id
    }

    /// Submits several candidates, returning their record ids in order
    pub fn submit_all<I>(&self, candidates: I) -> Vec<RecordId>
    where
        I: IntoIterator<Item = UploadCandidate>,
    {
        candidates
            .into_iter()
            .map(|candidate| self.submit(candidate))
            .collect()
    }

    /// Current batch
    #[must_use]
    pub fn snapshot(&self) -> BatchSnapshot {
        self.inner.batch.borrow().clone()
    }

    /// Receiver notified after every batch change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.inner.batch.subscribe()
    }

    /// Current state of one record
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<UploadRecord> {
        self.inner.batch.borrow().get(id).cloned()
    }

    /// Number of upload tasks still running
    ///
    /// Detached records count until their transfer ends.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// Removes a record from the batch
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::RecordNotFound`] if the record is not tracked.
    pub fn remove(&self, id: RecordId, mode: Removal) -> Result<UploadRecord, IngestError> {
        let mut removed = None;
        self.inner.batch.send_if_modified(|snapshot| {
            match snapshot.without_record(id) {
                Some((next, record)) => {
                    *snapshot = next;
                    removed = Some(record);
                    true
                }
                None => false,
            }
        });
        let record = removed.ok_or(IngestError::RecordNotFound(id))?;

        let running = {
            let mut tasks = self.inner.tasks.lock();
            match mode {
                Removal::Abort => match tasks.remove(&id) {
                    Some(handle) => {
                        handle.abort();
                        true
                    }
                    None => false,
                },
                // The worker deregisters itself once the transfer ends
                Removal::Detach => tasks.contains_key(&id),
            }
        };
        match (mode, running) {
            (Removal::Abort, true) => {
                info!("Aborted upload {} ('{}')", id, record.metadata().filename);
            }
            (Removal::Detach, true) => {
                info!(
                    "Detached upload {} ('{}'); transfer continues",
                    id,
                    record.metadata().filename
                );
            }
            (_, false) => debug!("Removed settled upload {}", id),
        }

        Ok(record)
    }

    /// Waits until record `id` reaches a terminal state
    ///
    /// Returns `None` if the record is not tracked or is removed while waiting.
    pub async fn wait_for_record(&self, id: RecordId) -> Option<UploadRecord> {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|snapshot| snapshot.get(id).is_none_or(|r| r.status().is_terminal()))
            .await;
        match result {
            Ok(snapshot) => snapshot.get(id).cloned(),
            Err(_) => None,
        }
    }

    /// Waits until every tracked record reaches a terminal state
    pub async fn settled(&self) -> BatchSnapshot {
        let mut rx = self.subscribe();
        let result = rx.wait_for(BatchSnapshot::is_settled).await;
        match result {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }
}

impl Inner {
    /// Publishes a transition; returns false if nothing changed
    fn apply(&self, id: RecordId, transition: Transition) -> bool {
        let mut applied = false;
        self.batch.send_if_modified(|snapshot| {
            match snapshot.advanced(id, transition) {
                Ok(Some(next)) => {
                    *snapshot = next;
                    applied = true;
                }
                Ok(None) => {}
                Err(e) => error!("Upload {} rejected a transition: {}", id, e),
            }
            applied
        });
        applied
    }
}

/// Drives one record from `Validating` to a terminal state
struct Worker {
    inner: Arc<Inner>,
    id: RecordId,
    metadata: CandidateMetadata,
}

impl Worker {
    async fn run(self, candidate: UploadCandidate) {
        let mut identity = None;
        let outcome = AssertUnwindSafe(self.pipeline(candidate, &mut identity))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(UploadFailure::Interrupted("upload task panicked".to_string()))
            });

        self.finish(outcome, identity.as_ref());
        self.inner.tasks.lock().remove(&self.id);
    }

    async fn pipeline(
        &self,
        candidate: UploadCandidate,
        identity: &mut Option<StorageIdentity>,
    ) -> Result<String, UploadFailure> {
        self.inner.apply(self.id, Transition::BeginValidation);

        let validator = self.inner.validator;
        let destination = self.inner.destination.clone();
        let request = tokio::task::spawn_blocking(move || {
            validator.admit(candidate).map(|upload| {
                let identity = StorageIdentity::derive(&upload, &destination);
                TransmitRequest::new(upload, identity)
            })
        })
        .await
        .map_err(|e| UploadFailure::Interrupted(format!("validation task failed: {e}")))?
        .map_err(|(kind, detail)| UploadFailure::Validation { kind, detail })?;

        debug!(
            "Validated as '{}' under '{}' (sha256 {})",
            request.secure_filename(),
            request.sanitized_path(),
            request.checksum_hex()
        );
        *identity = Some(request.identity().clone());
        self.inner.apply(self.id, Transition::BeginUpload);

        let _permit = self
            .inner
            .transfers
            .acquire()
            .await
            .map_err(|_| UploadFailure::Interrupted("transfer limiter closed".to_string()))?;

        let (reporter, mut progress) = ProgressReporter::channel();
        let mut transmit = self.inner.storage.transmit(request, reporter);

        loop {
            tokio::select! {
                result = &mut transmit => return result.map_err(UploadFailure::from),
                changed = progress.changed() => {
                    if changed.is_err() {
                        return transmit.await.map_err(UploadFailure::from);
                    }
                    let percent = progress.borrow_and_update().percent();
                    if self.inner.apply(self.id, Transition::Progress(percent)) {
                        trace!("Upload progress {}%", percent);
                    }
                }
            }
        }
    }

    fn finish(
        &self,
        outcome: Result<String, UploadFailure>,
        identity: Option<&StorageIdentity>,
    ) {
        match outcome {
            Ok(remote_location) => {
                info!("Upload stored at {}", remote_location);
                self.inner
                    .apply(self.id, Transition::Succeed(remote_location));
            }
            Err(failure) => {
                let event_kind = if failure.validation_kind().is_some() {
                    SecurityEventKind::ValidationFailed
                } else {
                    SecurityEventKind::UploadFailed
                };
                warn!("Upload failed: {}", failure);

                let mut detail = json!({
                    "recordId": self.id,
                    "fileName": self.metadata.filename,
                    "mimeType": self.metadata.mime_type,
                    "size": self.metadata.length,
                    "reason": failure.code(),
                    "error": failure.to_string(),
                });
                if let Some(identity) = identity {
                    detail["secureName"] = json!(identity.secure_name);
                    detail["checksum"] = json!(identity.checksum);
                }
                self.inner.apply(self.id, Transition::Fail(failure));
                self.inner.logger.report(event_kind, detail);
            }
        }
    }
}
