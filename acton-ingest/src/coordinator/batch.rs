//! Immutable batch snapshots

use serde::Serialize;
use std::sync::Arc;

use super::record::{InvalidTransition, RecordId, Transition, UploadRecord, UploadStatus};

/// Point-in-time view of every tracked record, in submission order
///
/// Snapshots are never mutated. Each change builds a new snapshot and
/// publishes it as a whole, so a reader never observes a record half-way
/// through an update. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSnapshot {
    records: Arc<Vec<UploadRecord>>,
}

/// Record counts by state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Records not started yet
    pub pending: usize,
    /// Records being validated
    pub validating: usize,
    /// Records being transmitted
    pub uploading: usize,
    /// Records stored successfully
    pub succeeded: usize,
    /// Records that ended in an error
    pub failed: usize,
}

impl BatchSummary {
    /// Total number of records
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.validating + self.uploading + self.succeeded + self.failed
    }
}

impl BatchSnapshot {
    /// All records in submission order
    #[must_use]
    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    /// Looks up a record by id
    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&UploadRecord> {
        self.records.iter().find(|record| record.id() == id)
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no record is tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if every record reached a terminal state
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.records.iter().all(|record| record.status().is_terminal())
    }

    /// Remote locations of the succeeded records, in submission order
    #[must_use]
    pub fn remote_locations(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter_map(UploadRecord::remote_location)
            .collect()
    }

    /// Counts records by state
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        self.records
            .iter()
            .fold(BatchSummary::default(), |mut summary, record| {
                match record.status() {
                    UploadStatus::Pending => summary.pending += 1,
                    UploadStatus::Validating => summary.validating += 1,
                    UploadStatus::Uploading { .. } => summary.uploading += 1,
                    UploadStatus::Success { .. } => summary.succeeded += 1,
                    UploadStatus::Error { .. } => summary.failed += 1,
                }
                summary
            })
    }

    pub(crate) fn with_record(&self, record: UploadRecord) -> Self {
        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.extend(self.records.iter().cloned());
        records.push(record);
        Self {
            records: Arc::new(records),
        }
    }

    pub(crate) fn without_record(&self, id: RecordId) -> Option<(Self, UploadRecord)> {
        let index = self.records.iter().position(|record| record.id() == id)?;
        let mut records = self.records.as_ref().clone();
        let removed = records.remove(index);
        Some((
            Self {
                records: Arc::new(records),
            },
            removed,
        ))
    }

    /// Builds the snapshot that results from applying `transition` to record `id`
    ///
    /// `Ok(None)` means nothing changed: the record is no longer tracked, or
    /// the transition was a no-op.
    pub(crate) fn advanced(
        &self,
        id: RecordId,
        transition: Transition,
    ) -> Result<Option<Self>, InvalidTransition> {
        let Some(index) = self.records.iter().position(|record| record.id() == id) else {
            return Ok(None);
        };

        let mut updated = self.records[index].clone();
        if !updated.advance(transition)? {
            return Ok(None);
        }

        let mut records = self.records.as_ref().clone();
        records[index] = updated;
        Ok(Some(Self {
            records: Arc::new(records),
        }))
    }
}
