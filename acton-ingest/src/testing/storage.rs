//! Recording storage collaborator

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::transport::{ProgressReporter, StorageCollaborator, TransmitRequest};
use crate::types::TransmissionError;

/// Storage collaborator that keeps every request in memory
///
/// Succeeds with `{base_url}/{path}/{secure_name}` unless a failure was
/// scripted for the request's content. Progress is reported at half-way and
/// at completion. A paused collaborator holds every transfer until
/// [`release`](Self::release) is called.
///
/// # Examples
///
/// ```rust
/// use acton_ingest::coordinator::UploadCoordinator;
/// use acton_ingest::testing::RecordingStorage;
/// use acton_ingest::types::UploadCandidate;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let storage = RecordingStorage::new();
/// let coordinator = UploadCoordinator::builder("docs", Arc::new(storage.clone())).build();
///
/// let id = coordinator.submit(UploadCandidate::new("a.txt", "text/plain", b"hi".to_vec()));
/// coordinator.wait_for_record(id).await;
///
/// assert_eq!(storage.request_count(), 1);
/// assert_eq!(storage.requests()[0].sanitized_path(), "docs");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RecordingStorage {
    state: Arc<State>,
}

#[derive(Debug)]
struct State {
    base_url: String,
    requests: Mutex<Vec<TransmitRequest>>,
    failures: Mutex<Vec<(Bytes, TransmissionError)>>,
    gate: Option<Semaphore>,
    started: watch::Sender<usize>,
    completed: watch::Sender<usize>,
}

impl Default for RecordingStorage {
    fn default() -> Self {
        Self::with_gate(None)
    }
}

impl RecordingStorage {
    /// Creates a collaborator that completes every transfer immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collaborator that holds every transfer until released
    #[must_use]
    pub fn paused() -> Self {
        Self::with_gate(Some(Semaphore::new(0)))
    }

    fn with_gate(gate: Option<Semaphore>) -> Self {
        Self {
            state: Arc::new(State {
                base_url: "https://storage.test".to_string(),
                requests: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
                gate,
                started: watch::Sender::new(0),
                completed: watch::Sender::new(0),
            }),
        }
    }

    /// Fails every transfer whose content equals `content`
    #[must_use]
    pub fn fail_content(self, content: impl Into<Bytes>, error: TransmissionError) -> Self {
        self.state.failures.lock().push((content.into(), error));
        self
    }

    /// Lets `count` held transfers proceed
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.state.gate {
            gate.add_permits(count);
        }
    }

    /// Every request received so far, in arrival order
    #[must_use]
    pub fn requests(&self) -> Vec<TransmitRequest> {
        self.state.requests.lock().clone()
    }

    /// Number of requests received
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// True if a request carried exactly these bytes
    #[must_use]
    pub fn received_content(&self, content: &[u8]) -> bool {
        self.state
            .requests
            .lock()
            .iter()
            .any(|request| request.content().as_ref() == content)
    }

    /// Number of transfers that ran to completion
    #[must_use]
    pub fn completed_count(&self) -> usize {
        *self.state.completed.borrow()
    }

    /// Waits until at least `count` transfers have started
    pub async fn wait_for_started(&self, count: usize) {
        let mut rx = self.state.started.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = rx.wait_for(|started| *started >= count).await;
    }

    /// Waits until at least `count` transfers have completed
    pub async fn wait_for_completed(&self, count: usize) {
        let mut rx = self.state.completed.subscribe();
        let _ = rx.wait_for(|completed| *completed >= count).await;
    }
}

#[async_trait]
impl StorageCollaborator for RecordingStorage {
    async fn transmit(
        &self,
        request: TransmitRequest,
        progress: ProgressReporter,
    ) -> Result<String, TransmissionError> {
        self.state.requests.lock().push(request.clone());
        self.state.started.send_modify(|started| *started += 1);

        if let Some(gate) = &self.state.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let total = request.content().len() as u64;
        progress.report(total / 2, total);
        tokio::task::yield_now().await;
        progress.report(total, total);

        let failure = self
            .state
            .failures
            .lock()
            .iter()
            .find(|(content, _)| content == request.content())
            .map(|(_, error)| error.clone());

        self.state.completed.send_modify(|completed| *completed += 1);

        match failure {
            Some(error) => Err(error),
            None => Ok(format!(
                "{}/{}/{}",
                self.state.base_url,
                request.sanitized_path(),
                request.secure_filename()
            )),
        }
    }
}
