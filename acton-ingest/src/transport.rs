//! Storage collaborator abstraction and HTTP implementation
//!
//! The coordinator never talks to the network itself. It hands a
//! [`TransmitRequest`] and a per-record [`ProgressReporter`] to a
//! [`StorageCollaborator`], which owns the transport framing.
//!
//! A `TransmitRequest` can only be built from a
//! [`ValidatedUpload`](crate::validation::ValidatedUpload), so a candidate the
//! gate rejected has no way to reach an implementation of this trait.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::IngestError;
use crate::identity::StorageIdentity;
use crate::types::TransmissionError;
use crate::validation::ValidatedUpload;

/// Size of the body chunks handed to the HTTP transport
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Everything a storage collaborator needs to store one file
#[derive(Debug, Clone)]
pub struct TransmitRequest {
    content: Bytes,
    mime_type: String,
    identity: StorageIdentity,
}

impl TransmitRequest {
    /// Builds a request from a validated upload and its derived identity
    #[must_use]
    pub fn new(upload: ValidatedUpload, identity: StorageIdentity) -> Self {
        let candidate = upload.into_candidate();
        Self {
            mime_type: candidate.mime_type().to_string(),
            content: candidate.content().clone(),
            identity,
        }
    }

    /// Exact validated bytes
    #[must_use]
    pub const fn content(&self) -> &Bytes {
        &self.content
    }

    /// Declared MIME type
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Storage name
    #[must_use]
    pub fn secure_filename(&self) -> &str {
        &self.identity.secure_name
    }

    /// Sanitized destination path
    #[must_use]
    pub fn sanitized_path(&self) -> &str {
        &self.identity.path
    }

    /// Hex-encoded SHA-256 of [`content`](Self::content)
    #[must_use]
    pub fn checksum_hex(&self) -> &str {
        &self.identity.checksum
    }

    /// Full derived identity
    #[must_use]
    pub const fn identity(&self) -> &StorageIdentity {
        &self.identity
    }
}

/// Bytes acknowledged by the transport so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes transferred
    pub transferred: u64,
    /// Total bytes to transfer
    pub total: u64,
}

impl TransferProgress {
    /// Completion percentage, rounded, clamped to 100
    ///
    /// A zero total is treated as one byte so that an empty body reports 0
    /// until it is done.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use acton_ingest::transport::TransferProgress;
    ///
    /// let progress = TransferProgress { transferred: 1, total: 3 };
    /// assert_eq!(progress.percent(), 33);
    /// ```
    #[must_use]
    pub fn percent(self) -> u8 {
        let total = u128::from(self.total.max(1));
        let transferred = u128::from(self.transferred.min(self.total.max(1)));
        let percent = (transferred * 100 + total / 2) / total;
        u8::try_from(percent.min(100)).unwrap_or(100)
    }
}

/// Per-record progress channel handed to the collaborator
///
/// Backed by a `watch` channel: reporting never blocks and the coordinator
/// always sees the latest value. Each record gets its own reporter, so
/// concurrent uploads cannot report into each other's records.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<TransferProgress>,
}

impl ProgressReporter {
    /// Creates a reporter and the receiving end
    #[must_use]
    pub fn channel() -> (Self, watch::Receiver<TransferProgress>) {
        let (tx, rx) = watch::channel(TransferProgress::default());
        (Self { tx }, rx)
    }

    /// Creates a reporter nobody listens to
    #[must_use]
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Publishes the number of bytes transferred so far
    pub fn report(&self, transferred: u64, total: u64) {
        self.tx.send_replace(TransferProgress { transferred, total });
    }
}

/// Abstraction for the remote storage collaborator
///
/// Implementations must report progress through the given reporter while
/// transferring, and return the remote location of the stored file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorageCollaborator: Send + Sync {
    /// Transmits one validated file
    ///
    /// # Errors
    ///
    /// Returns a [`TransmissionError`] for network failures and server rejections.
    async fn transmit(
        &self,
        request: TransmitRequest,
        progress: ProgressReporter,
    ) -> Result<String, TransmissionError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Storage collaborator that posts `multipart/form-data` to an HTTP endpoint
///
/// The form carries three parts: `file` (named with the secure filename),
/// `path` and `checksum`. A 2xx reply must be JSON of the form
/// `{ "url": "..." }`.
///
/// # Examples
///
/// ```rust,no_run
/// use acton_ingest::transport::HttpStorageCollaborator;
///
/// # fn example() -> Result<(), acton_ingest::error::IngestError> {
/// let storage = HttpStorageCollaborator::new("https://files.example.com/files/upload")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpStorageCollaborator {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStorageCollaborator {
    /// Creates a collaborator posting to `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, IngestError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| IngestError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, endpoint })
    }

    /// Returns the upload endpoint
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn file_part(
        request: &TransmitRequest,
        progress: ProgressReporter,
    ) -> Result<Part, TransmissionError> {
        let total = request.content().len() as u64;
        let body = reqwest::Body::wrap_stream(progress_stream(request.content().clone(), progress));

        Part::stream_with_length(body, total)
            .file_name(request.secure_filename().to_string())
            .mime_str(request.mime_type())
            .map_err(|e| TransmissionError::network(format!("invalid content type: {e}")))
    }
}

/// Splits `content` into chunks, reporting progress as each one is pulled
fn progress_stream(
    content: Bytes,
    progress: ProgressReporter,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = content.len() as u64;
    let chunks: Vec<Bytes> = (0..content.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| content.slice(start..(start + UPLOAD_CHUNK_SIZE).min(content.len())))
        .collect();

    let mut sent = 0_u64;
    futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len() as u64;
        progress.report(sent, total);
        Ok::<Bytes, std::io::Error>(chunk)
    }))
}

#[async_trait]
impl StorageCollaborator for HttpStorageCollaborator {
    async fn transmit(
        &self,
        request: TransmitRequest,
        progress: ProgressReporter,
    ) -> Result<String, TransmissionError> {
        let form = Form::new()
            .part("file", Self::file_part(&request, progress)?)
            .text("path", request.sanitized_path().to_string())
            .text("checksum", request.checksum_hex().to_string());

        debug!(
            "Posting '{}' ({} bytes) to {}",
            request.secure_filename(),
            request.content().len(),
            self.endpoint
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransmissionError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransmissionError::rejected(format!("HTTP {status}: {body}")));
        }

        let reply: UploadResponse = response
            .json()
            .await
            .map_err(|e| TransmissionError::rejected(format!("malformed upload response: {e}")))?;

        Ok(reply.url)
    }
}
