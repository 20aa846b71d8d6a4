//! Security event logger
//!
//! Best-effort audit trail for rejected and failed uploads. Reporting is
//! fire-and-forget: [`SecurityEventLogger::report`] writes a `warn!` line,
//! pushes the event onto a bounded queue with `try_send` and returns. A
//! background task drains the queue into a [`SecurityEventCollector`]; its
//! failures are logged at `debug` and otherwise ignored. A full queue drops
//! the event rather than wait.
//!
//! # Examples
//!
//! ```rust
//! use acton_ingest::security_log::{SecurityEventKind, SecurityEventLogger};
//! use serde_json::json;
//!
//! let logger = SecurityEventLogger::disabled();
//! logger.report(SecurityEventKind::ValidationFailed, json!({ "fileName": "a.exe" }));
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SecurityLogSettings;
use crate::error::IngestError;

/// Category of a security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// A candidate was rejected by the validation gate
    ValidationFailed,
    /// A validated file could not be stored
    UploadFailed,
}

impl SecurityEventKind {
    /// Wire name of the event kind
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::UploadFailed => "upload_failed",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One audit record, serialized as `{ "eventKind", "detail", "timestamp" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    /// Event category
    pub event_kind: SecurityEventKind,
    /// Free-form structured detail
    pub detail: serde_json::Value,
    /// When the event was reported
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Creates an event stamped with the current time
    #[must_use]
    pub fn new(event_kind: SecurityEventKind, detail: serde_json::Value) -> Self {
        Self {
            event_kind,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// External sink for security events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecurityEventCollector: Send + Sync {
    /// Delivers one event
    ///
    /// # Errors
    ///
    /// Returns a description of the delivery failure. The logger ignores it.
    async fn collect(&self, event: SecurityEvent) -> Result<(), String>;
}

/// Non-blocking reporter of security events
///
/// Cheap to clone; all clones feed the same queue.
#[derive(Debug, Clone)]
pub struct SecurityEventLogger {
    tx: Option<mpsc::Sender<SecurityEvent>>,
}

impl SecurityEventLogger {
    /// Starts a logger draining into `collector`
    ///
    /// Must be called from within a Tokio runtime. The drain task stops once
    /// every clone of the logger has been dropped.
    #[must_use]
    pub fn spawn(collector: Arc<dyn SecurityEventCollector>, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SecurityEvent>(queue_capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let kind = event.event_kind;
                if let Err(e) = collector.collect(event).await {
                    debug!("Security event '{}' was not delivered: {}", kind, e);
                }
            }
        });

        Self { tx: Some(tx) }
    }

    /// Creates a logger that only writes local log lines
    #[must_use]
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Builds a logger from configuration, posting to the configured endpoint
    ///
    /// Must be called from within a Tokio runtime when forwarding is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is invalid or the HTTP client cannot be built.
    pub fn from_settings(settings: &SecurityLogSettings) -> Result<Self, IngestError> {
        if !settings.enabled {
            return Ok(Self::disabled());
        }
        let collector = HttpSecurityEventCollector::new(&settings.endpoint)?;
        Ok(Self::spawn(Arc::new(collector), settings.queue_capacity))
    }

    /// Reports an event without blocking
    pub fn report(&self, event_kind: SecurityEventKind, detail: serde_json::Value) {
        warn!(event_kind = %event_kind, detail = %detail, "Security event");

        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(SecurityEvent::new(event_kind, detail)) {
            debug!("Security event '{}' dropped: {}", event_kind, e);
        }
    }
}

/// Collector posting each event as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpSecurityEventCollector {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpSecurityEventCollector {
    /// Creates a collector posting to `endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL or the HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, IngestError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| IngestError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SecurityEventCollector for HttpSecurityEventCollector {
    async fn collect(&self, event: SecurityEvent) -> Result<(), String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&event)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("collector answered HTTP {}", response.status()))
        }
    }
}
