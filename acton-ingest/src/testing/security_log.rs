//! Recording security event collector

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use crate::security_log::{SecurityEvent, SecurityEventCollector, SecurityEventKind};

/// Security event collector that keeps every event in memory
#[derive(Debug, Clone)]
pub struct RecordingSecurityCollector {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    count: Arc<watch::Sender<usize>>,
}

impl Default for RecordingSecurityCollector {
    fn default() -> Self {
        Self {
            events: Arc::default(),
            count: Arc::new(watch::Sender::new(0)),
        }
    }
}

impl RecordingSecurityCollector {
    /// Create a new recording collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far
    #[must_use]
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }

    /// Number of events of `kind` received so far
    #[must_use]
    pub fn count_of(&self, kind: SecurityEventKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.event_kind == kind)
            .count()
    }

    /// Waits until at least `count` events have arrived
    pub async fn wait_for_events(&self, count: usize) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|received| *received >= count).await;
    }
}

#[async_trait]
impl SecurityEventCollector for RecordingSecurityCollector {
    async fn collect(&self, event: SecurityEvent) -> Result<(), String> {
        self.events.lock().push(event);
        self.count.send_modify(|count| *count += 1);
        Ok(())
    }
}
