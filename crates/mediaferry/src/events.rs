// Copyright 2026 Mediaferry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pipeline event bus.
//!
//! A `tokio::sync::broadcast` channel carrying [`PipelineEvent`] values.
//! The SSE endpoint and tests subscribe independently. With no subscribers
//! events are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ErrorClass;
use crate::job::{JobPhase, MediaKind};

/// Every event the pipeline emits. Serialized to JSON for SSE streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    // ── Lifecycle ─────────────────────────
    JobQueued {
        job_id: String,
        media_kind: MediaKind,
        timestamp: String,
    },
    PhaseChanged {
        job_id: String,
        from: JobPhase,
        to: JobPhase,
    },

    // ── Extraction ────────────────────────
    AttemptStarted {
        job_id: String,
        attempt: usize,
        strategy: String,
    },
    AttemptFailed {
        job_id: String,
        attempt: usize,
        strategy: String,
        class: ErrorClass,
        error: String,
        elapsed_ms: u64,
    },
    ArtifactLocated {
        job_id: String,
        file_name: String,
        byte_len: u64,
    },

    // ── Delivery ──────────────────────────
    Uploaded {
        job_id: String,
        storage_key: String,
        byte_size: u64,
        elapsed_ms: u64,
    },

    // ── Terminal ──────────────────────────
    JobSucceeded {
        job_id: String,
        public_url: String,
        attempts: usize,
        total_ms: u64,
    },
    JobFailed {
        job_id: String,
        kind: String,
        error: String,
        attempts: usize,
        total_ms: u64,
    },
    /// Outcome of a webhook send. Never affects the job.
    NotificationSent {
        job_id: String,
        status: String,
        delivered: bool,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            PipelineEvent::JobQueued { job_id, .. }
            | PipelineEvent::PhaseChanged { job_id, .. }
            | PipelineEvent::AttemptStarted { job_id, .. }
            | PipelineEvent::AttemptFailed { job_id, .. }
            | PipelineEvent::ArtifactLocated { job_id, .. }
            | PipelineEvent::Uploaded { job_id, .. }
            | PipelineEvent::JobSucceeded { job_id, .. }
            | PipelineEvent::JobFailed { job_id, .. }
            | PipelineEvent::NotificationSent { job_id, .. } => job_id,
        }
    }
}

/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// `None` matches every event.
pub fn event_matches_job(event: &PipelineEvent, job_id: Option<&str>) -> bool {
    job_id.map_or(true, |id| event.job_id() == id)
}

/// RFC 3339 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(job_id: &str) -> PipelineEvent {
        PipelineEvent::JobQueued {
            job_id: job_id.to_string(),
            media_kind: MediaKind::Audio,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PipelineEvent::AttemptFailed {
            job_id: "asset-1".into(),
            attempt: 1,
            strategy: "ios-app".into(),
            class: ErrorClass::Transient,
            error: "timed out".into(),
            elapsed_ms: 1200,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AttemptFailed");
        assert_eq!(json["class"], "transient");

        let parsed: PipelineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(queued("asset-1"));
    }

    #[test]
    fn test_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.clone().emit(queued("asset-1"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.job_id(), "asset-1");
    }

    #[test]
    fn test_event_matches_job() {
        let event = queued("asset-1");
        assert!(event_matches_job(&event, Some("asset-1")));
        assert!(!event_matches_job(&event, Some("asset-2")));
        assert!(event_matches_job(&event, None));
    }
}
