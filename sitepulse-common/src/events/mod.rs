//! Event types for the SitePulse event system
//!
//! Provides shared audit lifecycle events and the EventBus used to fan
//! them out to SSE subscribers and other in-process listeners.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::AuditType;

/// Audit lifecycle events
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// All events carry the analysis id so subscribers can filter per audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuditEvent {
    /// An audit was accepted and its bundle record created
    ///
    /// Triggers:
    /// - SSE: show the new audit as processing
    AuditStarted {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Target URL under audit
        url: String,
        /// When orchestration began
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage began executing (its run record moved to running)
    ///
    /// Triggers:
    /// - SSE: per-stage progress display
    StageStarted {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Which dimension started
        audit_type: AuditType,
        /// Attempt number, 1-based
        attempt: u32,
        /// When the attempt started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage finished successfully
    ///
    /// Triggers:
    /// - SSE: per-stage progress display
    StageCompleted {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Which dimension completed
        audit_type: AuditType,
        /// Wall-clock duration of the final attempt in milliseconds
        duration_ms: u64,
        /// When the stage completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stage failed or timed out; the pipeline continues without it
    ///
    /// Triggers:
    /// - SSE: mark the category degraded
    StageFailed {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Which dimension failed
        audit_type: AuditType,
        /// Terminal status string ("failed" or "timeout")
        status: String,
        /// Captured error message
        error: String,
        /// When the stage reached its terminal state
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The audit finished and its scores were computed
    ///
    /// Triggers:
    /// - SSE: render final scores
    AuditCompleted {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Weighted composite score, 0-100
        composite_score: i64,
        /// Total wall-clock seconds for the whole pipeline
        total_seconds: f64,
        /// When the audit completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The audit aborted before results could be assembled
    ///
    /// Only emitted for fatal (non-stage) failures such as the bundle
    /// record itself being unpersistable.
    AuditFailed {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// Fatal error description
        error: String,
        /// When the audit failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The audit was cancelled by the caller
    ///
    /// Triggers:
    /// - SSE: show cancelled state; in-flight stages finish as timeout
    AuditCancelled {
        /// Analysis bundle UUID
        analysis_id: Uuid,
        /// When cancellation was requested
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AuditEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            AuditEvent::AuditStarted { .. } => "AuditStarted",
            AuditEvent::StageStarted { .. } => "StageStarted",
            AuditEvent::StageCompleted { .. } => "StageCompleted",
            AuditEvent::StageFailed { .. } => "StageFailed",
            AuditEvent::AuditCompleted { .. } => "AuditCompleted",
            AuditEvent::AuditFailed { .. } => "AuditFailed",
            AuditEvent::AuditCancelled { .. } => "AuditCancelled",
        }
    }

    /// The analysis this event belongs to
    pub fn analysis_id(&self) -> Uuid {
        match self {
            AuditEvent::AuditStarted { analysis_id, .. }
            | AuditEvent::StageStarted { analysis_id, .. }
            | AuditEvent::StageCompleted { analysis_id, .. }
            | AuditEvent::StageFailed { analysis_id, .. }
            | AuditEvent::AuditCompleted { analysis_id, .. }
            | AuditEvent::AuditFailed { analysis_id, .. }
            | AuditEvent::AuditCancelled { analysis_id, .. } => *analysis_id,
        }
    }
}

/// Broadcast bus for audit events
///
/// Wraps a tokio broadcast channel. Slow subscribers may lose events
/// (broadcast semantics); the database remains the record of truth.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuditEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AuditEvent,
    ) -> Result<usize, broadcast::error::SendError<AuditEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress events are advisory; persistence does not depend on them.
    pub fn emit_lossy(&self, event: AuditEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
