//! Audit run execution records
//!
//! One `AuditRun` per stage attempt sequence. Status transitions are
//! monotonic: `pending -> running -> {completed, failed, timeout}`,
//! never reverse, never skip `running`. The rows form an append-only
//! execution log owned by the parent analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use sitepulse_common::AuditType;

/// Run status state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not yet invoked
    Pending,
    /// Stage invocation in flight
    Running,
    /// Stage returned a structured result
    Completed,
    /// Stage returned an error
    Failed,
    /// Stage exceeded its deadline or was cancelled mid-flight
    Timeout,
}

impl RunStatus {
    /// Stable string form used in database rows and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        }
    }

    /// Parse the database string form back into the enum
    pub fn parse(s: &str) -> sitepulse_common::Result<Self> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "timeout" => Ok(RunStatus::Timeout),
            other => Err(sitepulse_common::Error::Internal(format!(
                "Unknown run status: {}",
                other
            ))),
        }
    }

    /// Whether this status ends the run (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Timeout
        )
    }
}

/// Rejected status transition
///
/// Raised when a transition would move backwards, skip `running`, or
/// finish an already-terminal run (double-finish). Signals a logic
/// error in the caller rather than silently overwriting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid run status transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: RunStatus,
    pub to: RunStatus,
}

/// One execution attempt sequence of one stage for one target analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    /// Run identifier
    pub id: Uuid,
    /// Owning analysis bundle
    pub parent_analysis_id: Uuid,
    /// Which dimension this run covers
    pub audit_type: AuditType,
    /// Current state machine position
    pub status: RunStatus,
    /// When the run moved to running
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
    /// Attempts actually made by the retry loop
    pub attempts: u32,
    /// Attempt ceiling for transient errors
    pub max_attempts: u32,
    /// JSON-serialized structured stage result (terminal, success only)
    pub result_data: Option<serde_json::Value>,
    /// Captured error message (terminal, failure only)
    pub error_message: Option<String>,
    /// Structured error details (kind, attempt history)
    pub error_details: Option<serde_json::Value>,
    /// Free-form diagnostic data (attempt timings, provider outcomes)
    pub debug_info: Option<serde_json::Value>,
    /// Peak memory attributed to the stage, if measured
    pub memory_usage_mb: Option<f64>,
    /// CPU time attributed to the stage, if measured
    pub cpu_usage_seconds: Option<f64>,
    /// External API calls made across all attempts
    pub api_calls_made: Option<u32>,
    /// Response time of each external call, milliseconds
    pub api_response_times: Vec<u64>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
}

impl AuditRun {
    /// Default attempt ceiling for transient-error retries
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Create a new pending run for one stage of one analysis
    pub fn new(parent_analysis_id: Uuid, audit_type: AuditType) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_analysis_id,
            audit_type,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            attempts: 0,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            result_data: None,
            error_message: None,
            error_details: None,
            debug_info: None,
            memory_usage_mb: None,
            cpu_usage_seconds: None,
            api_calls_made: None,
            api_response_times: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new status, enforcing monotonicity
    ///
    /// Valid moves: `pending -> running`, `running -> terminal`. Sets
    /// `started_at` on entering running and `completed_at` on entering
    /// a terminal state.
    ///
    /// # Errors
    /// `InvalidTransition` on any other move, including a second
    /// terminal write (double-finish).
    pub fn transition_to(&mut self, new_status: RunStatus) -> Result<(), InvalidTransition> {
        let valid = match (self.status, new_status) {
            (RunStatus::Pending, RunStatus::Running) => true,
            (RunStatus::Running, s) if s.is_terminal() => true,
            _ => false,
        };

        if !valid {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        self.status = new_status;
        match new_status {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }

        Ok(())
    }

    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the run in milliseconds, once terminal
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}
