//! Per-stage run tracking and retry
//!
//! The tracker owns the lifecycle of one `AuditRun` row per stage: insert
//! on start, exactly one terminal update, progress events on the bus. The
//! retry loop lives here too: only transient network errors are
//! re-attempted, with capped exponential backoff and jitter.
//!
//! Run-row persistence failures are stage-local. A stage whose execution
//! log cannot be written still delivers its slice; only the bundle row is
//! load-bearing.

use std::time::{Duration, Instant};

use rand::Rng;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sitepulse_common::db::settings::get_i64_setting;
use sitepulse_common::events::{AuditEvent, EventBus};
use sitepulse_common::{AuditTarget, AuditType, Result};

use crate::db::runs::{insert_run, update_run_terminal};
use crate::models::{AuditRun, RunStatus};
use crate::types::{StageAnalyzer, StageError, StageOutput};

/// Backoff ceiling between retry attempts
const RETRY_MAX_DELAY_MS: u64 = 5000;
/// Random jitter added to each backoff delay
const RETRY_JITTER_MS: u64 = 250;

/// Tracks stage executions for one analysis
pub struct RunTracker {
    db: SqlitePool,
    event_bus: EventBus,
    analysis_id: Uuid,
    max_attempts: u32,
    retry_base_delay_ms: u64,
}

impl RunTracker {
    /// Build a tracker with retry settings loaded from the database
    pub async fn load(db: SqlitePool, event_bus: EventBus, analysis_id: Uuid) -> Result<Self> {
        let max_attempts = get_i64_setting(&db, "audit_max_attempts", 3).await?.max(1) as u32;
        let retry_base_delay_ms =
            get_i64_setting(&db, "audit_retry_base_delay_ms", 500).await?.max(1) as u64;

        Ok(Self {
            db,
            event_bus,
            analysis_id,
            max_attempts,
            retry_base_delay_ms,
        })
    }

    /// Create a running run row for one stage and announce it
    pub async fn begin(&self, audit_type: AuditType) -> AuditRun {
        let mut run = AuditRun::new(self.analysis_id, audit_type);
        run.max_attempts = self.max_attempts;
        run.attempts = 1;

        // Fresh runs are pending; this transition cannot be rejected
        if let Err(e) = run.transition_to(RunStatus::Running) {
            tracing::error!(audit_type = %audit_type, error = %e, "Run refused start transition");
        }

        if let Err(e) = insert_run(&self.db, &run).await {
            tracing::warn!(
                analysis_id = %self.analysis_id,
                audit_type = %audit_type,
                error = %e,
                "Failed to record run start; stage continues"
            );
        }

        self.event_bus.emit_lossy(AuditEvent::StageStarted {
            analysis_id: self.analysis_id,
            audit_type,
            attempt: 1,
            timestamp: chrono::Utc::now(),
        });

        run
    }

    /// Finish a run as completed and announce it
    pub async fn finish_success(
        &self,
        run: &mut AuditRun,
        result_data: serde_json::Value,
        api_response_times: Vec<u64>,
        debug_info: Option<serde_json::Value>,
    ) {
        run.result_data = Some(result_data);
        run.api_calls_made = Some(api_response_times.len() as u32);
        run.api_response_times = api_response_times;
        run.debug_info = debug_info;

        if let Err(e) = run.transition_to(RunStatus::Completed) {
            tracing::error!(
                analysis_id = %self.analysis_id,
                audit_type = %run.audit_type,
                error = %e,
                "Rejected double finish on run"
            );
            return;
        }

        self.persist_terminal(run).await;

        self.event_bus.emit_lossy(AuditEvent::StageCompleted {
            analysis_id: self.analysis_id,
            audit_type: run.audit_type,
            duration_ms: run.duration_ms().unwrap_or(0),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Finish a run as failed or timed out and announce it
    pub async fn finish_failure(
        &self,
        run: &mut AuditRun,
        status: RunStatus,
        kind: &str,
        message: String,
        debug_info: Option<serde_json::Value>,
    ) {
        run.error_message = Some(message.clone());
        run.error_details = Some(serde_json::json!({
            "kind": kind,
            "attempts": run.attempts,
        }));
        run.debug_info = debug_info;

        if let Err(e) = run.transition_to(status) {
            tracing::error!(
                analysis_id = %self.analysis_id,
                audit_type = %run.audit_type,
                error = %e,
                "Rejected double finish on run"
            );
            return;
        }

        self.persist_terminal(run).await;

        self.event_bus.emit_lossy(AuditEvent::StageFailed {
            analysis_id: self.analysis_id,
            audit_type: run.audit_type,
            status: status.as_str().to_string(),
            error: message,
            timestamp: chrono::Utc::now(),
        });
    }

    async fn persist_terminal(&self, run: &AuditRun) {
        if let Err(e) = update_run_terminal(&self.db, run).await {
            tracing::warn!(
                analysis_id = %self.analysis_id,
                audit_type = %run.audit_type,
                error = %e,
                "Failed to record run terminal state"
            );
        }
    }

    /// Execute one level-1 analyzer under tracking, timeout, and retry
    ///
    /// Returns the stage output on success, or the error message to store
    /// as the category's `{error}` placeholder. Only `Network` errors are
    /// re-attempted; timeouts and cancellation finish the run as timeout.
    pub async fn run_stage(
        &self,
        analyzer: &dyn StageAnalyzer,
        target: &AuditTarget,
        cancel: &CancellationToken,
    ) -> std::result::Result<StageOutput, String> {
        let audit_type = analyzer.audit_type();
        let stage_timeout = analyzer.timeout();
        let mut run = self.begin(audit_type).await;

        let mut attempt_durations_ms: Vec<u64> = Vec::new();
        let mut attempt = 1u32;

        loop {
            run.attempts = attempt;
            if attempt > 1 {
                self.event_bus.emit_lossy(AuditEvent::StageStarted {
                    analysis_id: self.analysis_id,
                    audit_type,
                    attempt,
                    timestamp: chrono::Utc::now(),
                });
            }

            let started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                res = tokio::time::timeout(stage_timeout, analyzer.analyze(target)) => Some(res),
            };
            attempt_durations_ms.push(started.elapsed().as_millis() as u64);
            let debug_info = serde_json::json!({ "attempt_durations_ms": attempt_durations_ms });

            match outcome {
                None => {
                    let message = "Audit cancelled".to_string();
                    tracing::info!(
                        analysis_id = %self.analysis_id,
                        audit_type = %audit_type,
                        "Stage cancelled mid-flight"
                    );
                    self.finish_failure(
                        &mut run,
                        RunStatus::Timeout,
                        "cancelled",
                        message.clone(),
                        Some(debug_info),
                    )
                    .await;
                    return Err(message);
                }
                Some(Err(_elapsed)) => {
                    let message = format!(
                        "Stage timed out after {} seconds",
                        stage_timeout.as_secs()
                    );
                    tracing::warn!(
                        analysis_id = %self.analysis_id,
                        audit_type = %audit_type,
                        timeout_secs = stage_timeout.as_secs(),
                        "Stage exceeded its deadline"
                    );
                    self.finish_failure(
                        &mut run,
                        RunStatus::Timeout,
                        "timeout",
                        message.clone(),
                        Some(debug_info),
                    )
                    .await;
                    return Err(message);
                }
                Some(Ok(Ok(report))) => {
                    let result_data = match serde_json::to_value(&report.output) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to serialize stage output for run row");
                            serde_json::Value::Null
                        }
                    };
                    self.finish_success(
                        &mut run,
                        result_data,
                        report.api_response_times,
                        Some(debug_info),
                    )
                    .await;
                    return Ok(report.output);
                }
                Some(Ok(Err(stage_err))) => {
                    if stage_err.is_transient() && attempt < self.max_attempts {
                        let delay = self.backoff_delay(attempt);
                        tracing::warn!(
                            analysis_id = %self.analysis_id,
                            audit_type = %audit_type,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %stage_err,
                            "Transient stage error, will retry"
                        );

                        tokio::select! {
                            _ = cancel.cancelled() => {
                                let message = "Audit cancelled".to_string();
                                self.finish_failure(
                                    &mut run,
                                    RunStatus::Timeout,
                                    "cancelled",
                                    message.clone(),
                                    Some(debug_info),
                                )
                                .await;
                                return Err(message);
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }

                        attempt += 1;
                        continue;
                    }

                    let message = stage_err.to_string();
                    tracing::warn!(
                        analysis_id = %self.analysis_id,
                        audit_type = %audit_type,
                        attempt,
                        kind = stage_err.kind(),
                        error = %stage_err,
                        "Stage failed"
                    );
                    self.finish_failure(
                        &mut run,
                        RunStatus::Failed,
                        stage_err.kind(),
                        message.clone(),
                        Some(debug_info),
                    )
                    .await;
                    return Err(message);
                }
            }
        }
    }

    /// Exponential backoff with jitter: base doubles per attempt, capped
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .retry_base_delay_ms
            .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16))
            .min(RETRY_MAX_DELAY_MS);
        let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MS);
        Duration::from_millis(exp + jitter)
    }
}
