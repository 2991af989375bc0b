//! Core Types and Trait Definitions for the audit engine
//!
//! Defines the two trait seams of the pipeline:
//! - **Level 1:** StageAnalyzer (5 analyzers, run concurrently)
//! - **Level 2:** InsightProvider (0..N AI backends, consumed by the merger)
//!
//! and the two-tier error model: `StageError` marks one category slice,
//! `FatalError` aborts the whole audit.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::{
    DirectoryReport, MetadataReport, PerformanceReport, SecurityReport, TechnologyReport,
};

// ============================================================================
// Stage output types
// ============================================================================

/// Structured output of one analysis stage, tagged by dimension
///
/// Level-1 workers send these through the accumulator channel; the
/// orchestrator stores each slice into its bundle category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum StageOutput {
    Performance(PerformanceReport),
    Security(SecurityReport),
    Technology(TechnologyReport),
    Metadata(MetadataReport),
    Maps(DirectoryReport),
}

impl StageOutput {
    /// The dimension this output belongs to
    pub fn audit_type(&self) -> AuditType {
        match self {
            StageOutput::Performance(_) => AuditType::Performance,
            StageOutput::Security(_) => AuditType::Security,
            StageOutput::Technology(_) => AuditType::Technology,
            StageOutput::Metadata(_) => AuditType::Metadata,
            StageOutput::Maps(_) => AuditType::Maps,
        }
    }
}

/// Successful stage invocation: the structured output plus the response
/// times of the external calls the analyzer made (milliseconds)
#[derive(Debug, Clone)]
pub struct StageReport {
    pub output: StageOutput,
    pub api_response_times: Vec<u64>,
}

impl StageReport {
    pub fn new(output: StageOutput) -> Self {
        Self { output, api_response_times: Vec::new() }
    }

    pub fn with_timings(output: StageOutput, api_response_times: Vec<u64>) -> Self {
        Self { output, api_response_times }
    }
}

// ============================================================================
// Error model
// ============================================================================

/// Stage-local error
///
/// Every variant is recovered locally: logged, recorded on the stage's
/// `AuditRun`, and turned into an `{error}` placeholder on the bundle
/// category. Siblings and subsequent stages proceed.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// Transient network failure (timeout, connection refused). The only
    /// class the retry loop re-attempts.
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid or rejected credential. Provider-local for AI backends:
    /// the failing provider is excluded from the merge, others proceed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Malformed payload from a collaborator. Callers degrade to an
    /// empty or partial result where they can.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate or quota limit hit. Recorded as failed without backoff.
    #[error("Quota exceeded: {0}")]
    Quota(String),

    /// Collaborator disabled or unconfigured (e.g. missing API key)
    #[error("Not available: {0}")]
    NotAvailable(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StageError {
    /// Whether the retry loop should re-attempt after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::Network(_))
    }

    /// Stable machine-readable kind for error_details rows
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Network(_) => "network",
            StageError::Auth(_) => "auth",
            StageError::Parse(_) => "parse",
            StageError::Quota(_) => "quota",
            StageError::NotAvailable(_) => "not_available",
            StageError::Internal(_) => "internal",
        }
    }

    /// Map a reqwest failure onto the taxonomy
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            StageError::Network(err.to_string())
        } else if err.is_decode() {
            StageError::Parse(err.to_string())
        } else {
            StageError::Network(err.to_string())
        }
    }

    /// Map an HTTP status onto the taxonomy
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => StageError::Auth(format!("HTTP {}: {}", status, body)),
            429 => StageError::Quota(format!("HTTP {}: {}", status, body)),
            _ => StageError::Network(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// Fatal error: aborts the whole audit
///
/// The one non-isolated failure class. If the bundle's own record cannot
/// be established or finalized there is no console of record for partial
/// results, so nothing is surfaced.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The analysis bundle row could not be created or updated
    #[error("Failed to persist analysis record: {0}")]
    Persistence(#[source] sitepulse_common::Error),

    /// Pipeline internals broke in a way no stage can be blamed for
    #[error("Audit pipeline error: {0}")]
    Internal(String),
}

// ============================================================================
// Level 1: Stage Analyzer trait
// ============================================================================

/// Level 1 Stage Analyzer trait
///
/// One implementation per audit dimension. All analyzers run concurrently
/// against the same target; each owns its timeout and fails independently.
///
/// # Analyzers (5 total)
/// 1. PerformanceAnalyzer - Lighthouse scores via PageSpeed
/// 2. SecurityAnalyzer - TLS and response-header probe
/// 3. TechnologyDetector - fingerprint rules over headers and HTML
/// 4. MetadataExtractor - title/description/headings/OG/schema probes
/// 5. DirectoryAnalyzer - business-directory entity lookup (maps)
///
/// # Example
/// ```rust,ignore
/// use sitepulse_audit::types::{StageAnalyzer, StageError, StageOutput, StageReport};
///
/// pub struct SecurityAnalyzer { /* http client */ }
///
/// #[async_trait::async_trait]
/// impl StageAnalyzer for SecurityAnalyzer {
///     fn audit_type(&self) -> AuditType { AuditType::Security }
///     fn timeout(&self) -> Duration { Duration::from_secs(30) }
///
///     async fn analyze(&self, target: &AuditTarget) -> Result<StageReport, StageError> {
///         let report = probe_headers(&target.url).await?;
///         Ok(StageReport::new(StageOutput::Security(report)))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait StageAnalyzer: Send + Sync {
    /// The dimension this analyzer covers; also names its run records
    fn audit_type(&self) -> AuditType;

    /// Per-stage invocation deadline; elapsed attempts finish as timeout
    fn timeout(&self) -> Duration;

    /// Analyze the target
    ///
    /// # Errors
    /// Returns `StageError` on failure (per-stage error isolation); only
    /// `Network` errors are re-attempted by the retry loop.
    async fn analyze(&self, target: &AuditTarget) -> Result<StageReport, StageError>;
}

// ============================================================================
// Level 2: Insight Provider trait
// ============================================================================

/// Level 2 AI Insight Provider trait
///
/// Each configured backend turns the assembled stage context into a
/// free-text narrative. Providers fail independently; the merger only
/// ever sees successful responses.
#[async_trait::async_trait]
pub trait InsightProvider: Send + Sync {
    /// Provider name used in the merged provider label
    fn name(&self) -> &'static str;

    /// Generate a narrative for the prompt
    ///
    /// # Errors
    /// `Auth` and `Quota` are provider-local and exclude only this
    /// provider from the merge.
    async fn generate(&self, prompt: &str) -> Result<String, StageError>;
}

// ============================================================================
// Tests
// ============================================================================
