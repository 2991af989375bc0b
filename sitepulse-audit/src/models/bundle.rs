//! Analysis bundle: the aggregate result for one target
//!
//! The bundle is the console of record for an audit. It is created in
//! `processing` state before any stage executes, accumulates per-category
//! slices as stages finish, and receives scores, recommendations, and the
//! merged AI insight once all stages have attempted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sitepulse_common::AuditTarget;

use crate::models::insight::AiInsight;
use crate::models::reports::{
    DirectoryReport, MetadataReport, PerformanceReport, SecurityReport, TechnologyReport,
};
use crate::scoring::Recommendation;

/// Bundle lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    /// Accepted, orchestration not yet started
    Pending,
    /// Stages executing
    Processing,
    /// All stages attempted, scores computed
    Completed,
    /// Fatal (non-stage) failure; no partial data surfaced
    Failed,
}

impl BundleStatus {
    /// Stable string form used in database rows
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Processing => "processing",
            BundleStatus::Completed => "completed",
            BundleStatus::Failed => "failed",
        }
    }

    /// Parse the database string form back into the enum
    pub fn parse(s: &str) -> sitepulse_common::Result<Self> {
        match s {
            "pending" => Ok(BundleStatus::Pending),
            "processing" => Ok(BundleStatus::Processing),
            "completed" => Ok(BundleStatus::Completed),
            "failed" => Ok(BundleStatus::Failed),
            other => Err(sitepulse_common::Error::Internal(format!(
                "Unknown bundle status: {}",
                other
            ))),
        }
    }

    /// Whether the bundle has finished (successfully or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, BundleStatus::Completed | BundleStatus::Failed)
    }
}

/// Outcome of one category: the typed stage report, or the stored
/// `{error}` placeholder when the stage failed or timed out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryOutcome<T> {
    Report(T),
    Error { error: String },
}

impl<T> CategoryOutcome<T> {
    /// The typed report, None when the category holds an error
    pub fn report(&self) -> Option<&T> {
        match self {
            CategoryOutcome::Report(r) => Some(r),
            CategoryOutcome::Error { .. } => None,
        }
    }

    /// The stored error message, None when the category succeeded
    pub fn error(&self) -> Option<&str> {
        match self {
            CategoryOutcome::Report(_) => None,
            CategoryOutcome::Error { error } => Some(error),
        }
    }
}

/// Computed sub-scores plus the weighted overall score, all 0-100
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub performance: i64,
    pub security: i64,
    pub seo: i64,
    pub ux: i64,
    pub maps_presence: i64,
    pub overall: i64,
}

/// The aggregate result for one audited target
///
/// Owns a 1:N relationship to `AuditRun`: one bundle, many runs, one per
/// stage attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub id: Uuid,
    pub url: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
    pub status: BundleStatus,

    // Per-category results; absent if the stage never attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<CategoryOutcome<PerformanceReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<CategoryOutcome<SecurityReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology: Option<CategoryOutcome<TechnologyReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CategoryOutcome<MetadataReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maps_presence: Option<CategoryOutcome<DirectoryReport>>,

    /// Merged AI narrative, absent until the AI stage runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_insight: Option<AiInsight>,
    /// Threshold-derived recommendations, computed with the scores
    pub recommendations: Vec<Recommendation>,
    /// Computed scores, absent until the reduce step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreCard>,

    /// Fatal error description when status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub analysis_started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_analysis_time_seconds: Option<f64>,
}

impl AnalysisBundle {
    /// Create a new bundle in processing state for the target
    pub fn new(id: Uuid, target: &AuditTarget) -> Self {
        Self {
            id,
            url: target.url.clone(),
            domain: target.domain.clone(),
            business_name: target.business_name.clone(),
            status: BundleStatus::Processing,
            performance: None,
            security: None,
            technology: None,
            metadata: None,
            maps_presence: None,
            ai_insight: None,
            recommendations: Vec::new(),
            scores: None,
            error_message: None,
            analysis_started_at: Utc::now(),
            analysis_completed_at: None,
            total_analysis_time_seconds: None,
        }
    }

    /// Mark the bundle completed and record total wall-clock time
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = BundleStatus::Completed;
        self.analysis_completed_at = Some(now);
        self.total_analysis_time_seconds =
            Some((now - self.analysis_started_at).num_milliseconds() as f64 / 1000.0);
    }

    /// Mark the bundle failed with a fatal error description
    pub fn fail(&mut self, error: String) {
        let now = Utc::now();
        self.status = BundleStatus::Failed;
        self.error_message = Some(error);
        self.analysis_completed_at = Some(now);
        self.total_analysis_time_seconds =
            Some((now - self.analysis_started_at).num_milliseconds() as f64 / 1000.0);
    }
}
