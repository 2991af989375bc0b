//! Data model for the audit engine
//!
//! - `AuditRun`: append-only execution record of one stage attempt sequence
//! - `AnalysisBundle`: the aggregate result for one target
//! - stage report types: structured per-category results
//! - `AiInsight`: the merged AI narrative embedded in the bundle

pub mod audit_run;
pub mod bundle;
pub mod insight;
pub mod reports;

pub use audit_run::{AuditRun, InvalidTransition, RunStatus};
pub use bundle::{AnalysisBundle, BundleStatus, CategoryOutcome, ScoreCard};
pub use insight::AiInsight;
