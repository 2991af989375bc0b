//! AI insight pipeline: rule tables, per-provider extraction, and the
//! 0/1/N merge policy

pub mod extract;
pub mod merger;
pub mod rules;

pub use merger::{DedupMode, InsightMerger, ProviderInsight};
pub use rules::{RuleTable, DEFAULT_RULES};
