//! Merged AI narrative result
//!
//! Produced fresh by every merge call and embedded into the analysis
//! bundle; never persisted as a standalone entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The unified narrative assembled from 0..N provider responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiInsight {
    /// Full narrative text; multi-provider merges concatenate each
    /// provider's text under a labeled heading
    pub analysis_text: String,
    /// Short lead summary (~200 characters)
    pub summary: String,
    /// 0-100; single provider passes through exactly, multi-provider
    /// merges average to one decimal
    pub score: f64,
    /// Deduplicated recommendation lines across providers
    pub recommendations: Vec<String>,
    /// Recommendation lines bucketed by category, 3 per bucket max
    pub categorized: BTreeMap<String, Vec<String>>,
    /// Positive findings extracted from the raw text, 3 max
    pub strengths: Vec<String>,
    /// Negative findings extracted from the raw text, 3 max
    pub weaknesses: Vec<String>,
    /// Comma-joined names of contributing providers, or "none"
    pub provider_label: String,
    /// Number of providers that contributed
    pub providers_count: usize,
}
