//! AI insight merger
//!
//! Normalizes 0..N free-text provider outputs into one unified
//! narrative with a deterministic fallback when no provider succeeds.
//! The merger only ever sees successful provider entries; adapter
//! failures are caught by the AI stage before this point.

use std::collections::BTreeMap;

use crate::insight::extract;
use crate::insight::rules::RuleTable;
use crate::models::AiInsight;

/// Maximum lines per category bucket
const MAX_PER_BUCKET: usize = 3;

/// Maximum strength/weakness lines
const MAX_FINDINGS: usize = 3;

/// Canned summary when no usable lead line exists
const FALLBACK_SUMMARY: &str =
    "Automated analysis completed; see the full report for details.";

/// Canned narrative for the zero-provider fallback
const FALLBACK_TEXT: &str =
    "AI analysis was not available for this audit. No configured provider \
     returned a response.";

/// One successful provider response, post-extraction
#[derive(Debug, Clone)]
pub struct ProviderInsight {
    /// Provider name used in the merged label
    pub provider_label: String,
    /// Raw narrative text
    pub text: String,
    /// Score pulled from the text (or sentiment heuristic), 0-100
    pub extracted_score: f64,
    /// Recommendation lines pulled from the text, capped at 5
    pub extracted_recommendations: Vec<String>,
    /// Lead summary pulled from the text, if any
    pub summary: Option<String>,
}

impl ProviderInsight {
    /// Build a provider entry from raw text by running the extraction
    /// pass against the rule table
    pub fn from_text(provider_label: &str, text: String, rules: &RuleTable) -> Self {
        Self {
            provider_label: provider_label.to_string(),
            extracted_score: extract::extract_score(&text, rules),
            extracted_recommendations: extract::extract_recommendations(&text, rules),
            summary: extract::extract_summary(&text),
            text,
        }
    }
}

/// Recommendation deduplication mode
///
/// Exact is the default: lines differing only by trailing punctuation
/// or case survive as separate entries. Normalized folds case and
/// trims trailing punctuation/whitespace before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupMode {
    #[default]
    Exact,
    Normalized,
}

impl DedupMode {
    fn key(&self, line: &str) -> String {
        match self {
            DedupMode::Exact => line.to_string(),
            DedupMode::Normalized => line
                .trim()
                .trim_end_matches(['.', '!', '?', ',', ';', ':'])
                .trim_end()
                .to_lowercase(),
        }
    }
}

/// Merges provider insights into one `AiInsight`
#[derive(Debug, Clone)]
pub struct InsightMerger {
    rules: RuleTable,
    dedup_mode: DedupMode,
}

impl Default for InsightMerger {
    fn default() -> Self {
        Self::new(RuleTable::default(), DedupMode::Exact)
    }
}

impl InsightMerger {
    pub fn new(rules: RuleTable, dedup_mode: DedupMode) -> Self {
        Self { rules, dedup_mode }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Merge 0..N provider insights into one narrative result
    pub fn merge(&self, providers: Vec<ProviderInsight>) -> AiInsight {
        match providers.len() {
            0 => Self::fallback(),
            1 => self.merge_single(providers.into_iter().next().expect("one provider")),
            _ => self.merge_many(providers),
        }
    }

    /// Deterministic zero-provider fallback
    fn fallback() -> AiInsight {
        AiInsight {
            analysis_text: FALLBACK_TEXT.to_string(),
            summary: FALLBACK_SUMMARY.to_string(),
            score: 0.0,
            recommendations: Vec::new(),
            categorized: BTreeMap::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            provider_label: "none".to_string(),
            providers_count: 0,
        }
    }

    /// Single provider: pass fields through, synthesize what is missing
    fn merge_single(&self, provider: ProviderInsight) -> AiInsight {
        let summary = provider
            .summary
            .clone()
            .or_else(|| extract::extract_summary(&provider.text))
            .unwrap_or_else(|| FALLBACK_SUMMARY.to_string());

        let categorized = self.bucket(&provider.extracted_recommendations);
        let (strengths, weaknesses) = self.findings(&provider.text);

        AiInsight {
            analysis_text: provider.text,
            summary,
            score: provider.extracted_score,
            recommendations: provider.extracted_recommendations,
            categorized,
            strengths,
            weaknesses,
            provider_label: provider.provider_label,
            providers_count: 1,
        }
    }

    /// Multiple providers: concatenate under labeled headings, average
    /// scores to one decimal, union recommendations
    fn merge_many(&self, providers: Vec<ProviderInsight>) -> AiInsight {
        let count = providers.len();

        let analysis_text = providers
            .iter()
            .map(|p| format!("## {}\n\n{}", p.provider_label, p.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mean = providers.iter().map(|p| p.extracted_score).sum::<f64>() / count as f64;
        let score = (mean * 10.0).round() / 10.0;

        // Order-preserving set union; first occurrence wins
        let mut seen = std::collections::HashSet::new();
        let mut recommendations = Vec::new();
        for provider in &providers {
            for line in &provider.extracted_recommendations {
                if seen.insert(self.dedup_mode.key(line)) {
                    recommendations.push(line.clone());
                }
            }
        }

        let summary = providers
            .iter()
            .take(2)
            .filter_map(|p| {
                p.summary
                    .clone()
                    .or_else(|| extract::extract_summary(&p.text))
            })
            .collect::<Vec<_>>()
            .join(" ");
        let summary = if summary.is_empty() {
            FALLBACK_SUMMARY.to_string()
        } else {
            summary
        };

        let provider_label = providers
            .iter()
            .map(|p| p.provider_label.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let categorized = self.bucket(&recommendations);
        let (strengths, weaknesses) = self.findings(&analysis_text);

        AiInsight {
            analysis_text,
            summary,
            score,
            recommendations,
            categorized,
            strengths,
            weaknesses,
            provider_label,
            providers_count: count,
        }
    }

    /// Bucket recommendation lines into the fixed categories, capping
    /// each bucket; lines matching no category are left unbucketed
    fn bucket(&self, recommendations: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut buckets: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for line in recommendations {
            if let Some(category) = self.rules.category_for(line) {
                let bucket = buckets.entry(category.to_string()).or_default();
                if bucket.len() < MAX_PER_BUCKET {
                    bucket.push(line.clone());
                }
            }
        }
        buckets
    }

    /// Strength and weakness lines mined from the raw text
    fn findings(&self, text: &str) -> (Vec<String>, Vec<String>) {
        let strengths =
            extract::extract_marked_lines(text, MAX_FINDINGS, |l| self.rules.is_strength(l));
        let weaknesses =
            extract::extract_marked_lines(text, MAX_FINDINGS, |l| self.rules.is_weakness(l));
        (strengths, weaknesses)
    }
}
