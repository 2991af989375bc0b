//! Per-provider extraction from raw narrative text
//!
//! Runs before the merge, once per successful provider response: pull
//! out an explicit score mention (or fall back to a sentiment
//! heuristic), candidate recommendation lines, and a lead summary.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::insight::rules::RuleTable;

/// Maximum recommendation lines extracted per provider
const MAX_RECOMMENDATIONS: usize = 5;

/// Minimum length for a line to count as a recommendation
const MIN_RECOMMENDATION_LEN: usize = 20;

/// Minimum length for a line to serve as the summary
const MIN_SUMMARY_LEN: usize = 30;

/// Summary truncation length, characters
const MAX_SUMMARY_LEN: usize = 200;

/// Explicit numeric score mention: a 1-3 digit number immediately
/// followed by a percent/score/degree token
static SCORE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*(?:%|percent|/\s*100|points?\b|score\b|degree\b)")
        .expect("score regex is valid")
});

/// Leading list decoration on narrative lines ("- ", "* ", "1. ", "2) ")
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d{1,2}[.)])\s*").expect("bullet regex is valid"));

/// Extract a 0-100 score from the text
///
/// Prefers the first explicit numeric mention; falls back to the
/// sentiment heuristic `clamp(70 + 5*positive - 3*negative, 0, 100)`
/// over the rule table's word sets.
pub fn extract_score(text: &str, rules: &RuleTable) -> f64 {
    for captures in SCORE_RE.captures_iter(text) {
        if let Ok(value) = captures[1].parse::<i64>() {
            if (0..=100).contains(&value) {
                return value as f64;
            }
        }
    }

    let (positive, negative) = rules.sentiment_counts(text);
    (70 + 5 * positive - 3 * negative).clamp(0, 100) as f64
}

/// Extract candidate recommendation lines
///
/// Lines carrying a recommendation marker and longer than 20
/// characters, stripped of list decoration, capped at 5.
pub fn extract_recommendations(text: &str, rules: &RuleTable) -> Vec<String> {
    text.lines()
        .map(|line| BULLET_RE.replace(line.trim(), "").into_owned())
        .filter(|line| line.len() > MIN_RECOMMENDATION_LEN && rules.is_recommendation(line))
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

/// Extract a lead summary: the first line longer than 30 characters,
/// truncated to ~200 characters on a char boundary
pub fn extract_summary(text: &str) -> Option<String> {
    text.lines()
        .map(|line| BULLET_RE.replace(line.trim(), "").into_owned())
        .find(|line| line.len() > MIN_SUMMARY_LEN)
        .map(|line| truncate_chars(&line, MAX_SUMMARY_LEN))
}

/// Extract lines matching a marker predicate, capped
///
/// Used for strength/weakness line mining on the raw provider text.
pub fn extract_marked_lines<F>(text: &str, cap: usize, matches: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    text.lines()
        .map(|line| BULLET_RE.replace(line.trim(), "").into_owned())
        .filter(|line| line.len() > MIN_RECOMMENDATION_LEN && matches(line))
        .take(cap)
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated.trim_end())
}
