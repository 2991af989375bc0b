//! Keyword rule tables for narrative text classification
//!
//! All text classification (category bucketing, sentiment scoring,
//! recommendation/strength/weakness markers) is driven by this table
//! rather than hard-coded branches, so the classifiers are testable
//! with injected rule sets. Matching is case-insensitive substring
//! match against lowercase keywords.

use once_cell::sync::Lazy;

/// Default table shared by the extraction and merge paths
pub static DEFAULT_RULES: Lazy<RuleTable> = Lazy::new(RuleTable::default);

/// The six fixed recommendation categories, in bucket order
pub const CATEGORIES: [&str; 6] = [
    "seo",
    "performance",
    "security",
    "ux",
    "content",
    "marketing",
];

/// Data-driven keyword rule table
#[derive(Debug, Clone)]
pub struct RuleTable {
    /// category name -> lowercase keywords that place a line in it
    pub categories: Vec<(String, Vec<String>)>,
    /// Words counting toward the positive side of the sentiment heuristic
    pub positive_words: Vec<String>,
    /// Words counting toward the negative side of the sentiment heuristic
    pub negative_words: Vec<String>,
    /// A line containing one of these is a candidate recommendation
    pub recommendation_markers: Vec<String>,
    /// A line containing one of these is a candidate strength
    pub strength_markers: Vec<String>,
    /// A line containing one of these is a candidate weakness
    pub weakness_markers: Vec<String>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            categories: vec![
                (
                    "seo".to_string(),
                    words(&[
                        "seo", "meta", "keyword", "search", "ranking", "sitemap",
                        "title tag", "crawl",
                    ]),
                ),
                (
                    "performance".to_string(),
                    words(&[
                        "speed", "load", "performance", "cach", "compress", "image",
                        "render", "optimiz",
                    ]),
                ),
                (
                    "security".to_string(),
                    words(&[
                        "security", "ssl", "https", "header", "vulnerab", "certificate",
                        "encrypt",
                    ]),
                ),
                (
                    "ux".to_string(),
                    words(&[
                        "user experience", "ux", "navigation", "mobile", "accessib",
                        "layout", "design", "usabil",
                    ]),
                ),
                (
                    "content".to_string(),
                    words(&[
                        "content", "blog", "copy", "article", "readab", "text quality",
                    ]),
                ),
                (
                    "marketing".to_string(),
                    words(&[
                        "marketing", "social", "brand", "conversion", "call to action",
                        "cta", "email", "campaign",
                    ]),
                ),
            ],
            positive_words: words(&[
                "good", "great", "excellent", "strong", "fast", "secure", "solid",
                "effective", "clean", "modern", "well",
            ]),
            negative_words: words(&[
                "poor", "slow", "missing", "weak", "bad", "vulnerable", "outdated",
                "broken", "lacking", "error", "problem",
            ]),
            recommendation_markers: words(&[
                "recommend", "should", "consider", "improve", "add ", "fix",
                "optimize", "implement", "ensure",
            ]),
            strength_markers: words(&[
                "strength", "strong", "excellent", "good", "well", "advantage",
                "solid",
            ]),
            weakness_markers: words(&[
                "weakness", "weak", "poor", "missing", "lack", "issue", "problem",
                "concern",
            ]),
        }
    }
}

impl RuleTable {
    /// First category whose keyword list matches the line, if any
    pub fn category_for(&self, line: &str) -> Option<&str> {
        let lower = line.to_lowercase();
        self.categories
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k.as_str())))
            .map(|(name, _)| name.as_str())
    }

    /// Whether the line carries a recommendation marker
    pub fn is_recommendation(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.recommendation_markers
            .iter()
            .any(|m| lower.contains(m.as_str()))
    }

    /// Whether the line carries a strength marker
    pub fn is_strength(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.strength_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Whether the line carries a weakness marker
    pub fn is_weakness(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.weakness_markers.iter().any(|m| lower.contains(m.as_str()))
    }

    /// Count occurrences of words from a set in the text, one count per
    /// word per occurrence
    fn count_words(text_lower: &str, word_set: &[String]) -> i64 {
        word_set
            .iter()
            .map(|w| text_lower.matches(w.as_str()).count() as i64)
            .sum()
    }

    /// Positive and negative word counts for the sentiment heuristic
    pub fn sentiment_counts(&self, text: &str) -> (i64, i64) {
        let lower = text.to_lowercase();
        (
            Self::count_words(&lower, &self.positive_words),
            Self::count_words(&lower, &self.negative_words),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_matching_is_case_insensitive() {
        let rules = RuleTable::default();
        assert_eq!(rules.category_for("Improve your SEO ranking"), Some("seo"));
        assert_eq!(
            rules.category_for("Enable HTTPS on every page"),
            Some("security")
        );
        assert_eq!(rules.category_for("the weather is nice"), None);
    }

    #[test]
    fn first_matching_category_wins() {
        let rules = RuleTable::default();
        // Mentions both search (seo) and speed (performance); seo is listed
        // first in the table, so it wins
        assert_eq!(
            rules.category_for("search results load with poor speed"),
            Some("seo")
        );
    }

    #[test]
    fn recommendation_markers_match() {
        let rules = RuleTable::default();
        assert!(rules.is_recommendation("We recommend enabling compression"));
        assert!(rules.is_recommendation("You should add alt text to images"));
        assert!(!rules.is_recommendation("The site has a blue theme"));
    }

    #[test]
    fn sentiment_counts_both_directions() {
        let rules = RuleTable::default();
        let (pos, neg) = rules.sentiment_counts("Great speed but poor and outdated markup");
        assert_eq!(pos, 1);
        assert_eq!(neg, 2);
    }

    #[test]
    fn injected_table_overrides_defaults() {
        let rules = RuleTable {
            categories: vec![("custom".to_string(), vec!["widget".to_string()])],
            ..RuleTable::default()
        };
        assert_eq!(rules.category_for("add more widgets"), Some("custom"));
        assert_eq!(rules.category_for("improve seo"), None);
    }
}
