//! Technology stage: stack fingerprinting over headers and HTML
//!
//! Detection is a data-driven rule list, one regex per technology,
//! matched against either the page body or a named response header.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::TechnologyReport;
use crate::stages::USER_AGENT;
use crate::types::{StageAnalyzer, StageError, StageOutput, StageReport};

/// Where a fingerprint rule looks for its pattern
enum Probe {
    Body,
    Header(&'static str),
}

/// One fingerprint rule: pattern seen -> technology detected
struct TechRule {
    category: &'static str,
    name: &'static str,
    probe: Probe,
    pattern: Regex,
}

fn rule(category: &'static str, name: &'static str, probe: Probe, pattern: &str) -> TechRule {
    TechRule {
        category,
        name,
        probe,
        pattern: Regex::new(pattern).expect("fingerprint pattern is valid"),
    }
}

static FINGERPRINTS: Lazy<Vec<TechRule>> = Lazy::new(|| {
    vec![
        rule("cms", "WordPress", Probe::Body, r"(?i)wp-content|wp-includes"),
        rule("cms", "Drupal", Probe::Body, r"(?i)drupal\.js|sites/default/files"),
        rule("cms", "Joomla", Probe::Body, r"(?i)/media/jui/|joomla"),
        rule("ecommerce", "Shopify", Probe::Body, r"(?i)cdn\.shopify\.com"),
        rule("ecommerce", "WooCommerce", Probe::Body, r"(?i)woocommerce"),
        rule("javascript", "React", Probe::Body, r"data-reactroot|__NEXT_DATA__|react-dom"),
        rule("javascript", "Vue.js", Probe::Body, r"(?i)data-v-[0-9a-f]{8}|vue(?:\.min)?\.js"),
        rule("javascript", "jQuery", Probe::Body, r"(?i)jquery[.-]"),
        rule("css", "Bootstrap", Probe::Body, r"(?i)bootstrap(?:\.min)?\.(?:css|js)"),
        rule("css", "Tailwind CSS", Probe::Body, r"(?i)tailwind"),
        rule("analytics", "Google Analytics", Probe::Body, r"(?i)google-analytics\.com|gtag\("),
        rule("analytics", "Facebook Pixel", Probe::Body, r"(?i)connect\.facebook\.net|fbq\("),
        rule("server", "nginx", Probe::Header("server"), r"(?i)nginx"),
        rule("server", "Apache", Probe::Header("server"), r"(?i)apache"),
        rule("server", "Cloudflare", Probe::Header("server"), r"(?i)cloudflare"),
        rule("language", "PHP", Probe::Header("x-powered-by"), r"(?i)php"),
        rule("language", "ASP.NET", Probe::Header("x-powered-by"), r"(?i)asp\.net"),
        rule("framework", "Express", Probe::Header("x-powered-by"), r"(?i)express"),
    ]
});

/// Fingerprints the target's technology stack
pub struct TechnologyAnalyzer {
    client: reqwest::Client,
}

impl Default for TechnologyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TechnologyAnalyzer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(25))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Apply every fingerprint rule against the body and headers
    fn detect(body: &str, headers: &reqwest::header::HeaderMap) -> TechnologyReport {
        let mut detected: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for rule in FINGERPRINTS.iter() {
            let haystack: Option<&str> = match &rule.probe {
                Probe::Body => Some(body),
                Probe::Header(name) => headers.get(*name).and_then(|v| v.to_str().ok()),
            };

            let matched = haystack.is_some_and(|h| rule.pattern.is_match(h));
            if matched {
                let names = detected.entry(rule.category.to_string()).or_default();
                if !names.iter().any(|n| n == rule.name) {
                    names.push(rule.name.to_string());
                }
            }
        }

        TechnologyReport { detected }
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for TechnologyAnalyzer {
    fn audit_type(&self) -> AuditType {
        AuditType::Technology
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn analyze(&self, target: &AuditTarget) -> Result<StageReport, StageError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&target.url)
            .send()
            .await
            .map_err(StageError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, body));
        }

        let headers = response.headers().clone();
        // A truncated or non-UTF-8 body degrades to header-only detection
        let body = response.text().await.unwrap_or_default();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let report = Self::detect(&body, &headers);

        tracing::debug!(
            url = %target.url,
            categories = report.detected.len(),
            "Technology detection complete"
        );

        Ok(StageReport::with_timings(
            StageOutput::Technology(report),
            vec![elapsed_ms],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn body_fingerprints_detect_common_stacks() {
        let body = r#"<html><head>
            <link href="/wp-content/themes/site/style.css">
            <script src="https://code.jquery.com/jquery-3.6.0.min.js"></script>
            <script>gtag('config', 'G-XYZ');</script>
        </head></html>"#;

        let report = TechnologyAnalyzer::detect(body, &HeaderMap::new());
        assert_eq!(report.detected["cms"], vec!["WordPress"]);
        assert_eq!(report.detected["javascript"], vec!["jQuery"]);
        assert_eq!(report.detected["analytics"], vec!["Google Analytics"]);
    }

    #[test]
    fn header_fingerprints_detect_server_stack() {
        let mut headers = HeaderMap::new();
        headers.insert("server", HeaderValue::from_static("nginx/1.24.0"));
        headers.insert("x-powered-by", HeaderValue::from_static("PHP/8.2.1"));

        let report = TechnologyAnalyzer::detect("", &headers);
        assert_eq!(report.detected["server"], vec!["nginx"]);
        assert_eq!(report.detected["language"], vec!["PHP"]);
    }

    #[test]
    fn clean_page_detects_nothing() {
        let report = TechnologyAnalyzer::detect("<html></html>", &HeaderMap::new());
        assert!(report.detected.is_empty());
    }

    #[test]
    fn duplicate_rule_hits_record_once() {
        let body = "wp-content wp-includes wp-content";
        let report = TechnologyAnalyzer::detect(body, &HeaderMap::new());
        assert_eq!(report.detected["cms"], vec!["WordPress"]);
    }
}
