//! Metadata/SEO stage: on-page elements plus robots/sitemap probes
//!
//! Pulls title, description, headings, Open Graph tags, and Schema.org
//! types out of the page with targeted regexes, then probes robots.txt
//! and sitemap.xml. Malformed markup degrades to a partial report, not
//! a stage failure.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::MetadataReport;
use crate::stages::USER_AGENT;
use crate::types::{StageAnalyzer, StageError, StageOutput, StageReport};

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

// Both attribute orders occur in the wild
static DESC_NAME_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]*name=["']description["'][^>]*content=["']([^"']*)["']"#)
        .expect("valid regex")
});
static DESC_CONTENT_FIRST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]*content=["']([^"']*)["'][^>]*name=["']description["']"#)
        .expect("valid regex")
});

static H1_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));
static H2_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").expect("valid regex"));

static OG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]*property=["']og:([a-z:_.]+)["'][^>]*content=["']([^"']*)["']"#)
        .expect("valid regex")
});

static JSON_LD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type=["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});
static SCHEMA_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""@type"\s*:\s*"([^"]+)""#).expect("valid regex"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Extracts on-page SEO metadata from the target
pub struct MetadataAnalyzer {
    client: reqwest::Client,
}

impl Default for MetadataAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataAnalyzer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(25))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Strip inner tags and collapse whitespace in extracted text
    fn clean_text(raw: &str) -> String {
        let stripped = TAG_RE.replace_all(raw, " ");
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Parse the page body into the report's on-page fields
    fn parse_html(body: &str) -> MetadataReport {
        let title = TITLE_RE
            .captures(body)
            .map(|c| Self::clean_text(&c[1]))
            .filter(|t| !t.is_empty());

        let description = DESC_NAME_FIRST_RE
            .captures(body)
            .or_else(|| DESC_CONTENT_FIRST_RE.captures(body))
            .map(|c| c[1].trim().to_string())
            .filter(|d| !d.is_empty());

        let headings = |re: &Regex| -> Vec<String> {
            re.captures_iter(body)
                .map(|c| Self::clean_text(&c[1]))
                .filter(|h| !h.is_empty())
                .collect()
        };

        let mut open_graph = BTreeMap::new();
        for captures in OG_RE.captures_iter(body) {
            open_graph
                .entry(captures[1].to_lowercase())
                .or_insert_with(|| captures[2].trim().to_string());
        }

        let mut schema_org = Vec::new();
        for block in JSON_LD_RE.captures_iter(body) {
            for type_match in SCHEMA_TYPE_RE.captures_iter(&block[1]) {
                let type_name = type_match[1].to_string();
                if !schema_org.contains(&type_name) {
                    schema_org.push(type_name);
                }
            }
        }

        MetadataReport {
            title,
            description,
            h1s: headings(&H1_RE),
            h2s: headings(&H2_RE),
            open_graph,
            schema_org,
            has_robots_txt: false,
            has_sitemap: false,
        }
    }

    /// Probe a well-known path; network failure counts as absent
    async fn probe(&self, base: &str, path: &str) -> (bool, u64) {
        let url = format!("{}/{}", base.trim_end_matches('/'), path);
        let started = Instant::now();
        let found = match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        };
        (found, started.elapsed().as_millis() as u64)
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for MetadataAnalyzer {
    fn audit_type(&self) -> AuditType {
        AuditType::Metadata
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

        let body = response
            .text()
            .await
            .map_err(|e| StageError::Parse(format!("Page body: {}", e)))?;
        let page_ms = started.elapsed().as_millis() as u64;

        let mut report = Self::parse_html(&body);

        let origin = format!("https://{}", target.domain);
        let (has_robots, robots_ms) = self.probe(&origin, "robots.txt").await;
        let (has_sitemap, sitemap_ms) = self.probe(&origin, "sitemap.xml").await;
        report.has_robots_txt = has_robots;
        report.has_sitemap = has_sitemap;

        tracing::debug!(
            url = %target.url,
            title = report.title.is_some(),
            h1s = report.h1s.len(),
            og_tags = report.open_graph.len(),
            "Metadata extraction complete"
        );

        Ok(StageReport::with_timings(
            StageOutput::Metadata(report),
            vec![page_ms, robots_ms, sitemap_ms],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html><head>
        <title> Acme Bakery &mdash; Fresh Bread </title>
        <meta name="description" content="Artisan bread baked daily.">
        <meta property="og:title" content="Acme Bakery">
        <meta property="og:image" content="https://acme.example/logo.png">
        <script type="application/ld+json">
            {"@context": "https://schema.org", "@type": "Bakery", "name": "Acme"}
        </script>
    </head><body>
        <h1>Welcome to <em>Acme</em></h1>
        <h2>Our Breads</h2>
        <h2>Visit Us</h2>
    </body></html>"#;

    #[test]
    fn parses_title_description_and_headings() {
        let report = MetadataAnalyzer::parse_html(SAMPLE);
        assert!(report.title.unwrap().starts_with("Acme Bakery"));
        assert_eq!(report.description.as_deref(), Some("Artisan bread baked daily."));
        assert_eq!(report.h1s, vec!["Welcome to Acme"]);
        assert_eq!(report.h2s.len(), 2);
    }

    #[test]
    fn parses_open_graph_and_schema_org() {
        let report = MetadataAnalyzer::parse_html(SAMPLE);
        assert_eq!(report.open_graph["title"], "Acme Bakery");
        assert_eq!(report.open_graph.len(), 2);
        assert_eq!(report.schema_org, vec!["Bakery"]);
    }

    #[test]
    fn content_first_description_attribute_order_is_handled() {
        let html = r#"<meta content="Reversed order." name="description">"#;
        let report = MetadataAnalyzer::parse_html(html);
        assert_eq!(report.description.as_deref(), Some("Reversed order."));
    }

    #[test]
    fn empty_page_yields_empty_report() {
        let report = MetadataAnalyzer::parse_html("<html></html>");
        assert!(report.title.is_none());
        assert!(report.description.is_none());
        assert!(report.h1s.is_empty());
        assert!(report.open_graph.is_empty());
        assert!(report.schema_org.is_empty());
    }

    #[test]
    fn nested_tags_are_stripped_from_headings() {
        let html = "<h1><span class=\"big\">Hello</span> <b>World</b></h1>";
        let report = MetadataAnalyzer::parse_html(html);
        assert_eq!(report.h1s, vec!["Hello World"]);
    }
}
