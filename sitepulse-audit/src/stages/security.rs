//! Security stage: TLS presence and response-header posture
//!
//! One request against the target; the interesting data is all in the
//! response headers. No external API involved.

use std::time::{Duration, Instant};

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::SecurityReport;
use crate::stages::USER_AGENT;
use crate::types::{StageAnalyzer, StageError, StageOutput, StageReport};

/// Response headers checked for presence, lowercase
const CHECKED_HEADERS: [&str; 6] = [
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
    "x-content-type-options",
    "referrer-policy",
    "permissions-policy",
];

/// Probes the target's transport security posture
pub struct SecurityAnalyzer {
    client: reqwest::Client,
}

impl Default for SecurityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityAnalyzer {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(25))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Coarse letter grade from TLS and header presence
    fn grade(has_ssl: bool, headers_present: usize) -> &'static str {
        if !has_ssl {
            return "F";
        }
        match headers_present {
            5.. => "A",
            3..=4 => "B",
            1..=2 => "C",
            _ => "D",
        }
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for SecurityAnalyzer {
    fn audit_type(&self) -> AuditType {
        AuditType::Security
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
        let elapsed_ms = started.elapsed().as_millis() as u64;

        // The probe cares about headers, not the body; error pages
        // still carry a header posture worth reporting.
        let has_ssl = target.is_https();
        let headers = response.headers();

        let mut report = SecurityReport {
            has_ssl,
            ..Default::default()
        };

        let mut present = 0usize;
        for name in CHECKED_HEADERS {
            let found = headers.contains_key(name);
            report
                .security_headers
                .insert(name.to_string(), if found { 100 } else { 0 });
            if found {
                present += 1;
            } else {
                report
                    .vulnerabilities
                    .push(format!("Missing {} header", name));
            }
        }

        if !has_ssl {
            report
                .vulnerabilities
                .insert(0, "Site is not served over HTTPS".to_string());
        }

        // Version-revealing headers are findings, not score inputs
        for name in ["server", "x-powered-by"] {
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                if value.contains('/') || value.chars().any(|c| c.is_ascii_digit()) {
                    report
                        .vulnerabilities
                        .push(format!("{} header exposes software version: {}", name, value));
                }
            }
        }

        report.ssl_grade = Self::grade(has_ssl, present).to_string();

        tracing::debug!(
            url = %target.url,
            grade = %report.ssl_grade,
            headers_present = present,
            "Security analysis complete"
        );

        Ok(StageReport::with_timings(
            StageOutput::Security(report),
            vec![elapsed_ms],
        ))
    }
}
