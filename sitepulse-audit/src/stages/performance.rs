//! Performance stage: Lighthouse scores via the PageSpeed API
//!
//! Runs one mobile and one desktop analysis against the target. The
//! mobile run also supplies Core Web Vitals and network metrics.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use serde::Deserialize;

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::{CoreWebVitals, NetworkMetrics, PerformanceReport};
use crate::stages::{DirectRateLimiter, USER_AGENT};
use crate::types::{StageAnalyzer, StageError, StageOutput, StageReport};

const PAGESPEED_API_URL: &str =
    "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Per-request timeout; a full Lighthouse run routinely takes tens of
/// seconds
const REQUEST_TIMEOUT: Duration = Duration::from_secs(55);

#[derive(Debug, Deserialize)]
struct PageSpeedResponse {
    #[serde(rename = "lighthouseResult")]
    lighthouse_result: LighthouseResult,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    categories: Categories,
    #[serde(default)]
    audits: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Categories {
    performance: CategoryScore,
}

#[derive(Debug, Deserialize)]
struct CategoryScore {
    /// 0.0 - 1.0
    score: f64,
}

impl LighthouseResult {
    fn numeric_audit(&self, key: &str) -> Option<f64> {
        self.audits
            .get(key)
            .and_then(|a| a.get("numericValue"))
            .and_then(|v| v.as_f64())
    }
}

/// PageSpeed-backed performance analyzer
pub struct PerformanceAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl PerformanceAnalyzer {
    /// Build the analyzer; the API key is optional (keyless calls run
    /// against the shared public quota)
    pub fn new(api_key: Option<String>) -> Self {
        // PageSpeed free tier allows ~1 request/second sustained
        let quota = governor::Quota::per_second(NonZeroU32::new(1).expect("1 is non-zero"));

        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            rate_limiter: governor::RateLimiter::direct(quota),
        }
    }

    /// Run one Lighthouse analysis for the given strategy
    async fn run_strategy(
        &self,
        url: &str,
        strategy: &str,
    ) -> Result<(LighthouseResult, u64), StageError> {
        self.rate_limiter.until_ready().await;

        let mut request = self
            .client
            .get(PAGESPEED_API_URL)
            .query(&[("url", url), ("strategy", strategy)]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let started = Instant::now();
        let response = request.send().await.map_err(StageError::from_request)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, body));
        }

        let parsed: PageSpeedResponse = response
            .json()
            .await
            .map_err(|e| StageError::Parse(format!("PageSpeed response: {}", e)))?;

        Ok((parsed.lighthouse_result, elapsed_ms))
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for PerformanceAnalyzer {
    fn audit_type(&self) -> AuditType {
        AuditType::Performance
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    async fn analyze(&self, target: &AuditTarget) -> Result<StageReport, StageError> {
        let (mobile, mobile_ms) = self.run_strategy(&target.url, "mobile").await?;
        let (desktop, desktop_ms) = self.run_strategy(&target.url, "desktop").await?;

        let report = PerformanceReport {
            mobile_score: (mobile.categories.performance.score * 100.0).round() as i64,
            desktop_score: (desktop.categories.performance.score * 100.0).round() as i64,
            core_web_vitals: CoreWebVitals {
                lcp_ms: mobile.numeric_audit("largest-contentful-paint"),
                fcp_ms: mobile.numeric_audit("first-contentful-paint"),
                cls: mobile.numeric_audit("cumulative-layout-shift"),
                tbt_ms: mobile.numeric_audit("total-blocking-time"),
            },
            network_metrics: NetworkMetrics {
                total_byte_weight: mobile.numeric_audit("total-byte-weight"),
                request_count: mobile
                    .numeric_audit("network-requests")
                    .map(|v| v as u32),
            },
        };

        tracing::debug!(
            url = %target.url,
            mobile = report.mobile_score,
            desktop = report.desktop_score,
            "Performance analysis complete"
        );

        Ok(StageReport::with_timings(
            StageOutput::Performance(report),
            vec![mobile_ms, desktop_ms],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lighthouse_response_parses_scores_and_audits() {
        let json = serde_json::json!({
            "lighthouseResult": {
                "categories": { "performance": { "score": 0.92 } },
                "audits": {
                    "largest-contentful-paint": { "numericValue": 2400.5 },
                    "total-byte-weight": { "numericValue": 1048576.0 }
                }
            }
        });

        let parsed: PageSpeedResponse = serde_json::from_value(json).unwrap();
        let result = parsed.lighthouse_result;
        assert_eq!((result.categories.performance.score * 100.0).round() as i64, 92);
        assert_eq!(result.numeric_audit("largest-contentful-paint"), Some(2400.5));
        assert_eq!(result.numeric_audit("speed-index"), None);
    }

    #[test]
    fn audits_field_is_optional() {
        let json = serde_json::json!({
            "lighthouseResult": {
                "categories": { "performance": { "score": 0.5 } }
            }
        });
        let parsed: PageSpeedResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.lighthouse_result.numeric_audit("anything"), None);
    }
}
