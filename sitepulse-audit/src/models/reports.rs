//! Structured per-stage result types
//!
//! Each analyzer produces one of these; the bundle stores them per
//! category. All fields are serialized into the bundle's JSON columns
//! and into `AuditRun.result_data`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Performance stage result: Lighthouse-style scores plus the metrics
/// the score calculator and report consumers need
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Mobile strategy score, 0-100
    pub mobile_score: i64,
    /// Desktop strategy score, 0-100
    pub desktop_score: i64,
    pub core_web_vitals: CoreWebVitals,
    pub network_metrics: NetworkMetrics,
}

/// Core Web Vitals measured on the mobile run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreWebVitals {
    /// Largest Contentful Paint, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp_ms: Option<f64>,
    /// First Contentful Paint, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcp_ms: Option<f64>,
    /// Cumulative Layout Shift, unitless
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    /// Total Blocking Time, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbt_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkMetrics {
    /// Total transferred bytes reported by the page audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_byte_weight: Option<f64>,
    /// Number of network requests the page issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<u32>,
}

/// Security stage result: TLS presence and response-header posture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityReport {
    pub has_ssl: bool,
    /// Coarse letter grade derived from TLS and header posture
    pub ssl_grade: String,
    /// Checked header name -> score contribution (100 when present, 0
    /// when missing). The security sub-score sums these divided by 10.
    pub security_headers: BTreeMap<String, i64>,
    /// Human-readable findings (missing headers, exposed versions)
    pub vulnerabilities: Vec<String>,
}

/// Technology stage result: detected stack grouped by category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnologyReport {
    /// category name -> detected technology names
    pub detected: BTreeMap<String, Vec<String>>,
}

/// Metadata/SEO stage result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub h1s: Vec<String>,
    pub h2s: Vec<String>,
    /// og:* property name (without prefix) -> content
    pub open_graph: BTreeMap<String, String>,
    /// Schema.org @type values found in JSON-LD blocks
    pub schema_org: Vec<String>,
    pub has_robots_txt: bool,
    pub has_sitemap: bool,
}

/// Maps/business-directory stage result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryReport {
    /// Best directory match for the business name, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_entity: Option<BusinessEntity>,
    pub nearby_competitors: Vec<Competitor>,
}

/// One matched directory entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessEntity {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}
