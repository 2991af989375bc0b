//! Shared audit domain types
//!
//! Types used by both the audit engine and any future consumer services:
//! the audit target descriptor and the fixed set of audit dimensions.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of audit dimensions.
///
/// One `AuditRun` is recorded per dimension attempted for a target. The
/// set is closed: stage topology is fixed and small, not pluggable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    Performance,
    Security,
    Technology,
    Metadata,
    Ai,
    Maps,
}

impl AuditType {
    /// Stable string form used in database rows and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditType::Performance => "performance",
            AuditType::Security => "security",
            AuditType::Technology => "technology",
            AuditType::Metadata => "metadata",
            AuditType::Ai => "ai",
            AuditType::Maps => "maps",
        }
    }

    /// Parse the database string form back into the enum
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "performance" => Ok(AuditType::Performance),
            "security" => Ok(AuditType::Security),
            "technology" => Ok(AuditType::Technology),
            "metadata" => Ok(AuditType::Metadata),
            "ai" => Ok(AuditType::Ai),
            "maps" => Ok(AuditType::Maps),
            other => Err(Error::InvalidInput(format!("Unknown audit type: {}", other))),
        }
    }

    /// All dimensions in pipeline invocation order (AI last)
    pub fn all() -> [AuditType; 6] {
        [
            AuditType::Performance,
            AuditType::Technology,
            AuditType::Security,
            AuditType::Metadata,
            AuditType::Maps,
            AuditType::Ai,
        ]
    }
}

impl fmt::Display for AuditType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit target: the URL under analysis plus the optional business
/// name that enables the maps/business-directory dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditTarget {
    /// Full target URL, scheme included
    pub url: String,
    /// Host portion of the URL, lowercased, without port
    pub domain: String,
    /// Business name for directory lookup; absent disables the maps stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,
}

impl AuditTarget {
    /// Validate the URL and derive the domain.
    ///
    /// Only http/https targets are accepted; anything else is a caller
    /// input error, not a stage failure.
    pub fn new(url: &str, business_name: Option<String>) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidInput(format!(
                    "Unsupported URL scheme '{}': expected http or https",
                    other
                )));
            }
        }

        let domain = parsed
            .host_str()
            .ok_or_else(|| Error::InvalidInput(format!("URL has no host: {}", url)))?
            .to_ascii_lowercase();

        let business_name = business_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Self {
            url: parsed.to_string(),
            domain,
            business_name,
        })
    }

    /// Whether the target uses TLS (https scheme)
    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_type_round_trips_through_strings() {
        for t in AuditType::all() {
            assert_eq!(AuditType::parse(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn audit_type_rejects_unknown_string() {
        assert!(AuditType::parse("sentiment").is_err());
    }

    #[test]
    fn target_derives_lowercase_domain() {
        let target = AuditTarget::new("https://Example.COM/path?q=1", None).unwrap();
        assert_eq!(target.domain, "example.com");
        assert!(target.is_https());
        assert!(target.business_name.is_none());
    }

    #[test]
    fn target_rejects_non_http_schemes() {
        assert!(AuditTarget::new("ftp://example.com", None).is_err());
        assert!(AuditTarget::new("not a url", None).is_err());
    }

    #[test]
    fn blank_business_name_is_dropped() {
        let target =
            AuditTarget::new("http://example.com", Some("   ".to_string())).unwrap();
        assert!(target.business_name.is_none());

        let target =
            AuditTarget::new("http://example.com", Some(" Acme Bakery ".to_string())).unwrap();
        assert_eq!(target.business_name.as_deref(), Some("Acme Bakery"));
    }
}
