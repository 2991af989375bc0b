//! Threshold-derived recommendations
//!
//! Compares each sub-score against fixed thresholds and emits a
//! prioritized recommendation per shortfall. Exposed alongside the
//! score card on the bundle.

use serde::{Deserialize, Serialize};

use crate::models::ScoreCard;

/// Recommendation priority, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

/// One actionable recommendation derived from the scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub description: String,
}

/// Derive recommendations from the score card
///
/// Fixed thresholds: performance < 70 high, security < 60 critical,
/// seo < 80 medium, ux < 65 medium, maps_presence < 40 low (only when a
/// business name was given, otherwise the dimension was never in play).
/// Results are ordered by priority.
pub fn derive_recommendations(card: &ScoreCard, has_business_name: bool) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    if card.security < 60 {
        recommendations.push(Recommendation {
            priority: Priority::Critical,
            category: "security".to_string(),
            title: "Harden transport security".to_string(),
            description: format!(
                "Security scored {}/100. Serve the site over HTTPS and add the \
                 missing security response headers (HSTS, CSP, X-Frame-Options).",
                card.security
            ),
        });
    }

    if card.performance < 70 {
        recommendations.push(Recommendation {
            priority: Priority::High,
            category: "performance".to_string(),
            title: "Improve page load performance".to_string(),
            description: format!(
                "Performance scored {}/100. Compress images, reduce render-blocking \
                 resources, and enable caching to improve Core Web Vitals.",
                card.performance
            ),
        });
    }

    if card.seo < 80 {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            category: "seo".to_string(),
            title: "Fill in missing on-page SEO elements".to_string(),
            description: format!(
                "SEO scored {}/100. Ensure the page has a title, meta description, \
                 heading structure, Open Graph tags, and a sitemap.",
                card.seo
            ),
        });
    }

    if card.ux < 65 {
        recommendations.push(Recommendation {
            priority: Priority::Medium,
            category: "ux".to_string(),
            title: "Improve the user experience baseline".to_string(),
            description: format!(
                "UX scored {}/100. The derived experience score tracks page speed \
                 and connection safety; improving both lifts it.",
                card.ux
            ),
        });
    }

    if has_business_name && card.maps_presence < 40 {
        recommendations.push(Recommendation {
            priority: Priority::Low,
            category: "maps".to_string(),
            title: "Claim and complete the business directory listing".to_string(),
            description: format!(
                "Maps presence scored {}/100. Claim the listing, add photos, and \
                 gather reviews to improve local visibility.",
                card.maps_presence
            ),
        });
    }

    recommendations.sort_by_key(|r| r.priority);
    recommendations
}
