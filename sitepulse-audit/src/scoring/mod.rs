//! Composite score calculation
//!
//! Converts each stage's structured result into a 0-100 sub-score and
//! reduces the sub-scores via fixed weights into one overall score. All
//! rules are pure functions over the typed stage reports; an errored or
//! absent stage scores 0 for its dimension.

pub mod recommendations;

pub use recommendations::{derive_recommendations, Priority, Recommendation};

use crate::models::reports::{
    BusinessEntity, MetadataReport, PerformanceReport, SecurityReport,
};
use crate::models::ScoreCard;

/// Fixed reduction weights; must sum to exactly 1.0
pub const WEIGHT_SEO: f64 = 0.30;
pub const WEIGHT_PERFORMANCE: f64 = 0.25;
pub const WEIGHT_SECURITY: f64 = 0.15;
pub const WEIGHT_UX: f64 = 0.15;
pub const WEIGHT_MAPS_PRESENCE: f64 = 0.15;

/// Clamp a computed score into the valid 0-100 range
fn clamp_score(value: f64) -> i64 {
    (value.round() as i64).clamp(0, 100)
}

/// Performance sub-score: mobile weighted 60%, desktop 40%
pub fn performance_subscore(report: Option<&PerformanceReport>) -> i64 {
    match report {
        Some(r) => clamp_score(r.mobile_score as f64 * 0.6 + r.desktop_score as f64 * 0.4),
        None => 0,
    }
}

/// Security sub-score: 40 points for TLS plus header scores summed and
/// divided by 10, capped at 100
pub fn security_subscore(report: Option<&SecurityReport>) -> i64 {
    match report {
        Some(r) => {
            let ssl_bonus = if r.has_ssl { 40.0 } else { 0.0 };
            let header_sum: i64 = r.security_headers.values().sum();
            clamp_score(ssl_bonus + header_sum as f64 / 10.0)
        }
        None => 0,
    }
}

/// SEO sub-score: additive rubric out of 100
///
/// title +20, description +20, >=1 H1 +15, >=1 H2 +10, Open Graph
/// non-empty +15, Schema.org non-empty +10, robots.txt +5, sitemap +5.
pub fn seo_subscore(report: Option<&MetadataReport>) -> i64 {
    let r = match report {
        Some(r) => r,
        None => return 0,
    };

    let mut score = 0i64;
    if r.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        score += 20;
    }
    if r.description.as_deref().is_some_and(|d| !d.trim().is_empty()) {
        score += 20;
    }
    if !r.h1s.is_empty() {
        score += 15;
    }
    if !r.h2s.is_empty() {
        score += 10;
    }
    if !r.open_graph.is_empty() {
        score += 15;
    }
    if !r.schema_org.is_empty() {
        score += 10;
    }
    if r.has_robots_txt {
        score += 5;
    }
    if r.has_sitemap {
        score += 5;
    }

    score.min(100)
}

/// UX sub-score: derived from performance and security, not measured
pub fn ux_subscore(performance: i64, security: i64) -> i64 {
    clamp_score(performance as f64 * 0.7 + security as f64 * 0.3)
}

/// Maps-presence sub-score from the matched directory entity
///
/// 0 without a match; else base 40, +20 rating >= 4.0, +15 reviews
/// >= 50, +15 verified, +10 photos >= 5, capped at 100.
pub fn maps_subscore(entity: Option<&BusinessEntity>) -> i64 {
    let entity = match entity {
        Some(e) => e,
        None => return 0,
    };

    let mut score = 40i64;
    if entity.rating.is_some_and(|r| r >= 4.0) {
        score += 20;
    }
    if entity.review_count.is_some_and(|c| c >= 50) {
        score += 15;
    }
    if entity.verified {
        score += 15;
    }
    if entity.photo_count.is_some_and(|p| p >= 5) {
        score += 10;
    }

    score.min(100)
}

/// Reduce the typed stage reports into the full score card
///
/// Errored or absent stages contribute 0 to their dimension. The
/// weighted sum of values in [0,100] with weights summing to 1.0 stays
/// in range; the final clamp only guards the arithmetic.
pub fn reduce(
    performance: Option<&PerformanceReport>,
    security: Option<&SecurityReport>,
    metadata: Option<&MetadataReport>,
    maps_entity: Option<&BusinessEntity>,
) -> ScoreCard {
    let performance = performance_subscore(performance);
    let security = security_subscore(security);
    let seo = seo_subscore(metadata);
    let ux = ux_subscore(performance, security);
    let maps_presence = maps_subscore(maps_entity);

    let overall = clamp_score(
        seo as f64 * WEIGHT_SEO
            + performance as f64 * WEIGHT_PERFORMANCE
            + security as f64 * WEIGHT_SECURITY
            + ux as f64 * WEIGHT_UX
            + maps_presence as f64 * WEIGHT_MAPS_PRESENCE,
    );

    ScoreCard {
        performance,
        security,
        seo,
        ux,
        maps_presence,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn metadata_full() -> MetadataReport {
        MetadataReport {
            title: Some("T".to_string()),
            description: Some("D".to_string()),
            h1s: vec!["H".to_string()],
            h2s: vec!["H2".to_string()],
            open_graph: BTreeMap::from([("title".to_string(), "T".to_string())]),
            schema_org: vec!["Organization".to_string()],
            has_robots_txt: true,
            has_sitemap: true,
        }
    }

    #[test]
    fn weights_sum_to_one() {
        let sum = WEIGHT_SEO
            + WEIGHT_PERFORMANCE
            + WEIGHT_SECURITY
            + WEIGHT_UX
            + WEIGHT_MAPS_PRESENCE;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_error_inputs_yield_zero_overall() {
        let card = reduce(None, None, None, None);
        assert_eq!(card.overall, 0);
        assert_eq!(card.performance, 0);
        assert_eq!(card.security, 0);
        assert_eq!(card.seo, 0);
        assert_eq!(card.ux, 0);
        assert_eq!(card.maps_presence, 0);
    }

    #[test]
    fn performance_blends_mobile_and_desktop() {
        let report = PerformanceReport {
            mobile_score: 90,
            desktop_score: 95,
            ..Default::default()
        };
        assert_eq!(performance_subscore(Some(&report)), 92);
    }

    #[test]
    fn security_sums_ssl_bonus_and_headers() {
        let mut report = SecurityReport {
            has_ssl: true,
            ..Default::default()
        };
        report.security_headers.insert("strict-transport-security".to_string(), 100);
        report.security_headers.insert("content-security-policy".to_string(), 100);
        report.security_headers.insert("x-frame-options".to_string(), 100);

        // 40 + 300/10 = 70
        assert_eq!(security_subscore(Some(&report)), 70);

        report.has_ssl = false;
        assert_eq!(security_subscore(Some(&report)), 30);
    }

    #[test]
    fn security_caps_at_one_hundred() {
        let mut report = SecurityReport {
            has_ssl: true,
            ..Default::default()
        };
        for i in 0..8 {
            report.security_headers.insert(format!("header-{}", i), 100);
        }
        // 40 + 800/10 = 120, capped
        assert_eq!(security_subscore(Some(&report)), 100);
    }

    #[test]
    fn seo_rubric_is_additive() {
        assert_eq!(seo_subscore(Some(&metadata_full())), 100);

        let mut partial = metadata_full();
        partial.open_graph.clear();
        partial.schema_org.clear();
        partial.h2s.clear();
        // 20 + 20 + 15 + 5 + 5 = 65
        assert_eq!(seo_subscore(Some(&partial)), 65);
    }

    #[test]
    fn blank_title_does_not_score() {
        let mut report = MetadataReport::default();
        report.title = Some("   ".to_string());
        assert_eq!(seo_subscore(Some(&report)), 0);
    }

    #[test]
    fn maps_scoring_follows_entity_quality() {
        assert_eq!(maps_subscore(None), 0);

        let entity = BusinessEntity {
            name: "Acme Bakery".to_string(),
            rating: Some(4.5),
            review_count: Some(120),
            verified: true,
            photo_count: Some(12),
            address: None,
        };
        // 40 + 20 + 15 + 15 + 10 = 100
        assert_eq!(maps_subscore(Some(&entity)), 100);

        let weak = BusinessEntity {
            name: "Acme Bakery".to_string(),
            rating: Some(3.2),
            review_count: Some(4),
            verified: false,
            photo_count: None,
            address: None,
        };
        assert_eq!(maps_subscore(Some(&weak)), 40);
    }

    #[test]
    fn rating_boundary_is_inclusive() {
        let entity = BusinessEntity {
            name: "Acme".to_string(),
            rating: Some(4.0),
            review_count: Some(50),
            verified: false,
            photo_count: Some(5),
            address: None,
        };
        // 40 + 20 + 15 + 10 = 85
        assert_eq!(maps_subscore(Some(&entity)), 85);
    }

    // The documented end-to-end arithmetic: performance {90, 95},
    // security errored, partial metadata, no business name.
    #[test]
    fn end_to_end_scenario_arithmetic() {
        let performance = PerformanceReport {
            mobile_score: 90,
            desktop_score: 95,
            ..Default::default()
        };
        let metadata = MetadataReport {
            title: Some("T".to_string()),
            description: Some("D".to_string()),
            h1s: vec!["H".to_string()],
            h2s: Vec::new(),
            open_graph: BTreeMap::new(),
            schema_org: Vec::new(),
            has_robots_txt: true,
            has_sitemap: true,
        };

        let card = reduce(Some(&performance), None, Some(&metadata), None);
        assert_eq!(card.performance, 92);
        assert_eq!(card.security, 0);
        assert_eq!(card.seo, 65);
        assert_eq!(card.ux, 64);
        assert_eq!(card.maps_presence, 0);
        // round(65*0.30 + 92*0.25 + 0 + 64*0.15 + 0) = round(52.1) = 52
        assert_eq!(card.overall, 52);
    }

    #[test]
    fn overall_stays_in_range_for_extreme_inputs() {
        let performance = PerformanceReport {
            mobile_score: 100,
            desktop_score: 100,
            ..Default::default()
        };
        let mut security = SecurityReport {
            has_ssl: true,
            ..Default::default()
        };
        for i in 0..10 {
            security.security_headers.insert(format!("h{}", i), 100);
        }
        let entity = BusinessEntity {
            name: "Acme".to_string(),
            rating: Some(5.0),
            review_count: Some(1000),
            verified: true,
            photo_count: Some(100),
            address: None,
        };

        let card = reduce(
            Some(&performance),
            Some(&security),
            Some(&metadata_full()),
            Some(&entity),
        );
        assert_eq!(card.overall, 100);
    }
}
