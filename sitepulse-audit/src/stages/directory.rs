//! Maps stage: business-directory entity lookup
//!
//! Resolves the target's business name against a places-style text
//! search API: the best match becomes the scored entity, the rest of
//! the first page become nearby competitors. Requires an API key;
//! without one the stage reports itself unavailable.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use serde::Deserialize;

use sitepulse_common::{AuditTarget, AuditType};

use crate::models::reports::{BusinessEntity, Competitor, DirectoryReport};
use crate::stages::{DirectRateLimiter, USER_AGENT};
use crate::types::{StageAnalyzer, StageError, StageOutput, StageReport};

const PLACES_API_URL: &str =
    "https://maps.googleapis.com/maps/api/place/textsearch/json";

/// Competitors reported from the first results page
const MAX_COMPETITORS: usize = 5;

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    name: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<u32>,
    #[serde(default)]
    business_status: Option<String>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    photos: Vec<serde_json::Value>,
}

impl PlaceResult {
    fn into_entity(self) -> BusinessEntity {
        BusinessEntity {
            verified: self.business_status.as_deref() == Some("OPERATIONAL"),
            photo_count: if self.photos.is_empty() {
                None
            } else {
                Some(self.photos.len() as u32)
            },
            name: self.name,
            rating: self.rating,
            review_count: self.user_ratings_total,
            address: self.formatted_address,
        }
    }
}

/// Places-backed business directory analyzer
pub struct DirectoryAnalyzer {
    client: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: DirectRateLimiter,
}

impl DirectoryAnalyzer {
    pub fn new(api_key: Option<String>) -> Self {
        let quota = governor::Quota::per_second(NonZeroU32::new(5).expect("5 is non-zero"));

        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(25))
                .build()
                .expect("failed to build HTTP client"),
            api_key,
            rate_limiter: governor::RateLimiter::direct(quota),
        }
    }
}

#[async_trait::async_trait]
impl StageAnalyzer for DirectoryAnalyzer {
    fn audit_type(&self) -> AuditType {
        AuditType::Maps
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn analyze(&self, target: &AuditTarget) -> Result<StageReport, StageError> {
        let business_name = target.business_name.as_deref().ok_or_else(|| {
            StageError::Internal("Maps stage invoked without a business name".to_string())
        })?;
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            StageError::NotAvailable("Maps API key not configured".to_string())
        })?;

        self.rate_limiter.until_ready().await;

        let started = Instant::now();
        let response = self
            .client
            .get(PLACES_API_URL)
            .query(&[("query", business_name), ("key", api_key)])
            .send()
            .await
            .map_err(StageError::from_request)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::from_status(status, body));
        }

        let parsed: PlacesResponse = response
            .json()
            .await
            .map_err(|e| StageError::Parse(format!("Places response: {}", e)))?;

        // The places API signals errors in-band with a 200 status
        match parsed.status.as_str() {
            "OK" | "ZERO_RESULTS" => {}
            "OVER_QUERY_LIMIT" => {
                return Err(StageError::Quota(
                    parsed.error_message.unwrap_or(parsed.status),
                ))
            }
            "REQUEST_DENIED" => {
                return Err(StageError::Auth(
                    parsed.error_message.unwrap_or(parsed.status),
                ))
            }
            other => {
                return Err(StageError::Internal(format!(
                    "Places API status {}: {}",
                    other,
                    parsed.error_message.unwrap_or_default()
                )))
            }
        }

        let mut results = parsed.results.into_iter();
        let matched_entity = results.next().map(PlaceResult::into_entity);
        let nearby_competitors = results
            .take(MAX_COMPETITORS)
            .map(|r| Competitor {
                name: r.name,
                rating: r.rating,
            })
            .collect();

        let report = DirectoryReport {
            matched_entity,
            nearby_competitors,
        };

        tracing::debug!(
            business_name = %business_name,
            matched = report.matched_entity.is_some(),
            competitors = report.nearby_competitors.len(),
            "Directory lookup complete"
        );

        Ok(StageReport::with_timings(
            StageOutput::Maps(report),
            vec![elapsed_ms],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_result_maps_onto_entity() {
        let json = serde_json::json!({
            "name": "Acme Bakery",
            "rating": 4.6,
            "user_ratings_total": 210,
            "business_status": "OPERATIONAL",
            "formatted_address": "1 Main St",
            "photos": [{}, {}, {}]
        });
        let result: PlaceResult = serde_json::from_value(json).unwrap();
        let entity = result.into_entity();

        assert_eq!(entity.name, "Acme Bakery");
        assert_eq!(entity.rating, Some(4.6));
        assert_eq!(entity.review_count, Some(210));
        assert!(entity.verified);
        assert_eq!(entity.photo_count, Some(3));
    }

    #[test]
    fn closed_business_is_not_verified() {
        let json = serde_json::json!({
            "name": "Shuttered Shop",
            "business_status": "CLOSED_PERMANENTLY"
        });
        let result: PlaceResult = serde_json::from_value(json).unwrap();
        let entity = result.into_entity();
        assert!(!entity.verified);
        assert_eq!(entity.photo_count, None);
    }

    #[test]
    fn zero_results_response_parses_empty() {
        let json = serde_json::json!({"status": "ZERO_RESULTS"});
        let parsed: PlacesResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.status, "ZERO_RESULTS");
        assert!(parsed.results.is_empty());
    }
}
