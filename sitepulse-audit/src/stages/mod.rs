//! Stage analyzers: one implementation per audit dimension
//!
//! Each analyzer owns its HTTP client, timeout, and error mapping, and
//! implements the `StageAnalyzer` trait from `types`. All of them are
//! intentionally shallow collaborators; the pipeline around them is the
//! interesting part.

pub mod directory;
pub mod metadata;
pub mod performance;
pub mod security;
pub mod technology;

pub use directory::DirectoryAnalyzer;
pub use metadata::MetadataAnalyzer;
pub use performance::PerformanceAnalyzer;
pub use security::SecurityAnalyzer;
pub use technology::TechnologyAnalyzer;

use std::sync::Arc;

use crate::types::StageAnalyzer;

/// User agent sent on every outbound request
pub const USER_AGENT: &str = "SitePulse/0.1.0 (website audit bot)";

/// Rate limiter type used by analyzers that call quota-limited APIs
pub type DirectRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Build the default level-1 analyzer set
///
/// The maps analyzer is always in the set; the orchestrator skips it
/// for targets without a business name.
pub fn default_analyzers(
    pagespeed_api_key: Option<String>,
    maps_api_key: Option<String>,
) -> Vec<Arc<dyn StageAnalyzer>> {
    vec![
        Arc::new(PerformanceAnalyzer::new(pagespeed_api_key)),
        Arc::new(TechnologyAnalyzer::new()),
        Arc::new(SecurityAnalyzer::new()),
        Arc::new(MetadataAnalyzer::new()),
        Arc::new(DirectoryAnalyzer::new(maps_api_key)),
    ]
}
