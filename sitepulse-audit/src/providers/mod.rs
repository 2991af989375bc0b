//! AI insight provider adapters
//!
//! Each adapter turns the assembled stage context into one free-text
//! narrative via a chat-completion API. Adapters fail independently;
//! the AI stage catches their errors before the merge.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;
use std::time::Duration;

use crate::types::InsightProvider;

/// Request deadline for a single completion call
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);

/// Connection establishment deadline
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// System prompt shared by every provider
pub const SYSTEM_PROMPT: &str =
    "You are a website audit analyst. Given the structured audit findings, \
     write a concise narrative assessment. Include an overall score out of \
     100, the site's main strengths and weaknesses, and a short list of \
     concrete recommendations.";

/// Build the provider set from whichever API keys are configured
///
/// An empty result is valid: the merge then falls back to its
/// deterministic zero-provider output.
pub fn configured_providers(
    openai_api_key: Option<String>,
    anthropic_api_key: Option<String>,
) -> Vec<Arc<dyn InsightProvider>> {
    let mut providers: Vec<Arc<dyn InsightProvider>> = Vec::new();
    if let Some(key) = openai_api_key {
        providers.push(Arc::new(OpenAiProvider::new(key)));
    }
    if let Some(key) = anthropic_api_key {
        providers.push(Arc::new(AnthropicProvider::new(key)));
    }
    providers
}
