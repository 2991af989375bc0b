//! Settings API endpoint
//!
//! Provides POST /api/settings/{provider}/api_key so keys can be
//! configured at runtime without a restart. The database write is
//! authoritative; the TOML backup is best-effort.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sitepulse_common::db::settings::set_setting;

use crate::config::{is_valid_key, setting_key, KEY_PROVIDERS};
use crate::{ApiError, ApiResult, AppState};

/// Request payload for setting a provider API key
#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    /// The API key to configure
    pub api_key: String,
}

/// Response payload for API key configuration
#[derive(Debug, Serialize)]
pub struct SetApiKeyResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Human-readable status message
    pub message: String,
}

/// POST /api/settings/{provider}/api_key handler
///
/// **Request:** `{"api_key": "your-key"}`
/// **Response:** `{"success": true, "message": "..."}`
///
/// **Errors:**
/// - 400 Bad Request: Unknown provider, or empty/whitespace-only key
/// - 500 Internal Server Error: Database write failure
pub async fn set_provider_api_key(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !KEY_PROVIDERS.contains(&provider.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Unknown provider '{}'. Expected one of: {}",
            provider,
            KEY_PROVIDERS.join(", ")
        )));
    }

    if !is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    let setting = setting_key(&provider);

    // Write to database (authoritative)
    set_setting(&state.db, &setting, &payload.api_key)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("{} API key configured via settings API", provider);

    // Sync to TOML (best-effort backup)
    if let Err(e) = crate::config::sync_key_to_toml(&setting, &payload.api_key) {
        warn!("TOML sync failed (database write succeeded): {}", e);
    }

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: format!("{} API key configured successfully", provider),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/:provider/api_key", post(set_provider_api_key))
}
