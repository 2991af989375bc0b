//! Audit lifecycle endpoints
//!
//! POST starts an audit as a background task and returns 202 with the
//! pre-assigned analysis id; GET endpoints read the bundle and its run
//! log; cancel fires the audit's cancellation token.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sitepulse_common::AuditTarget;
use tokio_util::sync::CancellationToken;

use crate::db::bundles::load_bundle;
use crate::db::runs::list_runs;
use crate::models::{AnalysisBundle, AuditRun};
use crate::orchestrator::Orchestrator;
use crate::{ApiError, ApiResult, AppState};

/// POST /api/audit request
#[derive(Debug, Deserialize)]
pub struct StartAuditRequest {
    /// Target URL, http or https
    pub url: String,
    /// Optional business name; enables the maps stage
    #[serde(default)]
    pub business_name: Option<String>,
}

/// POST /api/audit response
#[derive(Debug, Serialize)]
pub struct StartAuditResponse {
    pub analysis_id: Uuid,
    pub url: String,
    pub status: String,
}

/// GET /api/audit/{id}/runs response
#[derive(Debug, Serialize)]
pub struct RunListResponse {
    pub analysis_id: Uuid,
    pub runs: Vec<AuditRun>,
}

/// POST /api/audit/{id}/cancel response
#[derive(Debug, Serialize)]
pub struct CancelAuditResponse {
    pub analysis_id: Uuid,
    pub cancelled: bool,
}

/// POST /api/audit
///
/// Begin an audit. Returns 202 Accepted with the analysis id; the
/// pipeline runs as a background task and progress streams over SSE.
pub async fn start_audit(
    State(state): State<AppState>,
    Json(request): Json<StartAuditRequest>,
) -> ApiResult<(StatusCode, Json<StartAuditResponse>)> {
    let target = AuditTarget::new(&request.url, request.business_name)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // Provider keys are resolved up front so a database problem
    // surfaces here instead of inside the background task
    let orchestrator = Orchestrator::with_default_stages(state.db.clone(), state.event_bus.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to configure audit pipeline: {}", e)))?;

    let analysis_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(analysis_id, cancel.clone());

    tracing::info!(
        analysis_id = %analysis_id,
        url = %target.url,
        has_business_name = target.business_name.is_some(),
        "Audit accepted"
    );

    let response = StartAuditResponse {
        analysis_id,
        url: target.url.clone(),
        status: "processing".to_string(),
    };

    let task_state = state.clone();
    tokio::spawn(async move {
        orchestrator.run(analysis_id, target, cancel).await;
        task_state
            .cancellation_tokens
            .write()
            .await
            .remove(&analysis_id);
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /api/audit/{id}
///
/// Fetch the analysis bundle: category results, scores,
/// recommendations, and the merged AI insight.
pub async fn get_audit(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisBundle>> {
    let bundle = load_bundle(&state.db, analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis not found: {}", analysis_id)))?;

    Ok(Json(bundle))
}

/// GET /api/audit/{id}/runs
///
/// Fetch the per-stage execution log for an analysis.
pub async fn get_audit_runs(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<RunListResponse>> {
    // 404 for unknown analyses rather than an empty list
    load_bundle(&state.db, analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis not found: {}", analysis_id)))?;

    let runs = list_runs(&state.db, analysis_id).await?;
    Ok(Json(RunListResponse { analysis_id, runs }))
}

/// POST /api/audit/{id}/cancel
///
/// Cancel a running audit. In-flight stages finish as timeout and the
/// bundle is marked failed.
pub async fn cancel_audit(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<CancelAuditResponse>> {
    let token = state
        .cancellation_tokens
        .read()
        .await
        .get(&analysis_id)
        .cloned();

    if let Some(token) = token {
        token.cancel();
        tracing::info!(analysis_id = %analysis_id, "Audit cancellation requested");
        return Ok(Json(CancelAuditResponse {
            analysis_id,
            cancelled: true,
        }));
    }

    // No live token: either the analysis never existed or it is
    // already terminal
    let bundle = load_bundle(&state.db, analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Analysis not found: {}", analysis_id)))?;

    Err(ApiError::Conflict(format!(
        "Analysis is not running (status: {})",
        bundle.status.as_str()
    )))
}

/// Build audit routes
pub fn audit_routes() -> Router<AppState> {
    Router::new()
        .route("/api/audit", post(start_audit))
        .route("/api/audit/:analysis_id", get(get_audit))
        .route("/api/audit/:analysis_id/runs", get(get_audit_runs))
        .route("/api/audit/:analysis_id/cancel", post(cancel_audit))
}
