//! Analysis bundle persistence
//!
//! One row per audited target in the `analyses` table; category results,
//! recommendations, and the AI insight ride in JSON columns.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use sitepulse_common::db::settings::get_i64_setting;
use sitepulse_common::{Error, Result};

use crate::db::retry::retry_on_lock;
use crate::models::{AnalysisBundle, BundleStatus, ScoreCard};

fn to_json<T: serde::Serialize>(label: &str, value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|v| {
            serde_json::to_string(v)
                .map_err(|e| Error::Internal(format!("Failed to serialize {}: {}", label, e)))
        })
        .transpose()
}

fn from_json<T: serde::de::DeserializeOwned>(
    label: &str,
    value: Option<String>,
) -> Result<Option<T>> {
    value
        .map(|s| {
            serde_json::from_str(&s)
                .map_err(|e| Error::Internal(format!("Failed to deserialize {}: {}", label, e)))
        })
        .transpose()
}

/// Save (insert or update) a bundle row
///
/// Serialization happens before any connection is taken; the write
/// itself runs under lock retry.
pub async fn save_bundle(pool: &SqlitePool, bundle: &AnalysisBundle) -> Result<()> {
    let id = bundle.id.to_string();
    let status = bundle.status.as_str();
    let performance = to_json("performance result", &bundle.performance)?;
    let security = to_json("security result", &bundle.security)?;
    let technology = to_json("technology result", &bundle.technology)?;
    let metadata = to_json("metadata result", &bundle.metadata)?;
    let maps = to_json("maps result", &bundle.maps_presence)?;
    let ai_insight = to_json("ai insight", &bundle.ai_insight)?;
    let recommendations = serde_json::to_string(&bundle.recommendations)
        .map_err(|e| Error::Internal(format!("Failed to serialize recommendations: {}", e)))?;
    let started_at = bundle.analysis_started_at.to_rfc3339();
    let completed_at = bundle.analysis_completed_at.map(|dt| dt.to_rfc3339());
    let scores = bundle.scores;

    let max_wait_ms = get_i64_setting(pool, "database_max_lock_wait_ms", 5000).await? as u64;

    retry_on_lock("save_bundle", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO analyses (
                id, url, domain, business_name, status,
                performance_result, security_result, technology_result,
                metadata_result, maps_result, ai_insight, recommendations,
                seo_score, performance_score, security_score, ux_score,
                maps_presence_score, composite_score, error_message,
                analysis_started_at, analysis_completed_at,
                total_analysis_time_seconds
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                performance_result = excluded.performance_result,
                security_result = excluded.security_result,
                technology_result = excluded.technology_result,
                metadata_result = excluded.metadata_result,
                maps_result = excluded.maps_result,
                ai_insight = excluded.ai_insight,
                recommendations = excluded.recommendations,
                seo_score = excluded.seo_score,
                performance_score = excluded.performance_score,
                security_score = excluded.security_score,
                ux_score = excluded.ux_score,
                maps_presence_score = excluded.maps_presence_score,
                composite_score = excluded.composite_score,
                error_message = excluded.error_message,
                analysis_completed_at = excluded.analysis_completed_at,
                total_analysis_time_seconds = excluded.total_analysis_time_seconds
            "#,
        )
        .bind(&id)
        .bind(&bundle.url)
        .bind(&bundle.domain)
        .bind(&bundle.business_name)
        .bind(status)
        .bind(&performance)
        .bind(&security)
        .bind(&technology)
        .bind(&metadata)
        .bind(&maps)
        .bind(&ai_insight)
        .bind(&recommendations)
        .bind(scores.map(|s| s.seo))
        .bind(scores.map(|s| s.performance))
        .bind(scores.map(|s| s.security))
        .bind(scores.map(|s| s.ux))
        .bind(scores.map(|s| s.maps_presence))
        .bind(scores.map(|s| s.overall))
        .bind(&bundle.error_message)
        .bind(&started_at)
        .bind(&completed_at)
        .bind(bundle.total_analysis_time_seconds)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load a bundle row by id
pub async fn load_bundle(pool: &SqlitePool, id: Uuid) -> Result<Option<AnalysisBundle>> {
    let row = sqlx::query(
        r#"
        SELECT id, url, domain, business_name, status,
               performance_result, security_result, technology_result,
               metadata_result, maps_result, ai_insight, recommendations,
               seo_score, performance_score, security_score, ux_score,
               maps_presence_score, composite_score, error_message,
               analysis_started_at, analysis_completed_at,
               total_analysis_time_seconds
        FROM analyses
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let status_str: String = row.get("status");
    let status = BundleStatus::parse(&status_str)?;

    let started_at: String = row.get("analysis_started_at");
    let analysis_started_at = chrono::DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse analysis_started_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let completed_at: Option<String> = row.get("analysis_completed_at");
    let analysis_completed_at = completed_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse analysis_completed_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    let recommendations: Option<String> = row.get("recommendations");
    let recommendations = from_json("recommendations", recommendations)?.unwrap_or_default();

    // Score columns are written together; composite presence implies all
    let scores = match row.get::<Option<i64>, _>("composite_score") {
        Some(overall) => Some(ScoreCard {
            performance: row.get::<Option<i64>, _>("performance_score").unwrap_or(0),
            security: row.get::<Option<i64>, _>("security_score").unwrap_or(0),
            seo: row.get::<Option<i64>, _>("seo_score").unwrap_or(0),
            ux: row.get::<Option<i64>, _>("ux_score").unwrap_or(0),
            maps_presence: row
                .get::<Option<i64>, _>("maps_presence_score")
                .unwrap_or(0),
            overall,
        }),
        None => None,
    };

    Ok(Some(AnalysisBundle {
        id,
        url: row.get("url"),
        domain: row.get("domain"),
        business_name: row.get("business_name"),
        status,
        performance: from_json("performance result", row.get("performance_result"))?,
        security: from_json("security result", row.get("security_result"))?,
        technology: from_json("technology result", row.get("technology_result"))?,
        metadata: from_json("metadata result", row.get("metadata_result"))?,
        maps_presence: from_json("maps result", row.get("maps_result"))?,
        ai_insight: from_json("ai insight", row.get("ai_insight"))?,
        recommendations,
        scores,
        error_message: row.get("error_message"),
        analysis_started_at,
        analysis_completed_at,
        total_analysis_time_seconds: row.get("total_analysis_time_seconds"),
    }))
}

/// Whether an analysis is still processing (used for cancel/conflict checks)
pub async fn is_processing(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM analyses WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(status.as_deref() == Some("processing"))
}

/// Best-effort direct status update to failed
///
/// Used on the fatal path where the full bundle save itself may be the
/// thing that is failing.
pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE analyses
        SET status = 'failed',
            error_message = ?,
            analysis_completed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(error)
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Cleanup stale analyses on startup
///
/// Any analysis still `processing` when the service starts is from a
/// previous process run and will never complete; mark it failed.
pub async fn cleanup_stale_analyses(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE analyses
        SET status = 'failed',
            error_message = 'Audit aborted - service was restarted',
            analysis_completed_at = ?
        WHERE status IN ('pending', 'processing')
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}
