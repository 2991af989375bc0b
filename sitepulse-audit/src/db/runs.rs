//! Audit run persistence
//!
//! The `audit_runs` table is the append-only execution log: one insert
//! when a stage starts, one terminal update when it finishes, never a
//! delete. Each terminal write is its own short statement so one
//! stage's persistence failure cannot roll back another's recorded
//! success.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use sitepulse_common::db::settings::get_i64_setting;
use sitepulse_common::{AuditType, Error, Result};

use crate::db::retry::retry_on_lock;
use crate::models::{AuditRun, RunStatus};

/// Insert a freshly started run row
pub async fn insert_run(pool: &SqlitePool, run: &AuditRun) -> Result<()> {
    let max_wait_ms = get_i64_setting(pool, "database_max_lock_wait_ms", 5000).await? as u64;
    let id = run.id.to_string();
    let parent = run.parent_analysis_id.to_string();
    let started_at = run.started_at.map(|dt| dt.to_rfc3339());

    retry_on_lock("insert_run", max_wait_ms, || async {
        sqlx::query(
            r#"
            INSERT INTO audit_runs (
                id, parent_analysis_id, audit_type, status,
                started_at, attempts, max_attempts
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&parent)
        .bind(run.audit_type.as_str())
        .bind(run.status.as_str())
        .bind(&started_at)
        .bind(run.attempts as i64)
        .bind(run.max_attempts as i64)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Write a run's terminal state: status, payload, and telemetry
pub async fn update_run_terminal(pool: &SqlitePool, run: &AuditRun) -> Result<()> {
    let max_wait_ms = get_i64_setting(pool, "database_max_lock_wait_ms", 5000).await? as u64;
    let id = run.id.to_string();
    let completed_at = run.completed_at.map(|dt| dt.to_rfc3339());
    let result_data = run.result_data.as_ref().map(|v| v.to_string());
    let error_details = run.error_details.as_ref().map(|v| v.to_string());
    let debug_info = run.debug_info.as_ref().map(|v| v.to_string());
    let api_response_times = serde_json::to_string(&run.api_response_times)
        .map_err(|e| Error::Internal(format!("Failed to serialize response times: {}", e)))?;

    retry_on_lock("update_run_terminal", max_wait_ms, || async {
        sqlx::query(
            r#"
            UPDATE audit_runs
            SET status = ?,
                completed_at = ?,
                attempts = ?,
                result_data = ?,
                error_message = ?,
                error_details = ?,
                debug_info = ?,
                memory_usage_mb = ?,
                cpu_usage_seconds = ?,
                api_calls_made = ?,
                api_response_times = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(&completed_at)
        .bind(run.attempts as i64)
        .bind(&result_data)
        .bind(&run.error_message)
        .bind(&error_details)
        .bind(&debug_info)
        .bind(run.memory_usage_mb)
        .bind(run.cpu_usage_seconds)
        .bind(run.api_calls_made.map(|v| v as i64))
        .bind(&api_response_times)
        .bind(&id)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditRun> {
    let id_str: String = row.get("id");
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| Error::Internal(format!("Failed to parse run id: {}", e)))?;

    let parent_str: String = row.get("parent_analysis_id");
    let parent_analysis_id = Uuid::parse_str(&parent_str)
        .map_err(|e| Error::Internal(format!("Failed to parse parent id: {}", e)))?;

    let audit_type_str: String = row.get("audit_type");
    let status_str: String = row.get("status");

    let parse_time = |value: Option<String>, label: &str| -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        value
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", label, e)))
            .map(|opt| opt.map(|dt| dt.with_timezone(&chrono::Utc)))
    };

    let parse_json = |value: Option<String>, label: &str| -> Result<Option<serde_json::Value>> {
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", label, e)))
    };

    let api_response_times: Vec<u64> = match row.get::<Option<String>, _>("api_response_times") {
        Some(s) => serde_json::from_str(&s)
            .map_err(|e| Error::Internal(format!("Failed to parse response times: {}", e)))?,
        None => Vec::new(),
    };

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP writes "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(&created_at, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc().fixed_offset())
        })
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(AuditRun {
        id,
        parent_analysis_id,
        audit_type: AuditType::parse(&audit_type_str)?,
        status: RunStatus::parse(&status_str)?,
        started_at: parse_time(row.get("started_at"), "started_at")?,
        completed_at: parse_time(row.get("completed_at"), "completed_at")?,
        attempts: row.get::<i64, _>("attempts") as u32,
        max_attempts: row.get::<i64, _>("max_attempts") as u32,
        result_data: parse_json(row.get("result_data"), "result_data")?,
        error_message: row.get("error_message"),
        error_details: parse_json(row.get("error_details"), "error_details")?,
        debug_info: parse_json(row.get("debug_info"), "debug_info")?,
        memory_usage_mb: row.get("memory_usage_mb"),
        cpu_usage_seconds: row.get("cpu_usage_seconds"),
        api_calls_made: row.get::<Option<i64>, _>("api_calls_made").map(|v| v as u32),
        api_response_times,
        created_at,
    })
}

/// List all runs owned by an analysis, oldest first
pub async fn list_runs(pool: &SqlitePool, parent_analysis_id: Uuid) -> Result<Vec<AuditRun>> {
    let rows = sqlx::query(
        r#"
        SELECT id, parent_analysis_id, audit_type, status,
               started_at, completed_at, attempts, max_attempts,
               result_data, error_message, error_details, debug_info,
               memory_usage_mb, cpu_usage_seconds, api_calls_made,
               api_response_times, created_at
        FROM audit_runs
        WHERE parent_analysis_id = ?
        ORDER BY created_at, rowid
        "#,
    )
    .bind(parent_analysis_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(run_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bundles::save_bundle;
    use crate::models::AnalysisBundle;
    use sitepulse_common::db::init_database;
    use sitepulse_common::AuditTarget;

    async fn pool_with_bundle() -> (tempfile::TempDir, SqlitePool, Uuid) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = init_database(&tmp.path().join("sitepulse.db")).await.unwrap();

        let target = AuditTarget::new("https://example.com", None).unwrap();
        let bundle = AnalysisBundle::new(Uuid::new_v4(), &target);
        save_bundle(&pool, &bundle).await.unwrap();

        (tmp, pool, bundle.id)
    }

    #[tokio::test]
    async fn run_round_trips_with_terminal_payload() {
        let (_tmp, pool, parent) = pool_with_bundle().await;

        let mut run = AuditRun::new(parent, AuditType::Security);
        run.transition_to(RunStatus::Running).unwrap();
        run.attempts = 1;
        insert_run(&pool, &run).await.unwrap();

        run.transition_to(RunStatus::Completed).unwrap();
        run.result_data = Some(serde_json::json!({"has_ssl": true}));
        run.api_calls_made = Some(1);
        run.api_response_times = vec![153];
        update_run_terminal(&pool, &run).await.unwrap();

        let runs = list_runs(&pool, parent).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].audit_type, AuditType::Security);
        assert_eq!(runs[0].attempts, 1);
        assert_eq!(runs[0].result_data.as_ref().unwrap()["has_ssl"], true);
        assert_eq!(runs[0].api_response_times, vec![153]);
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_run_records_error_details() {
        let (_tmp, pool, parent) = pool_with_bundle().await;

        let mut run = AuditRun::new(parent, AuditType::Performance);
        run.transition_to(RunStatus::Running).unwrap();
        insert_run(&pool, &run).await.unwrap();

        run.transition_to(RunStatus::Failed).unwrap();
        run.attempts = 3;
        run.error_message = Some("Network error: connection refused".to_string());
        run.error_details = Some(serde_json::json!({"kind": "network"}));
        update_run_terminal(&pool, &run).await.unwrap();

        let runs = list_runs(&pool, parent).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].attempts, 3);
        assert_eq!(runs[0].error_details.as_ref().unwrap()["kind"], "network");
    }

    #[tokio::test]
    async fn runs_list_in_insertion_order() {
        let (_tmp, pool, parent) = pool_with_bundle().await;

        for audit_type in [AuditType::Performance, AuditType::Security, AuditType::Ai] {
            let mut run = AuditRun::new(parent, audit_type);
            run.transition_to(RunStatus::Running).unwrap();
            insert_run(&pool, &run).await.unwrap();
        }

        let runs = list_runs(&pool, parent).await.unwrap();
        let types: Vec<AuditType> = runs.iter().map(|r| r.audit_type).collect();
        assert_eq!(
            types,
            vec![AuditType::Performance, AuditType::Security, AuditType::Ai]
        );
    }

    #[tokio::test]
    async fn listing_unknown_parent_is_empty() {
        let (_tmp, pool, _parent) = pool_with_bundle().await;
        let runs = list_runs(&pool, Uuid::new_v4()).await.unwrap();
        assert!(runs.is_empty());
    }
}
