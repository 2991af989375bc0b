//! Database initialization
//!
//! Creates the SQLite database on first run and keeps the schema
//! idempotent: every table uses CREATE TABLE IF NOT EXISTS, and default
//! settings are re-asserted on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Concurrent stage workers each hold a connection for their terminal
    // run write, so the pool is sized above the sqlite default.
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enable foreign keys
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers with one writer, which the parallel
    // stage workers rely on when recording their runs.
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // Initial busy timeout; re-applied from settings once they exist
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_settings_table(&pool).await?;
    create_analyses_table(&pool).await?;
    create_audit_runs_table(&pool).await?;

    init_default_settings(&pool).await?;

    // Apply configurable busy timeout from settings. Short lock waits
    // let the lock-retry helper own the backoff schedule instead.
    let timeout_ms: i64 = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = 'database_lock_retry_ms'",
    )
    .fetch_optional(&pool)
    .await?
    .unwrap_or(250);

    let pragma_sql = format!("PRAGMA busy_timeout = {}", timeout_ms);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    info!("Database busy timeout set to {} ms", timeout_ms);

    Ok(pool)
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the analyses table
///
/// One row per audited target: category results as JSON columns, computed
/// scores, timing, and terminal status.
pub async fn create_analyses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            domain TEXT NOT NULL,
            business_name TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
            performance_result TEXT,
            security_result TEXT,
            technology_result TEXT,
            metadata_result TEXT,
            maps_result TEXT,
            ai_insight TEXT,
            recommendations TEXT,
            seo_score INTEGER,
            performance_score INTEGER,
            security_score INTEGER,
            ux_score INTEGER,
            maps_presence_score INTEGER,
            composite_score INTEGER,
            error_message TEXT,
            analysis_started_at TEXT NOT NULL,
            analysis_completed_at TEXT,
            total_analysis_time_seconds REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (seo_score IS NULL OR (seo_score >= 0 AND seo_score <= 100)),
            CHECK (performance_score IS NULL OR (performance_score >= 0 AND performance_score <= 100)),
            CHECK (security_score IS NULL OR (security_score >= 0 AND security_score <= 100)),
            CHECK (ux_score IS NULL OR (ux_score >= 0 AND ux_score <= 100)),
            CHECK (maps_presence_score IS NULL OR (maps_presence_score >= 0 AND maps_presence_score <= 100)),
            CHECK (composite_score IS NULL OR (composite_score >= 0 AND composite_score <= 100))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_domain ON analyses(domain)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_status ON analyses(status)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the audit_runs table
///
/// Append-only execution log: one row per stage attempt sequence, owned by
/// its parent analysis. Rows are inserted when a stage starts and receive
/// exactly one terminal update; they are never deleted.
pub async fn create_audit_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_runs (
            id TEXT PRIMARY KEY,
            parent_analysis_id TEXT NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
            audit_type TEXT NOT NULL
                CHECK (audit_type IN ('performance', 'security', 'technology', 'metadata', 'ai', 'maps')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'running', 'completed', 'failed', 'timeout')),
            started_at TEXT,
            completed_at TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 3,
            result_data TEXT,
            error_message TEXT,
            error_details TEXT,
            debug_info TEXT,
            memory_usage_mb REAL,
            cpu_usage_seconds REAL,
            api_calls_made INTEGER,
            api_response_times TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (attempts >= 0),
            CHECK (max_attempts >= 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_runs_parent ON audit_runs(parent_analysis_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audit_runs_parent_type ON audit_runs(parent_analysis_id, audit_type)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Initialize or update default settings
///
/// Ensures all required settings exist with default values and resets
/// NULL values back to defaults.
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    // Pipeline settings
    ensure_setting(pool, "audit_pipeline_deadline_secs", "120").await?;
    ensure_setting(pool, "audit_max_attempts", "3").await?;
    ensure_setting(pool, "audit_retry_base_delay_ms", "500").await?;

    // Database contention settings
    ensure_setting(pool, "database_lock_retry_ms", "250").await?;
    ensure_setting(pool, "database_max_lock_wait_ms", "5000").await?;

    // Event bus settings
    ensure_setting(pool, "event_bus_capacity", "100").await?;

    info!("Default settings initialized");
    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// If the setting doesn't exist, it will be created with the default.
/// If the setting exists but has a NULL value, it will be reset.
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?)")
            .bind(key)
            .fetch_one(pool)
            .await?;

    if !exists {
        // INSERT OR IGNORE handles concurrent initialization races where
        // multiple tasks pass the exists check simultaneously
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(default_value)
            .execute(pool)
            .await?;

        info!("Initialized setting '{}' with default value: {}", key, default_value);
        return Ok(());
    }

    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    if value.is_none() {
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;

        warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_schema_and_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sitepulse.db");
        let pool = init_database(&db_path).await.unwrap();

        let deadline: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'audit_pipeline_deadline_secs'")
                .fetch_optional(&pool)
                .await
                .unwrap();
        assert_eq!(deadline.as_deref(), Some("120"));

        // Schema accepts a well-formed analysis row
        sqlx::query(
            "INSERT INTO analyses (id, url, domain, status, analysis_started_at)
             VALUES ('a1', 'https://example.com/', 'example.com', 'processing', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sitepulse.db");

        let pool = init_database(&db_path).await.unwrap();
        drop(pool);
        // Second init against the same file must not fail
        init_database(&db_path).await.unwrap();
    }

    #[tokio::test]
    async fn audit_runs_reject_unknown_audit_type() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = init_database(&tmp.path().join("sitepulse.db")).await.unwrap();

        sqlx::query(
            "INSERT INTO analyses (id, url, domain, status, analysis_started_at)
             VALUES ('a1', 'https://example.com/', 'example.com', 'processing', '2026-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let result = sqlx::query(
            "INSERT INTO audit_runs (id, parent_analysis_id, audit_type, status)
             VALUES ('r1', 'a1', 'sentiment', 'pending')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }
}
