//! API key resolution for external providers
//!
//! Multi-tier resolution with Database -> ENV -> TOML priority. The
//! database is authoritative; a key found only in ENV or TOML is
//! migrated into the database so later lookups and the settings API see
//! one source of truth.
//!
//! Every key is optional. An unresolved key disables the feature that
//! needs it (the analyzer degrades, the provider is not configured)
//! rather than failing startup.

use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::{info, warn};

use sitepulse_common::config::find_config_file;
use sitepulse_common::db::settings::{get_setting, set_setting};
use sitepulse_common::Result;

/// Providers whose API keys the configuration layer manages
pub const KEY_PROVIDERS: [&str; 4] = ["openai", "anthropic", "pagespeed", "maps"];

/// Settings-table key for a provider's API key
pub fn setting_key(provider: &str) -> String {
    format!("{}_api_key", provider)
}

/// Environment variable name for a provider's API key
pub fn env_var_name(provider: &str) -> String {
    format!("SITEPULSE_{}_API_KEY", provider.to_uppercase())
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one provider's API key from 3-tier configuration
///
/// **Priority:** Database -> ENV -> TOML. Returns `None` when no tier
/// holds a valid key. A key resolved from ENV or TOML is written back
/// to the database.
pub async fn resolve_provider_key(db: &SqlitePool, provider: &str) -> Result<Option<String>> {
    let setting = setting_key(provider);

    // Tier 1: Database (authoritative)
    let db_key = get_setting(db, &setting).await?.filter(|k| is_valid_key(k));

    // Tier 2: Environment variable
    let env_key = std::env::var(env_var_name(provider))
        .ok()
        .filter(|k| is_valid_key(k));

    // Tier 3: TOML config
    let toml_key = read_toml_key(&setting).filter(|k| is_valid_key(k));

    let mut sources = Vec::new();
    if db_key.is_some() {
        sources.push("database");
    }
    if env_key.is_some() {
        sources.push("environment");
    }
    if toml_key.is_some() {
        sources.push("TOML");
    }

    if sources.len() > 1 {
        warn!(
            "{} API key found in multiple sources: {}. Using database (highest priority).",
            provider,
            sources.join(", ")
        );
    }

    if let Some(key) = db_key {
        info!("{} API key loaded from database", provider);
        return Ok(Some(key));
    }

    if let Some(key) = env_key {
        info!("{} API key loaded from environment variable", provider);
        migrate_key_to_database(db, &setting, &key, "environment").await;
        return Ok(Some(key));
    }

    if let Some(key) = toml_key {
        info!("{} API key loaded from TOML config", provider);
        migrate_key_to_database(db, &setting, &key, "TOML").await;
        return Ok(Some(key));
    }

    info!(
        "{} API key not configured; dependent features are disabled. \
         Configure via the settings API, {}, or the config file.",
        provider,
        env_var_name(provider)
    );
    Ok(None)
}

/// Write a resolved key into the database, best-effort
///
/// The key is already usable for this process; a failed write only
/// means the next resolution repeats the migration.
async fn migrate_key_to_database(db: &SqlitePool, setting: &str, key: &str, source: &str) {
    match set_setting(db, setting, key).await {
        Ok(()) => info!("Migrated '{}' from {} to database", setting, source),
        Err(e) => warn!("Failed to migrate '{}' to database: {}", setting, e),
    }
}

/// Sync one key into the user config file, creating it if needed
///
/// Best-effort backup of the database value; other entries in the file
/// are preserved.
pub fn sync_key_to_toml(setting: &str, key: &str) -> Result<()> {
    let path = match find_config_file() {
        Ok(path) => path,
        Err(_) => dirs::config_dir()
            .map(|d| d.join("sitepulse").join("config.toml"))
            .ok_or_else(|| {
                sitepulse_common::Error::Config(
                    "Could not determine config directory".to_string(),
                )
            })?,
    };

    let mut config: toml::Table = match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).map_err(|e| {
            sitepulse_common::Error::Config(format!("Parse config file failed: {}", e))
        })?,
        Err(_) => toml::Table::new(),
    };

    config.insert(setting.to_string(), toml::Value::String(key.to_string()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(&config).map_err(|e| {
        sitepulse_common::Error::Config(format!("Serialize config file failed: {}", e))
    })?)?;

    info!("Setting '{}' synced to {}", setting, path.display());
    Ok(())
}

/// Read a `{provider}_api_key` entry from the platform config file
fn read_toml_key(setting: &str) -> Option<String> {
    let path = find_config_file().ok()?;
    read_toml_key_from(&path, setting)
}

fn read_toml_key_from(path: &PathBuf, setting: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let config: toml::Value = match toml::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            return None;
        }
    };
    config
        .get(setting)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use sitepulse_common::db::init_database;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = init_database(&tmp.path().join("sitepulse.db")).await.unwrap();
        (tmp, pool)
    }

    #[test]
    fn key_validation_rejects_whitespace() {
        assert!(is_valid_key("sk-test"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("   "));
    }

    #[test]
    fn naming_conventions_are_stable() {
        assert_eq!(setting_key("openai"), "openai_api_key");
        assert_eq!(env_var_name("openai"), "SITEPULSE_OPENAI_API_KEY");
        assert_eq!(env_var_name("maps"), "SITEPULSE_MAPS_API_KEY");
    }

    #[tokio::test]
    #[serial]
    async fn unconfigured_key_resolves_to_none() {
        let (_tmp, pool) = test_pool().await;
        std::env::remove_var("SITEPULSE_OPENAI_API_KEY");
        let key = resolve_provider_key(&pool, "openai").await.unwrap();
        assert_eq!(key, None);
    }

    #[tokio::test]
    #[serial]
    async fn database_key_wins_over_environment() {
        let (_tmp, pool) = test_pool().await;
        set_setting(&pool, "openai_api_key", "sk-from-db").await.unwrap();
        std::env::set_var("SITEPULSE_OPENAI_API_KEY", "sk-from-env");

        let key = resolve_provider_key(&pool, "openai").await.unwrap();
        assert_eq!(key.as_deref(), Some("sk-from-db"));

        std::env::remove_var("SITEPULSE_OPENAI_API_KEY");
    }

    #[tokio::test]
    #[serial]
    async fn environment_key_is_migrated_to_database() {
        let (_tmp, pool) = test_pool().await;
        std::env::set_var("SITEPULSE_ANTHROPIC_API_KEY", "sk-ant-env");

        let key = resolve_provider_key(&pool, "anthropic").await.unwrap();
        assert_eq!(key.as_deref(), Some("sk-ant-env"));

        // Now authoritative in the database
        let stored = get_setting(&pool, "anthropic_api_key").await.unwrap();
        assert_eq!(stored.as_deref(), Some("sk-ant-env"));

        std::env::remove_var("SITEPULSE_ANTHROPIC_API_KEY");
    }

    #[tokio::test]
    #[serial]
    async fn blank_environment_key_is_ignored() {
        let (_tmp, pool) = test_pool().await;
        std::env::set_var("SITEPULSE_MAPS_API_KEY", "   ");

        let key = resolve_provider_key(&pool, "maps").await.unwrap();
        assert_eq!(key, None);

        std::env::remove_var("SITEPULSE_MAPS_API_KEY");
    }

    #[test]
    fn toml_key_reads_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "pagespeed_api_key = \"ps-key\"\n").unwrap();

        let key = read_toml_key_from(&path, "pagespeed_api_key");
        assert_eq!(key.as_deref(), Some("ps-key"));
        assert_eq!(read_toml_key_from(&path, "maps_api_key"), None);
    }
}
