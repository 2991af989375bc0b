//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Default HTTP listen port for the audit service
pub const DEFAULT_PORT: u16 = 5725;

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "sitepulse.db";

/// Data folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            if let Ok(config) = toml::from_str::<toml::Value>(&toml_content) {
                if let Some(folder) = config.get("data_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(folder);
                }
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_folder()
}

/// Get the configuration file path for the platform, if one exists
pub fn find_config_file() -> Result<PathBuf> {
    if cfg!(target_os = "linux") {
        // Try ~/.config/sitepulse/config.toml first, then /etc/sitepulse/config.toml
        let user_config = dirs::config_dir().map(|d| d.join("sitepulse").join("config.toml"));
        let system_config = PathBuf::from("/etc/sitepulse/config.toml");

        if let Some(path) = user_config {
            if path.exists() {
                return Ok(path);
            }
        }
        if system_config.exists() {
            return Ok(system_config);
        }
        Err(Error::Config("No config file found".to_string()))
    } else {
        let path = dirs::config_dir()
            .map(|d| d.join("sitepulse").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

        if path.exists() {
            Ok(path)
        } else {
            Err(Error::Config(format!("Config file not found: {:?}", path)))
        }
    }
}

/// Get OS-dependent default data folder path
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("sitepulse"))
            .unwrap_or_else(|| PathBuf::from("./sitepulse_data"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("sitepulse"))
            .unwrap_or_else(|| PathBuf::from("./sitepulse_data"))
    }
}

/// Create the data folder if it does not exist yet
pub fn ensure_data_folder(folder: &Path) -> Result<()> {
    if !folder.exists() {
        std::fs::create_dir_all(folder)?;
        tracing::info!("Created data folder: {}", folder.display());
    }
    Ok(())
}

/// Database file path inside the data folder
pub fn database_path(data_folder: &Path) -> PathBuf {
    data_folder.join(DATABASE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn cli_argument_wins_over_environment() {
        std::env::set_var("SITEPULSE_TEST_DATA", "/from/env");
        let folder = resolve_data_folder(Some("/from/cli"), "SITEPULSE_TEST_DATA");
        assert_eq!(folder, PathBuf::from("/from/cli"));
        std::env::remove_var("SITEPULSE_TEST_DATA");
    }

    #[test]
    #[serial]
    fn environment_used_when_no_cli_argument() {
        std::env::set_var("SITEPULSE_TEST_DATA", "/from/env");
        let folder = resolve_data_folder(None, "SITEPULSE_TEST_DATA");
        assert_eq!(folder, PathBuf::from("/from/env"));
        std::env::remove_var("SITEPULSE_TEST_DATA");
    }

    #[test]
    fn database_path_is_inside_data_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let db = database_path(tmp.path());
        assert!(db.starts_with(tmp.path()));
        assert!(db.ends_with(DATABASE_FILE));
    }

    #[test]
    fn ensure_data_folder_creates_missing_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_data_folder(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
