//! Configuration persistence.
//!
//! Handles saving and loading the configuration file to/from disk.
//! Cross-platform: uses the appropriate config directory for each OS.

use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::error::{GhsError, Result};

// =============================================================================
// Config Path
// =============================================================================

const APP_NAME: &str = "ghs-monitor";
const CONFIG_FILE: &str = "config.json";

/// Get the configuration directory path.
/// - Linux: ~/.config/ghs-monitor/
/// - Windows: %APPDATA%\ghs-monitor\
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .ok_or_else(|| GhsError::InvalidConfig("Could not find config directory".into()))
}

/// Get the full path to the config file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(CONFIG_FILE))
}

// =============================================================================
// Storage Functions
// =============================================================================

/// Load configuration from the default location.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path()?)
}

/// Save configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

/// Load configuration from `path`; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| GhsError::InvalidConfig(format!("Failed to read config: {}", e)))?;

    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| GhsError::InvalidConfig(format!("Failed to parse config: {}", e)))?;

    config.validate()?;
    Ok(config)
}

/// Validate and write configuration to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    config.validate()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| {
            GhsError::InvalidConfig(format!("Failed to create config dir: {}", e))
        })?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| GhsError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, content)
        .map_err(|e| GhsError::InvalidConfig(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = AppConfig {
            panel_port: "/dev/ttyUSB0".into(),
            gauge_port: "/dev/ttyUSB1".into(),
            update_interval_secs: 2.0,
            coarse_wait_ms: 100,
        };
        save_config_to(&path, &config).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_config_from(&path),
            Err(GhsError::InvalidConfig(_))
        ));

        std::fs::write(&path, r#"{"update_interval_secs": -1.0}"#).unwrap();
        assert!(load_config_from(&path).is_err());
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = AppConfig {
            coarse_wait_ms: 0,
            ..AppConfig::default()
        };
        assert!(save_config_to(&path, &config).is_err());
        assert!(!path.exists());
    }
}
