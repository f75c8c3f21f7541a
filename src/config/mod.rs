//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::CatalogPolicy;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Detection settings
    pub scanner: ScannerSettings,
    /// Collection store settings
    pub storage: StorageSettings,
    /// OCR program settings
    pub ocr: OcrSettings,
}

/// Detection and confirmation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Consecutive identical reads before a card is saved
    pub confirmation_threshold: u32,
    /// Minimum milliseconds between processed OCR samples
    pub throttle_ms: u64,
    /// Milliseconds a saved code is ignored for
    pub cooldown_ms: u64,
    /// Milliseconds the last saved code stays visible
    pub success_display_ms: u64,
    /// Number of recent scans shown
    pub recent_cards_limit: usize,
    /// Lift the cooldown when a save fails so the card can be scanned again
    pub retry_on_failed_save: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            confirmation_threshold: 1,
            throttle_ms: 300,
            cooldown_ms: 3000,
            success_display_ms: 2000,
            recent_cards_limit: 5,
            retry_on_failed_save: true,
        }
    }
}

/// Collection store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database file; unset means the default data directory
    pub database_path: Option<PathBuf>,
    /// Handling of codes missing from the catalog
    pub catalog_policy: CatalogPolicy,
    /// User the scanned cards belong to
    pub user_id: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: None,
            catalog_policy: CatalogPolicy::Permissive,
            user_id: "f98c0e75-a7d9-4fab-ac5c-67ddd2ce1a54".to_string(),
        }
    }
}

/// External OCR program settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Program to run
    pub program: String,
    /// Arguments; `{frame}` is replaced with the frame path
    pub args: Vec<String>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            args: vec!["{frame}".to_string(), "stdout".to_string()],
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.scanner.confirmation_threshold, 1);
        assert_eq!(config.scanner.throttle_ms, 300);
        assert_eq!(config.scanner.cooldown_ms, 3000);
        assert_eq!(config.scanner.success_display_ms, 2000);
        assert_eq!(config.scanner.recent_cards_limit, 5);
        assert!(config.scanner.retry_on_failed_save);

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.storage.catalog_policy, CatalogPolicy::Permissive);
        assert!(!config.storage.user_id.is_empty());

        assert_eq!(config.ocr.program, "tesseract");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.scanner.confirmation_threshold = 3;
        config.storage.catalog_policy = CatalogPolicy::Strict;
        config.storage.database_path = Some(PathBuf::from("/tmp/cards.db"));

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.scanner.confirmation_threshold, 3);
        assert_eq!(parsed.storage.catalog_policy, CatalogPolicy::Strict);
        assert_eq!(parsed.storage.database_path, Some(PathBuf::from("/tmp/cards.db")));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [scanner]
            confirmation_threshold = 2

            [storage]
            catalog_policy = "strict"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.scanner.confirmation_threshold, 2);
        assert_eq!(parsed.scanner.throttle_ms, 300);
        assert_eq!(parsed.storage.catalog_policy, CatalogPolicy::Strict);
        assert_eq!(parsed.ocr.args, vec!["{frame}", "stdout"]);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.scanner.cooldown_ms, loaded.scanner.cooldown_ms);
        assert_eq!(config.storage.user_id, loaded.storage.user_id);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_catalog_policy_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[storage]\ncatalog_policy = \"maybe\"");
        assert!(result.is_err());
    }
}
