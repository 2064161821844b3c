//! JSON Configuration Management
//!
//! Handles reading and writing the memory bank configuration file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{MemoryBankConfig, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir};

/// Configuration service for managing memory bank settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: MemoryBankConfig,
}

impl ConfigService {
    /// Load ~/.memory-bank/config.json, writing defaults when missing
    pub fn new() -> AppResult<Self> {
        Self::at_path(config_path()?)
    }

    /// Load the config at `path`, writing defaults when missing
    pub fn at_path(config_path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = config_path.parent() {
            ensure_dir(parent)?;
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            let default_config = MemoryBankConfig::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> AppResult<MemoryBankConfig> {
        let content = fs::read_to_string(path)?;
        let config: MemoryBankConfig = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::config)?;
        Ok(config)
    }

    /// Save configuration to a file with pretty formatting
    fn save_to_file(path: &Path, config: &MemoryBankConfig) -> AppResult<()> {
        config.validate().map_err(AppError::config)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &MemoryBankConfig {
        &self.config
    }

    /// Get a clone of the current configuration
    pub fn get_config_clone(&self) -> MemoryBankConfig {
        self.config.clone()
    }

    /// Update the configuration with a partial update. An invalid result is
    /// rejected and the previous configuration kept.
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<MemoryBankConfig> {
        let mut next = self.config.clone();
        next.apply_update(update);
        Self::save_to_file(&self.config_path, &next)?;
        self.config = next;
        Ok(self.config.clone())
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload configuration from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset configuration to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = MemoryBankConfig::default();
        self.save()?;
        Ok(())
    }

    /// Check if the config service is healthy
    pub fn is_healthy(&self) -> bool {
        self.config_path.exists() && self.config.validate().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_writes_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        let service = ConfigService::at_path(path.clone()).unwrap();
        assert!(path.exists());
        assert!(service.is_healthy());
        assert_eq!(service.get_config(), &MemoryBankConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::at_path(path.clone()).unwrap();

        let update = SettingsUpdate {
            max_age_days: Some(14),
            ..Default::default()
        };
        let updated = service.update_config(update).unwrap();
        assert_eq!(updated.selection.max_age_days, 14);

        let reopened = ConfigService::at_path(path).unwrap();
        assert_eq!(reopened.get_config().selection.max_age_days, 14);
    }

    #[test]
    fn test_invalid_update_keeps_previous() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::at_path(path).unwrap();

        let result = service.update_config(SettingsUpdate {
            keyword_weight: Some(0.9),
            ..Default::default()
        });
        assert!(matches!(result, Err(AppError::Config(_))));
        assert_eq!(service.get_config().selection.keyword_weight, 0.6);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"embedding": {"batch_size": 0}}"#).unwrap();
        assert!(ConfigService::at_path(path).is_err());
    }

    #[test]
    fn test_reset() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        let mut service = ConfigService::at_path(path).unwrap();
        service
            .update_config(SettingsUpdate {
                default_token_budget: Some(100),
                ..Default::default()
            })
            .unwrap();
        service.reset().unwrap();
        service.reload().unwrap();
        assert_eq!(service.get_config().selection.default_token_budget, 4000);
    }
}
