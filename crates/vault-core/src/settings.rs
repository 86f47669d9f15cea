//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the databases.
//! Settings are readable while every database is locked.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::layout;

pub const SETTINGS_FILE: &str = "settings.json";
const SETTINGS_VERSION: u32 = 1;

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Default destination directory for exports
    pub export_dir: Option<PathBuf>,
    /// Name of the database most recently opened
    pub last_opened: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            export_dir: None,
            last_opened: None,
        }
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from `storage_dir`, falling back to defaults
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join(SETTINGS_FILE);
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings file {:?}: {}", settings_file, e);
            Settings::default()
        });

        Self {
            settings_file,
            settings,
        }
    }

    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;
        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        layout::write_atomic(&self.settings_file, contents.as_bytes()).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Replace settings and save
    pub async fn update(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings;
        self.save().await
    }

    pub fn export_dir(&self) -> Option<&Path> {
        self.settings.export_dir.as_deref()
    }

    /// Set the default export directory and save
    pub async fn set_export_dir(&mut self, dir: Option<PathBuf>) -> Result<()> {
        self.settings.export_dir = dir;
        self.save().await
    }

    pub fn last_opened(&self) -> Option<&str> {
        self.settings.last_opened.as_deref()
    }

    /// Remember the most recently opened database and save
    pub async fn set_last_opened(&mut self, name: Option<String>) -> Result<()> {
        if self.settings.last_opened == name {
            return Ok(());
        }
        self.settings.last_opened = name;
        self.save().await
    }

    /// Reset settings to defaults and delete the settings file
    pub async fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();

        match tokio::fs::remove_file(&self.settings_file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_settings_default() {
        let temp_dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(temp_dir.path());

        let settings = manager.get();
        assert_eq!(settings.version, 1);
        assert!(settings.export_dir.is_none());
        assert!(settings.last_opened.is_none());
    }

    #[tokio::test]
    async fn test_settings_persistence() {
        let temp_dir = TempDir::new().unwrap();

        {
            let mut manager = SettingsManager::new(temp_dir.path());
            manager.get_mut().export_dir = Some(PathBuf::from("/tmp/backups"));
            manager.set_last_opened(Some("vault".to_string())).await.unwrap();
        }

        {
            let manager = SettingsManager::new(temp_dir.path());
            assert_eq!(manager.export_dir(), Some(Path::new("/tmp/backups")));
            assert_eq!(manager.last_opened(), Some("vault"));
        }
    }

    #[tokio::test]
    async fn test_camel_case_and_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            r#"{"lastOpened": "work", "futureOption": true}"#,
        )
        .unwrap();

        let manager = SettingsManager::new(temp_dir.path());

        assert_eq!(manager.last_opened(), Some("work"));
        assert_eq!(manager.get().version, 1);
        assert!(manager.export_dir().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(SETTINGS_FILE), "not json").unwrap();

        let manager = SettingsManager::new(temp_dir.path());
        assert_eq!(manager.get(), &Settings::default());
    }

    #[tokio::test]
    async fn test_reset() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SettingsManager::new(temp_dir.path());
        manager
            .set_export_dir(Some(PathBuf::from("/tmp/out")))
            .await
            .unwrap();
        assert!(temp_dir.path().join(SETTINGS_FILE).exists());

        manager.reset().await.unwrap();

        assert!(!temp_dir.path().join(SETTINGS_FILE).exists());
        assert!(manager.export_dir().is_none());
        manager.reset().await.unwrap();
    }
}
