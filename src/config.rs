use crate::builder::BuilderSettings;
use crate::storage::{DurabilityMode, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Process settings, read from a JSON file
///
/// Every field is optional in the file; missing ones take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory for the store files; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    pub db_name: String,
    pub durability: DurabilityMode,
    pub checkpoint_threshold: usize,
    pub read_only: bool,
    pub builder: BuilderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            data_dir: Some(PathBuf::from(".")),
            db_name: store.file_stem,
            durability: DurabilityMode::Async,
            checkpoint_threshold: store.checkpoint_threshold,
            read_only: false,
            builder: BuilderSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        let config = match &self.data_dir {
            Some(dir) => StoreConfig::persistent(dir).durability(self.durability),
            None => StoreConfig::in_memory(),
        };
        config
            .file_stem(&self.db_name)
            .checkpoint_threshold(self.checkpoint_threshold)
            .read_only(self.read_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.db_name, "swift_clusters");
        assert_eq!(settings.builder.work_dir, PathBuf::from("/tmp/ringmanager"));

        let config = settings.store_config();
        assert!(config.is_persistent());
        assert_eq!(config.file_stem, "swift_clusters");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringmaster.json");
        std::fs::write(
            &path,
            r#"{"db_name": "lab", "durability": "sync", "builder": {"replicas": 2}}"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.db_name, "lab");
        assert_eq!(settings.durability, DurabilityMode::Sync);
        assert_eq!(settings.builder.replicas, 2);
        assert_eq!(settings.builder.part_power, 10);
        assert_eq!(settings.store_config().file_stem, "lab");
    }

    #[test]
    fn test_null_data_dir_is_in_memory() {
        let settings: Settings = serde_json::from_str(r#"{"data_dir": null}"#).unwrap();
        assert!(!settings.store_config().is_persistent());
    }

    #[test]
    fn test_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(Some(&path)), Err(SettingsError::Parse { .. })));
        assert!(matches!(
            Settings::load(Some(&dir.path().join("missing.json"))),
            Err(SettingsError::Read { .. })
        ));
    }
}
