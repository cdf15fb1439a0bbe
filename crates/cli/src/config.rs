//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_ARTIFACT_DIR: &str = "./artifacts";

/// CLI configuration, read from `~/.config/neorisk/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Directory holding model.json, weights.bin and metadata.json
    pub artifact_dir: Option<PathBuf>,
    /// Default seed for dataset generation and training
    pub seed: Option<u64>,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Missing files yield the default configuration
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Command-line flag wins over the config file
    pub fn artifact_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.artifact_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR))
    }

    pub fn seed(&self, flag: Option<u64>, fallback: u64) -> u64 {
        flag.or(self.seed).unwrap_or(fallback)
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("neorisk").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.artifact_dir.is_none());
        assert_eq!(config.artifact_dir(None), PathBuf::from(DEFAULT_ARTIFACT_DIR));
    }

    #[test]
    fn test_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"artifactDir": "/srv/neorisk", "seed": 7}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.artifact_dir(None), PathBuf::from("/srv/neorisk"));
        assert_eq!(
            config.artifact_dir(Some(PathBuf::from("/tmp/models"))),
            PathBuf::from("/tmp/models")
        );
        assert_eq!(config.seed(None, 42), 7);
        assert_eq!(config.seed(Some(9), 42), 9);
    }

    #[test]
    fn test_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
