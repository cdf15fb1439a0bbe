//! Service configuration

use anyhow::{Context, Result};
use risk_lib::artifact::{ArtifactStore, FileArtifactStore, KeyValueArtifactStore};
use risk_lib::predictor::{Capabilities, RuntimeConfig};
use risk_lib::training::TrainingConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const ENV_PREFIX: &str = "NEORISK";

/// Service configuration, read from `NEORISK_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Port for the predict/health/metrics API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory of the file artifact store
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default = "default_model_ttl")]
    pub model_ttl_secs: u64,

    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,

    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_ms: u64,

    /// Synthetic samples for bootstrap training
    #[serde(default = "default_bootstrap_samples")]
    pub bootstrap_samples: usize,

    #[serde(default = "default_true")]
    pub can_train: bool,

    #[serde(default = "default_true")]
    pub can_persist: bool,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_service_name() -> String {
    "risk-agent".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_model_ttl() -> u64 {
    24 * 60 * 60
}

fn default_retry_cooldown() -> u64 {
    60
}

fn default_inference_timeout() -> u64 {
    100
}

fn default_bootstrap_samples() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

fn default_epochs() -> usize {
    150
}

fn default_seed() -> u64 {
    42
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            api_port: default_api_port(),
            artifact_dir: default_artifact_dir(),
            model_ttl_secs: default_model_ttl(),
            retry_cooldown_secs: default_retry_cooldown(),
            inference_timeout_ms: default_inference_timeout(),
            bootstrap_samples: default_bootstrap_samples(),
            can_train: default_true(),
            can_persist: default_true(),
            epochs: default_epochs(),
            seed: default_seed(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::build(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Load configuration from an explicit variable map instead of the environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
    }

    fn build(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;
        config
            .try_deserialize()
            .context("Invalid NEORISK_* configuration")
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            ttl: Duration::from_secs(self.model_ttl_secs),
            retry_cooldown: Duration::from_secs(self.retry_cooldown_secs),
            inference_timeout: Duration::from_millis(self.inference_timeout_ms),
            bootstrap_samples: self.bootstrap_samples,
            training: TrainingConfig {
                epochs: self.epochs,
                seed: self.seed,
                ..Default::default()
            },
            generator_seed: self.seed,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_persist: self.can_persist,
            can_train: self.can_train,
        }
    }

    /// File store first, then the in-process key/value store
    pub fn stores(&self) -> Vec<Arc<dyn ArtifactStore>> {
        vec![
            Arc::new(FileArtifactStore::new(&self.artifact_dir)),
            Arc::new(KeyValueArtifactStore::default()),
        ]
    }
}
