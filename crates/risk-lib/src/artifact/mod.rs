//! Trained model artifacts and where they are kept
//!
//! An artifact is the network weights plus metadata describing how the
//! weights were produced. Stores are tried in order by the runtime; the
//! first one holding a valid artifact wins.

mod file_store;
mod kv_store;

pub use file_store::FileArtifactStore;
pub use kv_store::{KeyValueArtifactStore, DEFAULT_KEY};

use crate::error::{Result, RiskError};
use crate::models::{NUM_FEATURES, NUM_OUTPUTS};
use crate::training::network::{NetworkWeights, ScoringNetwork, HIDDEN_LAYERS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use crate::training::metrics::Correlations;

/// Final metrics of the run that produced an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub loss: f32,
    pub mae: f32,
    pub correlations: Correlations,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArchitecture {
    pub input_features: usize,
    pub hidden_layers: Vec<usize>,
    pub outputs: usize,
    pub total_parameters: usize,
}

impl ModelArchitecture {
    /// The only architecture this build can serve
    pub fn current() -> Self {
        let mut total = 0;
        let mut inputs = NUM_FEATURES;
        for width in HIDDEN_LAYERS.iter().copied().chain([NUM_OUTPUTS]) {
            total += inputs * width + width;
            inputs = width;
        }
        Self {
            input_features: NUM_FEATURES,
            hidden_layers: HIDDEN_LAYERS.to_vec(),
            outputs: NUM_OUTPUTS,
            total_parameters: total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSummary {
    pub training_samples: usize,
    pub validation_samples: usize,
    /// Epochs actually run
    pub epochs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub performance: Performance,
    pub model_architecture: ModelArchitecture,
    pub training: TrainingSummary,
    /// SHA-256 of the little-endian weight blob, hex encoded
    pub weights_checksum: String,
}

/// Weights plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub weights: NetworkWeights,
}

impl ModelArtifact {
    pub fn from_training(
        weights: NetworkWeights,
        performance: Performance,
        training: TrainingSummary,
        trained_at: DateTime<Utc>,
    ) -> Self {
        let weights_checksum = compute_checksum(&weights_blob(&weights));
        Self {
            metadata: ArtifactMetadata {
                version: version_tag(trained_at),
                trained_at,
                performance,
                model_architecture: ModelArchitecture::current(),
                training,
                weights_checksum,
            },
            weights,
        }
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    /// Check architecture and checksum against the weights
    pub fn verify(&self) -> Result<()> {
        let expected = ModelArchitecture::current();
        if self.metadata.model_architecture != expected {
            return Err(RiskError::model_load(format!(
                "artifact {} has architecture {:?}, expected {:?}",
                self.metadata.version, self.metadata.model_architecture, expected
            )));
        }

        let checksum = compute_checksum(&weights_blob(&self.weights));
        if checksum != self.metadata.weights_checksum {
            return Err(RiskError::model_load(format!(
                "checksum mismatch for {}: expected {}, got {}",
                self.metadata.version, self.metadata.weights_checksum, checksum
            )));
        }
        Ok(())
    }

    /// Verify, then rebuild the network
    pub fn network(&self) -> Result<ScoringNetwork> {
        self.verify()?;
        ScoringNetwork::from_weights(&self.weights)
    }
}

/// Somewhere artifacts can be kept between runs
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when nothing is stored, `ModelLoad` when what is stored is unusable
    async fn load(&self) -> Result<Option<ModelArtifact>>;

    async fn save(&self, artifact: &ModelArtifact) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// All parameters as little-endian f32, layer by layer
pub fn weights_blob(weights: &NetworkWeights) -> Vec<u8> {
    weights
        .flatten()
        .into_iter()
        .flat_map(f32::to_le_bytes)
        .collect()
}

/// Inverse of [`weights_blob`]
pub fn blob_values(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(RiskError::model_load(format!(
            "weight blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// SHA256 checksum, hex encoded
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// `v{crate version}-{trained at}`, e.g. `v0.1.0-20261019T081500Z`
pub fn version_tag(trained_at: DateTime<Utc>) -> String {
    format!(
        "v{}-{}",
        env!("CARGO_PKG_VERSION"),
        trained_at.format("%Y%m%dT%H%M%SZ")
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_parameter_count() {
        let arch = ModelArchitecture::current();
        assert_eq!(arch.total_parameters, 266);
        assert_eq!(arch.hidden_layers, vec![16, 8]);
    }

    #[test]
    fn test_fresh_artifact_verifies() {
        let artifact = test_support::artifact(1);
        assert!(artifact.verify().is_ok());
        assert_eq!(artifact.network().unwrap().parameter_count(), 266);
        assert!(artifact.version().starts_with('v'));
    }

    #[test]
    fn test_tampered_weights_fail_checksum() {
        let mut artifact = test_support::artifact(2);
        artifact.weights.layers[0].weights[0] += 0.5;
        let err = artifact.verify().unwrap_err();
        assert!(matches!(err, RiskError::ModelLoad(_)));
        assert!(artifact.network().is_err());
    }

    #[test]
    fn test_metadata_wire_names() {
        let artifact = test_support::artifact(3);
        let json = serde_json::to_value(&artifact.metadata).unwrap();
        assert!(json.get("trainedAt").is_some());
        assert!(json.get("weightsChecksum").is_some());
        assert_eq!(json["modelArchitecture"]["inputFeatures"], 6);
        assert_eq!(json["modelArchitecture"]["totalParameters"], 266);
        assert_eq!(json["training"]["validationSamples"], 200);
        assert!(json["performance"]["correlations"]["risk"].is_number());
    }

    #[test]
    fn test_blob_round_trip() {
        let artifact = test_support::artifact(4);
        let blob = weights_blob(&artifact.weights);
        assert_eq!(blob.len(), 266 * 4);
        assert_eq!(blob_values(&blob).unwrap(), artifact.weights.flatten());
        assert!(blob_values(&blob[..5]).is_err());
    }

    #[test]
    fn test_version_tag_format() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T08:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            version_tag(at),
            format!("v{}-20261019T081500Z", env!("CARGO_PKG_VERSION"))
        );
    }
}
