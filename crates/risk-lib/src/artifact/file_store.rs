//! Directory-backed artifact store
//!
//! Layout:
//! - `model.json`: architecture and per-layer shapes
//! - `weights.bin`: little-endian f32 parameters, layer by layer
//! - `metadata.json`: [`ArtifactMetadata`]

use super::{
    blob_values, compute_checksum, weights_blob, ArtifactMetadata, ArtifactStore,
    ModelArchitecture, ModelArtifact,
};
use crate::error::{Result, RiskError};
use crate::training::network::{architecture_shapes, Activation, LayerWeights, NetworkWeights};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const MODEL_FILE: &str = "model.json";
const WEIGHTS_FILE: &str = "weights.bin";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerShape {
    inputs: usize,
    outputs: usize,
    activation: Activation,
}

/// Contents of `model.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelManifest {
    architecture: ModelArchitecture,
    layers: Vec<LayerShape>,
    weights_file: String,
}

pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    async fn read_optional(&self, file: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path(file)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RiskError::model_load(format!("failed to read {}: {}", file, e))),
        }
    }

    /// Write to a temp file, then rename over the target
    async fn write_atomic(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(file);
        let temp_path = path.with_extension("tmp");

        let mut handle = fs::File::create(&temp_path).await?;
        handle.write_all(bytes).await?;
        handle.sync_all().await?;
        drop(handle);

        fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self) -> Result<Option<ModelArtifact>> {
        let model = self.read_optional(MODEL_FILE).await?;
        let weights = self.read_optional(WEIGHTS_FILE).await?;
        let metadata = self.read_optional(METADATA_FILE).await?;

        let (model, blob, metadata) = match (model, weights, metadata) {
            (None, None, None) => return Ok(None),
            (Some(m), Some(w), Some(md)) => (m, w, md),
            _ => {
                return Err(RiskError::model_load(format!(
                    "incomplete artifact in {}",
                    self.dir.display()
                )))
            }
        };

        let manifest: ModelManifest = serde_json::from_slice(&model)
            .map_err(|e| RiskError::model_load(format!("invalid {}: {}", MODEL_FILE, e)))?;
        let metadata: ArtifactMetadata = serde_json::from_slice(&metadata)
            .map_err(|e| RiskError::model_load(format!("invalid {}: {}", METADATA_FILE, e)))?;

        if manifest.architecture != ModelArchitecture::current() {
            return Err(RiskError::model_load(format!(
                "unsupported architecture {:?}",
                manifest.architecture
            )));
        }

        let checksum = compute_checksum(&blob);
        if checksum != metadata.weights_checksum {
            return Err(RiskError::model_load(format!(
                "checksum mismatch: expected {}, got {}",
                metadata.weights_checksum, checksum
            )));
        }

        check_layer_shapes(&manifest.layers)?;

        let expected_len: usize = manifest
            .layers
            .iter()
            .map(|l| (l.inputs * l.outputs + l.outputs) * 4)
            .sum();
        if blob.len() != expected_len {
            return Err(RiskError::model_load(format!(
                "weight blob is {} bytes, expected {}",
                blob.len(),
                expected_len
            )));
        }

        let values = blob_values(&blob)?;
        let mut offset = 0;
        let mut layers = Vec::with_capacity(manifest.layers.len());
        for shape in &manifest.layers {
            let weight_len = shape.inputs * shape.outputs;
            let weights = values[offset..offset + weight_len].to_vec();
            offset += weight_len;
            let bias = values[offset..offset + shape.outputs].to_vec();
            offset += shape.outputs;
            layers.push(LayerWeights {
                inputs: shape.inputs,
                outputs: shape.outputs,
                activation: shape.activation,
                weights,
                bias,
            });
        }

        let artifact = ModelArtifact {
            metadata,
            weights: NetworkWeights { layers },
        };
        artifact.verify()?;

        debug!(
            dir = %self.dir.display(),
            version = %artifact.metadata.version,
            "Loaded artifact from disk"
        );
        Ok(Some(artifact))
    }

    async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let manifest = ModelManifest {
            architecture: artifact.metadata.model_architecture.clone(),
            layers: artifact
                .weights
                .layers
                .iter()
                .map(|l| LayerShape {
                    inputs: l.inputs,
                    outputs: l.outputs,
                    activation: l.activation,
                })
                .collect(),
            weights_file: WEIGHTS_FILE.to_string(),
        };

        self.write_atomic(WEIGHTS_FILE, &weights_blob(&artifact.weights))
            .await?;
        self.write_atomic(MODEL_FILE, &serde_json::to_vec_pretty(&manifest)?)
            .await?;
        self.write_atomic(METADATA_FILE, &serde_json::to_vec_pretty(&artifact.metadata)?)
            .await?;

        info!(
            dir = %self.dir.display(),
            version = %artifact.metadata.version,
            "Saved artifact"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        for file in [MODEL_FILE, WEIGHTS_FILE, METADATA_FILE] {
            match fs::remove_file(self.path(file)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Shapes in `model.json` must match the served network before any slicing
fn check_layer_shapes(layers: &[LayerShape]) -> Result<()> {
    let expected = architecture_shapes();
    if layers.len() != expected.len() {
        return Err(RiskError::model_load(format!(
            "{} lists {} layers, expected {}",
            MODEL_FILE,
            layers.len(),
            expected.len()
        )));
    }
    for (i, (layer, &(inputs, outputs, activation))) in layers.iter().zip(&expected).enumerate() {
        if layer.inputs != inputs || layer.outputs != outputs || layer.activation != activation {
            return Err(RiskError::model_load(format!(
                "{} layer {} is {}x{} {:?}, expected {}x{} {:?}",
                MODEL_FILE,
                i,
                layer.inputs,
                layer.outputs,
                layer.activation,
                inputs,
                outputs,
                activation
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::artifact;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_dir_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path().join("missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let original = artifact(1);

        store.save(&original).await.unwrap();
        for file in [MODEL_FILE, WEIGHTS_FILE, METADATA_FILE] {
            assert!(dir.path().join(file).exists());
        }
        assert!(!dir.path().join("weights.tmp").exists());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_corrupt_weights_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(2)).await.unwrap();

        let path = dir.path().join(WEIGHTS_FILE);
        let mut blob = std::fs::read(&path).unwrap();
        blob[10] ^= 0xff;
        std::fs::write(&path, blob).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, RiskError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_truncated_weights_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(3)).await.unwrap();

        let path = dir.path().join(WEIGHTS_FILE);
        let blob = std::fs::read(&path).unwrap();
        std::fs::write(&path, &blob[..blob.len() - 8]).unwrap();

        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_layer_shape_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(6)).await.unwrap();

        let path = dir.path().join(MODEL_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest["layers"][0]["inputs"] = serde_json::json!(u64::MAX / 2);
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, RiskError::ModelLoad(_)), "{}", err);
    }

    #[tokio::test]
    async fn test_missing_layer_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(7)).await.unwrap();

        let path = dir.path().join(MODEL_FILE);
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest["layers"].as_array_mut().unwrap().pop();
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        assert!(matches!(store.load().await, Err(RiskError::ModelLoad(_))));
    }

    #[tokio::test]
    async fn test_incomplete_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(4)).await.unwrap();
        std::fs::remove_file(dir.path().join(METADATA_FILE)).unwrap();

        assert!(matches!(
            store.load().await,
            Err(RiskError::ModelLoad(_))
        ));
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(5)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        // Clearing twice is fine
        store.clear().await.unwrap();
    }
}
