//! In-process key/value artifact store
//!
//! Keeps artifacts as serialized JSON documents under a string key, the way
//! a client-side local storage would. Mostly useful as a second tier behind
//! the file store and in tests.

use super::{ArtifactStore, ModelArtifact};
use crate::error::{Result, RiskError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub const DEFAULT_KEY: &str = "neo-risk-model";

#[derive(Clone)]
pub struct KeyValueArtifactStore {
    key: String,
    documents: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for KeyValueArtifactStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEY)
    }
}

impl KeyValueArtifactStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Raw document under the store key
    pub async fn raw(&self) -> Option<String> {
        self.documents.read().await.get(&self.key).cloned()
    }

    /// Replace the raw document, bypassing serialization
    pub async fn put_raw(&self, document: impl Into<String>) {
        self.documents
            .write()
            .await
            .insert(self.key.clone(), document.into());
    }
}

#[async_trait]
impl ArtifactStore for KeyValueArtifactStore {
    fn name(&self) -> &str {
        "key_value"
    }

    async fn load(&self) -> Result<Option<ModelArtifact>> {
        let Some(document) = self.raw().await else {
            return Ok(None);
        };
        let artifact: ModelArtifact = serde_json::from_str(&document).map_err(|e| {
            RiskError::model_load(format!("invalid document under {}: {}", self.key, e))
        })?;
        artifact.verify()?;
        Ok(Some(artifact))
    }

    async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
        let document = serde_json::to_string(artifact)?;
        self.put_raw(document).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().await.remove(&self.key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::artifact;

    #[tokio::test]
    async fn test_round_trip() {
        let store = KeyValueArtifactStore::default();
        assert!(store.load().await.unwrap().is_none());

        let original = artifact(1);
        store.save(&original).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap(), original);
        assert!(store.raw().await.unwrap().contains("weightsChecksum"));
    }

    #[tokio::test]
    async fn test_garbage_document_rejected() {
        let store = KeyValueArtifactStore::new("other");
        store.put_raw("{not json").await;
        assert!(matches!(store.load().await, Err(RiskError::ModelLoad(_))));
    }

    #[tokio::test]
    async fn test_tampered_document_rejected() {
        let store = KeyValueArtifactStore::default();
        let mut tampered = artifact(2);
        tampered.weights.layers[2].bias[0] = 3.0;
        store
            .put_raw(serde_json::to_string(&tampered).unwrap())
            .await;
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(3)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
