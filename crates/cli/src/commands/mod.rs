//! Subcommand implementations

pub mod dataset;
pub mod evaluate;
pub mod inspect;
pub mod score;
pub mod train;

use anyhow::{Context, Result};
use risk_lib::artifact::{ArtifactStore, FileArtifactStore, ModelArtifact};
use std::path::Path;

/// Load the artifact saved in `dir`, failing when there is none
pub(crate) async fn load_artifact(dir: &Path) -> Result<ModelArtifact> {
    FileArtifactStore::new(dir)
        .load()
        .await
        .with_context(|| format!("Failed to load model from {}", dir.display()))?
        .with_context(|| {
            format!(
                "No model in {}; run `neorisk train` first",
                dir.display()
            )
        })
}
