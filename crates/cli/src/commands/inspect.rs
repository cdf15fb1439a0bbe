//! Show metadata of the saved model

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use super::load_artifact;
use crate::output::{
    format_timestamp, print_heading, print_json, print_rows, print_success, FieldRow, OutputFormat,
};

pub async fn run(artifact_dir: &Path, format: OutputFormat) -> Result<()> {
    // Loading verifies architecture and checksum
    let artifact = load_artifact(artifact_dir).await?;
    let metadata = &artifact.metadata;

    match format {
        OutputFormat::Json => print_json(metadata)?,
        OutputFormat::Table => {
            println!("Model: {}", metadata.version.cyan());
            println!();

            print_heading("Training");
            print_rows(vec![
                FieldRow::new("Trained at", format_timestamp(&metadata.trained_at)),
                FieldRow::new("Training samples", metadata.training.training_samples),
                FieldRow::new("Validation samples", metadata.training.validation_samples),
                FieldRow::new("Epochs", metadata.training.epochs),
            ]);
            println!();

            print_heading("Performance");
            let performance = &metadata.performance;
            print_rows(vec![
                FieldRow::new("MSE", format!("{:.5}", performance.loss)),
                FieldRow::new("MAE", format!("{:.4}", performance.mae)),
                FieldRow::new("Risk correlation", format!("{:.3}", performance.correlations.risk)),
                FieldRow::new(
                    "Confidence correlation",
                    format!("{:.3}", performance.correlations.confidence),
                ),
            ]);
            println!();

            print_heading("Architecture");
            let architecture = &metadata.model_architecture;
            let layers: Vec<String> = std::iter::once(architecture.input_features)
                .chain(architecture.hidden_layers.iter().copied())
                .chain(std::iter::once(architecture.outputs))
                .map(|width| width.to_string())
                .collect();
            print_rows(vec![
                FieldRow::new("Layers", layers.join(" → ")),
                FieldRow::new("Parameters", architecture.total_parameters),
                FieldRow::new("Checksum", &metadata.weights_checksum),
            ]);
            println!();
            print_success("Checksum verified");
        }
    }

    Ok(())
}
