//! Model training command

use anyhow::{Context, Result};
use colored::Colorize;
use risk_lib::artifact::{ArtifactStore, FileArtifactStore, ModelArtifact};
use risk_lib::synthetic::{GenerationMode, SyntheticDataGenerator};
use risk_lib::training::{EvaluationReport, Trainer, TrainingConfig};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_grade, print_heading, print_json, print_rows, print_success, FieldRow, OutputFormat};

pub struct TrainOptions {
    pub samples: usize,
    pub epochs: usize,
    pub seed: u64,
    pub mode: GenerationMode,
    pub save: bool,
}

/// Row for the epoch history table
#[derive(Tabled)]
struct EpochRow {
    #[tabled(rename = "Epoch")]
    epoch: usize,
    #[tabled(rename = "Train Loss")]
    train_loss: String,
    #[tabled(rename = "Val Loss")]
    val_loss: String,
    #[tabled(rename = "Val MAE")]
    val_mae: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainSummary<'a> {
    version: &'a str,
    saved_to: Option<String>,
    epochs_run: usize,
    stopped_early: bool,
    elapsed_ms: u64,
    loss: f32,
    mae: f32,
    risk_correlation: f32,
    confidence_correlation: f32,
    risk_grade: String,
    confidence_grade: String,
}

/// Generate data, train and optionally save the artifact
pub async fn run(artifact_dir: &Path, options: TrainOptions, format: OutputFormat) -> Result<()> {
    let config = TrainingConfig {
        epochs: options.epochs,
        seed: options.seed,
        ..Default::default()
    };
    let (samples, seed, mode) = (options.samples, options.seed, options.mode);

    let outcome = tokio::task::spawn_blocking(move || {
        let dataset = SyntheticDataGenerator::with_seed(seed).generate_dataset(samples, mode);
        Trainer::train(&dataset, &config)
    })
    .await
    .context("Training task failed")??;

    let saved_to = if options.save {
        FileArtifactStore::new(artifact_dir)
            .save(&outcome.artifact)
            .await
            .with_context(|| format!("Failed to save model to {}", artifact_dir.display()))?;
        Some(artifact_dir.display().to_string())
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            version: outcome.artifact.version(),
            saved_to,
            epochs_run: outcome.history.len(),
            stopped_early: outcome.stopped_early,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            loss: outcome.report.loss,
            mae: outcome.report.mae,
            risk_correlation: outcome.report.correlations.risk,
            confidence_correlation: outcome.report.correlations.confidence,
            risk_grade: outcome.report.risk_grade.as_str().to_string(),
            confidence_grade: outcome.report.confidence_grade.as_str().to_string(),
        })?,
        OutputFormat::Table => {
            print_heading("Training Run");
            print_rows(vec![
                FieldRow::new("Samples", options.samples),
                FieldRow::new("Seed", options.seed),
                FieldRow::new("Epochs run", outcome.history.len()),
                FieldRow::new("Stopped early", outcome.stopped_early),
                FieldRow::new("Elapsed", format!("{:.1}s", outcome.elapsed.as_secs_f64())),
            ]);
            println!();

            print_heading("Loss History");
            let rows: Vec<EpochRow> = outcome
                .history
                .iter()
                .filter(|m| m.epoch == 1 || m.epoch % 10 == 0 || m.epoch == outcome.history.len())
                .map(|m| EpochRow {
                    epoch: m.epoch,
                    train_loss: format!("{:.5}", m.train_loss),
                    val_loss: m.val_loss.map_or("-".into(), |l| format!("{:.5}", l)),
                    val_mae: m.val_mae.map_or("-".into(), |l| format!("{:.4}", l)),
                })
                .collect();
            print_rows(rows);
            println!();

            print_report(&outcome.report);
            println!();
            print_saved(&outcome.artifact, saved_to.as_deref());
        }
    }

    Ok(())
}

/// Metrics and grades of an evaluation
pub(crate) fn print_report(report: &EvaluationReport) {
    print_heading("Evaluation");
    print_rows(vec![
        FieldRow::new("Samples", report.samples),
        FieldRow::new("MSE", format!("{:.5}", report.loss)),
        FieldRow::new("MAE", format!("{:.4}", report.mae)),
        FieldRow::new(
            "Risk correlation",
            format!("{:.3} ({})", report.correlations.risk, color_grade(report.risk_grade)),
        ),
        FieldRow::new(
            "Confidence correlation",
            format!(
                "{:.3} ({})",
                report.correlations.confidence,
                color_grade(report.confidence_grade)
            ),
        ),
    ]);
}

fn print_saved(artifact: &ModelArtifact, saved_to: Option<&str>) {
    match saved_to {
        Some(dir) => print_success(&format!(
            "Model {} saved to {}",
            artifact.version().cyan(),
            dir
        )),
        None => println!("Model {} not saved", artifact.version().cyan()),
    }
}
