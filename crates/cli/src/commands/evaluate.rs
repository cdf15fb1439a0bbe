//! Evaluation of the saved model on a fresh test set

use anyhow::{Context, Result};
use colored::Colorize;
use risk_lib::models::RiskBand;
use risk_lib::synthetic::{GenerationMode, SyntheticDataGenerator};
use risk_lib::training::{EvaluationReport, Trainer};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{load_artifact, train::print_report};
use crate::output::{print_heading, print_json, print_rows, OutputFormat};

/// Per-band accuracy of the risk output
#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct BandRow {
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "Risk MAE")]
    risk_mae: String,
    #[tabled(rename = "Band Agreement")]
    agreement: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluationOutput<'a> {
    version: &'a str,
    samples: usize,
    loss: f32,
    mae: f32,
    risk_correlation: f32,
    confidence_correlation: f32,
    risk_grade: String,
    confidence_grade: String,
    bands: Vec<BandRow>,
}

pub async fn run(
    artifact_dir: &Path,
    samples: usize,
    seed: u64,
    mode: GenerationMode,
    format: OutputFormat,
) -> Result<()> {
    let artifact = load_artifact(artifact_dir).await?;
    let network = artifact.network()?;

    let (report, labels) = tokio::task::spawn_blocking(move || {
        let dataset = SyntheticDataGenerator::with_seed(seed).generate_dataset(samples, mode);
        let labels: Vec<[f32; 2]> = dataset.iter().map(|s| s.labels()).collect();
        Trainer::evaluate(&network, &dataset).map(|report| (report, labels))
    })
    .await
    .context("Evaluation task failed")??;

    let bands = band_breakdown(&report, &labels);

    match format {
        OutputFormat::Json => print_json(&EvaluationOutput {
            version: artifact.version(),
            samples: report.samples,
            loss: report.loss,
            mae: report.mae,
            risk_correlation: report.correlations.risk,
            confidence_correlation: report.correlations.confidence,
            risk_grade: report.risk_grade.as_str().to_string(),
            confidence_grade: report.confidence_grade.as_str().to_string(),
            bands,
        })?,
        OutputFormat::Table => {
            println!("Model: {}", artifact.version().cyan());
            println!();
            print_report(&report);
            println!();
            print_heading("By Risk Band");
            print_rows(bands);
        }
    }

    Ok(())
}

/// Group by the labeled band; agreement is the share predicted into the same band
fn band_breakdown(report: &EvaluationReport, labels: &[[f32; 2]]) -> Vec<BandRow> {
    RiskBand::all()
        .into_iter()
        .map(|band| {
            let pairs: Vec<(f32, f32)> = report
                .predictions
                .iter()
                .zip(labels)
                .filter(|(_, label)| RiskBand::classify(label[0]) == band)
                .map(|(pred, label)| (pred[0], label[0]))
                .collect();

            let n = pairs.len();
            let (risk_mae, agreement) = if n == 0 {
                ("-".to_string(), "-".to_string())
            } else {
                let mae = pairs.iter().map(|(p, l)| (p - l).abs()).sum::<f32>() / n as f32;
                let agree = pairs
                    .iter()
                    .filter(|(p, _)| RiskBand::classify(*p) == band)
                    .count();
                (
                    format!("{:.4}", mae),
                    format!("{:.1}%", agree as f32 / n as f32 * 100.0),
                )
            };

            BandRow {
                band: band.as_str().to_string(),
                samples: n,
                risk_mae,
                agreement,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_lib::training::Correlations;

    #[test]
    fn test_band_breakdown_groups_by_label() {
        let predictions = vec![[0.1, 0.8], [0.5, 0.8], [0.2, 0.8]];
        let labels = [[0.1, 0.8], [0.7, 0.8], [0.25, 0.8]];
        let report = EvaluationReport {
            samples: 3,
            loss: 0.0,
            mae: 0.0,
            correlations: Correlations::default(),
            predictions,
            risk_grade: risk_lib::training::QualityGrade::Good,
            confidence_grade: risk_lib::training::QualityGrade::Good,
        };

        let rows = band_breakdown(&report, &labels);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].samples, 2);
        assert_eq!(rows[0].agreement, "100.0%");
        assert_eq!(rows[1].samples, 0);
        assert_eq!(rows[1].risk_mae, "-");
        assert_eq!(rows[2].samples, 1);
        assert_eq!(rows[2].agreement, "0.0%");
        assert_eq!(rows[2].risk_mae, "0.2000");
    }
}
