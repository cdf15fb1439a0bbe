//! Synthetic dataset generation

use anyhow::{Context, Result};
use risk_lib::models::RiskBand;
use risk_lib::synthetic::{DatasetSummary, GenerationMode, SyntheticDataGenerator};
use std::collections::HashMap;
use std::path::PathBuf;
use tabled::Tabled;

use crate::output::{
    format_percent, print_heading, print_info, print_json, print_rows, print_success, FieldRow,
    OutputFormat,
};

/// Row for the band distribution table
#[derive(Tabled)]
struct BandRow {
    #[tabled(rename = "Band")]
    band: String,
    #[tabled(rename = "Drawn From")]
    drawn_from: usize,
    #[tabled(rename = "Labeled As")]
    labeled_as: usize,
}

pub async fn run(
    samples: usize,
    seed: u64,
    mode: GenerationMode,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let dataset = tokio::task::spawn_blocking(move || {
        SyntheticDataGenerator::with_seed(seed).generate_dataset(samples, mode)
    })
    .await
    .context("Dataset generation failed")?;
    let summary = DatasetSummary::from_samples(&dataset);

    if let Some(path) = &output {
        let json = serde_json::to_vec_pretty(&dataset)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write dataset to {}", path.display()))?;
    }

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading("Synthetic Dataset");
            print_rows(vec![
                FieldRow::new("Samples", summary.total),
                FieldRow::new("Seed", seed),
                FieldRow::new("Mean risk", format!("{:.3}", summary.mean_risk)),
                FieldRow::new("Mean confidence", format!("{:.3}", summary.mean_confidence)),
                FieldRow::new("PHA share", format_percent(summary.pha_fraction)),
            ]);
            println!();

            print_heading("Risk Bands");
            let count = |counts: &HashMap<RiskBand, usize>, band: RiskBand| {
                counts.get(&band).copied().unwrap_or(0)
            };
            print_rows(
                RiskBand::all()
                    .into_iter()
                    .map(|band| BandRow {
                        band: band.as_str().to_string(),
                        drawn_from: count(&summary.drawn_from, band),
                        labeled_as: count(&summary.labeled_as, band),
                    })
                    .collect(),
            );
            println!();

            match &output {
                Some(path) => print_success(&format!(
                    "Wrote {} samples to {}",
                    summary.total,
                    path.display()
                )),
                None => print_info("Pass --output to export the samples as JSON"),
            }
        }
    }

    Ok(())
}
