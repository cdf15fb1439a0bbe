//! Score a single object

use anyhow::Result;
use risk_lib::artifact::{ArtifactStore, FileArtifactStore};
use risk_lib::models::{ObjectParams, PredictionResult};
use risk_lib::predictor::{
    feature_names, Capabilities, FeatureExtractor, OutputFormatter, PredictorRuntime,
    RuntimeConfig,
};
use risk_lib::synthetic::{OracleScore, RiskFactors, ScoringOracle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{
    color_confidence, color_model_used, color_risk, print_heading, print_json, print_rows,
    print_warning, FieldRow, OutputFormat,
};

#[derive(Debug, Serialize, Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Value")]
    value: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Explanation {
    features: Vec<FeatureRow>,
    factors: RiskFactors,
    oracle: OracleScore,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreOutput {
    #[serde(flatten)]
    result: PredictionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    low_confidence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<Explanation>,
}

pub async fn run(
    artifact_dir: &Path,
    params: ObjectParams,
    explain: bool,
    allow_training: bool,
    format: OutputFormat,
) -> Result<()> {
    let stores: Vec<Arc<dyn ArtifactStore>> = vec![Arc::new(FileArtifactStore::new(artifact_dir))];
    let runtime = PredictorRuntime::new(
        RuntimeConfig::default(),
        Capabilities {
            can_persist: allow_training,
            can_train: allow_training,
        },
        stores,
    );

    let result = runtime.predict(&params).await?;
    let low_confidence = OutputFormatter::new().low_confidence_reason(&result);
    let explanation = if explain {
        Some(explain_object(&params)?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(&ScoreOutput {
            result,
            low_confidence,
            explanation,
        })?,
        OutputFormat::Table => {
            print_heading("Risk Assessment");
            print_rows(vec![
                FieldRow::new("Risk", color_risk(result.risk)),
                FieldRow::new("Confidence", color_confidence(result.confidence)),
                FieldRow::new("Model", color_model_used(result.model_used)),
                FieldRow::new("Version", &result.model_version),
                FieldRow::new("Time", format!("{:.3} ms", result.processing_time)),
            ]);
            if let Some(last_error) = runtime.last_error().await {
                print_warning(&format!("Scored by the fallback: {}", last_error));
            }
            if let Some(reason) = &low_confidence {
                print_warning(reason);
            }

            if let Some(explanation) = explanation {
                println!();
                print_heading("Features");
                print_rows(explanation.features);
                println!();
                print_heading("Oracle Factors");
                let factors = explanation.factors;
                print_rows(vec![
                    FieldRow::new("Size", format!("{:.3}", factors.size)),
                    FieldRow::new("Distance", format!("{:.3}", factors.distance)),
                    FieldRow::new("Velocity", format!("{:.3}", factors.velocity)),
                    FieldRow::new("PHA", format!("{:.3}", factors.pha)),
                    FieldRow::new("Kinetic", format!("{:.3}", factors.kinetic)),
                    FieldRow::new("Proximity", format!("{:.3}", factors.proximity)),
                    FieldRow::new("Oracle risk", color_risk(explanation.oracle.risk)),
                    FieldRow::new(
                        "Oracle confidence",
                        color_confidence(explanation.oracle.confidence),
                    ),
                ]);
            }
        }
    }

    Ok(())
}

fn explain_object(params: &ObjectParams) -> Result<Explanation> {
    let features = FeatureExtractor::new().extract(params)?;
    let oracle = ScoringOracle::new();
    Ok(Explanation {
        features: feature_names()
            .iter()
            .zip(features.values)
            .map(|(name, value)| FeatureRow {
                name: name.to_string(),
                value,
            })
            .collect(),
        factors: oracle.factors(params),
        oracle: oracle.score(params),
    })
}
