//! Model training
//!
//! Fits the [`ScoringNetwork`] to oracle-labeled samples with mini-batch Adam
//! on a mean squared error loss, optionally with early stopping on the
//! held-out loss.

pub mod metrics;
pub mod network;
pub mod optimizer;

pub use metrics::{pearson_correlation, Correlations, EvaluationReport, QualityGrade};
pub use network::{NetworkWeights, ScoringNetwork};
pub use optimizer::AdamOptimizer;

use crate::artifact::{ModelArtifact, Performance, TrainingSummary};
use crate::error::{Result, RiskError};
use crate::models::{TrainingSample, NUM_FEATURES, NUM_OUTPUTS};
use crate::predictor::validate_features;
use chrono::Utc;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Hyperparameters of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Fraction of samples held out from the tail for validation
    pub validation_split: f32,
    pub early_stopping: bool,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Seed for initialization, shuffling and dropout
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 150,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.2,
            early_stopping: true,
            patience: 20,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(RiskError::training("epochs must be > 0"));
        }
        if self.batch_size == 0 {
            return Err(RiskError::training("batch_size must be > 0"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(RiskError::training(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(RiskError::training(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        Ok(())
    }
}

/// Loss and MAE of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_mae: f32,
    /// Absent when nothing was held out
    pub val_loss: Option<f32>,
    pub val_mae: Option<f32>,
}

impl EpochMetrics {
    /// Loss watched by early stopping
    pub fn monitored_loss(&self) -> f32 {
        self.val_loss.unwrap_or(self.train_loss)
    }
}

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub network: ScoringNetwork,
    pub history: Vec<EpochMetrics>,
    /// Evaluation on the held-out set, or the training set without one
    pub report: EvaluationReport,
    pub stopped_early: bool,
    pub elapsed: Duration,
}

/// Design matrices of a sample set
struct Batch {
    features: Array2<f32>,
    labels: Array2<f32>,
}

impl Batch {
    fn from_samples(samples: &[TrainingSample]) -> Self {
        Self {
            features: Array2::from_shape_fn((samples.len(), NUM_FEATURES), |(i, j)| {
                samples[i].features.values[j]
            }),
            labels: Array2::from_shape_fn((samples.len(), NUM_OUTPUTS), |(i, j)| {
                samples[i].labels()[j]
            }),
        }
    }

    fn len(&self) -> usize {
        self.features.nrows()
    }
}

pub struct Trainer;

impl Trainer {
    /// Train a fresh network on `samples`
    pub fn train(samples: &[TrainingSample], config: &TrainingConfig) -> Result<TrainingOutcome> {
        config.validate()?;
        validate_samples(samples)?;

        let start = Instant::now();
        let validation_len = (samples.len() as f32 * config.validation_split).floor() as usize;
        let (train_samples, validation_samples) = samples.split_at(samples.len() - validation_len);

        let train = Batch::from_samples(train_samples);
        let validation = (!validation_samples.is_empty()).then(|| Batch::from_samples(validation_samples));

        info!(
            train_samples = train.len(),
            validation_samples = validation_samples.len(),
            epochs = config.epochs,
            batch_size = config.batch_size,
            learning_rate = config.learning_rate,
            "Starting training"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut network = ScoringNetwork::new(&mut rng);
        let mut optimizer = AdamOptimizer::new(config.learning_rate);
        let parameter_names: Vec<(String, String)> = (0..network.layers().len())
            .map(|idx| (format!("layer{}.weights", idx), format!("layer{}.bias", idx)))
            .collect();

        let mut indices: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(config.epochs);
        let mut best: Option<(f32, ScoringNetwork)> = None;
        let mut stale_epochs = 0;
        let mut stopped_early = false;

        for epoch in 1..=config.epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0f64;
            let mut abs_sum = 0.0f64;

            for chunk in indices.chunks(config.batch_size) {
                let x = train.features.select(Axis(0), chunk);
                let y = train.labels.select(Axis(0), chunk);

                let (output, cache) = network.forward_train(&x.view(), &mut rng);
                let error = &output - &y;
                loss_sum += error.iter().map(|e| (*e as f64).powi(2)).sum::<f64>();
                abs_sum += error.iter().map(|e| e.abs() as f64).sum::<f64>();

                // d(mean squared error)/d(output)
                let grad_output = error * (2.0 / (chunk.len() * NUM_OUTPUTS) as f32);
                let gradients = network.backward(&cache, grad_output);

                optimizer.next_step();
                for ((layer, grads), (weight_name, bias_name)) in network
                    .layers_mut()
                    .iter_mut()
                    .zip(&gradients)
                    .zip(&parameter_names)
                {
                    optimizer.update(
                        weight_name,
                        layer.weights.view_mut().into_dyn(),
                        grads.weights.view().into_dyn(),
                    );
                    optimizer.update(
                        bias_name,
                        layer.bias.view_mut().into_dyn(),
                        grads.bias.view().into_dyn(),
                    );
                }
            }

            let elements = (train.len() * NUM_OUTPUTS) as f64;
            let (val_loss, val_mae) = match &validation {
                Some(batch) => {
                    let (loss, mae) = loss_and_mae(&network, batch)?;
                    (Some(loss), Some(mae))
                }
                None => (None, None),
            };
            let metrics = EpochMetrics {
                epoch,
                train_loss: (loss_sum / elements) as f32,
                train_mae: (abs_sum / elements) as f32,
                val_loss,
                val_mae,
            };

            if !metrics.train_loss.is_finite() {
                return Err(RiskError::training(format!("loss diverged at epoch {}", epoch)));
            }

            if epoch % 10 == 0 {
                info!(
                    epoch,
                    loss = metrics.train_loss,
                    mae = metrics.train_mae,
                    val_loss = ?metrics.val_loss,
                    val_mae = ?metrics.val_mae,
                    "Training progress"
                );
            }

            let monitored = metrics.monitored_loss();
            history.push(metrics);

            if config.early_stopping {
                let improved = best
                    .as_ref()
                    .map_or(true, |(best_loss, _)| monitored < *best_loss);
                if improved {
                    best = Some((monitored, network.clone()));
                    stale_epochs = 0;
                } else {
                    stale_epochs += 1;
                    if stale_epochs >= config.patience {
                        debug!(epoch, monitored, "Early stopping");
                        stopped_early = epoch < config.epochs;
                        break;
                    }
                }
            }
        }

        if let Some((_, best_network)) = best {
            network = best_network;
        }

        let held_out = if validation_samples.is_empty() {
            train_samples
        } else {
            validation_samples
        };
        let report = Self::evaluate(&network, held_out)?;

        let artifact = ModelArtifact::from_training(
            network.weights(),
            Performance {
                loss: report.loss,
                mae: report.mae,
                correlations: report.correlations,
            },
            TrainingSummary {
                training_samples: train_samples.len(),
                validation_samples: validation_samples.len(),
                epochs: history.len(),
            },
            Utc::now(),
        );

        let elapsed = start.elapsed();
        info!(
            version = %artifact.metadata.version,
            epochs = history.len(),
            stopped_early,
            loss = report.loss,
            mae = report.mae,
            risk_correlation = report.correlations.risk,
            confidence_correlation = report.correlations.confidence,
            elapsed_ms = elapsed.as_millis() as u64,
            "Training completed"
        );

        Ok(TrainingOutcome {
            artifact,
            network,
            history,
            report,
            stopped_early,
            elapsed,
        })
    }

    /// Score `samples` with `network` and compare against their labels
    pub fn evaluate(network: &ScoringNetwork, samples: &[TrainingSample]) -> Result<EvaluationReport> {
        if samples.is_empty() {
            return Err(RiskError::training("cannot evaluate on an empty dataset"));
        }
        let batch = Batch::from_samples(samples);
        let output = network
            .forward(&batch.features.view())
            .map_err(|e| RiskError::training(e.to_string()))?;

        let predictions: Vec<[f32; 2]> = output.rows().into_iter().map(|r| [r[0], r[1]]).collect();
        let labels: Vec<[f32; 2]> = samples.iter().map(TrainingSample::labels).collect();
        Ok(EvaluationReport::from_predictions(predictions, &labels))
    }
}

fn loss_and_mae(network: &ScoringNetwork, batch: &Batch) -> Result<(f32, f32)> {
    let output = network
        .forward(&batch.features.view())
        .map_err(|e| RiskError::training(e.to_string()))?;
    let error = &output - &batch.labels;
    let n = error.len().max(1) as f64;
    let loss = error.iter().map(|e| (*e as f64).powi(2)).sum::<f64>() / n;
    let mae = error.iter().map(|e| e.abs() as f64).sum::<f64>() / n;
    Ok((loss as f32, mae as f32))
}

fn validate_samples(samples: &[TrainingSample]) -> Result<()> {
    if samples.is_empty() {
        return Err(RiskError::training("training dataset is empty"));
    }
    for (idx, sample) in samples.iter().enumerate() {
        if !validate_features(sample.features.as_slice()) {
            return Err(RiskError::training(format!(
                "sample {} has features outside [0, 1]",
                idx
            )));
        }
        let labels = sample.labels();
        if labels.iter().any(|v| !v.is_finite() || !(0.0..=1.0).contains(v)) {
            return Err(RiskError::training(format!(
                "sample {} has labels outside [0, 1]: {:?}",
                idx, labels
            )));
        }
    }
    Ok(())
}
