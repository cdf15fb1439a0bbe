//! Network inference and the rule-based fallback

use super::output::{OutputFormatter, FALLBACK_VERSION};
use super::Predictor;
use crate::error::{Result, RiskError};
use crate::models::{FeatureVector, ModelUsed, ObjectParams, PredictionResult, NUM_FEATURES};
use crate::synthetic::ScoringOracle;
use crate::training::ScoringNetwork;
use ndarray::Array2;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Single inferences slower than this are logged
const SLOW_INFERENCE: Duration = Duration::from_millis(5);

/// Scores feature vectors with a trained network
pub struct NetworkPredictor {
    network: Arc<ScoringNetwork>,
    version: String,
    output_formatter: OutputFormatter,
}

impl NetworkPredictor {
    pub fn new(network: Arc<ScoringNetwork>, version: impl Into<String>) -> Self {
        Self {
            network,
            version: version.into(),
            output_formatter: OutputFormatter::new(),
        }
    }

    /// Raw `[risk, confidence]` rows for many vectors in one forward pass
    pub fn predict_raw_batch(&self, features: &[FeatureVector]) -> Result<Vec<[f32; 2]>> {
        let start = Instant::now();
        let input = Array2::from_shape_fn((features.len(), NUM_FEATURES), |(i, j)| {
            features[i].values[j]
        });
        let output = self.network.forward(&input.view())?;
        if output.nrows() != features.len() {
            return Err(RiskError::inference(format!(
                "network returned {} rows for {} inputs",
                output.nrows(),
                features.len()
            )));
        }

        debug!(
            batch = features.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Batch inference completed"
        );
        Ok(output.rows().into_iter().map(|r| [r[0], r[1]]).collect())
    }

}

impl Predictor for NetworkPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult> {
        let start = Instant::now();
        let raw = self.network.predict_one(features.as_slice())?;
        let elapsed = start.elapsed();

        if elapsed > SLOW_INFERENCE {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target",
                SLOW_INFERENCE.as_millis()
            );
        }

        Ok(self.output_formatter.format(
            raw,
            ModelUsed::Ml,
            &self.version,
            elapsed.as_secs_f64() * 1000.0,
        ))
    }

    fn model_version(&self) -> &str {
        &self.version
    }
}

/// Noise-free oracle used whenever the network cannot answer
#[derive(Debug, Clone, Default)]
pub struct FallbackPredictor {
    oracle: ScoringOracle,
    output_formatter: OutputFormatter,
}

impl FallbackPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self, params: &ObjectParams) -> PredictionResult {
        let start = Instant::now();
        let score = self.oracle.score(params);
        self.output_formatter.format(
            [score.risk, score.confidence],
            ModelUsed::Fallback,
            FALLBACK_VERSION,
            start.elapsed().as_secs_f64() * 1000.0,
        )
    }
}

impl Predictor for FallbackPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult> {
        Ok(self.score(&features.source))
    }

    fn model_version(&self) -> &str {
        FALLBACK_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::FeatureExtractor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn predictor() -> NetworkPredictor {
        let network = ScoringNetwork::new(&mut StdRng::seed_from_u64(42));
        NetworkPredictor::new(Arc::new(network), "v-test")
    }

    fn features(params: ObjectParams) -> FeatureVector {
        FeatureExtractor::new().extract(&params).unwrap()
    }

    #[test]
    fn test_network_prediction_tagged_ml() {
        let predictor = predictor();
        let result = predictor
            .predict(&features(ObjectParams::new(500.0, 25.0, 0.02, true)))
            .unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(result.model_version, "v-test");
        assert!((0.0..=1.0).contains(&result.risk));
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn test_batch_matches_single() {
        let predictor = predictor();
        let batch: Vec<FeatureVector> = [
            ObjectParams::new(500.0, 25.0, 0.02, true),
            ObjectParams::new(15.0, 6.0, 0.8, false),
            ObjectParams::new(140.0, 18.0, 0.1, false),
        ]
        .into_iter()
        .map(features)
        .collect();

        let rows = predictor.predict_raw_batch(&batch).unwrap();
        assert_eq!(rows.len(), 3);
        for (row, fv) in rows.iter().zip(&batch) {
            let single = predictor.predict(fv).unwrap();
            assert!((row[0] - single.risk).abs() < 1e-5);
            assert!((row[1] - single.confidence).abs() < 1e-5);
        }
    }

    #[test]
    fn test_fallback_matches_oracle() {
        let fallback = FallbackPredictor::new();
        let params = ObjectParams::new(500.0, 25.0, 0.02, true);
        let result = fallback.predict(&features(params)).unwrap();
        let expected = ScoringOracle::new().score(&params);

        assert_eq!(result.model_used, ModelUsed::Fallback);
        assert_eq!(result.model_version, FALLBACK_VERSION);
        assert_eq!(result.risk, expected.risk);
        assert_eq!(result.confidence, expected.confidence);
        assert_eq!(fallback.model_version(), "fallback");
    }
}
