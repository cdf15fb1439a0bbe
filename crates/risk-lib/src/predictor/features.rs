//! Feature extraction for ML inference
//!
//! Maps raw object observables to the fixed 6-element normalized vector
//! consumed by the scoring network. Every component is clamped to [0, 1].

use crate::error::{Result, RiskError};
use crate::models::{FeatureVector, ObjectParams, NUM_FEATURES};

/// Size normalization divisor (log10 of 100 km)
pub const LOG_SIZE_SCALE: f64 = 5.0;

/// Empirical NEO velocity ceiling in km/s
pub const MAX_VELOCITY_KM_S: f64 = 30.0;

/// Inverse-distance multiplier; 0.05 AU maps to 1.0
pub const INVERSE_DISTANCE_SCALE: f64 = 20.0;

/// size (m) x velocity (km/s) that saturates the kinetic energy proxy
pub const KINETIC_ENERGY_SCALE: f64 = 50_000.0;

/// Miss distance below which an approach counts as close
pub const CLOSE_APPROACH_AU: f64 = 0.05;

/// Ordered names of the extracted features
pub fn feature_names() -> [&'static str; NUM_FEATURES] {
    [
        "log_size",
        "norm_velocity",
        "inverse_distance",
        "pha_flag",
        "kinetic_energy_proxy",
        "close_approach_flag",
    ]
}

/// Extracts normalized features from object observables
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, params: &ObjectParams) -> Result<FeatureVector> {
        params.validate()?;

        let size = params.size_m;
        let velocity = params.velocity_km_s;
        let distance = params.miss_distance_au;

        let values = [
            unit((size + 1.0).log10() / LOG_SIZE_SCALE),
            unit(velocity / MAX_VELOCITY_KM_S),
            unit(1.0 / (distance * INVERSE_DISTANCE_SCALE)),
            if params.is_pha { 1.0 } else { 0.0 },
            unit(size * velocity / KINETIC_ENERGY_SCALE),
            if distance < CLOSE_APPROACH_AU { 1.0 } else { 0.0 },
        ];

        if !validate_features(&values) {
            return Err(RiskError::invalid_input(format!(
                "extracted features out of range: {:?}",
                values
            )));
        }

        Ok(FeatureVector {
            values,
            source: *params,
        })
    }

    /// Extract features for a whole batch, keeping per-item failures
    pub fn extract_batch(&self, batch: &[ObjectParams]) -> Vec<Result<FeatureVector>> {
        batch.iter().map(|params| self.extract(params)).collect()
    }
}

/// Check that a feature slice can be fed to the model
pub fn validate_features(values: &[f32]) -> bool {
    values.len() == NUM_FEATURES
        && values
            .iter()
            .all(|v| !v.is_nan() && (0.0..=1.0).contains(v))
}

fn unit(value: f64) -> f32 {
    value.clamp(0.0, 1.0) as f32
}
