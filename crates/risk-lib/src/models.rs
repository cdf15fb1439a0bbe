//! Core data models for the risk-scoring core

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of model input features
pub const NUM_FEATURES: usize = 6;

/// Number of model outputs (risk, confidence)
pub const NUM_OUTPUTS: usize = 2;

/// Physical and orbital observables of one near-Earth object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectParams {
    /// Estimated diameter in meters
    #[serde(rename = "size")]
    pub size_m: f64,
    /// Relative approach velocity in km/s
    #[serde(rename = "velocity")]
    pub velocity_km_s: f64,
    /// Miss distance at closest approach in AU
    #[serde(rename = "missDistance")]
    pub miss_distance_au: f64,
    /// Potentially Hazardous Asteroid flag
    #[serde(rename = "isPHA")]
    pub is_pha: bool,
}

impl ObjectParams {
    pub fn new(size_m: f64, velocity_km_s: f64, miss_distance_au: f64, is_pha: bool) -> Self {
        Self {
            size_m,
            velocity_km_s,
            miss_distance_au,
            is_pha,
        }
    }

    /// Reject non-finite or non-positive observables
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("size", self.size_m),
            ("velocity", self.velocity_km_s),
            ("missDistance", self.miss_distance_au),
        ];
        for (name, value) in checks {
            if !value.is_finite() {
                return Err(RiskError::invalid_input(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
            if value <= 0.0 {
                return Err(RiskError::invalid_input(format!(
                    "{} must be > 0, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Normalized model input with the unnormalized values it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f32; NUM_FEATURES],
    pub source: ObjectParams,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn log_size(&self) -> f32 {
        self.values[0]
    }

    pub fn norm_velocity(&self) -> f32 {
        self.values[1]
    }

    pub fn inverse_distance(&self) -> f32 {
        self.values[2]
    }

    pub fn pha_flag(&self) -> f32 {
        self.values[3]
    }

    pub fn kinetic_energy_proxy(&self) -> f32 {
        self.values[4]
    }

    pub fn close_approach_flag(&self) -> f32 {
        self.values[5]
    }
}

/// Risk stratum used for class-balanced dataset construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn all() -> [RiskBand; 3] {
        [RiskBand::Low, RiskBand::Medium, RiskBand::High]
    }

    /// Bucket a risk score into a band
    pub fn classify(risk: f32) -> Self {
        if risk < 0.3 {
            RiskBand::Low
        } else if risk < 0.6 {
            RiskBand::Medium
        } else {
            RiskBand::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supervised example
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub risk: f32,
    pub confidence: f32,
    /// Stratum the sample was drawn from, if it was drawn per band
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<RiskBand>,
}

impl TrainingSample {
    pub fn labels(&self) -> [f32; NUM_OUTPUTS] {
        [self.risk, self.confidence]
    }
}

/// Which path produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelUsed {
    Ml,
    Fallback,
}

impl ModelUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelUsed::Ml => "ml",
            ModelUsed::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ModelUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of scoring one object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub risk: f32,
    pub confidence: f32,
    pub model_used: ModelUsed,
    /// Processing time in milliseconds
    pub processing_time: f64,
    pub model_version: String,
}

impl PredictionResult {
    /// Conservative result for an item that could not be scored at all
    pub fn conservative_default() -> Self {
        Self {
            risk: 0.0,
            confidence: 0.5,
            model_used: ModelUsed::Fallback,
            processing_time: 0.0,
            model_version: "fallback".to_string(),
        }
    }
}
