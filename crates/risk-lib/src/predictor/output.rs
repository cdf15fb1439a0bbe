//! Prediction output formatting
//!
//! Turns raw network or oracle outputs into a [`PredictionResult`] with
//! scores clamped to [0, 1].

use crate::models::{ModelUsed, PredictionResult, NUM_OUTPUTS};

/// Version tag reported for oracle-backed results
pub const FALLBACK_VERSION: &str = "fallback";

/// Configuration for output formatting
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Results below this confidence are flagged as low confidence
    pub low_confidence_threshold: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    config: OutputConfig,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a result from raw `[risk, confidence]`
    pub fn format(
        &self,
        raw: [f32; NUM_OUTPUTS],
        model_used: ModelUsed,
        model_version: &str,
        processing_time_ms: f64,
    ) -> PredictionResult {
        PredictionResult {
            risk: unit(raw[0]),
            confidence: unit(raw[1]),
            model_used,
            processing_time: processing_time_ms.max(0.0),
            model_version: model_version.to_string(),
        }
    }

    pub fn is_low_confidence(&self, result: &PredictionResult) -> bool {
        result.confidence < self.config.low_confidence_threshold
    }

    pub fn low_confidence_reason(&self, result: &PredictionResult) -> Option<String> {
        if !self.is_low_confidence(result) {
            return None;
        }
        let reason = match result.model_used {
            ModelUsed::Fallback => format!(
                "rule-based fallback with confidence {:.2}",
                result.confidence
            ),
            ModelUsed::Ml => format!(
                "confidence {:.2} below {:.2}",
                result.confidence, self.config.low_confidence_threshold
            ),
        };
        Some(reason)
    }
}

/// Clamp to [0, 1], mapping NaN to 0
fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clamps() {
        let formatter = OutputFormatter::new();
        let result = formatter.format([1.3, -0.2], ModelUsed::Ml, "v1", 0.4);
        assert_eq!(result.risk, 1.0);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.model_version, "v1");

        let result = formatter.format([f32::NAN, 0.8], ModelUsed::Fallback, FALLBACK_VERSION, -1.0);
        assert_eq!(result.risk, 0.0);
        assert_eq!(result.processing_time, 0.0);
    }

    #[test]
    fn test_low_confidence() {
        let formatter = OutputFormatter::new();
        let confident = formatter.format([0.4, 0.9], ModelUsed::Ml, "v1", 1.0);
        let unsure = formatter.format([0.4, 0.6], ModelUsed::Fallback, FALLBACK_VERSION, 1.0);

        assert!(!formatter.is_low_confidence(&confident));
        assert!(formatter.low_confidence_reason(&confident).is_none());
        assert!(formatter.is_low_confidence(&unsure));
        assert!(formatter
            .low_confidence_reason(&unsure)
            .unwrap()
            .contains("fallback"));
    }
}
