//! Risk prediction engine

mod features;
mod inference;
mod output;
mod runtime;

pub use features::{
    feature_names, validate_features, FeatureExtractor, CLOSE_APPROACH_AU,
    INVERSE_DISTANCE_SCALE, KINETIC_ENERGY_SCALE, LOG_SIZE_SCALE, MAX_VELOCITY_KM_S,
};
pub use inference::{FallbackPredictor, NetworkPredictor};
pub use output::{OutputFormatter, FALLBACK_VERSION};
pub use runtime::{
    Capabilities, PredictorRuntime, RuntimeConfig, RuntimeState, RuntimeStats,
    DEFAULT_BOOTSTRAP_SAMPLES, DEFAULT_MODEL_TTL, DEFAULT_RETRY_COOLDOWN, INFERENCE_TIMEOUT,
};

use crate::error::Result;
use crate::models::{FeatureVector, PredictionResult};

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Score one feature vector
    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult>;

    /// Version tag reported with results
    fn model_version(&self) -> &str;
}
