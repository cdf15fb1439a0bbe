//! Collision-risk scoring for near-Earth objects
//!
//! This crate provides the core functionality for:
//! - Feature extraction from physical observables
//! - Synthetic, oracle-labeled training data
//! - Training and evaluating the scoring network
//! - Model lifecycle, inference and rule-based fallback
//! - Artifact persistence, health checks and observability

pub mod artifact;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod synthetic;
pub mod training;

pub use artifact::{
    ArtifactMetadata, ArtifactStore, FileArtifactStore, KeyValueArtifactStore, ModelArtifact,
};
pub use error::{Result, RiskError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{RiskMetrics, StructuredLogger};
pub use predictor::{
    Capabilities, FeatureExtractor, PredictorRuntime, RuntimeConfig, RuntimeState, RuntimeStats,
};
pub use synthetic::{GenerationMode, ScoringOracle, SyntheticDataGenerator};
pub use training::{Trainer, TrainingConfig};
