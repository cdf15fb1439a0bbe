//! Error taxonomy for the risk-scoring core
//!
//! Extraction and validation errors are surfaced to the caller. Load,
//! training and inference errors are absorbed by the runtime and turned
//! into fallback predictions.

use thiserror::Error;

/// Errors produced by the risk-scoring core
#[derive(Error, Debug)]
pub enum RiskError {
    /// Malformed or non-finite observable, or a malformed feature vector
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Model artifact missing or corrupt
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// Empty or malformed dataset, or unusable training configuration
    #[error("training failed: {0}")]
    Training(String),

    /// Runtime failure while running the network
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RiskError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::Training(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Whether the error must be surfaced to the immediate caller
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, RiskError::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, RiskError>;
