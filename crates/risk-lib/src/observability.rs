//! Observability infrastructure for risk scoring
//!
//! Provides:
//! - Prometheus metrics (prediction latency, ml/fallback counts, model state, training time)
//! - Structured logging of lifecycle events with tracing

use crate::models::{ModelUsed, PredictionResult};
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Latency buckets in seconds
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0,
];

/// Training duration buckets in seconds
const TRAINING_BUCKETS: &[f64] = &[0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0];

static GLOBAL_METRICS: OnceLock<RiskMetricsInner> = OnceLock::new();

struct RiskMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    invalid_inputs_total: IntCounter,
    inference_errors_total: IntCounter,
    model_state: IntGauge,
    model_loads_total: IntCounterVec,
    training_duration_seconds: Histogram,
    model_version_info: GaugeVec,
}

impl RiskMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "neorisk_prediction_latency_seconds",
                "Time spent scoring one object",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "neorisk_predictions_total",
                "Predictions served, by the path that produced them",
                &["model_used"]
            )
            .expect("Failed to register predictions_total"),

            invalid_inputs_total: register_int_counter!(
                "neorisk_invalid_inputs_total",
                "Requests rejected for invalid observables"
            )
            .expect("Failed to register invalid_inputs_total"),

            inference_errors_total: register_int_counter!(
                "neorisk_inference_errors_total",
                "Network inference failures and timeouts"
            )
            .expect("Failed to register inference_errors_total"),

            model_state: register_int_gauge!(
                "neorisk_model_state",
                "Runtime state: 0 unloaded, 1 loading, 2 ready, 3 degraded"
            )
            .expect("Failed to register model_state"),

            model_loads_total: register_int_counter_vec!(
                "neorisk_model_loads_total",
                "Models made current, by where they came from",
                &["source"]
            )
            .expect("Failed to register model_loads_total"),

            training_duration_seconds: register_histogram!(
                "neorisk_training_duration_seconds",
                "Wall time of bootstrap training runs",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            model_version_info: register_gauge_vec!(
                "neorisk_model_version_info",
                "Information about the currently loaded model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Handle to the process-wide metrics; clones share the same metrics
#[derive(Clone)]
pub struct RiskMetrics {
    _private: (),
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RiskMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RiskMetricsInner {
        GLOBAL_METRICS.get_or_init(RiskMetricsInner::new)
    }

    pub fn observe_prediction(&self, model_used: ModelUsed, duration_secs: f64) {
        let inner = self.inner();
        inner.prediction_latency_seconds.observe(duration_secs);
        inner
            .predictions_total
            .with_label_values(&[model_used.as_str()])
            .inc();
    }

    pub fn inc_invalid_inputs(&self) {
        self.inner().invalid_inputs_total.inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors_total.inc();
    }

    pub fn set_model_state(&self, code: i64) {
        self.inner().model_state.set(code);
    }

    pub fn inc_model_loads(&self, source: &str) {
        self.inner().model_loads_total.with_label_values(&[source]).inc();
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    /// Replace the version label; `None` clears it
    pub fn set_model_version(&self, version: Option<&str>) {
        let info = &self.inner().model_version_info;
        info.reset();
        if let Some(version) = version {
            info.with_label_values(&[version]).set(1.0);
        }
    }
}

/// Event-style logging for the scoring lifecycle
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_prediction(&self, result: &PredictionResult) {
        debug!(
            event = "prediction",
            service = %self.service,
            risk = result.risk,
            confidence = result.confidence,
            model_used = %result.model_used,
            model_version = %result.model_version,
            processing_time_ms = result.processing_time,
            "Scored object"
        );
    }

    pub fn log_model_loaded(&self, version: &str, source: &str, elapsed_ms: u64) {
        info!(
            event = "model_loaded",
            service = %self.service,
            model_version = %version,
            source = %source,
            elapsed_ms,
            "Model ready"
        );
    }

    pub fn log_training_completed(
        &self,
        version: &str,
        epochs: usize,
        loss: f32,
        risk_correlation: f32,
        confidence_correlation: f32,
        elapsed_ms: u64,
    ) {
        info!(
            event = "training_completed",
            service = %self.service,
            model_version = %version,
            epochs,
            loss,
            risk_correlation,
            confidence_correlation,
            elapsed_ms,
            "Bootstrap model trained"
        );
    }

    /// A load failed; `serving_stale` when an expired model keeps serving
    pub fn log_degraded(&self, reason: &str, retry_in_secs: u64, serving_stale: bool) {
        if serving_stale {
            warn!(
                event = "model_refresh_failed",
                service = %self.service,
                reason = %reason,
                retry_in_secs,
                "Model refresh failed, keeping previous model"
            );
        } else {
            warn!(
                event = "model_degraded",
                service = %self.service,
                reason = %reason,
                retry_in_secs,
                "No model available, serving rule-based fallback"
            );
        }
    }

    pub fn log_startup(&self, version: &str, artifact_dir: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            service_version = %version,
            artifact_dir = %artifact_dir,
            "Risk scoring service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Risk scoring service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = RiskMetrics::new();
        let other = metrics.clone();

        metrics.observe_prediction(ModelUsed::Ml, 0.0004);
        other.observe_prediction(ModelUsed::Fallback, 0.0001);
        metrics.inc_invalid_inputs();
        metrics.inc_inference_errors();
        metrics.set_model_state(2);
        metrics.inc_model_loads("file");
        metrics.observe_training_duration(3.5);
        metrics.set_model_version(Some("v0.1.0-test"));
        metrics.set_model_version(None);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "neorisk_predictions_total"));
    }

    #[test]
    fn test_structured_logger() {
        let logger = StructuredLogger::new("risk-agent");
        assert_eq!(logger.service(), "risk-agent");
        logger.log_prediction(&PredictionResult::conservative_default());
        logger.log_degraded("no artifact", 60, false);
    }
}
