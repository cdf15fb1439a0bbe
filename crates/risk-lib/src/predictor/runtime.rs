//! Model lifecycle and serving
//!
//! The runtime owns at most one cached model. The first request (or
//! [`PredictorRuntime::init`]) loads it from the configured artifact stores,
//! or trains a bootstrap model when none is stored. Concurrent callers share
//! a single in-flight load. Anything that goes wrong on the way degrades to
//! the rule-based fallback; only invalid input is reported to the caller.

use super::inference::{FallbackPredictor, NetworkPredictor};
use super::output::OutputFormatter;
use super::{FeatureExtractor, Predictor};
use crate::artifact::{ArtifactMetadata, ArtifactStore};
use crate::error::{Result, RiskError};
use crate::models::{FeatureVector, ModelUsed, ObjectParams, PredictionResult};
use crate::observability::{RiskMetrics, StructuredLogger};
use crate::synthetic::{GenerationMode, SyntheticDataGenerator};
use crate::training::{ScoringNetwork, Trainer, TrainingConfig, TrainingOutcome};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How long a loaded model is served before it is reloaded
pub const DEFAULT_MODEL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Wait after a failed load before trying again
pub const DEFAULT_RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// Maximum inference time before using the fallback
pub const INFERENCE_TIMEOUT: Duration = Duration::from_millis(100);

pub const DEFAULT_BOOTSTRAP_SAMPLES: usize = 2000;

/// Predictions kept for the rolling latency average
const LATENCY_WINDOW: usize = 100;

/// Source label for models produced by bootstrap training
const TRAINED_SOURCE: &str = "training";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub ttl: Duration,
    pub retry_cooldown: Duration,
    pub inference_timeout: Duration,
    /// Synthetic samples used when a model has to be trained
    pub bootstrap_samples: usize,
    pub training: TrainingConfig,
    pub generator_seed: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_MODEL_TTL,
            retry_cooldown: DEFAULT_RETRY_COOLDOWN,
            inference_timeout: INFERENCE_TIMEOUT,
            bootstrap_samples: DEFAULT_BOOTSTRAP_SAMPLES,
            training: TrainingConfig::default(),
            generator_seed: 42,
        }
    }
}

/// What the runtime is allowed to do when no model is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Save freshly trained models to the stores
    pub can_persist: bool,
    /// Train a bootstrap model
    pub can_train: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_persist: true,
            can_train: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Unloaded,
    Loading,
    Ready,
    /// No model could be loaded; serving the fallback until the cooldown passes
    Degraded,
}

impl RuntimeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeState::Unloaded => "unloaded",
            RuntimeState::Loading => "loading",
            RuntimeState::Ready => "ready",
            RuntimeState::Degraded => "degraded",
        }
    }

    /// Numeric code exported as a gauge
    pub fn code(&self) -> i64 {
        match self {
            RuntimeState::Unloaded => 0,
            RuntimeState::Loading => 1,
            RuntimeState::Ready => 2,
            RuntimeState::Degraded => 3,
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing what the runtime has served
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStats {
    pub total_predictions: u64,
    pub ml_predictions: u64,
    pub fallback_predictions: u64,
    pub invalid_inputs: u64,
    /// Invalid inputs plus inference failures
    pub errors: u64,
    pub error_rate: f64,
    /// Mean over the last 100 predictions
    pub average_latency_ms: f64,
    pub load_attempts: u64,
    pub trainings: u64,
}

#[derive(Default)]
struct StatsTracker {
    total: u64,
    ml: u64,
    fallback: u64,
    invalid: u64,
    inference_errors: u64,
    latencies_ms: VecDeque<f64>,
}

impl StatsTracker {
    fn record(&mut self, result: &PredictionResult) {
        self.total += 1;
        match result.model_used {
            ModelUsed::Ml => self.ml += 1,
            ModelUsed::Fallback => self.fallback += 1,
        }
        if self.latencies_ms.len() == LATENCY_WINDOW {
            self.latencies_ms.pop_front();
        }
        self.latencies_ms.push_back(result.processing_time);
    }

    fn snapshot(&self) -> RuntimeStats {
        let errors = self.invalid + self.inference_errors;
        let requests = self.total + self.invalid;
        let average_latency_ms = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        };
        RuntimeStats {
            total_predictions: self.total,
            ml_predictions: self.ml,
            fallback_predictions: self.fallback,
            invalid_inputs: self.invalid,
            errors,
            error_rate: if requests == 0 {
                0.0
            } else {
                errors as f64 / requests as f64
            },
            average_latency_ms,
            ..Default::default()
        }
    }
}

/// The cached model
struct CacheEntry {
    predictor: Arc<NetworkPredictor>,
    metadata: ArtifactMetadata,
    loaded_at: Instant,
    ttl: Duration,
    /// Set after a failed refresh; the stale model serves until then
    refresh_after: Option<Instant>,
}

impl CacheEntry {
    fn needs_refresh(&self, now: Instant) -> bool {
        if now.duration_since(self.loaded_at) < self.ttl {
            return false;
        }
        self.refresh_after.map_or(true, |at| now >= at)
    }
}

struct Inner {
    state: RuntimeState,
    entry: Option<CacheEntry>,
    /// Earliest retry while degraded
    retry_at: Option<Instant>,
    last_error: Option<String>,
    /// Completion signal of the load in progress
    in_flight: Option<watch::Receiver<bool>>,
    /// Bumped by invalidate and shutdown so stale loads are discarded
    generation: u64,
    shut_down: bool,
}

impl Inner {
    /// `Some(model)` when the caller can be answered without loading
    fn serving(&self, now: Instant) -> Option<Option<Arc<NetworkPredictor>>> {
        if self.shut_down {
            return Some(None);
        }
        if self.in_flight.is_some() {
            return None;
        }
        match &self.entry {
            Some(entry) if !entry.needs_refresh(now) => Some(Some(Arc::clone(&entry.predictor))),
            Some(_) => None,
            None => match self.retry_at {
                Some(at) if self.state == RuntimeState::Degraded && now < at => Some(None),
                _ => None,
            },
        }
    }
}

/// A model ready to become current
struct Loaded {
    predictor: Arc<NetworkPredictor>,
    metadata: ArtifactMetadata,
    source: String,
}

impl Loaded {
    fn new(network: ScoringNetwork, metadata: ArtifactMetadata, source: &str) -> Self {
        Self {
            predictor: Arc::new(NetworkPredictor::new(
                Arc::new(network),
                metadata.version.clone(),
            )),
            metadata,
            source: source.to_string(),
        }
    }
}

struct Shared {
    config: RuntimeConfig,
    capabilities: Capabilities,
    stores: Vec<Arc<dyn ArtifactStore>>,
    inner: RwLock<Inner>,
    stats: Mutex<StatsTracker>,
    load_attempts: AtomicU64,
    trainings: AtomicU64,
    extractor: FeatureExtractor,
    fallback: FallbackPredictor,
    formatter: OutputFormatter,
    metrics: RiskMetrics,
    logger: StructuredLogger,
}

impl Shared {
    fn transition(&self, inner: &mut Inner, state: RuntimeState) {
        if inner.state != state {
            debug!(from = %inner.state, to = %state, "Runtime state change");
            inner.state = state;
        }
        self.metrics.set_model_state(state.code());
    }

    fn tracker(&self) -> std::sync::MutexGuard<'_, StatsTracker> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, result: &PredictionResult) {
        self.tracker().record(result);
        self.metrics
            .observe_prediction(result.model_used, result.processing_time / 1000.0);
        self.logger.log_prediction(result);
    }

    fn record_invalid(&self) {
        self.tracker().invalid += 1;
        self.metrics.inc_invalid_inputs();
    }

    fn record_inference_error(&self) {
        self.tracker().inference_errors += 1;
        self.metrics.inc_inference_errors();
    }

    /// Body of the spawned load task
    async fn complete_load(self: Arc<Self>, generation: u64, done: watch::Sender<bool>) {
        let started = Instant::now();
        // A panicking load must still end in Degraded with a cooldown
        let loader = Arc::clone(&self);
        let result = match tokio::spawn(async move { loader.load_or_train().await }).await {
            Ok(result) => result,
            Err(e) => Err(RiskError::model_load(format!("model load task failed: {}", e))),
        };

        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if inner.generation != generation || inner.shut_down {
            debug!("Discarding model load started before invalidation");
            // A newer load owns the state once one is in flight
            if inner.in_flight.is_none() {
                let state = if inner.entry.is_some() {
                    RuntimeState::Ready
                } else {
                    RuntimeState::Unloaded
                };
                self.transition(inner, state);
            }
        } else {
            inner.in_flight = None;
            match result {
                Ok(loaded) => {
                    let version = loaded.metadata.version.clone();
                    inner.entry = Some(CacheEntry {
                        predictor: loaded.predictor,
                        metadata: loaded.metadata,
                        loaded_at: Instant::now(),
                        ttl: self.config.ttl,
                        refresh_after: None,
                    });
                    inner.retry_at = None;
                    inner.last_error = None;
                    self.transition(inner, RuntimeState::Ready);

                    self.metrics.inc_model_loads(&loaded.source);
                    self.metrics.set_model_version(Some(&version));
                    self.logger.log_model_loaded(
                        &version,
                        &loaded.source,
                        started.elapsed().as_millis() as u64,
                    );
                }
                Err(e) => {
                    let reason = e.to_string();
                    let retry_at = Instant::now() + self.config.retry_cooldown;
                    let serving_stale = match inner.entry.as_mut() {
                        Some(entry) => {
                            entry.refresh_after = Some(retry_at);
                            true
                        }
                        None => false,
                    };
                    if serving_stale {
                        self.transition(inner, RuntimeState::Ready);
                    } else {
                        inner.retry_at = Some(retry_at);
                        self.transition(inner, RuntimeState::Degraded);
                    }
                    self.logger.log_degraded(
                        &reason,
                        self.config.retry_cooldown.as_secs(),
                        serving_stale,
                    );
                    inner.last_error = Some(reason);
                }
            }
        }

        drop(guard);
        let _ = done.send(true);
    }

    /// First valid stored artifact, else a freshly trained model
    async fn load_or_train(&self) -> Result<Loaded> {
        self.load_attempts.fetch_add(1, Ordering::Relaxed);

        for store in &self.stores {
            match store.load().await {
                Ok(Some(artifact)) => match artifact.network() {
                    Ok(network) => return Ok(Loaded::new(network, artifact.metadata, store.name())),
                    Err(e) => warn!(store = store.name(), error = %e, "Discarding unusable artifact"),
                },
                Ok(None) => debug!(store = store.name(), "No stored artifact"),
                Err(e) => warn!(store = store.name(), error = %e, "Failed to load artifact"),
            }
        }

        if !self.capabilities.can_train {
            return Err(RiskError::model_load(
                "no stored model available and training is disabled",
            ));
        }

        let outcome = self.train_bootstrap().await?;

        if self.capabilities.can_persist {
            for store in &self.stores {
                // The model still becomes current if it cannot be saved
                if let Err(e) = store.save(&outcome.artifact).await {
                    warn!(store = store.name(), error = %e, "Failed to persist trained model");
                }
            }
        }

        let metadata = outcome.artifact.metadata;
        Ok(Loaded::new(outcome.network, metadata, TRAINED_SOURCE))
    }

    async fn train_bootstrap(&self) -> Result<TrainingOutcome> {
        let samples = self.config.bootstrap_samples;
        let seed = self.config.generator_seed;
        let training = self.config.training.clone();
        info!(samples, epochs = training.epochs, "Training bootstrap model");

        let outcome = tokio::task::spawn_blocking(move || {
            let dataset = SyntheticDataGenerator::with_seed(seed)
                .generate_dataset(samples, GenerationMode::Balanced);
            Trainer::train(&dataset, &training)
        })
        .await
        .map_err(|e| RiskError::training(format!("training task failed: {}", e)))??;

        self.trainings.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .observe_training_duration(outcome.elapsed.as_secs_f64());
        self.logger.log_training_completed(
            &outcome.artifact.metadata.version,
            outcome.history.len(),
            outcome.report.loss,
            outcome.report.correlations.risk,
            outcome.report.correlations.confidence,
            outcome.elapsed.as_millis() as u64,
        );
        Ok(outcome)
    }
}

/// Serves risk predictions and owns the model lifecycle; clones share state
#[derive(Clone)]
pub struct PredictorRuntime {
    shared: Arc<Shared>,
}

impl PredictorRuntime {
    /// Stores are tried in order when loading
    pub fn new(
        config: RuntimeConfig,
        capabilities: Capabilities,
        stores: Vec<Arc<dyn ArtifactStore>>,
    ) -> Self {
        let metrics = RiskMetrics::new();
        metrics.set_model_state(RuntimeState::Unloaded.code());
        Self {
            shared: Arc::new(Shared {
                config,
                capabilities,
                stores,
                inner: RwLock::new(Inner {
                    state: RuntimeState::Unloaded,
                    entry: None,
                    retry_at: None,
                    last_error: None,
                    in_flight: None,
                    generation: 0,
                    shut_down: false,
                }),
                stats: Mutex::new(StatsTracker::default()),
                load_attempts: AtomicU64::new(0),
                trainings: AtomicU64::new(0),
                extractor: FeatureExtractor::new(),
                fallback: FallbackPredictor::new(),
                formatter: OutputFormatter::new(),
                metrics,
                logger: StructuredLogger::new("predictor-runtime"),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared.capabilities
    }

    /// Load (or train) the model eagerly; returns the resulting state
    pub async fn init(&self) -> RuntimeState {
        self.current_model().await;
        self.state().await
    }

    /// Score one object. Only invalid input is an error.
    pub async fn predict(&self, params: &ObjectParams) -> Result<PredictionResult> {
        let start = Instant::now();
        let features = match self.shared.extractor.extract(params) {
            Ok(features) => features,
            Err(e) => {
                self.shared.record_invalid();
                return Err(e);
            }
        };

        let mut result = match self.current_model().await {
            Some(predictor) => self.infer(predictor, &features).await,
            None => self.shared.fallback.score(params),
        };
        result.processing_time = elapsed_ms(start);
        self.shared.record(&result);
        Ok(result)
    }

    /// Score many objects with one forward pass over the valid ones.
    ///
    /// Results are in input order. Malformed items get a conservative
    /// default instead of failing the batch.
    pub async fn predict_batch(&self, batch: &[ObjectParams]) -> Vec<PredictionResult> {
        if batch.is_empty() {
            return Vec::new();
        }
        let start = Instant::now();

        let mut positions = Vec::with_capacity(batch.len());
        let mut features = Vec::with_capacity(batch.len());
        for (idx, extracted) in self.shared.extractor.extract_batch(batch).into_iter().enumerate() {
            match extracted {
                Ok(fv) => {
                    positions.push(idx);
                    features.push(fv);
                }
                Err(e) => {
                    debug!(index = idx, error = %e, "Rejected batch item");
                    self.shared.record_invalid();
                }
            }
        }

        let mut scored: Vec<Option<PredictionResult>> = vec![None; batch.len()];
        if !features.is_empty() {
            let results = match self.current_model().await {
                Some(predictor) => self.infer_batch(predictor, &features).await,
                None => self.fallback_all(&features),
            };
            for (idx, result) in positions.into_iter().zip(results) {
                scored[idx] = Some(result);
            }
        }

        let per_item_ms = elapsed_ms(start) / batch.len() as f64;
        scored
            .into_iter()
            .map(|slot| match slot {
                Some(mut result) => {
                    result.processing_time = per_item_ms;
                    self.shared.record(&result);
                    result
                }
                None => PredictionResult {
                    processing_time: per_item_ms,
                    ..PredictionResult::conservative_default()
                },
            })
            .collect()
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            load_attempts: self.shared.load_attempts.load(Ordering::Relaxed),
            trainings: self.shared.trainings.load(Ordering::Relaxed),
            ..self.shared.tracker().snapshot()
        }
    }

    pub async fn state(&self) -> RuntimeState {
        self.shared.inner.read().await.state
    }

    pub async fn model_version(&self) -> Option<String> {
        let inner = self.shared.inner.read().await;
        inner.entry.as_ref().map(|e| e.metadata.version.clone())
    }

    pub async fn model_metadata(&self) -> Option<ArtifactMetadata> {
        let inner = self.shared.inner.read().await;
        inner.entry.as_ref().map(|e| e.metadata.clone())
    }

    /// Reason of the most recent failed load, if any
    pub async fn last_error(&self) -> Option<String> {
        self.shared.inner.read().await.last_error.clone()
    }

    /// Drop the cached model; the next request loads again
    pub async fn invalidate(&self) {
        let mut guard = self.shared.inner.write().await;
        let inner = &mut *guard;
        let version = inner.entry.take().map(|e| e.metadata.version);
        inner.generation += 1;
        inner.retry_at = None;
        // Later callers start a fresh load instead of joining a discarded one
        inner.in_flight = None;
        self.shared.transition(inner, RuntimeState::Unloaded);
        self.shared.metrics.set_model_version(None);
        info!(version = ?version, "Model invalidated");
    }

    /// Drop the model for good; later requests are answered by the fallback
    pub async fn shutdown(&self) {
        let mut guard = self.shared.inner.write().await;
        let inner = &mut *guard;
        inner.shut_down = true;
        inner.entry = None;
        inner.generation += 1;
        self.shared.transition(inner, RuntimeState::Unloaded);
        self.shared.metrics.set_model_version(None);
        info!("Predictor runtime shut down");
    }

    /// Current model, loading it first when needed; `None` means fallback
    async fn current_model(&self) -> Option<Arc<NetworkPredictor>> {
        {
            let inner = self.shared.inner.read().await;
            if let Some(serving) = inner.serving(Instant::now()) {
                return serving;
            }
        }

        let mut done = {
            let mut guard = self.shared.inner.write().await;
            if let Some(serving) = guard.serving(Instant::now()) {
                return serving;
            }
            // A closed sender means the load task died; start over
            let joinable = guard
                .in_flight
                .as_ref()
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            match joinable {
                Some(rx) => rx,
                None => self.start_load(&mut guard),
            }
        };

        let _ = done.wait_for(|finished| *finished).await;

        let inner = self.shared.inner.read().await;
        inner.entry.as_ref().map(|e| Arc::clone(&e.predictor))
    }

    fn start_load(&self, inner: &mut Inner) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        inner.in_flight = Some(rx.clone());
        self.shared.transition(inner, RuntimeState::Loading);

        let shared = Arc::clone(&self.shared);
        let generation = inner.generation;
        tokio::spawn(shared.complete_load(generation, tx));
        rx
    }

    /// Run the network off the async workers, bounded by the inference timeout
    async fn infer(
        &self,
        predictor: Arc<NetworkPredictor>,
        features: &FeatureVector,
    ) -> PredictionResult {
        let input = features.clone();
        let task = tokio::task::spawn_blocking(move || predictor.predict(&input));

        match timeout(self.shared.config.inference_timeout, task).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "Inference error, using fallback");
                self.shared.record_inference_error();
                self.shared.fallback.score(&features.source)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Inference task failed, using fallback");
                self.shared.record_inference_error();
                self.shared.fallback.score(&features.source)
            }
            Err(_) => {
                warn!("Inference timeout, using fallback");
                self.shared.record_inference_error();
                self.shared.fallback.score(&features.source)
            }
        }
    }

    async fn infer_batch(
        &self,
        predictor: Arc<NetworkPredictor>,
        features: &[FeatureVector],
    ) -> Vec<PredictionResult> {
        let version = predictor.model_version().to_string();
        let input = features.to_vec();
        let task = tokio::task::spawn_blocking(move || predictor.predict_raw_batch(&input));

        match timeout(self.shared.config.inference_timeout, task).await {
            Ok(Ok(Ok(rows))) => rows
                .into_iter()
                .map(|raw| self.shared.formatter.format(raw, ModelUsed::Ml, &version, 0.0))
                .collect(),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, batch = features.len(), "Batch inference error, using fallback");
                self.shared.record_inference_error();
                self.fallback_all(features)
            }
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    batch = features.len(),
                    "Batch inference task failed, using fallback"
                );
                self.shared.record_inference_error();
                self.fallback_all(features)
            }
            Err(_) => {
                warn!(batch = features.len(), "Batch inference timeout, using fallback");
                self.shared.record_inference_error();
                self.fallback_all(features)
            }
        }
    }

    fn fallback_all(&self, features: &[FeatureVector]) -> Vec<PredictionResult> {
        features
            .iter()
            .map(|fv| self.shared.fallback.score(&fv.source))
            .collect()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::artifact;
    use crate::artifact::{FileArtifactStore, KeyValueArtifactStore, ModelArtifact};
    use crate::synthetic::ScoringOracle;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Store whose loads are slow or crash
    struct FlakyStore {
        inner: KeyValueArtifactStore,
        delay: Duration,
        panics: bool,
    }

    #[async_trait]
    impl ArtifactStore for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn load(&self) -> Result<Option<ModelArtifact>> {
            tokio::time::sleep(self.delay).await;
            if self.panics {
                panic!("artifact store crashed");
            }
            self.inner.load().await
        }

        async fn save(&self, artifact: &ModelArtifact) -> Result<()> {
            self.inner.save(artifact).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig {
            bootstrap_samples: 200,
            training: TrainingConfig {
                epochs: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn no_training() -> Capabilities {
        Capabilities {
            can_persist: false,
            can_train: false,
        }
    }

    fn close_pha() -> ObjectParams {
        ObjectParams::new(500.0, 25.0, 0.02, true)
    }

    #[tokio::test]
    async fn test_loads_stored_model() {
        let store = KeyValueArtifactStore::default();
        let stored = artifact(1);
        store.save(&stored).await.unwrap();

        let runtime = PredictorRuntime::new(fast_config(), no_training(), vec![Arc::new(store)]);
        assert_eq!(runtime.state().await, RuntimeState::Unloaded);

        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(result.model_version, stored.metadata.version);
        assert_eq!(runtime.state().await, RuntimeState::Ready);
        assert_eq!(runtime.model_version().await, Some(stored.metadata.version.clone()));
        assert_eq!(runtime.stats().trainings, 0);
    }

    #[tokio::test]
    async fn test_first_valid_store_wins() {
        let broken = KeyValueArtifactStore::new("broken");
        broken.put_raw("{}").await;
        let good = KeyValueArtifactStore::new("good");
        let stored = artifact(2);
        good.save(&stored).await.unwrap();

        let runtime = PredictorRuntime::new(
            fast_config(),
            no_training(),
            vec![Arc::new(broken), Arc::new(good)],
        );
        assert_eq!(runtime.init().await, RuntimeState::Ready);
        assert_eq!(runtime.model_version().await, Some(stored.metadata.version));
    }

    #[tokio::test]
    async fn test_trains_and_persists_when_empty() {
        let dir = TempDir::new().unwrap();
        let file_store = Arc::new(FileArtifactStore::new(dir.path()));
        let runtime = PredictorRuntime::new(
            fast_config(),
            Capabilities::default(),
            vec![file_store.clone()],
        );

        assert_eq!(runtime.init().await, RuntimeState::Ready);
        assert_eq!(runtime.stats().trainings, 1);

        let saved = file_store.load().await.unwrap().unwrap();
        assert_eq!(Some(saved.metadata.version), runtime.model_version().await);
    }

    #[tokio::test]
    async fn test_trained_model_not_persisted_without_capability() {
        let store = Arc::new(KeyValueArtifactStore::default());
        let runtime = PredictorRuntime::new(
            fast_config(),
            Capabilities {
                can_persist: false,
                can_train: true,
            },
            vec![store.clone()],
        );

        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_load() {
        let runtime = PredictorRuntime::new(
            fast_config(),
            Capabilities::default(),
            vec![Arc::new(KeyValueArtifactStore::default())],
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = runtime.clone();
                tokio::spawn(async move { runtime.predict(&close_pha()).await })
            })
            .collect();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.model_used, ModelUsed::Ml);
        }

        let stats = runtime.stats();
        assert_eq!(stats.trainings, 1);
        assert_eq!(stats.load_attempts, 1);
        assert_eq!(stats.ml_predictions, 8);
    }

    #[tokio::test]
    async fn test_degraded_serves_oracle_and_retries_after_cooldown() {
        let store = Arc::new(KeyValueArtifactStore::default());
        let config = RuntimeConfig {
            retry_cooldown: Duration::from_millis(200),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, no_training(), vec![store.clone()]);

        let params = close_pha();
        let result = runtime.predict(&params).await.unwrap();
        let expected = ScoringOracle::new().score(&params);
        assert_eq!(result.model_used, ModelUsed::Fallback);
        assert_eq!(result.model_version, "fallback");
        assert_eq!(result.risk, expected.risk);
        assert_eq!(result.confidence, expected.confidence);
        assert_eq!(runtime.state().await, RuntimeState::Degraded);
        assert!(runtime.last_error().await.is_some());

        // Within the cooldown nothing is retried
        store.save(&artifact(3)).await.unwrap();
        runtime.predict(&params).await.unwrap();
        assert_eq!(runtime.stats().load_attempts, 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let result = runtime.predict(&params).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(runtime.state().await, RuntimeState::Ready);
        assert_eq!(runtime.stats().load_attempts, 2);
    }

    #[tokio::test]
    async fn test_corrupt_file_artifact_degrades_with_cooldown() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&artifact(9)).await.unwrap();

        let path = dir.path().join("model.json");
        let mut manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        manifest["layers"][0]["inputs"] = serde_json::json!(u64::MAX / 2);
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        let config = RuntimeConfig {
            retry_cooldown: Duration::from_secs(60),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, no_training(), vec![Arc::new(store)]);

        for _ in 0..3 {
            let result = runtime.predict(&close_pha()).await.unwrap();
            assert_eq!(result.model_used, ModelUsed::Fallback);
            assert_eq!(runtime.state().await, RuntimeState::Degraded);
        }
        assert_eq!(runtime.stats().load_attempts, 1);
        assert!(runtime.last_error().await.is_some());
    }

    #[tokio::test]
    async fn test_panicking_load_degrades_with_cooldown() {
        let store = FlakyStore {
            inner: KeyValueArtifactStore::default(),
            delay: Duration::ZERO,
            panics: true,
        };
        let config = RuntimeConfig {
            retry_cooldown: Duration::from_secs(60),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, Capabilities::default(), vec![Arc::new(store)]);

        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Fallback);
        assert_eq!(runtime.state().await, RuntimeState::Degraded);
        let reason = runtime.last_error().await.unwrap();
        assert!(reason.contains("load task failed"), "{}", reason);

        runtime.predict(&close_pha()).await.unwrap();
        let stats = runtime.stats();
        assert_eq!(stats.load_attempts, 1);
        assert_eq!(stats.trainings, 0);
    }

    #[tokio::test]
    async fn test_ttl_expiry_forces_reload() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(4)).await.unwrap();
        let config = RuntimeConfig {
            ttl: Duration::from_millis(100),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, no_training(), vec![Arc::new(store)]);

        runtime.predict(&close_pha()).await.unwrap();
        runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(runtime.stats().load_attempts, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(runtime.stats().load_attempts, 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_model() {
        let store = Arc::new(KeyValueArtifactStore::default());
        let stored = artifact(5);
        store.save(&stored).await.unwrap();
        let config = RuntimeConfig {
            ttl: Duration::from_millis(100),
            retry_cooldown: Duration::from_secs(60),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, no_training(), vec![store.clone()]);
        runtime.init().await;

        store.clear().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(result.model_version, stored.metadata.version);
        assert_eq!(runtime.state().await, RuntimeState::Ready);
        assert!(runtime.last_error().await.is_some());
        assert_eq!(runtime.stats().load_attempts, 2);

        // Next retry waits for the cooldown
        runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(runtime.stats().load_attempts, 2);
    }

    #[tokio::test]
    async fn test_invalid_input_is_an_error() {
        let runtime = PredictorRuntime::new(fast_config(), no_training(), Vec::new());
        let err = runtime
            .predict(&ObjectParams::new(-1.0, 20.0, 0.1, false))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());

        let stats = runtime.stats();
        assert_eq!(stats.invalid_inputs, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_predictions, 0);
        // Invalid input never triggers a load
        assert_eq!(stats.load_attempts, 0);
    }

    #[tokio::test]
    async fn test_batch_matches_single_predictions() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(6)).await.unwrap();
        let runtime = PredictorRuntime::new(fast_config(), no_training(), vec![Arc::new(store)]);

        let batch = vec![
            close_pha(),
            ObjectParams::new(f64::NAN, 10.0, 0.1, false),
            ObjectParams::new(15.0, 6.0, 0.8, false),
            ObjectParams::new(140.0, 18.0, 0.1, false),
        ];
        let results = runtime.predict_batch(&batch).await;
        assert_eq!(results.len(), 4);

        assert_eq!(results[1].risk, 0.0);
        assert_eq!(results[1].confidence, 0.5);
        assert_eq!(results[1].model_used, ModelUsed::Fallback);

        for idx in [0, 2, 3] {
            let single = runtime.predict(&batch[idx]).await.unwrap();
            assert_eq!(results[idx].model_used, ModelUsed::Ml);
            assert!((results[idx].risk - single.risk).abs() < 1e-5);
            assert!((results[idx].confidence - single.confidence).abs() < 1e-5);
        }

        let per_item = results[0].processing_time;
        assert!(results.iter().all(|r| r.processing_time == per_item));
        assert!(runtime.predict_batch(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_batch_without_model_uses_oracle() {
        let runtime = PredictorRuntime::new(fast_config(), no_training(), Vec::new());
        let batch = [close_pha(), ObjectParams::new(15.0, 6.0, 0.8, false)];
        let results = runtime.predict_batch(&batch).await;
        let oracle = ScoringOracle::new();
        for (result, params) in results.iter().zip(&batch) {
            assert_eq!(result.model_used, ModelUsed::Fallback);
            assert_eq!(result.risk, oracle.score(params).risk);
        }
    }

    #[tokio::test]
    async fn test_invalidate_reloads() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(7)).await.unwrap();
        let runtime = PredictorRuntime::new(fast_config(), no_training(), vec![Arc::new(store)]);

        runtime.init().await;
        runtime.invalidate().await;
        assert_eq!(runtime.state().await, RuntimeState::Unloaded);
        assert!(runtime.model_version().await.is_none());

        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(runtime.stats().load_attempts, 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_load_starts_fresh_load() {
        let inner = KeyValueArtifactStore::default();
        let stored = artifact(10);
        inner.save(&stored).await.unwrap();
        let store = FlakyStore {
            inner,
            delay: Duration::from_millis(200),
            panics: false,
        };
        let runtime = PredictorRuntime::new(fast_config(), no_training(), vec![Arc::new(store)]);

        let first = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.predict(&close_pha()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.state().await, RuntimeState::Loading);

        runtime.invalidate().await;
        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Ml);
        assert_eq!(result.model_version, stored.metadata.version);
        assert_eq!(runtime.state().await, RuntimeState::Ready);
        assert_eq!(runtime.stats().load_attempts, 2);

        // The discarded load answers its own caller with the oracle
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.model_used, ModelUsed::Fallback);
    }

    #[tokio::test]
    async fn test_slow_inference_falls_back() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(11)).await.unwrap();
        let config = RuntimeConfig {
            inference_timeout: Duration::from_millis(1),
            ..fast_config()
        };
        let runtime = PredictorRuntime::new(config, no_training(), vec![Arc::new(store)]);
        assert_eq!(runtime.init().await, RuntimeState::Ready);

        let batch: Vec<ObjectParams> = (0..50_000)
            .map(|i| ObjectParams::new(20.0 + (i % 900) as f64, 12.0, 0.05, i % 2 == 0))
            .collect();
        let results = runtime.predict_batch(&batch).await;
        assert_eq!(results.len(), batch.len());
        assert!(results.iter().all(|r| r.model_used == ModelUsed::Fallback));
        assert_eq!(results[0].risk, ScoringOracle::new().score(&batch[0]).risk);

        let stats = runtime.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.invalid_inputs, 0);
        // The model stays loaded
        assert_eq!(runtime.state().await, RuntimeState::Ready);
    }

    #[tokio::test]
    async fn test_shutdown_falls_back() {
        let store = KeyValueArtifactStore::default();
        store.save(&artifact(8)).await.unwrap();
        let runtime = PredictorRuntime::new(fast_config(), no_training(), vec![Arc::new(store)]);
        runtime.init().await;

        runtime.shutdown().await;
        let result = runtime.predict(&close_pha()).await.unwrap();
        assert_eq!(result.model_used, ModelUsed::Fallback);
        assert_eq!(runtime.state().await, RuntimeState::Unloaded);
        assert_eq!(runtime.stats().load_attempts, 1);
    }

    #[tokio::test]
    async fn test_stats_track_latency_window() {
        let runtime = PredictorRuntime::new(fast_config(), no_training(), Vec::new());
        for _ in 0..150 {
            runtime.predict(&close_pha()).await.unwrap();
        }
        let stats = runtime.stats();
        assert_eq!(stats.total_predictions, 150);
        assert_eq!(stats.fallback_predictions, 150);
        assert_eq!(stats.error_rate, 0.0);
        assert!(stats.average_latency_ms >= 0.0);
        assert_eq!(runtime.shared.tracker().latencies_ms.len(), LATENCY_WINDOW);
    }
}
