//! Synthetic training data
//!
//! There is no labeled impact history to learn from, so training data is
//! drawn from parametric physical distributions and labeled by the
//! [`ScoringOracle`]. Balanced generation stratifies by risk band so the
//! rare high-risk objects are represented.

mod oracle;

pub use oracle::{OracleScore, RiskFactors, ScoringOracle};

use crate::predictor::FeatureExtractor;
use crate::models::{ObjectParams, RiskBand, TrainingSample};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Target band mix for balanced generation (low, medium, high)
pub const BALANCED_MIX: [(RiskBand, f64); 3] = [
    (RiskBand::Low, 0.60),
    (RiskBand::Medium, 0.25),
    (RiskBand::High, 0.15),
];

const MIN_MISS_DISTANCE_AU: f64 = 0.001;
const MAX_MISS_DISTANCE_AU: f64 = 2.0;
const MEAN_MISS_DISTANCE_AU: f64 = 0.2;
/// Draws per balanced sample before taking one outside its band
const MAX_BAND_ATTEMPTS: usize = 1000;

/// How samples are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Straight from the population distributions
    Unbiased,
    /// Stratified 60/25/15 over low/medium/high bands
    #[default]
    Balanced,
}

/// Sampling ranges for one risk band
#[derive(Debug, Clone, Copy)]
pub struct BandRanges {
    pub size_m: (f64, f64),
    pub velocity_km_s: (f64, f64),
    pub miss_distance_au: (f64, f64),
    pub pha_probability: f64,
}

impl BandRanges {
    pub fn for_band(band: RiskBand) -> Self {
        match band {
            RiskBand::Low => Self {
                size_m: (10.0, 150.0),
                velocity_km_s: (5.0, 20.0),
                miss_distance_au: (0.2, 1.0),
                pha_probability: 0.05,
            },
            RiskBand::Medium => Self {
                size_m: (50.0, 500.0),
                velocity_km_s: (10.0, 25.0),
                miss_distance_au: (0.02, 0.05),
                pha_probability: 0.5,
            },
            RiskBand::High => Self {
                size_m: (200.0, 2000.0),
                velocity_km_s: (15.0, 35.0),
                miss_distance_au: (0.001, 0.051),
                pha_probability: 0.6,
            },
        }
    }
}

/// Configuration for dataset generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Whether oracle labels carry noise
    pub label_noise: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            label_noise: true,
        }
    }
}

/// Produces labeled samples from physical distributions
pub struct SyntheticDataGenerator {
    rng: StdRng,
    config: GeneratorConfig,
    oracle: ScoringOracle,
    extractor: FeatureExtractor,
}

impl SyntheticDataGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            oracle: ScoringOracle::new(),
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(GeneratorConfig {
            seed,
            ..Default::default()
        })
    }

    /// Draw one object from the population distributions
    pub fn sample_unbiased(&mut self) -> ObjectParams {
        let size_m = log_uniform(&mut self.rng, 10.0, 10_000.0);
        let velocity_km_s =
            (self.rng.gen_range(15.0f64..25.0) + self.rng.gen_range(-5.0..5.0)).clamp(5.0, 40.0);
        // Exponential favors small distances
        let u: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let miss_distance_au =
            (-u.ln() * MEAN_MISS_DISTANCE_AU).clamp(MIN_MISS_DISTANCE_AU, MAX_MISS_DISTANCE_AU);
        let is_pha = self.rng.gen_bool(0.2);

        ObjectParams::new(size_m, velocity_km_s, miss_distance_au, is_pha)
    }

    /// Draw one object from the ranges of a risk band
    pub fn sample_for_risk_band(&mut self, band: RiskBand) -> ObjectParams {
        let ranges = BandRanges::for_band(band);
        let size_m = log_uniform(&mut self.rng, ranges.size_m.0, ranges.size_m.1);
        let velocity_km_s = self
            .rng
            .gen_range(ranges.velocity_km_s.0..ranges.velocity_km_s.1);
        let miss_distance_au = self
            .rng
            .gen_range(ranges.miss_distance_au.0..ranges.miss_distance_au.1)
            .max(MIN_MISS_DISTANCE_AU);
        let is_pha = self.rng.gen_bool(ranges.pha_probability);

        ObjectParams::new(size_m, velocity_km_s, miss_distance_au, is_pha)
    }

    /// Label an object with the oracle
    pub fn label(&mut self, params: &ObjectParams, band: Option<RiskBand>) -> Option<TrainingSample> {
        let features = self.extractor.extract(params).ok()?;
        let score = if self.config.label_noise {
            self.oracle.score_noisy(params, &mut self.rng)
        } else {
            self.oracle.score(params)
        };
        Some(TrainingSample {
            features,
            risk: score.risk,
            confidence: score.confidence,
            band,
        })
    }

    /// Draw from a band's ranges until the oracle label lands in that band
    fn sample_in_band(&mut self, band: RiskBand) -> Option<TrainingSample> {
        let mut last = None;
        for _ in 0..MAX_BAND_ATTEMPTS {
            let params = self.sample_for_risk_band(band);
            let Some(sample) = self.label(&params, Some(band)) else {
                continue;
            };
            if RiskBand::classify(sample.risk) == band {
                return Some(sample);
            }
            last = Some(sample);
        }
        warn!(band = %band, attempts = MAX_BAND_ATTEMPTS, "No sample labeled inside band");
        last
    }

    /// Build `n` labeled samples and shuffle them
    pub fn generate_dataset(&mut self, n: usize, mode: GenerationMode) -> Vec<TrainingSample> {
        let mut samples = Vec::with_capacity(n);

        match mode {
            GenerationMode::Unbiased => {
                while samples.len() < n {
                    let params = self.sample_unbiased();
                    if let Some(sample) = self.label(&params, None) {
                        samples.push(sample);
                    }
                }
            }
            GenerationMode::Balanced => {
                for (band, count) in balanced_counts(n) {
                    let target = samples.len() + count;
                    while samples.len() < target {
                        if let Some(sample) = self.sample_in_band(band) {
                            samples.push(sample);
                        }
                    }
                }
            }
        }

        samples.shuffle(&mut self.rng);

        debug!(samples = samples.len(), mode = ?mode, "Generated synthetic dataset");
        samples
    }
}

/// Per-band sample counts for balanced generation, summing to `n`
pub fn balanced_counts(n: usize) -> [(RiskBand, usize); 3] {
    let low = ((n as f64 * BALANCED_MIX[0].1).round() as usize).min(n);
    let medium = ((n as f64 * BALANCED_MIX[1].1).round() as usize).min(n - low);
    let high = n - low - medium;
    [
        (RiskBand::Low, low),
        (RiskBand::Medium, medium),
        (RiskBand::High, high),
    ]
}

/// Split into (train, validation), taking validation from the tail
pub fn split(
    mut samples: Vec<TrainingSample>,
    validation_split: f32,
) -> (Vec<TrainingSample>, Vec<TrainingSample>) {
    let fraction = validation_split.clamp(0.0, 1.0);
    let validation_len = (samples.len() as f32 * fraction).floor() as usize;
    let validation = samples.split_off(samples.len() - validation_len);
    (samples, validation)
}

/// Counts and label means of a dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total: usize,
    /// Samples per band they were drawn from
    pub drawn_from: HashMap<RiskBand, usize>,
    /// Samples per band of their oracle risk label
    pub labeled_as: HashMap<RiskBand, usize>,
    pub mean_risk: f32,
    pub mean_confidence: f32,
    pub pha_fraction: f32,
}

impl DatasetSummary {
    pub fn from_samples(samples: &[TrainingSample]) -> Self {
        let mut drawn_from = HashMap::new();
        let mut labeled_as = HashMap::new();
        let mut risk_sum = 0.0;
        let mut confidence_sum = 0.0;
        let mut pha = 0usize;

        for sample in samples {
            if let Some(band) = sample.band {
                *drawn_from.entry(band).or_insert(0) += 1;
            }
            *labeled_as.entry(RiskBand::classify(sample.risk)).or_insert(0) += 1;
            risk_sum += sample.risk;
            confidence_sum += sample.confidence;
            if sample.features.source.is_pha {
                pha += 1;
            }
        }

        let n = samples.len().max(1) as f32;
        Self {
            total: samples.len(),
            drawn_from,
            labeled_as,
            mean_risk: risk_sum / n,
            mean_confidence: confidence_sum / n,
            pha_fraction: pha as f32 / n,
        }
    }

    pub fn drawn_fraction(&self, band: RiskBand) -> f32 {
        *self.drawn_from.get(&band).unwrap_or(&0) as f32 / self.total.max(1) as f32
    }
}

fn log_uniform<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    let exponent = rng.gen_range(min.log10()..max.log10());
    10f64.powf(exponent)
}
