//! Deterministic rule-based scoring oracle
//!
//! Labels synthetic training data and answers requests whenever the
//! trained network is unavailable. The weights and thresholds below define
//! the scoring contract and must not be tuned independently of the model.

use crate::models::ObjectParams;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const SIZE_WEIGHT: f64 = 0.20;
pub const DISTANCE_WEIGHT: f64 = 0.35;
pub const VELOCITY_WEIGHT: f64 = 0.15;
/// Fixed bonus for PHA-flagged objects
pub const PHA_BONUS: f64 = 0.15;
pub const KINETIC_WEIGHT: f64 = 0.10;
pub const PROXIMITY_WEIGHT: f64 = 0.05;

/// Miss distance (AU) where the distance ramp starts
pub const DISTANCE_RAMP_START_AU: f64 = 0.05;
/// Miss distance (AU) where the distance ramp saturates
pub const DISTANCE_RAMP_FULL_AU: f64 = 0.02;
/// Miss distance (AU) under which the proximity bonus applies
pub const PROXIMITY_AU: f64 = 0.01;

pub const BASE_CONFIDENCE: f64 = 0.7;
pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 0.99;

/// Half-width of the risk label noise
pub const RISK_NOISE: f64 = 0.05;
/// Half-width of the confidence label noise
pub const CONFIDENCE_NOISE: f64 = 0.025;

/// Risk and confidence produced by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OracleScore {
    pub risk: f32,
    pub confidence: f32,
}

/// Normalized intermediate factors of a risk score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    pub size: f64,
    pub distance: f64,
    pub velocity: f64,
    pub pha: f64,
    pub kinetic: f64,
    pub proximity: f64,
}

impl RiskFactors {
    pub fn weighted_sum(&self) -> f64 {
        SIZE_WEIGHT * self.size
            + DISTANCE_WEIGHT * self.distance
            + VELOCITY_WEIGHT * self.velocity
            + PHA_BONUS * self.pha
            + KINETIC_WEIGHT * self.kinetic
            + PROXIMITY_WEIGHT * self.proximity
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringOracle;

impl ScoringOracle {
    pub fn new() -> Self {
        Self
    }

    pub fn factors(&self, params: &ObjectParams) -> RiskFactors {
        let d = params.miss_distance_au;
        // 10 m -> 0, 10 km -> 1
        let size = ((params.size_m / 10.0).log10() / 3.0).clamp(0.0, 1.0);
        let distance = ((DISTANCE_RAMP_START_AU - d)
            / (DISTANCE_RAMP_START_AU - DISTANCE_RAMP_FULL_AU))
            .clamp(0.0, 1.0);
        let velocity = (params.velocity_km_s / 30.0).clamp(0.0, 1.0);

        RiskFactors {
            size,
            distance,
            velocity,
            pha: if params.is_pha { 1.0 } else { 0.0 },
            kinetic: size * velocity,
            proximity: if d < PROXIMITY_AU { 1.0 } else { 0.0 },
        }
    }

    /// Noise-free score
    pub fn score(&self, params: &ObjectParams) -> OracleScore {
        let (risk, confidence) = self.raw(params);
        OracleScore {
            risk: risk.clamp(0.0, 1.0) as f32,
            confidence: confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as f32,
        }
    }

    /// Score with bounded bell-shaped label noise drawn from `rng`
    pub fn score_noisy<R: Rng + ?Sized>(&self, params: &ObjectParams, rng: &mut R) -> OracleScore {
        let (risk, confidence) = self.raw(params);
        let risk = risk + bell_noise(rng) * RISK_NOISE;
        let confidence = confidence + bell_noise(rng) * CONFIDENCE_NOISE;
        OracleScore {
            risk: risk.clamp(0.0, 1.0) as f32,
            confidence: confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as f32,
        }
    }

    /// Noisy score; a fixed seed reproduces the same output
    pub fn score_seeded(&self, params: &ObjectParams, seed: Option<u64>) -> OracleScore {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.score_noisy(params, &mut rng)
    }

    fn raw(&self, params: &ObjectParams) -> (f64, f64) {
        let risk = self.factors(params).weighted_sum();

        let d = params.miss_distance_au;
        let mut confidence = BASE_CONFIDENCE;
        if d < 0.1 {
            confidence += 0.25;
        } else if d < 0.5 {
            confidence += 0.15;
        }
        if params.size_m > 100.0 {
            confidence += 0.1;
        }
        if params.is_pha {
            confidence += 0.05;
        }

        (risk, confidence)
    }
}

/// Mean of three centered uniforms, scaled to [-1, 1]
fn bell_noise<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let sum: f64 = (0..3).map(|_| rng.gen_range(-1.0..=1.0)).sum();
    sum / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_pha_scores_high() {
        let oracle = ScoringOracle::new();
        let params = ObjectParams::new(500.0, 25.0, 0.02, true);

        let factors = oracle.factors(&params);
        assert_eq!(factors.distance, 1.0);
        assert_eq!(factors.pha, 1.0);
        assert!((factors.velocity - 0.8333).abs() < 0.001);

        let score = oracle.score(&params);
        assert!(score.risk > 0.5, "risk was {}", score.risk);
        assert!(score.confidence >= 0.95);
    }

    #[test]
    fn test_far_small_object_scores_low() {
        let oracle = ScoringOracle::new();
        let params = ObjectParams::new(15.0, 6.0, 0.8, false);

        let factors = oracle.factors(&params);
        assert_eq!(factors.distance, 0.0);
        assert_eq!(factors.pha, 0.0);

        assert!(oracle.score(&params).risk < 0.1);
        for seed in 0..50 {
            assert!(oracle.score_seeded(&params, Some(seed)).risk < 0.1);
        }
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let oracle = ScoringOracle::new();
        let params = ObjectParams::new(320.0, 18.0, 0.04, false);
        let a = oracle.score_seeded(&params, Some(7));
        let b = oracle.score_seeded(&params, Some(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_noise_is_bounded() {
        let oracle = ScoringOracle::new();
        let params = ObjectParams::new(320.0, 18.0, 0.3, false);
        let clean = oracle.score(&params);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let noisy = oracle.score_noisy(&params, &mut rng);
            assert!((noisy.risk - clean.risk).abs() <= RISK_NOISE as f32 + 1e-6);
            assert!((noisy.confidence - clean.confidence).abs() <= CONFIDENCE_NOISE as f32 + 1e-6);
        }
    }

    #[test]
    fn test_scores_stay_in_range() {
        let oracle = ScoringOracle::new();
        let extremes = [
            ObjectParams::new(1e-3, 1e-3, 1e-6, true),
            ObjectParams::new(1e7, 200.0, 1e-6, true),
            ObjectParams::new(10.0, 5.0, 100.0, false),
        ];
        let mut rng = StdRng::seed_from_u64(11);
        for params in extremes {
            for score in [oracle.score(&params), oracle.score_noisy(&params, &mut rng)] {
                assert!((0.0..=1.0).contains(&score.risk));
                assert!((0.5..=0.99).contains(&score.confidence));
            }
        }
    }

    #[test]
    fn test_confidence_steps() {
        let oracle = ScoringOracle::new();
        let near = oracle.score(&ObjectParams::new(50.0, 10.0, 0.05, false));
        let mid = oracle.score(&ObjectParams::new(50.0, 10.0, 0.3, false));
        let far = oracle.score(&ObjectParams::new(50.0, 10.0, 0.9, false));
        assert!((near.confidence - 0.95).abs() < 1e-6);
        assert!((mid.confidence - 0.85).abs() < 1e-6);
        assert!((far.confidence - 0.7).abs() < 1e-6);
    }
}
