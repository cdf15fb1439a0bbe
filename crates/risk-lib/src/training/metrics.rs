//! Evaluation metrics and quality grading

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pearson correlation; 0.0 for fewer than two points or constant inputs
pub fn pearson_correlation(x: &[f32], y: &[f32]) -> f32 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().map(|&v| v as f64).sum::<f64>() / nf;
    let mean_y = y[..n].iter().map(|&v| v as f64).sum::<f64>() / nf;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (&a, &b) in x[..n].iter().zip(&y[..n]) {
        let dx = a as f64 - mean_x;
        let dy = b as f64 - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    (cov / denom) as f32
}

/// Human-facing quality gate derived from correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Excellent,
    Good,
    NeedsImprovement,
}

impl QualityGrade {
    /// Risk: > 0.9 excellent, > 0.8 good
    pub fn for_risk(correlation: f32) -> Self {
        Self::grade(correlation, 0.9, 0.8)
    }

    /// Confidence: > 0.8 excellent, > 0.7 good
    pub fn for_confidence(correlation: f32) -> Self {
        Self::grade(correlation, 0.8, 0.7)
    }

    fn grade(correlation: f32, excellent: f32, good: f32) -> Self {
        if correlation > excellent {
            QualityGrade::Excellent
        } else if correlation > good {
            QualityGrade::Good
        } else {
            QualityGrade::NeedsImprovement
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGrade::Excellent => "excellent",
            QualityGrade::Good => "good",
            QualityGrade::NeedsImprovement => "needs improvement",
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-output Pearson correlations
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    pub risk: f32,
    pub confidence: f32,
}

/// Held-out evaluation of a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub loss: f32,
    pub mae: f32,
    pub correlations: Correlations,
    /// Predicted (risk, confidence) per sample, in input order
    pub predictions: Vec<[f32; 2]>,
    pub risk_grade: QualityGrade,
    pub confidence_grade: QualityGrade,
}

impl EvaluationReport {
    pub fn from_predictions(predictions: Vec<[f32; 2]>, labels: &[[f32; 2]]) -> Self {
        let (loss, mae) = mse_mae(&predictions, labels);
        let column = |rows: &[[f32; 2]], idx: usize| rows.iter().map(|r| r[idx]).collect::<Vec<_>>();
        let correlations = Correlations {
            risk: pearson_correlation(&column(&predictions, 0), &column(labels, 0)),
            confidence: pearson_correlation(&column(&predictions, 1), &column(labels, 1)),
        };
        Self {
            samples: labels.len(),
            loss,
            mae,
            correlations,
            predictions,
            risk_grade: QualityGrade::for_risk(correlations.risk),
            confidence_grade: QualityGrade::for_confidence(correlations.confidence),
        }
    }
}

/// Mean squared and mean absolute error over both outputs
pub fn mse_mae(predictions: &[[f32; 2]], labels: &[[f32; 2]]) -> (f32, f32) {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return (0.0, 0.0);
    }
    let (mut se, mut ae) = (0.0f64, 0.0f64);
    for (p, l) in predictions.iter().zip(labels) {
        for k in 0..2 {
            let d = (p[k] - l[k]) as f64;
            se += d * d;
            ae += d.abs();
        }
    }
    let count = (n * 2) as f64;
    ((se / count) as f32, (ae / count) as f32)
}
