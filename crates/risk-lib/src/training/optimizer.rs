//! Adam optimizer (Adaptive Moment Estimation)

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use std::collections::HashMap;

/// Adam with per-parameter first and second moments keyed by name
pub struct AdamOptimizer {
    pub learning_rate: f32,
    /// Exponential decay rate for the first moment
    pub beta1: f32,
    /// Exponential decay rate for the second moment
    pub beta2: f32,
    pub epsilon: f32,
    first_moments: HashMap<String, ArrayD<f32>>,
    second_moments: HashMap<String, ArrayD<f32>>,
    t: i32,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            first_moments: HashMap::new(),
            second_moments: HashMap::new(),
            t: 0,
        }
    }

    /// Advance the time step; call once per mini-batch before `update`
    pub fn next_step(&mut self) {
        self.t += 1;
    }

    /// Apply one Adam update to a parameter in place
    pub fn update(&mut self, name: &str, param: ArrayViewMutD<f32>, gradient: ArrayViewD<f32>) {
        let t = self.t.max(1);
        let (beta1, beta2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);
        let step = self.learning_rate;
        let epsilon = self.epsilon;

        let m = self
            .first_moments
            .entry(name.to_string())
            .or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));
        let v = self
            .second_moments
            .entry(name.to_string())
            .or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));

        Zip::from(param)
            .and(&gradient)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= step * m_hat / (v_hat.sqrt() + epsilon);
            });
    }
}
