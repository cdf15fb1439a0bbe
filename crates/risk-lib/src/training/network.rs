//! Feed-forward scoring network
//!
//! Fixed architecture: 6 → dense(16, relu) → dropout(0.2) → dense(8, relu)
//! → dropout(0.1) → dense(2, sigmoid). Weights are stored `[out, in]`.

use crate::error::{Result, RiskError};
use crate::models::{NUM_FEATURES, NUM_OUTPUTS};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hidden layer widths
pub const HIDDEN_LAYERS: [usize; 2] = [16, 8];

/// Dropout rate after each hidden layer
pub const DROPOUT_RATES: [f32; 2] = [0.2, 0.1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(sigmoid),
        }
    }

    /// Derivative expressed through the activation output
    fn derivative(&self, activated: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => activated.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => activated.mapv(|v| v * (1.0 - v)),
        }
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// One fully connected layer
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    /// He-normal initialization for relu layers
    fn he<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let std = (2.0 / inputs as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((outputs, inputs), |_| standard_normal(rng) * std),
            bias: Array1::zeros(outputs),
            activation: Activation::Relu,
        }
    }

    /// Glorot-uniform initialization for the sigmoid head
    fn glorot<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((outputs, inputs), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(outputs),
            activation: Activation::Sigmoid,
        }
    }

    fn forward(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        let z = input.dot(&self.weights.t()) + &self.bias;
        self.activation.apply(&z)
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// Box-Muller transform
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Serializable weights of one layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerWeights {
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    /// Row-major `[outputs, inputs]`
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Serializable weights of the whole network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub layers: Vec<LayerWeights>,
}

impl NetworkWeights {
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    /// Flatten all parameters, layer by layer, weights before bias
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.parameter_count());
        for layer in &self.layers {
            out.extend_from_slice(&layer.weights);
            out.extend_from_slice(&layer.bias);
        }
        out
    }
}

/// Intermediate activations kept for backpropagation
pub(crate) struct ForwardCache {
    /// Input of each layer (after dropout for hidden layers)
    pub inputs: Vec<Array2<f32>>,
    /// Activated output of each layer, before dropout
    pub activations: Vec<Array2<f32>>,
    /// Inverted-dropout masks applied to hidden outputs
    pub masks: Vec<Array2<f32>>,
}

/// Per-layer parameter gradients
pub(crate) struct LayerGradients {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

/// The risk/confidence scoring network
#[derive(Debug, Clone)]
pub struct ScoringNetwork {
    layers: Vec<DenseLayer>,
}

impl ScoringNetwork {
    /// Fresh network with random initialization
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            layers: vec![
                DenseLayer::he(NUM_FEATURES, HIDDEN_LAYERS[0], rng),
                DenseLayer::he(HIDDEN_LAYERS[0], HIDDEN_LAYERS[1], rng),
                DenseLayer::glorot(HIDDEN_LAYERS[1], NUM_OUTPUTS, rng),
            ],
        }
    }

    /// Total trainable parameters (266 for the fixed architecture)
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    /// Inference forward pass over a `[batch, 6]` matrix
    pub fn forward(&self, input: &ArrayView2<f32>) -> Result<Array2<f32>> {
        if input.ncols() != NUM_FEATURES {
            return Err(RiskError::inference(format!(
                "expected {} input features, got {}",
                NUM_FEATURES,
                input.ncols()
            )));
        }
        let mut current = input.to_owned();
        for layer in &self.layers {
            current = layer.forward(&current.view());
        }
        if current.iter().any(|v| !v.is_finite()) {
            return Err(RiskError::inference("network produced non-finite output"));
        }
        Ok(current)
    }

    /// Score one feature vector
    pub fn predict_one(&self, features: &[f32]) -> Result<[f32; NUM_OUTPUTS]> {
        let input = ArrayView2::from_shape((1, features.len()), features)
            .map_err(|e| RiskError::inference(e.to_string()))?;
        let output = self.forward(&input)?;
        Ok([output[[0, 0]], output[[0, 1]]])
    }

    /// Training forward pass with inverted dropout on hidden layers
    pub(crate) fn forward_train<R: Rng + ?Sized>(
        &self,
        input: &ArrayView2<f32>,
        rng: &mut R,
    ) -> (Array2<f32>, ForwardCache) {
        let mut cache = ForwardCache {
            inputs: Vec::with_capacity(self.layers.len()),
            activations: Vec::with_capacity(self.layers.len()),
            masks: Vec::with_capacity(DROPOUT_RATES.len()),
        };
        let mut current = input.to_owned();

        for (idx, layer) in self.layers.iter().enumerate() {
            let activated = layer.forward(&current.view());
            cache.inputs.push(current);
            current = match DROPOUT_RATES.get(idx) {
                Some(&rate) => {
                    let keep = 1.0 - rate;
                    let mask = activated.mapv(|_| {
                        if rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    });
                    let dropped = &activated * &mask;
                    cache.masks.push(mask);
                    dropped
                }
                None => activated.clone(),
            };
            cache.activations.push(activated);
        }

        (current, cache)
    }

    /// Backpropagate the gradient of the loss w.r.t. the network output
    pub(crate) fn backward(
        &self,
        cache: &ForwardCache,
        grad_output: Array2<f32>,
    ) -> Vec<LayerGradients> {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut grad = grad_output;

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];
            if let Some(mask) = cache.masks.get(idx) {
                grad = &grad * mask;
            }
            let dz = &grad * &layer.activation.derivative(&cache.activations[idx]);
            let weights = dz.t().dot(&cache.inputs[idx]);
            let bias = dz.sum_axis(Axis(0));
            grad = dz.dot(&layer.weights);
            grads.push(LayerGradients { weights, bias });
        }

        grads.reverse();
        grads
    }

    pub fn weights(&self) -> NetworkWeights {
        NetworkWeights {
            layers: self
                .layers
                .iter()
                .map(|layer| LayerWeights {
                    inputs: layer.weights.ncols(),
                    outputs: layer.weights.nrows(),
                    activation: layer.activation,
                    weights: layer.weights.iter().copied().collect(),
                    bias: layer.bias.to_vec(),
                })
                .collect(),
        }
    }

    /// Rebuild a network, rejecting weights that do not match the architecture
    pub fn from_weights(weights: &NetworkWeights) -> Result<Self> {
        let expected = architecture_shapes();
        if weights.layers.len() != expected.len() {
            return Err(RiskError::model_load(format!(
                "expected {} layers, got {}",
                expected.len(),
                weights.layers.len()
            )));
        }

        let mut layers = Vec::with_capacity(expected.len());
        for (idx, (layer, (inputs, outputs, activation))) in
            weights.layers.iter().zip(expected).enumerate()
        {
            if layer.inputs != inputs || layer.outputs != outputs || layer.activation != activation {
                return Err(RiskError::model_load(format!(
                    "layer {} is {}x{} {:?}, expected {}x{} {:?}",
                    idx, layer.inputs, layer.outputs, layer.activation, inputs, outputs, activation
                )));
            }
            if layer.bias.len() != outputs {
                return Err(RiskError::model_load(format!("layer {} bias size mismatch", idx)));
            }
            if layer.weights.iter().chain(&layer.bias).any(|v| !v.is_finite()) {
                return Err(RiskError::model_load(format!(
                    "layer {} has non-finite parameters",
                    idx
                )));
            }
            let matrix = Array2::from_shape_vec((outputs, inputs), layer.weights.clone())
                .map_err(|e| RiskError::model_load(format!("layer {}: {}", idx, e)))?;
            layers.push(DenseLayer {
                weights: matrix,
                bias: Array1::from_vec(layer.bias.clone()),
                activation,
            });
        }

        Ok(Self { layers })
    }
}

/// (inputs, outputs, activation) of each layer
pub fn architecture_shapes() -> [(usize, usize, Activation); 3] {
    [
        (NUM_FEATURES, HIDDEN_LAYERS[0], Activation::Relu),
        (HIDDEN_LAYERS[0], HIDDEN_LAYERS[1], Activation::Relu),
        (HIDDEN_LAYERS[1], NUM_OUTPUTS, Activation::Sigmoid),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network() -> ScoringNetwork {
        ScoringNetwork::new(&mut StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_parameter_count() {
        assert_eq!(network().parameter_count(), 266);
        assert_eq!(network().weights().parameter_count(), 266);
    }

    #[test]
    fn test_outputs_in_unit_range() {
        let net = network();
        let out = net.predict_one(&[0.5, 0.8, 1.0, 1.0, 0.25, 1.0]).unwrap();
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_wrong_width_rejected() {
        let err = network().predict_one(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(err, RiskError::Inference(_)));
    }

    #[test]
    fn test_batch_matches_single() {
        let net = network();
        let rows = [[0.1, 0.2, 0.3, 0.0, 0.1, 0.0], [0.9, 0.8, 1.0, 1.0, 0.7, 1.0]];
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let batch = Array2::from_shape_vec((2, 6), flat).unwrap();
        let out = net.forward(&batch.view()).unwrap();
        for (i, row) in rows.iter().enumerate() {
            let single = net.predict_one(row).unwrap();
            assert!((out[[i, 0]] - single[0]).abs() < 1e-6);
            assert!((out[[i, 1]] - single[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_weights_round_trip() {
        let net = network();
        let restored = ScoringNetwork::from_weights(&net.weights()).unwrap();
        let x: [f32; 6] = [0.3, 0.4, 0.5, 0.0, 0.2, 1.0];
        assert_eq!(net.predict_one(&x).unwrap(), restored.predict_one(&x).unwrap());
    }

    #[test]
    fn test_from_weights_rejects_wrong_shape() {
        let mut weights = network().weights();
        weights.layers[1].outputs = 9;
        assert!(matches!(
            ScoringNetwork::from_weights(&weights),
            Err(RiskError::ModelLoad(_))
        ));

        let mut weights = network().weights();
        weights.layers[0].weights.pop();
        assert!(ScoringNetwork::from_weights(&weights).is_err());
    }

    #[test]
    fn test_backward_shapes() {
        let net = network();
        let mut rng = StdRng::seed_from_u64(1);
        let input = Array2::from_elem((4, 6), 0.5f32);
        let (out, cache) = net.forward_train(&input.view(), &mut rng);
        assert_eq!(out.dim(), (4, 2));
        let grads = net.backward(&cache, Array2::ones((4, 2)));
        for (layer, grad) in net.layers().iter().zip(&grads) {
            assert_eq!(grad.weights.dim(), layer.weights.dim());
            assert_eq!(grad.bias.dim(), layer.bias.dim());
        }
    }
}
