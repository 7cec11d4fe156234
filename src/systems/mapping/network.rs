use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const MIN_STD: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub hidden_layers: Vec<usize>,
    pub max_iterations: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DenseLayer {
    /// inputs x outputs
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

/// Per-column mean and spread, so the network works on unit-scale data
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Standardiser {
    pub mean: [f64; 2],
    pub std: [f64; 2],
}

impl Standardiser {
    fn from_columns(rows: &[(f64, f64)]) -> Self {
        let n = rows.len().max(1) as f64;
        let mean = [
            rows.iter().map(|r| r.0).sum::<f64>() / n,
            rows.iter().map(|r| r.1).sum::<f64>() / n,
        ];
        let var = [
            rows.iter().map(|r| (r.0 - mean[0]).powi(2)).sum::<f64>() / n,
            rows.iter().map(|r| (r.1 - mean[1]).powi(2)).sum::<f64>() / n,
        ];
        let std = var.map(|v| if v.sqrt() > MIN_STD { v.sqrt() } else { 1. });
        Standardiser { mean, std }
    }

    fn apply(&self, row: (f64, f64)) -> [f64; 2] {
        [
            (row.0 - self.mean[0]) / self.std[0],
            (row.1 - self.mean[1]) / self.std[1],
        ]
    }

    fn invert(&self, v: [f64; 2]) -> (f64, f64) {
        (
            v[0] * self.std[0] + self.mean[0],
            v[1] * self.std[1] + self.mean[1],
        )
    }
}

/// Small tanh MLP: 2 inputs, configurable hidden layers, 2 linear outputs
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFit {
    pub input_scale: Standardiser,
    pub output_scale: Standardiser,
    pub layers: Vec<DenseLayer>,
}

struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl NetworkFit {
    pub fn fit(
        inputs: &[(f64, f64)],
        outputs: &[(f64, f64)],
        settings: &NetworkSettings,
    ) -> Result<Self, TrainError> {
        let input_scale = Standardiser::from_columns(inputs);
        let output_scale = Standardiser::from_columns(outputs);

        let n = inputs.len();
        let x = Array2::from_shape_fn((n, 2), |(r, c)| input_scale.apply(inputs[r])[c]);
        let y = Array2::from_shape_fn((n, 2), |(r, c)| output_scale.apply(outputs[r])[c]);

        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut sizes = vec![2];
        sizes.extend(settings.hidden_layers.iter().copied());
        sizes.push(2);

        // Xavier/Glorot uniform
        let mut layers: Vec<DenseLayer> = sizes
            .windows(2)
            .map(|w| {
                let limit = (6. / (w[0] + w[1]) as f64).sqrt();
                DenseLayer {
                    weights: Array2::from_shape_fn((w[0], w[1]), |_| {
                        rng.gen_range(-limit..limit)
                    }),
                    bias: Array1::zeros(w[1]),
                }
            })
            .collect();

        let mut adam: Vec<AdamState> = layers
            .iter()
            .map(|l| AdamState {
                m_w: Array2::zeros(l.weights.raw_dim()),
                v_w: Array2::zeros(l.weights.raw_dim()),
                m_b: Array1::zeros(l.bias.raw_dim()),
                v_b: Array1::zeros(l.bias.raw_dim()),
            })
            .collect();

        let mut loss = f64::NAN;
        for step in 1..=settings.max_iterations {
            let activations = forward_all(&layers, &x);
            let Some(prediction) = activations.last() else {
                return Err(TrainError::NumericalFailure("network has no layers".into()));
            };
            let error = prediction - &y;
            loss = error.mapv(|e| e * e).mean().unwrap_or(f64::NAN) / 2.;
            if !loss.is_finite() {
                return Err(TrainError::NumericalFailure(format!(
                    "network loss diverged at iteration {}",
                    step
                )));
            }

            // Backpropagate, last layer first
            let mut delta = error / (n as f64 * 2.);
            for i in (0..layers.len()).rev() {
                let grad_w = activations[i].t().dot(&delta);
                let grad_b = delta.sum_axis(Axis(0));
                if i > 0 {
                    let upstream = delta.dot(&layers[i].weights.t());
                    delta = upstream * activations[i].mapv(|a| 1. - a * a);
                }
                adam_step(
                    &mut layers[i],
                    &mut adam[i],
                    &grad_w,
                    &grad_b,
                    settings.learning_rate,
                    step as i32,
                );
            }
        }
        debug!(
            "Network trained for {} iterations, final loss {:.6}",
            settings.max_iterations, loss
        );

        Ok(NetworkFit {
            input_scale,
            output_scale,
            layers,
        })
    }

    pub fn is_well_formed(&self) -> bool {
        let mut expected_inputs = 2;
        for layer in &self.layers {
            let (rows, cols) = layer.weights.dim();
            if rows != expected_inputs
                || cols != layer.bias.len()
                || !layer.weights.iter().chain(layer.bias.iter()).all(|v| v.is_finite())
            {
                return false;
            }
            expected_inputs = cols;
        }
        !self.layers.is_empty() && expected_inputs == 2
    }

    pub fn predict(&self, nx: f64, ny: f64) -> (f64, f64) {
        let x = Array2::from_shape_vec((1, 2), self.input_scale.apply((nx, ny)).to_vec())
            .unwrap_or_else(|_| Array2::zeros((1, 2)));
        let out = forward_all(&self.layers, &x);
        match out.last() {
            Some(y) if y.dim() == (1, 2) => self.output_scale.invert([y[[0, 0]], y[[0, 1]]]),
            _ => (f64::NAN, f64::NAN),
        }
    }
}

/// Activations of every layer, starting with the input itself
fn forward_all(layers: &[DenseLayer], x: &Array2<f64>) -> Vec<Array2<f64>> {
    let mut activations = vec![x.clone()];
    for (i, layer) in layers.iter().enumerate() {
        let z = activations[i].dot(&layer.weights) + &layer.bias;
        let a = if i + 1 < layers.len() {
            z.mapv(f64::tanh)
        } else {
            z
        };
        activations.push(a);
    }
    activations
}

fn adam_step(
    layer: &mut DenseLayer,
    state: &mut AdamState,
    grad_w: &Array2<f64>,
    grad_b: &Array1<f64>,
    learning_rate: f64,
    step: i32,
) {
    let correction1 = 1. - BETA1.powi(step);
    let correction2 = 1. - BETA2.powi(step);

    state.m_w = &state.m_w * BETA1 + grad_w * (1. - BETA1);
    state.v_w = &state.v_w * BETA2 + &grad_w.mapv(|g| g * g) * (1. - BETA2);
    state.m_b = &state.m_b * BETA1 + grad_b * (1. - BETA1);
    state.v_b = &state.v_b * BETA2 + &grad_b.mapv(|g| g * g) * (1. - BETA2);

    // w -= lr * m_hat / (sqrt(v_hat) + eps)
    let update_w = (&state.m_w / correction1)
        / ((&state.v_w / correction2).mapv(f64::sqrt) + ADAM_EPSILON);
    let update_b = (&state.m_b / correction1)
        / ((&state.v_b / correction2).mapv(f64::sqrt) + ADAM_EPSILON);
    layer.weights.scaled_add(-learning_rate, &update_w);
    layer.bias.scaled_add(-learning_rate, &update_b);
}
