use ndarray::{Array, Array1, Array2, Dimension};
use serde::{Deserialize, Serialize};

use super::network::{LayerGradient, QNetwork};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Moments {
    m_weights: Array2<f64>,
    v_weights: Array2<f64>,
    m_bias: Array1<f64>,
    v_bias: Array1<f64>,
}

/// Adam with bias correction, one pair of moment estimates per layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f64,
    moments: Vec<Moments>,
    steps: u64,
    // bias-correction powers
    beta1_pow: f64,
    beta2_pow: f64,
}

fn update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    learning_rate: f64,
    beta1_pow: f64,
    beta2_pow: f64,
) {
    *m = BETA1 * &*m + (1.0 - BETA1) * grad;
    *v = BETA2 * &*v + (1.0 - BETA2) * grad.mapv(|x| x * x);
    let m_hat = &*m / (1.0 - beta1_pow);
    let v_hat = &*v / (1.0 - beta2_pow);
    *param -= &(learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + EPSILON));
}

impl Adam {
    pub fn new(network: &QNetwork, learning_rate: f64) -> Self {
        let moments = network
            .layers()
            .iter()
            .map(|layer| Moments {
                m_weights: Array2::zeros(layer.weights.raw_dim()),
                v_weights: Array2::zeros(layer.weights.raw_dim()),
                m_bias: Array1::zeros(layer.bias.raw_dim()),
                v_bias: Array1::zeros(layer.bias.raw_dim()),
            })
            .collect();

        Self {
            learning_rate,
            moments,
            steps: 0,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn step(&mut self, network: &mut QNetwork, gradients: &[LayerGradient]) {
        self.steps += 1;
        self.beta1_pow *= BETA1;
        self.beta2_pow *= BETA2;

        for ((layer, gradient), moments) in network
            .layers_mut()
            .iter_mut()
            .zip(gradients)
            .zip(self.moments.iter_mut())
        {
            update(
                &mut layer.weights,
                &gradient.weights,
                &mut moments.m_weights,
                &mut moments.v_weights,
                self.learning_rate,
                self.beta1_pow,
                self.beta2_pow,
            );
            update(
                &mut layer.bias,
                &gradient.bias,
                &mut moments.m_bias,
                &mut moments.v_bias,
                self.learning_rate,
                self.beta1_pow,
                self.beta2_pow,
            );
        }
    }
}
