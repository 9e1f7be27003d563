use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// (in, out)
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Linear {
    /// Xavier uniform weights, zero bias
    fn new(input: usize, output: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (input + output) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((input, output), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(output),
        }
    }

    fn forward(&self, input: &ArrayView2<f64>) -> Array2<f64> {
        input.dot(&self.weights) + &self.bias
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradient {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

/// What a training forward pass keeps for the backward pass
pub struct ForwardCache {
    /// Input of every layer, the first being the batch itself
    inputs: Vec<Array2<f64>>,
    /// ReLU derivative times the dropout mask of every hidden layer
    masks: Vec<Array2<f64>>,
}

/// Fully connected Q-network: ReLU and inverted dropout after every hidden
/// layer, linear output with one value per action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetwork {
    layers: Vec<Linear>,
    dropout: f64,
}

impl QNetwork {
    pub fn new(
        input: usize,
        hidden: &[usize],
        output: usize,
        dropout: f64,
        rng: &mut impl Rng,
    ) -> Self {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input);
        sizes.extend_from_slice(hidden);
        sizes.push(output);

        let layers = sizes
            .windows(2)
            .map(|pair| Linear::new(pair[0], pair[1], rng))
            .collect();
        Self { layers, dropout }
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.weights.nrows())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.weights.ncols())
    }

    pub fn hidden_dims(&self) -> Vec<usize> {
        self.layers[..self.layers.len().saturating_sub(1)]
            .iter()
            .map(|layer| layer.weights.ncols())
            .collect()
    }

    pub fn layers(&self) -> &[Linear] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Linear] {
        &mut self.layers
    }

    /// Inference pass, dropout disabled
    pub fn forward(&self, input: ArrayView2<f64>) -> Array2<f64> {
        let last = self.layers.len() - 1;
        let mut activation = input.to_owned();
        for (index, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(&activation.view());
            if index < last {
                activation.mapv_inplace(|value| value.max(0.0));
            }
        }
        activation
    }

    pub fn predict(&self, state: ArrayView1<f64>) -> Array1<f64> {
        let batch = state.insert_axis(Axis(0));
        self.forward(batch).row(0).to_owned()
    }

    /// Training pass with dropout sampled from `rng`
    pub fn forward_train(&self, input: ArrayView2<f64>, rng: &mut impl Rng) -> (Array2<f64>, ForwardCache) {
        let last = self.layers.len() - 1;
        let keep = 1.0 - self.dropout;
        let mut cache = ForwardCache {
            inputs: Vec::with_capacity(self.layers.len()),
            masks: Vec::with_capacity(last),
        };

        let mut activation = input.to_owned();
        for layer in &self.layers[..last] {
            let output = layer.forward(&activation.view());
            cache.inputs.push(activation);

            let mask = output.mapv(|value| {
                if value <= 0.0 || (self.dropout > 0.0 && rng.gen::<f64>() < self.dropout) {
                    0.0
                } else {
                    1.0 / keep
                }
            });
            activation = &output * &mask;
            cache.masks.push(mask);
        }

        let output = self.layers[last].forward(&activation.view());
        cache.inputs.push(activation);
        (output, cache)
    }

    /// Gradients of every layer given d(loss)/d(output), first layer first
    pub fn backward(&self, cache: &ForwardCache, grad_output: Array2<f64>) -> Vec<LayerGradient> {
        let mut gradients = Vec::with_capacity(self.layers.len());
        let mut grad = grad_output;

        for (index, layer) in self.layers.iter().enumerate().rev() {
            let input = &cache.inputs[index];
            gradients.push(LayerGradient {
                weights: input.t().dot(&grad),
                bias: grad.sum_axis(Axis(0)),
            });
            if index > 0 {
                grad = grad.dot(&layer.weights.t()) * &cache.masks[index - 1];
            }
        }

        gradients.reverse();
        gradients
    }
}

/// Scales gradients so their global L2 norm is at most `max_norm`. Returns
/// the norm before clipping.
pub fn clip_gradients(gradients: &mut [LayerGradient], max_norm: f64) -> f64 {
    let norm = gradients
        .iter()
        .map(|gradient| {
            gradient.weights.iter().map(|value| value * value).sum::<f64>()
                + gradient.bias.iter().map(|value| value * value).sum::<f64>()
        })
        .sum::<f64>()
        .sqrt();

    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for gradient in gradients.iter_mut() {
            gradient.weights *= scale;
            gradient.bias *= scale;
        }
    }
    norm
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn network(dropout: f64) -> QNetwork {
        let mut rng = StdRng::seed_from_u64(11);
        QNetwork::new(4, &[8, 6], 3, dropout, &mut rng)
    }

    #[test]
    fn test_shapes() {
        let net = network(0.2);
        assert_eq!(net.input_dim(), 4);
        assert_eq!(net.output_dim(), 3);
        assert_eq!(net.hidden_dims(), vec![8, 6]);
        let output = net.forward(Array2::zeros((5, 4)).view());
        assert_eq!(output.dim(), (5, 3));
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut net = network(0.0);
        let input = array![[0.5, -1.0, 0.25, 2.0], [1.5, 0.3, -0.7, 0.1]];
        // loss = sum of outputs
        let loss = |net: &QNetwork| net.forward(input.view()).sum();

        let mut rng = StdRng::seed_from_u64(0);
        let (output, cache) = net.forward_train(input.view(), &mut rng);
        let gradients = net.backward(&cache, Array2::ones(output.dim()));

        let step = 1e-6;
        for (layer, row, col) in [(0, 0, 0), (1, 3, 2), (2, 5, 1)] {
            let base = loss(&net);
            net.layers_mut()[layer].weights[[row, col]] += step;
            let numeric = (loss(&net) - base) / step;
            net.layers_mut()[layer].weights[[row, col]] -= step;
            assert!(
                (numeric - gradients[layer].weights[[row, col]]).abs() < 1e-4,
                "layer {layer}: numeric {numeric} analytic {}",
                gradients[layer].weights[[row, col]]
            );
        }
        let numeric_bias = {
            let base = loss(&net);
            net.layers_mut()[2].bias[0] += step;
            let moved = loss(&net);
            net.layers_mut()[2].bias[0] -= step;
            (moved - base) / step
        };
        assert!((numeric_bias - gradients[2].bias[0]).abs() < 1e-4);
    }

    #[test]
    fn test_clip_gradients() {
        let mut gradients = vec![LayerGradient {
            weights: array![[3.0, 0.0]],
            bias: array![4.0],
        }];
        let norm = clip_gradients(&mut gradients, 1.0);
        assert!((norm - 5.0).abs() < 1e-12);
        assert!((gradients[0].weights[[0, 0]] - 0.6).abs() < 1e-12);
        assert!((gradients[0].bias[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_inference_ignores_dropout() {
        let net = network(0.5);
        let state = array![0.1, 0.2, 0.3, 0.4];
        assert_eq!(net.predict(state.view()), net.predict(state.view()));
    }
}
