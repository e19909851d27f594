//! One-hidden-layer feed-forward regression network.
//!
//! `input → tanh(W1·x + b1) → W2·h + b2 → output`, trained by full-batch
//! gradient descent on the mean squared error.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Largest global gradient norm applied in one step.
const MAX_GRAD_NORM: f32 = 1.0;

/// Dense weights, row-major (`w1[h * input + i]`, `w2[o * hidden + h]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
    w1: Vec<f32>,
    b1: Vec<f32>,
    w2: Vec<f32>,
    b2: Vec<f32>,
}

/// Dimension or numeric problem in a forward/training pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetworkError {
    #[error("expected {expected} inputs, got {got}")]
    InputSize { expected: usize, got: usize },
    #[error("expected {expected} targets, got {got}")]
    TargetSize { expected: usize, got: usize },
    #[error("weights do not match the declared shape")]
    Shape,
    #[error("non-finite value encountered")]
    NonFinite,
}

impl Mlp {
    /// Xavier-uniform initialisation from a fixed seed.
    pub fn new(input: usize, hidden: usize, output: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = |fan_in: usize, fan_out: usize| -> Vec<f32> {
            let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
            (0..fan_in * fan_out)
                .map(|_| rng.gen_range(-limit..limit))
                .collect()
        };
        let w1 = init(input, hidden);
        let w2 = init(hidden, output);
        Self {
            input,
            hidden,
            output,
            w1,
            b1: vec![0.0; hidden],
            w2,
            b2: vec![0.0; output],
        }
    }

    fn check_shape(&self) -> Result<(), NetworkError> {
        if self.w1.len() != self.input * self.hidden
            || self.b1.len() != self.hidden
            || self.w2.len() != self.hidden * self.output
            || self.b2.len() != self.output
        {
            return Err(NetworkError::Shape);
        }
        Ok(())
    }

    fn hidden_activations(&self, x: &[f32]) -> Vec<f32> {
        (0..self.hidden)
            .map(|h| {
                let row = &self.w1[h * self.input..(h + 1) * self.input];
                let z: f32 = row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + self.b1[h];
                z.tanh()
            })
            .collect()
    }

    fn output_from_hidden(&self, hidden: &[f32]) -> Vec<f32> {
        (0..self.output)
            .map(|o| {
                let row = &self.w2[o * self.hidden..(o + 1) * self.hidden];
                row.iter().zip(hidden).map(|(w, h)| w * h).sum::<f32>() + self.b2[o]
            })
            .collect()
    }

    /// Run inference on one input vector.
    pub fn forward(&self, x: &[f32]) -> Result<Vec<f32>, NetworkError> {
        self.check_shape()?;
        if x.len() != self.input {
            return Err(NetworkError::InputSize {
                expected: self.input,
                got: x.len(),
            });
        }
        let y = self.output_from_hidden(&self.hidden_activations(x));
        if y.iter().any(|v| !v.is_finite()) {
            return Err(NetworkError::NonFinite);
        }
        Ok(y)
    }

    /// Mean squared error (½‖y − t‖², averaged over examples).
    pub fn loss(&self, inputs: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<f32, NetworkError> {
        let mut total = 0.0f64;
        for (x, t) in inputs.iter().zip(targets) {
            let y = self.forward(x)?;
            total += y
                .iter()
                .zip(t)
                .map(|(a, b)| 0.5 * ((a - b) as f64).powi(2))
                .sum::<f64>();
        }
        Ok((total / inputs.len().max(1) as f64) as f32)
    }

    /// One full-batch gradient-descent step; returns the loss before the
    /// update.  The gradient is clipped to a global norm of 1.
    pub fn train_step(
        &mut self,
        inputs: &[Vec<f32>],
        targets: &[Vec<f32>],
        learning_rate: f32,
    ) -> Result<f32, NetworkError> {
        self.check_shape()?;
        let n = inputs.len().min(targets.len());
        if n == 0 {
            return Ok(0.0);
        }

        let mut g_w1 = vec![0.0f32; self.w1.len()];
        let mut g_b1 = vec![0.0f32; self.b1.len()];
        let mut g_w2 = vec![0.0f32; self.w2.len()];
        let mut g_b2 = vec![0.0f32; self.b2.len()];
        let mut loss = 0.0f64;

        for (x, t) in inputs.iter().zip(targets).take(n) {
            if x.len() != self.input {
                return Err(NetworkError::InputSize {
                    expected: self.input,
                    got: x.len(),
                });
            }
            if t.len() != self.output {
                return Err(NetworkError::TargetSize {
                    expected: self.output,
                    got: t.len(),
                });
            }
            let h = self.hidden_activations(x);
            let y = self.output_from_hidden(&h);

            let d_out: Vec<f32> = y.iter().zip(t).map(|(a, b)| a - b).collect();
            loss += d_out.iter().map(|d| 0.5 * (*d as f64).powi(2)).sum::<f64>();

            let mut d_hidden = vec![0.0f32; self.hidden];
            for (o, &d) in d_out.iter().enumerate() {
                g_b2[o] += d;
                let row = o * self.hidden;
                for (j, &hv) in h.iter().enumerate() {
                    g_w2[row + j] += d * hv;
                    d_hidden[j] += d * self.w2[row + j];
                }
            }
            for (j, dh) in d_hidden.iter().enumerate() {
                let dz = dh * (1.0 - h[j] * h[j]);
                g_b1[j] += dz;
                let row = j * self.input;
                for (i, &xv) in x.iter().enumerate() {
                    g_w1[row + i] += dz * xv;
                }
            }
        }

        let loss = (loss / n as f64) as f32;
        if !loss.is_finite() {
            return Err(NetworkError::NonFinite);
        }

        let scale = 1.0 / n as f32;
        let norm = [&g_w1, &g_b1, &g_w2, &g_b2]
            .iter()
            .flat_map(|g| g.iter())
            .map(|g| (g * scale) * (g * scale))
            .sum::<f32>()
            .sqrt();
        if !norm.is_finite() {
            return Err(NetworkError::NonFinite);
        }
        let clip = if norm > MAX_GRAD_NORM {
            MAX_GRAD_NORM / norm
        } else {
            1.0
        };
        let step = learning_rate * scale * clip;

        for (w, g) in self.w1.iter_mut().zip(&g_w1) {
            *w -= step * g;
        }
        for (b, g) in self.b1.iter_mut().zip(&g_b1) {
            *b -= step * g;
        }
        for (w, g) in self.w2.iter_mut().zip(&g_w2) {
            *w -= step * g;
        }
        for (b, g) in self.b2.iter_mut().zip(&g_b2) {
            *b -= step * g;
        }
        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_data() -> (Vec<Vec<f32>>, Vec<Vec<f32>>) {
        let inputs: Vec<Vec<f32>> = (0..16)
            .map(|i| vec![(i as f32 / 8.0) - 1.0, ((i * 7) % 16) as f32 / 16.0])
            .collect();
        let targets = inputs
            .iter()
            .map(|x| vec![0.5 * x[0] - 0.25 * x[1], x[0] * x[1]])
            .collect();
        (inputs, targets)
    }

    #[test]
    fn same_seed_same_weights() {
        assert_eq!(Mlp::new(8, 4, 3, 7), Mlp::new(8, 4, 3, 7));
        assert_ne!(Mlp::new(8, 4, 3, 7), Mlp::new(8, 4, 3, 8));
    }

    #[test]
    fn forward_checks_input_size() {
        let net = Mlp::new(4, 3, 2, 1);
        assert_eq!(net.forward(&[0.0; 4]).unwrap().len(), 2);
        assert_eq!(
            net.forward(&[0.0; 3]),
            Err(NetworkError::InputSize {
                expected: 4,
                got: 3
            })
        );
    }

    #[test]
    fn training_reduces_loss() {
        let (inputs, targets) = toy_data();
        let mut net = Mlp::new(2, 8, 2, 42);
        let before = net.loss(&inputs, &targets).unwrap();
        for _ in 0..300 {
            net.train_step(&inputs, &targets, 0.1).unwrap();
        }
        let after = net.loss(&inputs, &targets).unwrap();
        assert!(after < before * 0.5, "loss {before} -> {after}");
    }

    #[test]
    fn nan_input_is_reported() {
        let mut net = Mlp::new(2, 3, 1, 0);
        let err = net
            .train_step(&[vec![f32::NAN, 0.0]], &[vec![1.0]], 0.1)
            .unwrap_err();
        assert_eq!(err, NetworkError::NonFinite);
    }

    #[test]
    fn survives_serde_round_trip() {
        let net = Mlp::new(3, 2, 2, 9);
        let json = serde_json::to_string(&net).unwrap();
        let back: Mlp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, net);
    }
}
