//! Synthetic test processes
//!
//! A diagonal AR(1) process with known relaxation times, optionally observed
//! through a linear mixing of its coordinates.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Stationary first-order autoregressive process
/// `s_{t+1} = a ⊙ s_t + sqrt(1 - a²) ⊙ ξ_t` with unit stationary variance,
/// observed as `x_t = M s_t`.
#[derive(Debug, Clone)]
pub struct Ar1Process {
    decay: Array1<f64>,
    mixing: Option<Array2<f64>>,
}

impl Ar1Process {
    /// Independent coordinates with the given decay constants, each in `(-1, 1)`
    pub fn new(decay: Vec<f64>) -> Self {
        Self {
            decay: Array1::from_vec(decay),
            mixing: None,
        }
    }

    /// Observe the process through `mixing` (shape `(n_features, n_decay)`)
    pub fn with_mixing(mut self, mixing: Array2<f64>) -> Self {
        self.mixing = Some(mixing);
        self
    }

    /// Number of observed features
    pub fn dimension(&self) -> usize {
        self.mixing.as_ref().map_or(self.decay.len(), |m| m.nrows())
    }

    /// Analytic relaxation times `-lag / ln(a_i)` in frames
    pub fn relaxation_times(&self, lag: usize) -> Array1<f64> {
        self.decay.mapv(|a| -(lag as f64) / a.abs().ln())
    }

    /// Stationary trajectory of `n_steps` frames
    pub fn generate(&self, n_steps: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let start = self.decay.mapv(|_| StandardNormal.sample(&mut rng));
        self.run(start, n_steps, &mut rng)
    }

    /// Trajectory started from a fixed hidden state instead of the
    /// stationary distribution
    pub fn generate_from(&self, start: Array1<f64>, n_steps: usize, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.run(start, n_steps, &mut rng)
    }

    fn run(&self, start: Array1<f64>, n_steps: usize, rng: &mut StdRng) -> Array2<f64> {
        let dim = self.decay.len();
        let noise_scale = self.decay.mapv(|a| (1.0 - a * a).max(0.0).sqrt());

        let mut hidden = Array2::zeros((n_steps, dim));
        let mut state = start;
        for t in 0..n_steps {
            hidden.row_mut(t).assign(&state);
            let noise: Array1<f64> =
                Array1::from_shape_fn(dim, |_| StandardNormal.sample(&mut *rng));
            state = &self.decay * &state + &noise_scale * &noise;
        }

        match &self.mixing {
            Some(m) => hidden.dot(&m.t()),
            None => hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Axis};

    #[test]
    fn test_stationary_variance() {
        let data = Ar1Process::new(vec![0.9, 0.0]).generate(50_000, 1);
        let var = data.var_axis(Axis(0), 0.0);
        assert_abs_diff_eq!(var[0], 1.0, epsilon = 0.1);
        assert_abs_diff_eq!(var[1], 1.0, epsilon = 0.05);
    }

    #[test]
    fn test_mixing_and_determinism() {
        let process = Ar1Process::new(vec![0.5, 0.2])
            .with_mixing(array![[1.0, 0.0], [1.0, 1.0], [0.0, 2.0]]);
        assert_eq!(process.dimension(), 3);

        let a = process.generate(100, 42);
        let b = process.generate(100, 42);
        assert_eq!(a.dim(), (100, 3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_relaxation_times() {
        let t = Ar1Process::new(vec![(-1.0f64).exp()]).relaxation_times(2);
        assert_abs_diff_eq!(t[0], 2.0, epsilon = 1e-12);
    }
}
