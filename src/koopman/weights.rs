//! Per-frame equilibrium weights

use ndarray::{Array1, Array2, ArrayView2};

/// Weight function `w(x) = (x - μ)·R·u + u_c`.
///
/// `u` holds the coefficients of the ratio between the stationary and the
/// empirical distribution in the whitened basis, `u_c` the coefficient of the
/// constant function.
#[derive(Debug, Clone, PartialEq)]
pub struct KoopmanWeights {
    u: Array1<f64>,
    u_const: f64,
    whitening: Array2<f64>,
    mean: Array1<f64>,
}

impl KoopmanWeights {
    pub fn new(u: Array1<f64>, u_const: f64, whitening: Array2<f64>, mean: Array1<f64>) -> Self {
        Self {
            u,
            u_const,
            whitening,
            mean,
        }
    }

    /// Weights of the frames in `x` (one row per frame)
    pub fn weights(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let coefficients = self.whitening.dot(&self.u);
        (&x - &self.mean).dot(&coefficients) + self.u_const
    }

    /// Number of input features the weights apply to
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.u
    }

    pub fn constant(&self) -> f64 {
        self.u_const
    }
}
