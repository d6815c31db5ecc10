//! Projected data and output scalings

use crate::error::{Result, TicaError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Imaginary parts below this are considered absent (numpy's `allclose` atol)
pub const IMAGINARY_ATOL: f64 = 1e-8;

/// Output of a transform: real unless the components are genuinely complex
#[derive(Debug, Clone, PartialEq)]
pub enum TicaOutput {
    Real(Array2<f64>),
    Complex(Array2<Complex64>),
}

impl TicaOutput {
    pub fn is_real(&self) -> bool {
        matches!(self, TicaOutput::Real(_))
    }

    pub fn dim(&self) -> (usize, usize) {
        match self {
            TicaOutput::Real(y) => y.dim(),
            TicaOutput::Complex(y) => y.dim(),
        }
    }

    pub fn as_real(&self) -> Option<&Array2<f64>> {
        match self {
            TicaOutput::Real(y) => Some(y),
            TicaOutput::Complex(_) => None,
        }
    }

    /// The real output, or an error if the projection is complex
    pub fn into_real(self) -> Result<Array2<f64>> {
        match self {
            TicaOutput::Real(y) => Ok(y),
            TicaOutput::Complex(_) => Err(TicaError::Numerical(
                "projection onto complex eigenvectors has no real representation".into(),
            )),
        }
    }

    /// Complex view of the output regardless of its representation
    pub fn to_complex(&self) -> Array2<Complex64> {
        match self {
            TicaOutput::Real(y) => y.mapv(|v| Complex64::new(v, 0.0)),
            TicaOutput::Complex(y) => y.clone(),
        }
    }
}

/// Whether all entries have a negligible imaginary part
pub fn is_effectively_real(values: ArrayView2<Complex64>) -> bool {
    values.iter().all(|v| v.im.abs() <= IMAGINARY_ATOL)
}

/// `data · vectors`, each column multiplied by `scaling[i]` if given.
/// Stays real when `vectors` is effectively real.
pub fn project(
    data: ArrayView2<f64>,
    vectors: ArrayView2<Complex64>,
    scaling: Option<ArrayView1<Complex64>>,
) -> TicaOutput {
    if is_effectively_real(vectors) {
        let vectors = vectors.mapv(|v| v.re);
        let mut y = data.dot(&vectors);
        if let Some(scaling) = scaling {
            let scaling = scaling.mapv(|v| v.re);
            y *= &scaling.insert_axis(Axis(0));
        }
        TicaOutput::Real(y)
    } else {
        let data = data.mapv(|v| Complex64::new(v, 0.0));
        let mut y = data.dot(&vectors);
        if let Some(scaling) = scaling {
            y *= &scaling.insert_axis(Axis(0));
        }
        TicaOutput::Complex(y)
    }
}

/// Commute-map scaling `sqrt(t̃_i / 2)` with the regularized timescales
/// `t̃_i = ½ t_i tanh(π (t_i - τ)/τ + 1)`.
///
/// The regularization damps timescales below the lag time, which are
/// dominated by noise.
pub fn commute_map_scaling(timescales: ArrayView1<f64>, lag: usize) -> Array1<f64> {
    let lag = lag as f64;
    timescales.mapv(|t| {
        let regularized = 0.5 * t * (PI * ((t - lag) / lag) + 1.0).tanh();
        (regularized / 2.0).sqrt()
    })
}

/// Correlation between input features (rows) and components (columns):
/// `(C0 · V) / σ` with `σ_i = sqrt(C0_ii)`
pub fn feature_correlation(cov: &Array2<f64>, vectors: ArrayView2<Complex64>) -> TicaOutput {
    let sigma = cov.diag().mapv(f64::sqrt).insert_axis(Axis(1));
    match project(cov.view(), vectors, None) {
        TicaOutput::Real(y) => TicaOutput::Real(y / &sigma),
        TicaOutput::Complex(y) => {
            let sigma = sigma.mapv(|s| Complex64::new(s, 0.0));
            TicaOutput::Complex(y / &sigma)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_real_projection_with_scaling() {
        let data = array![[1.0, 2.0], [0.0, -1.0]];
        let vectors = array![[c(1.0, 0.0), c(0.0, 0.0)], [c(1.0, 0.0), c(2.0, 0.0)]];
        let scaling = array![c(0.5, 0.0), c(-1.0, 0.0)];

        let y = project(data.view(), vectors.view(), Some(scaling.view()));
        assert_eq!(y, TicaOutput::Real(array![[1.5, -4.0], [-0.5, 2.0]]));
    }

    #[test]
    fn test_complex_projection() {
        let data = array![[1.0, 1.0]];
        let vectors = array![[c(1.0, 1.0)], [c(0.0, 1.0)]];
        let y = project(data.view(), vectors.view(), None);
        assert!(!y.is_real());
        assert_eq!(y.to_complex()[[0, 0]], c(1.0, 2.0));
        assert!(y.into_real().is_err());
    }

    #[test]
    fn test_commute_map_scaling() {
        let lag = 2;
        let t = array![2.0, 100.0];
        let s = commute_map_scaling(t.view(), lag);
        // t = lag: ½ t tanh(1)
        assert_abs_diff_eq!(s[0], (0.5 * 2.0 * 1f64.tanh() / 2.0).sqrt(), epsilon = 1e-12);
        // long timescales are left essentially untouched
        assert_abs_diff_eq!(s[1], (0.5 * 100.0 / 2.0f64).sqrt(), epsilon = 1e-9);

        let s = commute_map_scaling(array![f64::INFINITY].view(), lag);
        assert!(s[0].is_infinite());
    }

    #[test]
    fn test_feature_correlation_identity() {
        let cov = array![[4.0, 0.0], [0.0, 1.0]];
        // C0-normalized eigenvectors
        let vectors = array![[c(0.5, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(1.0, 0.0)]];
        let corr = feature_correlation(&cov, vectors.view()).into_real().unwrap();
        assert_eq!(corr, array![[1.0, 0.0], [0.0, 1.0]]);
    }
}
