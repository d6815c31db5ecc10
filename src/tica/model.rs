//! Estimation results of the TICA variants

use crate::covariance::Covariances;
use crate::error::{Result, TicaError};
use crate::koopman::KoopmanWeights;
use crate::linalg::Eigenpairs;
use ndarray::{Array1, Array2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Lifecycle of an estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimationState {
    /// No data seen
    Unestimated,
    /// Covariances present, eigendecomposition stale
    DataAccumulated,
    /// Eigendecomposition cached
    Diagonalized,
}

/// Cumulative kinetic variance `Σ_{i≤k} |λ_i|² / Σ |λ_i|²`
pub fn cumulative_variance(eigenvalues: &Array1<Complex64>) -> Result<Array1<f64>> {
    let mut total = 0.0;
    let mut cumvar: Array1<f64> = eigenvalues
        .iter()
        .map(|v| {
            total += v.norm_sqr();
            total
        })
        .collect();

    if !(total > 0.0) || !total.is_finite() {
        return Err(TicaError::Numerical(format!(
            "cannot normalize cumulative variance, total is {}",
            total
        )));
    }
    cumvar /= total;
    Ok(cumvar)
}

/// Implied timescales `-lag / ln|λ_i|`. A unit-norm eigenvalue gives `+∞`.
pub fn implied_timescales(eigenvalues: &Array1<Complex64>, lag: usize) -> Array1<f64> {
    let lag = lag as f64;
    eigenvalues.mapv(|v| {
        let log = v.norm().ln();
        if log == 0.0 {
            f64::INFINITY
        } else {
            -lag / log
        }
    })
}

/// Eigenpairs of the TICA problem and their cumulative variance
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub eigenvalues: Array1<Complex64>,
    /// Independent components as columns
    pub eigenvectors: Array2<Complex64>,
    pub cumvar: Array1<f64>,
}

impl Spectrum {
    pub fn from_eigenpairs(pairs: Eigenpairs) -> Result<Self> {
        let cumvar = cumulative_variance(&pairs.eigenvalues)?;
        Ok(Self {
            eigenvalues: pairs.eigenvalues,
            eigenvectors: pairs.eigenvectors,
            cumvar,
        })
    }
}

/// Results of standard TICA: input statistics plus the cached spectrum
#[derive(Debug, Clone, Default)]
pub struct TicaModel {
    covariances: Option<Covariances>,
    spectrum: Option<Spectrum>,
}

impl TicaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EstimationState {
        match (&self.covariances, &self.spectrum) {
            (None, _) => EstimationState::Unestimated,
            (Some(_), None) => EstimationState::DataAccumulated,
            (Some(_), Some(_)) => EstimationState::Diagonalized,
        }
    }

    /// Replace the input statistics. Invalidates the spectrum.
    pub fn set_covariances(&mut self, covariances: Covariances) {
        self.covariances = Some(covariances);
        self.spectrum = None;
    }

    pub fn set_spectrum(&mut self, spectrum: Spectrum) {
        self.spectrum = Some(spectrum);
    }

    pub fn covariances(&self) -> Option<&Covariances> {
        self.covariances.as_ref()
    }

    pub fn spectrum(&self) -> Option<&Spectrum> {
        self.spectrum.as_ref()
    }
}

/// Results of equilibrium-corrected TICA.
///
/// The transform is affine: `x ↦ x·projection + offset`.
#[derive(Debug, Clone)]
pub struct EquilibriumModel {
    /// Reweighted mean of the input, relative to the Koopman mean
    pub mean: Array1<f64>,
    pub eigenvalues: Array1<Complex64>,
    pub cumvar: Array1<f64>,
    /// Linear part of the transform, shape `(d, n_components)`
    pub projection: Array2<f64>,
    /// Additive part of the transform
    pub offset: Array1<f64>,
    /// Equilibrium weights used for the covariance estimate
    pub weights: KoopmanWeights,
    /// Reweighted covariance in the `(PC | 1)` basis
    pub augmented_cov: Array2<f64>,
    /// Symmetrized Koopman matrix in the whitened basis
    pub augmented_koopman: Array2<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn real(values: &[f64]) -> Array1<Complex64> {
        values.iter().map(|&v| Complex64::new(v, 0.0)).collect()
    }

    #[test]
    fn test_cumvar_is_monotone_and_normalized() {
        let cumvar = cumulative_variance(&real(&[0.9, -0.5, 0.3, 1e-4])).unwrap();
        assert!(cumvar.windows(2).into_iter().all(|w| w[1] >= w[0]));
        assert_abs_diff_eq!(cumvar[cumvar.len() - 1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cumvar[0], 0.81 / 1.15000001, epsilon = 1e-6);
    }

    #[test]
    fn test_cumvar_of_zero_spectrum_fails() {
        assert!(cumulative_variance(&real(&[0.0, 0.0])).is_err());
    }

    #[test]
    fn test_implied_timescales() {
        let t = implied_timescales(&real(&[(-0.5f64).exp(), -(-0.25f64).exp()]), 3);
        assert_abs_diff_eq!(t[0], 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t[1], 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_eigenvalue_has_infinite_timescale() {
        let t = implied_timescales(&real(&[1.0, -1.0]), 5);
        assert!(t.iter().all(|v| v.is_infinite() && *v > 0.0));

        let t = implied_timescales(&array![Complex64::new(0.0, 1.0)], 5);
        assert!(t[0].is_infinite());
    }

    #[test]
    fn test_model_state_transitions() {
        let mut model = TicaModel::new();
        assert_eq!(model.state(), EstimationState::Unestimated);

        let covariances = Covariances {
            mean: array![0.0],
            mean_tau: array![0.0],
            cov: array![[1.0]],
            cov_tau: array![[0.5]],
            weight: 10.0,
        };
        model.set_covariances(covariances.clone());
        assert_eq!(model.state(), EstimationState::DataAccumulated);

        model.set_spectrum(Spectrum {
            eigenvalues: real(&[0.5]),
            eigenvectors: array![[Complex64::new(1.0, 0.0)]],
            cumvar: array![1.0],
        });
        assert_eq!(model.state(), EstimationState::Diagonalized);

        model.set_covariances(covariances);
        assert_eq!(model.state(), EstimationState::DataAccumulated);
        assert!(model.spectrum().is_none());
    }
}
