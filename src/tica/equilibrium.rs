//! Equilibrium-corrected TICA
//!
//! Data sampled out of equilibrium gives biased covariances. The estimate is
//! corrected in three steps:
//!
//! 1. A Koopman model on the whitened, constant-augmented basis yields
//!    equilibrium weights for every frame.
//! 2. The reweighted covariance is expressed in the `(PC | 1)` basis, so the
//!    mean becomes part of the eigenproblem instead of being subtracted.
//! 3. That covariance is whitened and the symmetrized Koopman matrix is
//!    diagonalized in the whitened basis.

use super::model::{cumulative_variance, EquilibriumModel};
use crate::config::TicaConfig;
use crate::covariance::CovarianceEstimator;
use crate::data::{ChunkParams, DataSource};
use crate::error::{Result, TicaError};
use crate::koopman::KoopmanEstimator;
use crate::linalg::EigenDecomposition;
use ndarray::{s, Array1, Array2};
use num_complex::Complex64;
use tracing::{debug, warn};

/// Run the full equilibrium-corrected estimation over `source`
pub fn estimate<S: DataSource + ?Sized>(
    config: &TicaConfig,
    source: &S,
) -> Result<EquilibriumModel> {
    let params = ChunkParams::from(config);

    let mut koopman = KoopmanEstimator::new(params, config.epsilon);
    let koopman = koopman.estimate(source)?.clone();
    let k = &koopman.koopman_matrix;
    let r = &koopman.whitening;
    let rank = r.ncols();
    debug!("Koopman reweighting done, rank {} of {}", rank, source.dimension());

    let weights = koopman.weights();
    let c = CovarianceEstimator::new(params)
        .with_weights(weights.clone())
        .remove_constant_mean(koopman.mean.clone())
        .remove_data_mean(false)
        .reversible(config.reversible)
        .estimate(source)?;

    let augmented_cov = augmented_covariance(&c.cov, &c.mean, r);
    let r_eq = whitening(&augmented_cov, config.epsilon)?;

    let augmented_koopman = {
        let lagged = augmented_cov.dot(k) + k.t().dot(&augmented_cov);
        r_eq.t().dot(&lagged).dot(&r_eq) * 0.5
    };
    let eigen = EigenDecomposition::from_symmetric(&augmented_koopman)?.sort_by_norm();

    let w = r_eq.dot(&eigen.eigenvectors);
    let projection = r.dot(&w.slice(s![..rank, ..]));
    let offset = &w.row(rank) - &koopman.mean.dot(&projection);

    let eigenvalues = eigen.eigenvalues.mapv(|v| Complex64::new(v, 0.0));
    let cumvar = cumulative_variance(&eigenvalues)?;

    Ok(EquilibriumModel {
        mean: c.mean,
        eigenvalues,
        cumvar,
        projection,
        offset,
        weights,
        augmented_cov,
        augmented_koopman,
    })
}

/// Covariance of the basis `[x·R, 1]` given the second moment `c0` and mean `mean` of `x`
fn augmented_covariance(c0: &Array2<f64>, mean: &Array1<f64>, r: &Array2<f64>) -> Array2<f64> {
    let rank = r.ncols();
    let mean_pc = mean.dot(r);

    let mut augmented = Array2::zeros((rank + 1, rank + 1));
    augmented.slice_mut(s![..rank, ..rank]).assign(&r.t().dot(c0).dot(r));
    augmented.slice_mut(s![..rank, rank]).assign(&mean_pc);
    augmented.slice_mut(s![rank, ..rank]).assign(&mean_pc);
    augmented[[rank, rank]] = 1.0;
    augmented
}

/// `R_eq = Q s^{-1/2}` with `R_eqᵀ C R_eq = I` on the significant subspace of `c`.
///
/// Reweighting can make `c` indefinite. The cutoff is then raised to the
/// magnitude of the most negative eigenvalue.
fn whitening(c: &Array2<f64>, epsilon: f64) -> Result<Array2<f64>> {
    let eigen = EigenDecomposition::from_symmetric(c)?;

    let mut cutoff = epsilon;
    if let Some(evmin) = eigen.min_eigenvalue() {
        if evmin < 0.0 {
            cutoff = epsilon.max(-evmin);
            warn!(
                "reweighted covariance has negative eigenvalue {:.3e}; using cutoff {:.3e}",
                evmin, cutoff
            );
        }
    }

    let eigen = eigen.sort_by_norm().truncate(cutoff);
    if eigen.is_empty() {
        return Err(TicaError::Numerical(
            "reweighted covariance has no eigenvalue above the cutoff".into(),
        ));
    }
    Ok(&eigen.eigenvectors * &eigen.eigenvalues.mapv(|s| 1.0 / s.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_augmented_covariance_layout() {
        let c0 = array![[2.0, 0.0], [0.0, 3.0]];
        let mean = array![1.0, -1.0];
        let r = array![[1.0], [1.0]];
        let augmented = augmented_covariance(&c0, &mean, &r);
        assert_eq!(augmented, array![[5.0, 0.0], [0.0, 1.0]]);
    }

    #[test]
    fn test_whitening() {
        let c = array![[2.0, 0.5, 0.1], [0.5, 1.0, 0.0], [0.1, 0.0, 1.0]];
        let r = whitening(&c, 1e-10).unwrap();
        let identity = r.t().dot(&c).dot(&r);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(identity[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_whitening_drops_negative_directions() {
        let c = array![[1.0, 0.0], [0.0, -0.2]];
        let r = whitening(&c, 1e-6).unwrap();
        assert_eq!(r.ncols(), 1);
    }
}
