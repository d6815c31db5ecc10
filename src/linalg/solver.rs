//! Low-rank whitening and the generalized eigenvalue problem `Cτ r = λ C0 r`

use super::decomposition::{is_symmetric, symmetrize, EigenDecomposition, Eigenpairs};
use crate::error::{Result, TicaError};
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use tracing::{debug, warn};

const SYMMETRY_RTOL: f64 = 1e-5;
const SYMMETRY_ATOL: f64 = 1e-8;

/// Imaginary parts up to this size are treated as round-off
const IMAGINARY_TOL: f64 = 1e-10;

/// Eigenvalues and eigenvectors of a symmetric positive semi-definite matrix,
/// truncated to the numerically significant subspace.
///
/// Eigenpairs with norm `<= epsilon` are dropped. When the smallest
/// eigenvalue is negative, the cutoff is raised above its magnitude so that
/// every kept eigenvalue is positive. Sorted by descending norm.
pub fn spd_eig(matrix: &Array2<f64>, epsilon: f64) -> Result<(Array1<f64>, Array2<f64>)> {
    if !is_symmetric(matrix, SYMMETRY_RTOL, SYMMETRY_ATOL) {
        return Err(TicaError::Numerical("covariance matrix is not symmetric".into()));
    }

    let eigen = EigenDecomposition::from_symmetric(matrix)?.sort_by_norm();

    let mut cutoff = epsilon;
    if let Some(evmin) = eigen.min_eigenvalue() {
        if evmin < 0.0 {
            cutoff = cutoff.max(-evmin + 1e-16);
            if cutoff > epsilon {
                warn!(
                    "covariance matrix has negative eigenvalue {:.3e}; raising cutoff to {:.3e}",
                    evmin, cutoff
                );
            }
        }
    }

    let n = eigen.len();
    let eigen = eigen.truncate(cutoff);
    if eigen.is_empty() {
        return Err(TicaError::Numerical(format!(
            "All eigenvalues are smaller than {:e}, rank reduction would discard all dimensions",
            cutoff
        )));
    }
    debug!("effective rank {} of {}", eigen.len(), n);

    Ok((eigen.eigenvalues, eigen.eigenvectors))
}

/// Low-rank inverse square root `L = V s^{-1/2}` of a covariance matrix, so
/// that `Lᵀ C L = I` on the significant subspace.
///
/// With `canonical_signs` each column is flipped so that the entry of
/// largest magnitude in the corresponding eigenvector is positive.
pub fn spd_inv_split(
    matrix: &Array2<f64>,
    epsilon: f64,
    canonical_signs: bool,
) -> Result<Array2<f64>> {
    let (s, v) = spd_eig(matrix, epsilon)?;
    let mut l = &v * &s.mapv(|x| 1.0 / x.sqrt());

    if canonical_signs {
        for (mut column, eigenvector) in l.axis_iter_mut(Axis(1)).zip(v.axis_iter(Axis(1))) {
            let largest = eigenvector
                .iter()
                .copied()
                .fold(0.0_f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
            if largest < 0.0 {
                column.mapv_inplace(|x| -x);
            }
        }
    }

    Ok(l)
}

/// Solve the generalized eigenvalue problem `Cτ r = λ C0 r`.
///
/// `C0` is whitened with [`spd_inv_split`], dropping directions whose
/// eigenvalue norm is `<= epsilon`, and the whitened lagged matrix is
/// diagonalized. Eigenpairs are returned sorted by descending eigenvalue
/// norm with eigenvectors in the input basis as columns.
///
/// For `reversible` problems the whitened matrix must be symmetric; a
/// non-symmetric one is reported as a numerical error rather than producing
/// complex eigenvalues.
pub fn eig_corr(
    cov: &Array2<f64>,
    cov_tau: &Array2<f64>,
    epsilon: f64,
    reversible: bool,
) -> Result<Eigenpairs> {
    if cov.dim() != cov_tau.dim() {
        return Err(TicaError::Numerical(format!(
            "covariance shapes differ: {:?} vs {:?}",
            cov.dim(),
            cov_tau.dim()
        )));
    }

    let l = spd_inv_split(cov, epsilon, false)?;
    let ct_trans = l.t().dot(cov_tau).dot(&l);

    let pairs = if is_symmetric(&ct_trans, SYMMETRY_RTOL, SYMMETRY_ATOL) {
        Eigenpairs::from(EigenDecomposition::from_symmetric(&symmetrize(&ct_trans))?)
    } else if reversible {
        return Err(TicaError::Numerical(
            "time-lagged covariance is not symmetric although the process is assumed \
             reversible"
                .into(),
        ));
    } else {
        let pairs = Eigenpairs::from_general(&ct_trans)?;
        if !pairs.has_real_eigenvalues(IMAGINARY_TOL) {
            debug!("time-lagged covariance has complex eigenvalues");
        }
        pairs
    };
    let pairs = pairs.sort_by_norm();

    let l = l.mapv(|x| Complex64::new(x, 0.0));
    Ok(Eigenpairs {
        eigenvectors: l.dot(&pairs.eigenvectors),
        eigenvalues: pairs.eigenvalues,
    })
}
