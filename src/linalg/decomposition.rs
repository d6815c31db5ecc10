//! Eigendecompositions on top of nalgebra

use crate::error::{Result, TicaError};
use nalgebra::{DMatrix, DVector, Schur, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;
use std::cmp::Ordering;
use tracing::debug;

const MAX_ITERATIONS: usize = 10_000;

/// Eigenvalues closer than this (relative to the matrix norm) share an eigenspace
const CLUSTER_RTOL: f64 = 1e-6;

/// Largest accepted eigenvector residual `‖A v - λ v‖`, relative to the matrix norm
const RESIDUAL_RTOL: f64 = 1e-6;

/// Copy an ndarray matrix into a nalgebra matrix
pub fn to_dmatrix<T: nalgebra::Scalar + Copy>(matrix: &Array2<T>) -> DMatrix<T> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[[i, j]])
}

/// Copy a nalgebra matrix into an ndarray matrix
pub fn from_dmatrix<T: nalgebra::Scalar + Copy>(matrix: &DMatrix<T>) -> Array2<T> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}

/// Elementwise `allclose(m, mᵀ)` with absolute and relative tolerance
pub fn is_symmetric(matrix: &Array2<f64>, rtol: f64, atol: f64) -> bool {
    if !matrix.is_square() {
        return false;
    }
    let n = matrix.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let a = matrix[[i, j]];
            let b = matrix[[j, i]];
            if (a - b).abs() > atol + rtol * b.abs() {
                return false;
            }
        }
    }
    true
}

/// `0.5 * (m + mᵀ)`
pub fn symmetrize(matrix: &Array2<f64>) -> Array2<f64> {
    (matrix + &matrix.t()) * 0.5
}

/// Indices ordering `values` by descending norm. Ties keep their original order.
pub fn argsort_by_norm<T>(values: &[T], norm: impl Fn(&T) -> f64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| {
        norm(&values[b])
            .partial_cmp(&norm(&values[a]))
            .unwrap_or(Ordering::Equal)
    });
    indices
}

/// Real eigendecomposition of a symmetric matrix
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns correspond to eigenvalues)
    pub eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Eigendecomposition of a symmetric matrix. Only the lower triangle is read.
    pub fn from_symmetric(matrix: &Array2<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(TicaError::Numerical(format!(
                "cannot diagonalize a non-square {}x{} matrix",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(TicaError::Numerical("matrix contains non-finite entries".into()));
        }

        let eigen = SymmetricEigen::try_new(to_dmatrix(matrix), f64::EPSILON, MAX_ITERATIONS)
            .ok_or_else(|| {
                TicaError::Numerical("symmetric eigendecomposition did not converge".into())
            })?;

        Ok(Self {
            eigenvalues: Array1::from_iter(eigen.eigenvalues.iter().copied()),
            eigenvectors: from_dmatrix(&eigen.eigenvectors),
        })
    }

    /// Reorder by descending eigenvalue norm
    pub fn sort_by_norm(self) -> Self {
        let values = self.eigenvalues.to_vec();
        let order = argsort_by_norm(&values, |v| v.abs());
        Self {
            eigenvalues: self.eigenvalues.select(Axis(0), &order),
            eigenvectors: self.eigenvectors.select(Axis(1), &order),
        }
    }

    /// Keep only the eigenpairs whose eigenvalue norm exceeds `cutoff`
    pub fn truncate(self, cutoff: f64) -> Self {
        let keep: Vec<usize> = self
            .eigenvalues
            .iter()
            .enumerate()
            .filter(|(_, v)| v.abs() > cutoff)
            .map(|(i, _)| i)
            .collect();
        Self {
            eigenvalues: self.eigenvalues.select(Axis(0), &keep),
            eigenvectors: self.eigenvectors.select(Axis(1), &keep),
        }
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    pub fn min_eigenvalue(&self) -> Option<f64> {
        self.eigenvalues.iter().copied().reduce(f64::min)
    }
}

/// Possibly complex eigenpairs of a general real matrix
#[derive(Debug, Clone)]
pub struct Eigenpairs {
    /// Eigenvalues
    pub eigenvalues: Array1<Complex64>,
    /// Unit-norm eigenvectors as columns
    pub eigenvectors: Array2<Complex64>,
}

impl From<EigenDecomposition> for Eigenpairs {
    fn from(eigen: EigenDecomposition) -> Self {
        Self {
            eigenvalues: eigen.eigenvalues.mapv(|v| Complex64::new(v, 0.0)),
            eigenvectors: eigen.eigenvectors.mapv(|v| Complex64::new(v, 0.0)),
        }
    }
}

impl Eigenpairs {
    /// Eigendecomposition of a general (non-symmetric) real matrix.
    ///
    /// Eigenvalues come from the real Schur form, eigenvectors from shifted
    /// inverse iteration in complex arithmetic. Each eigenvector is scaled to
    /// unit norm with its largest entry real and positive, so eigenvectors of
    /// real eigenvalues come out real.
    pub fn from_general(matrix: &Array2<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(TicaError::Numerical("cannot diagonalize a non-square matrix".into()));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(TicaError::Numerical("matrix contains non-finite entries".into()));
        }
        let n = matrix.nrows();

        let schur = Schur::try_new(to_dmatrix(matrix), f64::EPSILON, MAX_ITERATIONS)
            .ok_or_else(|| TicaError::Numerical("Schur decomposition did not converge".into()))?;
        let eigenvalues: Vec<Complex64> = schur.complex_eigenvalues().iter().copied().collect();

        let complex = to_dmatrix(&matrix.mapv(|v| Complex64::new(v, 0.0)));
        let scale = complex.norm().max(f64::MIN_POSITIVE);

        let mut found: Vec<DVector<Complex64>> = Vec::with_capacity(n);
        for &lambda in &eigenvalues {
            // earlier vectors of a repeated eigenvalue span part of the same eigenspace
            let cluster: Vec<&DVector<Complex64>> = eigenvalues
                .iter()
                .zip(&found)
                .filter(|(mu, _)| (*mu - lambda).norm() <= CLUSTER_RTOL * scale)
                .map(|(_, v)| v)
                .collect();
            let v = inverse_iteration(&complex, lambda, scale, &cluster)?;
            found.push(v);
        }

        let mut eigenvectors = Array2::zeros((n, n));
        for (k, v) in found.iter().enumerate() {
            for i in 0..n {
                eigenvectors[[i, k]] = v[i];
            }
        }

        Ok(Self {
            eigenvalues: Array1::from_vec(eigenvalues),
            eigenvectors,
        })
    }

    /// Reorder by descending eigenvalue norm
    pub fn sort_by_norm(self) -> Self {
        let values = self.eigenvalues.to_vec();
        let order = argsort_by_norm(&values, |v| v.norm());
        Self {
            eigenvalues: self.eigenvalues.select(Axis(0), &order),
            eigenvectors: self.eigenvectors.select(Axis(1), &order),
        }
    }

    /// Whether all eigenvalues have an imaginary part of at most `tol`
    pub fn has_real_eigenvalues(&self, tol: f64) -> bool {
        self.eigenvalues.iter().all(|v| v.im.abs() <= tol)
    }

    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }
}

/// Eigenvector of `matrix` for the (approximate) eigenvalue `lambda`,
/// orthogonal to the eigenvectors already found for the same eigenvalue.
///
/// Fails if no vector with a small residual exists, which happens for
/// defective eigenvalues.
fn inverse_iteration(
    matrix: &DMatrix<Complex64>,
    lambda: Complex64,
    scale: f64,
    cluster: &[&DVector<Complex64>],
) -> Result<DVector<Complex64>> {
    let n = matrix.nrows();
    let identity = DMatrix::<Complex64>::identity(n, n);
    let start = orthogonalize(
        DVector::from_fn(n, |i, _| Complex64::new(1.0 / (i as f64 + 1.0).sqrt(), 0.0)),
        cluster,
    );

    let mut perturbation = 1e-10 * scale;
    for _ in 0..4 {
        let shifted = matrix - &identity * (lambda + Complex64::new(perturbation, 0.0));
        let lu = shifted.lu();

        let mut v = start.clone();
        let mut converged = true;
        for _ in 0..3 {
            match lu.solve(&v) {
                Some(next) => {
                    let next = orthogonalize(next, cluster);
                    let norm = next.norm();
                    if !norm.is_finite() || norm == 0.0 {
                        converged = false;
                        break;
                    }
                    v = next.unscale(norm);
                }
                None => {
                    converged = false;
                    break;
                }
            }
        }

        if converged {
            let residual = (matrix * &v - &v * lambda).norm();
            debug!(
                "inverse iteration for eigenvalue {:.6}: residual {:.3e}",
                lambda, residual
            );
            if residual > RESIDUAL_RTOL * scale {
                return Err(TicaError::Numerical(format!(
                    "no independent eigenvector for eigenvalue {} (residual {:.3e}), \
                     the matrix is not diagonalizable",
                    lambda, residual
                )));
            }
            return Ok(canonical_phase(v));
        }
        perturbation *= 1e3;
    }

    Err(TicaError::Numerical(format!(
        "inverse iteration failed for eigenvalue {}",
        lambda
    )))
}

/// Remove the components of `v` along the orthonormal vectors `basis`
fn orthogonalize(mut v: DVector<Complex64>, basis: &[&DVector<Complex64>]) -> DVector<Complex64> {
    for b in basis {
        let overlap = b.dotc(&v);
        v -= *b * overlap;
    }
    v
}

/// Rotate `v` so that its largest-magnitude entry is real and positive
fn canonical_phase(v: DVector<Complex64>) -> DVector<Complex64> {
    let pivot = v
        .iter()
        .copied()
        .max_by(|a, b| a.norm().partial_cmp(&b.norm()).unwrap_or(Ordering::Equal));
    match pivot {
        Some(p) if p.norm() > 0.0 => {
            let phase = p.conj() / p.norm();
            v.map(|x| x * phase)
        }
        _ => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_symmetric_eigen_reconstructs() {
        let matrix = array![[4.0, 2.0, 0.5], [2.0, 3.0, 0.0], [0.5, 0.0, 1.0]];
        let eigen = EigenDecomposition::from_symmetric(&matrix).unwrap().sort_by_norm();

        // A = V diag(s) Vᵀ
        let d = Array2::from_diag(&eigen.eigenvalues);
        let rebuilt = eigen.eigenvectors.dot(&d).dot(&eigen.eigenvectors.t());
        for (a, b) in matrix.iter().zip(rebuilt.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
        assert!(eigen.eigenvalues[0] >= eigen.eigenvalues[1]);
        assert_abs_diff_eq!(eigen.eigenvalues.sum(), 8.0, epsilon = 1e-10);
    }

    #[test]
    fn test_sort_by_norm_is_stable() {
        let order = argsort_by_norm(&[1.0, -3.0, 3.0, 0.5], |v: &f64| v.abs());
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn test_truncate() {
        let eigen = EigenDecomposition {
            eigenvalues: array![2.0, 1e-9, -0.5],
            eigenvectors: Array2::eye(3),
        }
        .truncate(1e-6);
        assert_eq!(eigen.len(), 2);
        assert_eq!(eigen.eigenvalues, array![2.0, -0.5]);
        assert_eq!(eigen.eigenvectors.column(1), array![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_general_real_eigenvalues() {
        let matrix = array![[2.0, 1.0], [0.0, 0.5]];
        let pairs = Eigenpairs::from_general(&matrix).unwrap().sort_by_norm();

        assert!(pairs.has_real_eigenvalues(1e-12));
        assert_abs_diff_eq!(pairs.eigenvalues[0].re, 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(pairs.eigenvalues[1].re, 0.5, epsilon = 1e-10);

        // A v = λ v, v real
        let complex = matrix.mapv(|v| Complex64::new(v, 0.0));
        for k in 0..2 {
            let v = pairs.eigenvectors.column(k).to_owned();
            let av = complex.dot(&v);
            for i in 0..2 {
                let residual = (av[i] - v[i] * pairs.eigenvalues[k]).norm();
                assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-8);
                assert_abs_diff_eq!(v[i].im, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_general_complex_eigenvalues() {
        // rotation by 90 degrees scaled by 0.5
        let matrix = array![[0.0, -0.5], [0.5, 0.0]];
        let pairs = Eigenpairs::from_general(&matrix).unwrap();

        assert!(!pairs.has_real_eigenvalues(1e-12));
        for k in 0..2 {
            assert_abs_diff_eq!(pairs.eigenvalues[k].norm(), 0.5, epsilon = 1e-10);
        }
        let complex = matrix.mapv(|v| Complex64::new(v, 0.0));
        let v = pairs.eigenvectors.column(0).to_owned();
        let av = complex.dot(&v);
        for i in 0..2 {
            assert_abs_diff_eq!((av[i] - v[i] * pairs.eigenvalues[0]).norm(), 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_general_repeated_eigenvalue_gets_independent_vectors() {
        let matrix = array![[0.5, 0.0, 0.1], [0.0, 0.5, 0.0], [0.0, 0.0, 0.2]];
        let pairs = Eigenpairs::from_general(&matrix).unwrap().sort_by_norm();

        assert_abs_diff_eq!(pairs.eigenvalues[0].re, 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(pairs.eigenvalues[1].re, 0.5, epsilon = 1e-10);
        assert_abs_diff_eq!(pairs.eigenvalues[2].re, 0.2, epsilon = 1e-10);

        let v0 = pairs.eigenvectors.column(0).to_owned();
        let v1 = pairs.eigenvectors.column(1).to_owned();
        let overlap: Complex64 = v0.iter().zip(v1.iter()).map(|(a, b)| a.conj() * b).sum();
        assert_abs_diff_eq!(overlap.norm(), 0.0, epsilon = 1e-8);

        // both lie in span(e1, e2)
        assert_abs_diff_eq!(v0[2].norm(), 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(v1[2].norm(), 0.0, epsilon = 1e-8);

        let complex = matrix.mapv(|v| Complex64::new(v, 0.0));
        for k in 0..3 {
            let v = pairs.eigenvectors.column(k).to_owned();
            let av = complex.dot(&v);
            for i in 0..3 {
                let residual = (av[i] - v[i] * pairs.eigenvalues[k]).norm();
                assert_abs_diff_eq!(residual, 0.0, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn test_general_defective_matrix_is_an_error() {
        let matrix = array![[0.5, 1.0], [0.0, 0.5]];
        assert!(matches!(Eigenpairs::from_general(&matrix), Err(TicaError::Numerical(_))));
    }

    #[test]
    fn test_is_symmetric() {
        assert!(is_symmetric(&array![[1.0, 2.0], [2.0, 1.0]], 1e-5, 1e-8));
        assert!(!is_symmetric(&array![[1.0, 2.0], [2.5, 1.0]], 1e-5, 1e-8));
        assert_eq!(symmetrize(&array![[1.0, 2.0], [4.0, 1.0]]), array![[1.0, 3.0], [3.0, 1.0]]);
    }
}
