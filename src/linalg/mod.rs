//! Linear algebra used by the estimators
//!
//! Thin layer over `nalgebra` decompositions working on `ndarray` arrays:
//! symmetric and general eigendecompositions, sorting by eigenvalue norm,
//! low-rank inverse square roots of covariance matrices and the
//! generalized eigenvalue solver for correlation matrices.

mod decomposition;
mod solver;

pub use decomposition::{
    argsort_by_norm, from_dmatrix, is_symmetric, symmetrize, to_dmatrix, EigenDecomposition,
    Eigenpairs,
};
pub use solver::{eig_corr, spd_eig, spd_inv_split};
