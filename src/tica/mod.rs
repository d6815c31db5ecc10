//! Time-lagged independent component analysis
//!
//! Two variants share one estimator type: standard TICA, which solves the
//! generalized eigenproblem `Cτ r = λ C0 r` on mean-free covariances, and
//! equilibrium-corrected TICA, which first reweights the data with a
//! Koopman model so that non-equilibrium sampling does not bias the result.

mod equilibrium;
mod estimator;
mod model;
mod output;

pub use estimator::{Tica, TicaKind};
pub use model::{
    cumulative_variance, implied_timescales, EquilibriumModel, EstimationState, Spectrum,
    TicaModel,
};
pub use output::{
    commute_map_scaling, feature_correlation, is_effectively_real, project, TicaOutput,
    IMAGINARY_ATOL,
};
