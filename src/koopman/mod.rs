//! Koopman reweighting
//!
//! Estimates a Koopman matrix on a whitened, constant-augmented basis and
//! derives per-frame weights that correct non-equilibrium sampling.

mod estimator;
mod weights;

pub use estimator::{KoopmanEstimator, KoopmanModel};
pub use weights::KoopmanWeights;
