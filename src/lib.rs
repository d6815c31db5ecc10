//! # TICA
//!
//! Time-lagged independent component analysis for multivariate time series.
//!
//! ## Features
//!
//! - Streaming estimation of instantaneous and time-lagged covariances
//! - Reversible (symmetrized) and non-reversible estimates
//! - Output dimension by fixed count or cumulative kinetic variance
//! - Kinetic map and commute map scaling of the projected data
//! - Equilibrium correction of non-equilibrium data via Koopman reweighting
//!
//! ## Example
//!
//! ```rust,no_run
//! use tica::prelude::*;
//!
//! let data = Ar1Process::new(vec![0.9, 0.5, 0.1]).generate(10_000, 42);
//! let mut tica = Tica::new(TicaConfig::with_lag(1).with_dim(2)).unwrap();
//! tica.estimate(&data).unwrap();
//! let projected = tica.transform(data.view()).unwrap();
//! println!("{} -> {:?}", tica, projected.dim());
//! ```

pub mod config;
pub mod covariance;
pub mod data;
pub mod error;
pub mod koopman;
pub mod linalg;
pub mod synthetic;
pub mod tica;

pub use config::{TicaConfig, DEFAULT_VAR_CUTOFF};
pub use error::{Result, TicaError};
pub use tica::{Tica, TicaKind, TicaOutput};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::TicaConfig;
    pub use crate::covariance::{CovarianceEstimator, Covariances};
    pub use crate::data::{ChunkParams, DataSource, TrajectorySource};
    pub use crate::error::{Result, TicaError};
    pub use crate::koopman::{KoopmanEstimator, KoopmanWeights};
    pub use crate::synthetic::Ar1Process;
    pub use crate::tica::{EstimationState, Tica, TicaKind, TicaOutput};
}
