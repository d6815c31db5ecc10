//! Estimator configuration
//!
//! Options controlling the lag time, the output dimension policy and the
//! scaling of the transformed coordinates.

use crate::error::{Result, TicaError};
use serde::{Deserialize, Serialize};

/// Variance cutoff used when neither `dim` nor `var_cutoff` is set
pub const DEFAULT_VAR_CUTOFF: f64 = 0.95;

/// Configuration for a TICA estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicaConfig {
    /// Lag time in frames
    pub lag: usize,

    /// Fixed number of output dimensions. Exclusive with `var_cutoff`
    pub dim: Option<usize>,

    /// Keep components until their cumulative kinetic variance reaches this
    /// fraction. `None` means the default of 0.95
    pub var_cutoff: Option<f64>,

    /// Scale the output by the eigenvalues (kinetic map)
    pub kinetic_map: bool,

    /// Scale the output by the square root of the regularized timescales
    pub commute_map: bool,

    /// Eigenvalue norm cutoff for the covariance matrix
    pub epsilon: f64,

    /// Assume a reversible process and symmetrize the estimates
    pub reversible: bool,

    /// Only use every `stride`-th frame as a time origin
    pub stride: usize,

    /// Skip the first frames of every trajectory
    pub skip: usize,

    /// Number of lagged pairs processed per chunk
    pub chunksize: usize,
}

impl Default for TicaConfig {
    fn default() -> Self {
        Self {
            lag: 10,
            dim: None,
            var_cutoff: None,
            kinetic_map: true,
            commute_map: false,
            epsilon: 1e-6,
            reversible: true,
            stride: 1,
            skip: 0,
            chunksize: 5000,
        }
    }
}

impl TicaConfig {
    /// Default configuration with the given lag time
    pub fn with_lag(lag: usize) -> Self {
        Self {
            lag,
            ..Default::default()
        }
    }

    /// Request a fixed output dimension
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    /// Request a cumulative kinetic variance cutoff
    pub fn with_var_cutoff(mut self, var_cutoff: f64) -> Self {
        self.var_cutoff = Some(var_cutoff);
        self
    }

    /// Disable both kinetic and commute map scaling
    pub fn unscaled(mut self) -> Self {
        self.kinetic_map = false;
        self.commute_map = false;
        self
    }

    /// Variance cutoff actually used by the dimension policy.
    ///
    /// A fixed `dim` switches the cutoff off.
    pub fn effective_var_cutoff(&self) -> f64 {
        if self.dim.is_some() {
            1.0
        } else {
            self.var_cutoff.unwrap_or(DEFAULT_VAR_CUTOFF)
        }
    }

    /// Check option ranges and mutually exclusive options
    pub fn validate(&self) -> Result<()> {
        if self.lag == 0 {
            return Err(TicaError::Configuration("lag must be a positive number of frames".into()));
        }
        if self.dim == Some(0) {
            return Err(TicaError::Configuration("dim must be positive".into()));
        }
        if let Some(cutoff) = self.var_cutoff {
            if !(cutoff > 0.0 && cutoff <= 1.0) {
                return Err(TicaError::Configuration(format!(
                    "var_cutoff must lie in (0, 1], got {}",
                    cutoff
                )));
            }
            if self.dim.is_some() && cutoff != DEFAULT_VAR_CUTOFF {
                return Err(TicaError::Configuration(
                    "Trying to set both the number of dimension and the subspace variance. \
                     Use either or."
                        .into(),
                ));
            }
        }
        if !(self.epsilon > 0.0) {
            return Err(TicaError::Configuration(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.stride == 0 || self.chunksize == 0 {
            return Err(TicaError::Configuration("stride and chunksize must be positive".into()));
        }
        self.validate_scaling()
    }

    /// Check the scaling flags only. Repeated at transform time since the
    /// flags can be changed after construction.
    pub fn validate_scaling(&self) -> Result<()> {
        if self.kinetic_map && self.commute_map {
            return Err(TicaError::Configuration(
                "Trying to use both kinetic_map and commute_map. Use either or.".into(),
            ));
        }
        if (self.kinetic_map || self.commute_map) && !self.reversible {
            return Err(TicaError::Configuration(
                "kinetic_map and commute_map are not implemented for irreversible processes".into(),
            ));
        }
        Ok(())
    }
}
