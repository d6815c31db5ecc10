//! Streaming estimation of mean, covariance and time-lagged covariance
//!
//! - `Moments` - weighted first and centered second moments of one or more chunks
//! - `CovarianceEstimator` - accumulates moments over a data source

mod estimator;
mod moments;

pub use estimator::{CovarianceEstimator, Covariances};
pub use moments::Moments;
