//! Covariance estimator over a data source

use super::moments::{outer, Moments};
use crate::data::{ChunkParams, DataSource};
use crate::error::{Result, TicaError};
use crate::koopman::KoopmanWeights;
use ndarray::{Array1, Array2};
use tracing::debug;

/// Mean, instantaneous and time-lagged covariance of a data set
#[derive(Debug, Clone, PartialEq)]
pub struct Covariances {
    /// Mean of the time origins (symmetrized for reversible estimates)
    pub mean: Array1<f64>,
    /// Mean of the time-lagged frames
    pub mean_tau: Array1<f64>,
    /// Instantaneous covariance C0
    pub cov: Array2<f64>,
    /// Time-lagged covariance Cτ
    pub cov_tau: Array2<f64>,
    /// Total weight of all pairs
    pub weight: f64,
}

/// Accumulates `Covariances` chunk by chunk.
///
/// Every chunk contributes time-lagged pairs `(x_t, x_{t+τ})`. With
/// `reversible` both halves of each pair are used for the instantaneous
/// statistics and the lagged covariance is symmetrized.
#[derive(Debug, Clone)]
pub struct CovarianceEstimator {
    params: ChunkParams,
    reversible: bool,
    remove_data_mean: bool,
    bessel: bool,
    weights: Option<KoopmanWeights>,
    constant_mean: Option<Array1<f64>>,
    moments: Option<Moments>,
    dimension: Option<usize>,
    n_pairs: usize,
}

impl CovarianceEstimator {
    /// Mean-free, Bessel-corrected, non-reversible estimator
    pub fn new(params: ChunkParams) -> Self {
        Self {
            params,
            reversible: false,
            remove_data_mean: true,
            bessel: true,
            weights: None,
            constant_mean: None,
            moments: None,
            dimension: None,
            n_pairs: 0,
        }
    }

    /// Symmetrize the estimates
    pub fn reversible(mut self, reversible: bool) -> Self {
        self.reversible = reversible;
        self
    }

    /// Divide by `weight - 1` instead of `weight`
    pub fn bessel(mut self, bessel: bool) -> Self {
        self.bessel = bessel;
        self
    }

    /// Center the second moments on the data mean. If disabled the
    /// uncentered second moments are returned.
    pub fn remove_data_mean(mut self, remove: bool) -> Self {
        self.remove_data_mean = remove;
        self
    }

    /// Weight every pair by a function of its time origin
    pub fn with_weights(mut self, weights: KoopmanWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Subtract a fixed vector from every frame before accumulating
    pub fn remove_constant_mean(mut self, mean: Array1<f64>) -> Self {
        self.constant_mean = Some(mean);
        self
    }

    pub fn params(&self) -> ChunkParams {
        self.params
    }

    /// Number of pairs accumulated so far
    pub fn n_pairs(&self) -> usize {
        self.n_pairs
    }

    /// Input dimension, once data has been seen
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn has_data(&self) -> bool {
        self.moments.is_some()
    }

    /// Forget all accumulated data
    pub fn reset(&mut self) {
        self.moments = None;
        self.dimension = None;
        self.n_pairs = 0;
    }

    /// Add the pairs of `source` to the running statistics
    pub fn partial_fit<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let dim = source.dimension();
        if let Some(expected) = self.dimension {
            if expected != dim {
                return Err(TicaError::FeatureMismatch { expected, found: dim });
            }
        }
        if let Some(mean) = &self.constant_mean {
            if mean.len() != dim {
                return Err(TicaError::FeatureMismatch {
                    expected: mean.len(),
                    found: dim,
                });
            }
        }
        if let Some(weights) = &self.weights {
            if weights.dimension() != dim {
                return Err(TicaError::FeatureMismatch {
                    expected: weights.dimension(),
                    found: dim,
                });
            }
        }
        self.dimension = Some(dim);

        let mut n_chunks = 0;
        for chunk in source.lagged_chunks(self.params) {
            let w = self.weights.as_ref().map(|f| f.weights(chunk.x));
            let chunk_moments = match &self.constant_mean {
                Some(mean) => {
                    let x = &chunk.x - mean;
                    let y = &chunk.y - mean;
                    Moments::from_chunk(x.view(), y.view(), w.as_ref().map(|w| w.view()))
                }
                None => Moments::from_chunk(chunk.x, chunk.y, w.as_ref().map(|w| w.view())),
            };

            if let Some(chunk_moments) = chunk_moments {
                self.moments = Some(match &self.moments {
                    Some(total) => total.merge(&chunk_moments),
                    None => chunk_moments,
                });
            }
            self.n_pairs += chunk.len();
            n_chunks += 1;
        }

        debug!(
            "accumulated {} chunks, {} time-lagged pairs in total (lag {})",
            n_chunks, self.n_pairs, self.params.lag
        );
        Ok(())
    }

    /// Estimate from scratch over the whole source
    pub fn estimate<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<Covariances> {
        self.reset();
        self.partial_fit(source)?;
        self.covariances()
    }

    /// Current estimates
    pub fn covariances(&self) -> Result<Covariances> {
        let m = self.moments.as_ref().ok_or_else(|| {
            TicaError::InsufficientData(format!(
                "no time-lagged pairs available for lag {}",
                self.params.lag
            ))
        })?;

        let (mean, mean_tau, mut s_00, mut s_0t, total) = if self.reversible {
            let mean = (&m.mean_x + &m.mean_y) * 0.5;
            let dx = &m.mean_x - &mean;
            let dy = &m.mean_y - &mean;

            let s_00 = &m.m_xx
                + &m.m_yy
                + &(outer(dx.view(), dx.view()) * m.weight)
                + &(outer(dy.view(), dy.view()) * m.weight);
            let s_xy = &m.m_xy + &(outer(dx.view(), dy.view()) * m.weight);
            let s_0t = &s_xy + &s_xy.t();

            (mean.clone(), mean, s_00, s_0t, 2.0 * m.weight)
        } else {
            (
                m.mean_x.clone(),
                m.mean_y.clone(),
                m.m_xx.clone(),
                m.m_xy.clone(),
                m.weight,
            )
        };

        if !self.remove_data_mean {
            s_00 = &s_00 + &(outer(mean.view(), mean.view()) * total);
            s_0t = &s_0t + &(outer(mean.view(), mean_tau.view()) * total);
        }

        let norm = if self.bessel { total - 1.0 } else { total };
        if norm <= 0.0 {
            return Err(TicaError::InsufficientData(format!(
                "total weight {} is too small to normalize the covariances",
                total
            )));
        }

        Ok(Covariances {
            mean,
            mean_tau,
            cov: s_00 / norm,
            cov_tau: s_0t / norm,
            weight: m.weight,
        })
    }
}
