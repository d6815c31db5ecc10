//! Koopman matrix estimation on a whitened, constant-augmented basis

use super::weights::KoopmanWeights;
use crate::covariance::CovarianceEstimator;
use crate::data::{ChunkParams, DataSource};
use crate::error::{Result, TicaError};
use crate::linalg::{spd_inv_split, Eigenpairs};
use ndarray::{concatenate, s, Array1, Array2, ArrayView2, Axis};
use tracing::debug;

/// Result of a Koopman estimation
#[derive(Debug, Clone)]
pub struct KoopmanModel {
    /// Koopman matrix on the basis `[(x - μ)·R, 1]`, shape `(M+1, M+1)`
    pub koopman_matrix: Array2<f64>,
    /// Whitening transform `R` of the mean-free data, shape `(d, M)`
    pub whitening: Array2<f64>,
    /// Mean of the time origins
    pub mean: Array1<f64>,
    /// Dominant left eigenvector of the Koopman matrix, last entry 1
    pub u: Array1<f64>,
}

impl KoopmanModel {
    /// Rank `M` of the whitened basis (without the constant)
    pub fn rank(&self) -> usize {
        self.whitening.ncols()
    }

    /// Equilibrium weight function of this model
    pub fn weights(&self) -> KoopmanWeights {
        let m = self.rank();
        KoopmanWeights::new(
            self.u.slice(s![..m]).to_owned(),
            self.u[m],
            self.whitening.clone(),
            self.mean.clone(),
        )
    }
}

/// Estimates the Koopman matrix of a (possibly non-equilibrium) data set.
///
/// The data is whitened with the low-rank inverse square root `R` of its
/// covariance and padded with a constant function. In this basis the
/// time-lagged regression reads
///
/// ```text
/// K = | Rᵀ Cτ R          0 |
///     | (μ_τ - μ) R      1 |
/// ```
#[derive(Debug, Clone)]
pub struct KoopmanEstimator {
    epsilon: f64,
    covar: CovarianceEstimator,
    model: Option<KoopmanModel>,
}

impl KoopmanEstimator {
    pub fn new(params: ChunkParams, epsilon: f64) -> Self {
        Self {
            epsilon,
            covar: CovarianceEstimator::new(params)
                .reversible(false)
                .bessel(false)
                .remove_data_mean(true),
            model: None,
        }
    }

    pub fn lag(&self) -> usize {
        self.covar.params().lag
    }

    /// Add data and re-estimate the Koopman matrix
    pub fn partial_fit<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<&KoopmanModel> {
        self.covar.partial_fit(source)?;
        self.finalize()
    }

    /// Estimate from scratch over the whole source
    pub fn estimate<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<&KoopmanModel> {
        self.covar.reset();
        self.partial_fit(source)
    }

    pub fn model(&self) -> Result<&KoopmanModel> {
        self.model.as_ref().ok_or(TicaError::NotEstimated)
    }

    /// Equilibrium weight function
    pub fn weights(&self) -> Result<KoopmanWeights> {
        Ok(self.model()?.weights())
    }

    /// Map frames onto the whitened, constant-augmented basis
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let model = self.model()?;
        if x.ncols() != model.mean.len() {
            return Err(TicaError::FeatureMismatch {
                expected: model.mean.len(),
                found: x.ncols(),
            });
        }
        let z = (&x - &model.mean).dot(&model.whitening);
        let ones = Array2::<f64>::ones((x.nrows(), 1));
        concatenate(Axis(1), &[z.view(), ones.view()])
            .map_err(|e| TicaError::Numerical(format!("failed to pad basis: {}", e)))
    }

    fn finalize(&mut self) -> Result<&KoopmanModel> {
        let c = self.covar.covariances()?;
        let r = spd_inv_split(&c.cov, self.epsilon, true)?;
        let m = r.ncols();

        let mut k = Array2::zeros((m + 1, m + 1));
        k.slice_mut(s![..m, ..m]).assign(&r.t().dot(&c.cov_tau).dot(&r));
        k.slice_mut(s![m, ..m]).assign(&(&c.mean_tau - &c.mean).dot(&r));
        k[[m, m]] = 1.0;

        let u = dominant_left_eigenvector(&k)?;
        debug!("estimated Koopman matrix of rank {} (+1 constant)", m);

        self.model = Some(KoopmanModel {
            koopman_matrix: k,
            whitening: r,
            mean: c.mean,
            u,
        });
        self.model()
    }
}

/// Real part of the largest-norm eigenvector of `Kᵀ`, scaled so that its
/// last entry (the constant function) is one
fn dominant_left_eigenvector(k: &Array2<f64>) -> Result<Array1<f64>> {
    let pairs = Eigenpairs::from_general(&k.t().to_owned())?.sort_by_norm();
    let u = pairs.eigenvectors.column(0).mapv(|v| v.re);

    let last = u[u.len() - 1];
    if last.abs() < f64::EPSILON {
        return Err(TicaError::Numerical(
            "stationary vector of the Koopman matrix has no constant component".into(),
        ));
    }
    Ok(u / last)
}
