//! The TICA estimator

use super::equilibrium;
use super::model::{implied_timescales, EquilibriumModel, EstimationState, Spectrum, TicaModel};
use super::output::{commute_map_scaling, feature_correlation, project, TicaOutput};
use crate::config::TicaConfig;
use crate::covariance::{CovarianceEstimator, Covariances};
use crate::data::{ChunkParams, DataSource};
use crate::error::{Result, TicaError};
use crate::koopman::KoopmanWeights;
use crate::linalg::eig_corr;
use ndarray::{s, Array1, Array2, ArrayView2};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Which flavour of TICA an estimator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicaKind {
    /// Direct generalized eigenproblem on mean-free covariances
    Standard,
    /// Koopman-reweighted estimate for non-equilibrium data
    EquilibriumCorrected,
}

#[derive(Debug, Clone)]
struct StandardState {
    covar: CovarianceEstimator,
    model: TicaModel,
}

impl StandardState {
    fn diagonalize(&mut self, config: &TicaConfig) -> Result<()> {
        if self.model.spectrum().is_some() {
            return Ok(());
        }
        let c = self.model.covariances().ok_or(TicaError::NotEstimated)?;

        debug!("diagonalize Cov and Cov_tau.");
        let pairs = eig_corr(&c.cov, &c.cov_tau, config.epsilon, config.reversible)?;
        debug!("finished diagonalisation.");

        let spectrum = Spectrum::from_eigenpairs(pairs)?;
        self.model.set_spectrum(spectrum);
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Variant {
    Standard(StandardState),
    EquilibriumCorrected(Option<EquilibriumModel>),
}

/// Time-lagged independent component analysis.
///
/// Given covariances `C0` and `Cτ` of a time series, finds the components
/// `r_i` solving `Cτ r_i = λ_i C0 r_i`, ordered by the norm of their
/// autocorrelation `λ_i`. The eigendecomposition is computed lazily: it
/// runs on first access to any derived quantity after new data arrived.
#[derive(Debug, Clone)]
pub struct Tica {
    config: TicaConfig,
    input_dim: Option<usize>,
    variant: Variant,
}

impl Tica {
    /// Standard TICA
    pub fn new(config: TicaConfig) -> Result<Self> {
        config.validate()?;
        let covar =
            CovarianceEstimator::new(ChunkParams::from(&config)).reversible(config.reversible);
        Ok(Self {
            config,
            input_dim: None,
            variant: Variant::Standard(StandardState {
                covar,
                model: TicaModel::new(),
            }),
        })
    }

    /// Equilibrium-corrected TICA. Kinetic and commute map scaling are not
    /// defined for this variant and must be switched off.
    pub fn equilibrium_corrected(config: TicaConfig) -> Result<Self> {
        config.validate()?;
        Self::check_no_scaling(&config)?;
        Ok(Self {
            config,
            input_dim: None,
            variant: Variant::EquilibriumCorrected(None),
        })
    }

    /// Declare the input dimension before any data is seen
    pub fn with_input_dimension(mut self, dim: usize) -> Self {
        self.input_dim = Some(dim);
        self
    }

    pub fn config(&self) -> &TicaConfig {
        &self.config
    }

    pub fn lag(&self) -> usize {
        self.config.lag
    }

    pub fn kind(&self) -> TicaKind {
        match self.variant {
            Variant::Standard(_) => TicaKind::Standard,
            Variant::EquilibriumCorrected(_) => TicaKind::EquilibriumCorrected,
        }
    }

    pub fn state(&self) -> EstimationState {
        match &self.variant {
            Variant::Standard(state) => state.model.state(),
            Variant::EquilibriumCorrected(None) => EstimationState::Unestimated,
            Variant::EquilibriumCorrected(Some(_)) => EstimationState::Diagonalized,
        }
    }

    /// Switch kinetic map scaling. Conflicts are reported by `transform`.
    pub fn set_kinetic_map(&mut self, enabled: bool) {
        self.config.kinetic_map = enabled;
    }

    /// Switch commute map scaling. Conflicts are reported by `transform`.
    pub fn set_commute_map(&mut self, enabled: bool) {
        self.config.commute_map = enabled;
    }

    /// Incrementally update mean and covariances with more data.
    ///
    /// The eigendecomposition is recomputed on the next access to a derived
    /// quantity.
    pub fn partial_fit<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let indim = source.dimension();
        self.check_output_dimension(indim)?;

        match &mut self.variant {
            Variant::Standard(state) => {
                state.covar.partial_fit(source)?;
                let covariances = state.covar.covariances()?;
                state.model.set_covariances(covariances);
            }
            Variant::EquilibriumCorrected(_) => {
                return Err(TicaError::Unsupported(
                    "equilibrium-corrected TICA needs two passes over the data, \
                     use estimate()"
                        .into(),
                ))
            }
        }

        self.input_dim = Some(indim);
        Ok(())
    }

    /// Estimate from scratch over the whole source and diagonalize
    pub fn estimate<S: DataSource + ?Sized>(&mut self, source: &S) -> Result<()> {
        let indim = source.dimension();
        self.check_output_dimension(indim)?;

        debug!(
            "Running TICA with tau={}; Estimating two covariance matrices with dimension ({}, {})",
            self.config.lag, indim, indim
        );

        match &mut self.variant {
            Variant::Standard(state) => {
                // a failed estimate leaves the estimator unestimated
                state.model = TicaModel::new();
                let covariances = state.covar.estimate(source)?;
                state.model.set_covariances(covariances);
                state.diagonalize(&self.config)?;
            }
            Variant::EquilibriumCorrected(model) => {
                *model = None;
                *model = Some(equilibrium::estimate(&self.config, source)?);
            }
        }

        self.input_dim = Some(indim);
        Ok(())
    }

    /// Compute and cache the eigendecomposition if it is stale
    pub fn diagonalize(&mut self) -> Result<()> {
        match &mut self.variant {
            Variant::Standard(state) => state.diagonalize(&self.config),
            Variant::EquilibriumCorrected(model) => {
                model.as_ref().map(|_| ()).ok_or(TicaError::NotEstimated)
            }
        }
    }

    /// Output dimension.
    ///
    /// A fixed `dim` is returned as is until the estimator is diagonalized.
    /// Afterwards the number of components is limited by the numerical rank,
    /// the variance cutoff and `dim`. Before diagonalization with a variance
    /// cutoff of one, the input dimension is returned.
    pub fn dimension(&self) -> Result<usize> {
        let var_cutoff = self.config.effective_var_cutoff();

        if let Some((eigenvalues, cumvar)) = self.cached_spectrum() {
            let mut dim = eigenvalues.len();
            if var_cutoff < 1.0 {
                dim = dim.min(search_sorted(cumvar, var_cutoff) + 1);
            }
            if let Some(fixed) = self.config.dim {
                dim = dim.min(fixed);
            }
            return Ok(dim);
        }

        if let Some(fixed) = self.config.dim {
            return Ok(fixed);
        }
        if var_cutoff == 1.0 {
            return self.input_dim.ok_or(TicaError::NotEstimated);
        }
        Err(TicaError::DimensionIndeterminate)
    }

    /// Project `x` (frames as rows) onto the leading `dimension()` components
    pub fn transform(&mut self, x: ArrayView2<f64>) -> Result<TicaOutput> {
        match self.variant {
            Variant::Standard(_) => self.config.validate_scaling()?,
            Variant::EquilibriumCorrected(_) => Self::check_no_scaling(&self.config)?,
        }
        self.diagonalize()?;
        let dim = self.dimension()?;

        match &self.variant {
            Variant::Standard(state) => {
                let (c, spectrum) = standard_results(state)?;
                check_features(c.mean.len(), x.ncols())?;

                let centered = &x - &c.mean;
                let vectors = spectrum.eigenvectors.slice(s![.., ..dim]);
                let scaling = self.scaling(spectrum, dim);
                Ok(project(centered.view(), vectors, scaling.as_ref().map(|s| s.view())))
            }
            Variant::EquilibriumCorrected(model) => {
                let model = model.as_ref().ok_or(TicaError::NotEstimated)?;
                check_features(model.projection.nrows(), x.ncols())?;

                let y = x.dot(&model.projection.slice(s![.., ..dim]))
                    + &model.offset.slice(s![..dim]);
                Ok(TicaOutput::Real(y))
            }
        }
    }

    /// Transform every trajectory of a source
    pub fn transform_source<S: DataSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<Vec<TicaOutput>> {
        source
            .trajectories()
            .into_iter()
            .map(|trajectory| self.transform(trajectory))
            .collect()
    }

    /// Implied timescales `-lag / ln|λ_i|`
    pub fn timescales(&mut self) -> Result<Array1<f64>> {
        let lag = self.config.lag;
        Ok(implied_timescales(self.eigenvalues()?, lag))
    }

    /// Instantaneous correlation between input features (rows) and the
    /// leading `dimension()` components (columns)
    pub fn feature_correlation(&mut self) -> Result<TicaOutput> {
        self.diagonalize()?;
        let dim = self.dimension()?;
        let state = self.standard("feature_correlation")?;
        let (c, spectrum) = standard_results(state)?;
        Ok(feature_correlation(&c.cov, spectrum.eigenvectors.slice(s![.., ..dim])))
    }

    /// Short human-readable summary
    pub fn describe(&self) -> String {
        self.to_string()
    }

    /// Mean of the input features
    pub fn mean(&self) -> Result<&Array1<f64>> {
        match &self.variant {
            Variant::Standard(state) => {
                Ok(&state.model.covariances().ok_or(TicaError::NotEstimated)?.mean)
            }
            Variant::EquilibriumCorrected(model) => {
                Ok(&model.as_ref().ok_or(TicaError::NotEstimated)?.mean)
            }
        }
    }

    /// Instantaneous covariance C0
    pub fn cov(&self) -> Result<&Array2<f64>> {
        let state = self.standard("cov")?;
        Ok(&state.model.covariances().ok_or(TicaError::NotEstimated)?.cov)
    }

    /// Time-lagged covariance Cτ
    pub fn cov_tau(&self) -> Result<&Array2<f64>> {
        let state = self.standard("cov_tau")?;
        Ok(&state.model.covariances().ok_or(TicaError::NotEstimated)?.cov_tau)
    }

    /// TICA eigenvalues, sorted by descending norm
    pub fn eigenvalues(&mut self) -> Result<&Array1<Complex64>> {
        self.diagonalize()?;
        self.cached_spectrum()
            .map(|(eigenvalues, _)| eigenvalues)
            .ok_or(TicaError::NotEstimated)
    }

    /// Cumulative kinetic variance of the eigenvalues
    pub fn cumvar(&mut self) -> Result<&Array1<f64>> {
        self.diagonalize()?;
        self.cached_spectrum()
            .map(|(_, cumvar)| cumvar)
            .ok_or(TicaError::NotEstimated)
    }

    /// TICA eigenvectors as columns
    pub fn eigenvectors(&mut self) -> Result<&Array2<Complex64>> {
        self.diagonalize()?;
        let state = self.standard("eigenvectors")?;
        Ok(&standard_results(state)?.1.eigenvectors)
    }

    /// Linear part of the equilibrium-corrected transform, all components
    pub fn projection(&self) -> Result<&Array2<f64>> {
        Ok(&self.equilibrium_model("projection")?.projection)
    }

    /// Additive part of the equilibrium-corrected transform, all components
    pub fn offset(&self) -> Result<&Array1<f64>> {
        Ok(&self.equilibrium_model("offset")?.offset)
    }

    /// Equilibrium weights estimated by the Koopman reweighting
    pub fn koopman_weights(&self) -> Result<&KoopmanWeights> {
        Ok(&self.equilibrium_model("koopman_weights")?.weights)
    }

    fn check_output_dimension(&self, indim: usize) -> Result<()> {
        match self.config.dim {
            Some(requested) if requested > indim => Err(TicaError::DimensionMismatch {
                requested,
                available: indim,
            }),
            _ => Ok(()),
        }
    }

    fn check_no_scaling(config: &TicaConfig) -> Result<()> {
        if config.kinetic_map || config.commute_map {
            return Err(TicaError::Configuration(
                "kinetic_map and commute_map are not defined for equilibrium-corrected TICA".into(),
            ));
        }
        Ok(())
    }

    /// Eigenvalues and cumvar if already computed, without triggering a diagonalization
    fn cached_spectrum(&self) -> Option<(&Array1<Complex64>, &Array1<f64>)> {
        match &self.variant {
            Variant::Standard(state) => state.model.spectrum().map(|s| (&s.eigenvalues, &s.cumvar)),
            Variant::EquilibriumCorrected(model) => {
                model.as_ref().map(|m| (&m.eigenvalues, &m.cumvar))
            }
        }
    }

    fn scaling(&self, spectrum: &Spectrum, dim: usize) -> Option<Array1<Complex64>> {
        if self.config.kinetic_map {
            Some(spectrum.eigenvalues.slice(s![..dim]).to_owned())
        } else if self.config.commute_map {
            let leading = spectrum.eigenvalues.slice(s![..dim]).to_owned();
            let timescales = implied_timescales(&leading, self.config.lag);
            let factors = commute_map_scaling(timescales.view(), self.config.lag);
            Some(factors.mapv(|f| Complex64::new(f, 0.0)))
        } else {
            None
        }
    }

    fn standard(&self, what: &str) -> Result<&StandardState> {
        match &self.variant {
            Variant::Standard(state) => Ok(state),
            Variant::EquilibriumCorrected(_) => Err(TicaError::Unsupported(format!(
                "{} is not available for equilibrium-corrected TICA",
                what
            ))),
        }
    }

    fn equilibrium_model(&self, what: &str) -> Result<&EquilibriumModel> {
        match &self.variant {
            Variant::EquilibriumCorrected(model) => model.as_ref().ok_or(TicaError::NotEstimated),
            Variant::Standard(_) => Err(TicaError::Unsupported(format!(
                "{} is only available for equilibrium-corrected TICA",
                what
            ))),
        }
    }
}

impl fmt::Display for Tica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dimension() {
            Ok(dim) => write!(f, "TICA, lag={}; max output dim={}", self.config.lag, dim),
            Err(_) => write!(f, "TICA, lag={}; max output dim=?", self.config.lag),
        }
    }
}

fn standard_results(state: &StandardState) -> Result<(&Covariances, &Spectrum)> {
    let c = state.model.covariances().ok_or(TicaError::NotEstimated)?;
    let spectrum = state.model.spectrum().ok_or(TicaError::NotEstimated)?;
    Ok((c, spectrum))
}

fn check_features(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(TicaError::FeatureMismatch { expected, found });
    }
    Ok(())
}

/// Number of entries of the ascending `values` strictly below `target`
fn search_sorted(values: &Array1<f64>, target: f64) -> usize {
    values.iter().take_while(|&&v| v < target).count()
}
