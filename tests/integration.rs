//! Integration tests for the TICA library

use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array1, Array2};
use num_complex::Complex64;
use tica::prelude::*;
use tica::tica::implied_timescales;

fn mixing() -> Array2<f64> {
    array![[1.0, 0.5, 0.0], [0.0, 1.0, 0.5], [0.3, 0.0, 1.0]]
}

fn mixed_ar1(n_steps: usize, seed: u64) -> Array2<f64> {
    Ar1Process::new(vec![0.9, 0.5, 0.1])
        .with_mixing(mixing())
        .generate(n_steps, seed)
}

/// The slowest process of a mixed AR(1) system is recovered
#[test]
fn test_ar1_slowest_timescale() {
    let data = mixed_ar1(50_000, 3);
    let mut tica = Tica::new(TicaConfig::with_lag(1)).unwrap();
    tica.estimate(&data).unwrap();

    let timescales = tica.timescales().unwrap();
    let expected = -1.0 / 0.9f64.ln();
    assert!((timescales[0] - expected).abs() / expected < 0.1);
    assert!(timescales[0] > timescales[1]);
    assert!(timescales[1] > timescales[2]);
}

/// Cumulative variance is monotone and ends at one
#[test]
fn test_cumvar_properties() {
    let mut tica = Tica::new(TicaConfig::with_lag(2)).unwrap();
    tica.estimate(&mixed_ar1(10_000, 5)).unwrap();

    let cumvar = tica.cumvar().unwrap().clone();
    for w in cumvar.windows(2) {
        assert!(w[1] >= w[0]);
    }
    assert_abs_diff_eq!(cumvar[cumvar.len() - 1], 1.0, epsilon = 1e-8);
}

/// Output dimension follows the variance cutoff after diagonalization
#[test]
fn test_dimension_from_var_cutoff() {
    let mut tica = Tica::new(TicaConfig::with_lag(1).with_var_cutoff(0.9)).unwrap();
    assert_eq!(tica.dimension(), Err(TicaError::DimensionIndeterminate));

    tica.estimate(&mixed_ar1(20_000, 11)).unwrap();
    let dim = tica.dimension().unwrap();
    let cumvar = tica.cumvar().unwrap().clone();

    assert!(cumvar[dim - 1] >= 0.9);
    if dim > 1 {
        assert!(cumvar[dim - 2] < 0.9);
    }

    let data = mixed_ar1(100, 12);
    let y = tica.transform(data.view()).unwrap();
    assert_eq!(y.dim(), (100, dim));
}

/// A fixed dimension caps the output after diagonalization too
#[test]
fn test_fixed_dimension() {
    let mut tica = Tica::new(TicaConfig::with_lag(1).with_dim(1)).unwrap();
    assert_eq!(tica.dimension(), Ok(1));
    tica.estimate(&mixed_ar1(5_000, 1)).unwrap();
    assert_eq!(tica.dimension(), Ok(1));
    assert_eq!(tica.describe(), "TICA, lag=1; max output dim=1");
}

/// Without scaling the transform is a plain projection of the centered data
#[test]
fn test_transform_matches_projection() {
    let data = mixed_ar1(10_000, 21);
    let mut tica = Tica::new(TicaConfig::with_lag(1).with_dim(2).unscaled()).unwrap();
    tica.estimate(&data).unwrap();

    let frames = data.slice(s![..50, ..]);
    let y = tica.transform(frames).unwrap().into_real().unwrap();

    let mean = tica.mean().unwrap().clone();
    let vectors = tica.eigenvectors().unwrap().slice(s![.., ..2]).mapv(|v| v.re);
    let expected = (&frames - &mean).dot(&vectors);
    for (a, b) in y.iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

/// Transformed output has unit variance and is uncorrelated
#[test]
fn test_components_are_whitened() {
    let data = mixed_ar1(20_000, 8);
    let mut tica = Tica::new(TicaConfig::with_lag(1).with_var_cutoff(1.0).unscaled()).unwrap();
    tica.estimate(&data).unwrap();

    let y = tica.transform(data.view()).unwrap().into_real().unwrap();
    let n = y.nrows() as f64;
    let cov = y.t().dot(&y) / (n - 1.0);
    for i in 0..cov.nrows() {
        for j in 0..cov.ncols() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(cov[[i, j]], expected, epsilon = 5e-3);
        }
    }
}

/// Diagonalizing twice changes nothing
#[test]
fn test_diagonalize_idempotent() {
    let mut tica = Tica::new(TicaConfig::with_lag(1)).unwrap();
    tica.partial_fit(&mixed_ar1(5_000, 2)).unwrap();

    tica.diagonalize().unwrap();
    let first = tica.eigenvalues().unwrap().clone();
    tica.diagonalize().unwrap();
    assert_eq!(tica.eigenvalues().unwrap(), &first);
    assert_eq!(tica.state(), EstimationState::Diagonalized);
}

/// Streaming over two halves equals one estimate over both trajectories
#[test]
fn test_partial_fit_matches_estimate() {
    let first = mixed_ar1(4_000, 31);
    let second = mixed_ar1(3_000, 32);

    let mut streamed = Tica::new(TicaConfig::with_lag(2)).unwrap();
    streamed.partial_fit(&first).unwrap();
    streamed.partial_fit(&second).unwrap();

    let source = TrajectorySource::new(vec![first, second]).unwrap();
    let mut batch = Tica::new(TicaConfig::with_lag(2)).unwrap();
    batch.estimate(&source).unwrap();

    for (a, b) in streamed.mean().unwrap().iter().zip(batch.mean().unwrap().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
    for (a, b) in streamed.cov().unwrap().iter().zip(batch.cov().unwrap().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
    for (a, b) in streamed.cov_tau().unwrap().iter().zip(batch.cov_tau().unwrap().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }

    let streamed_ev = streamed.eigenvalues().unwrap().clone();
    let batch_ev = batch.eigenvalues().unwrap().clone();
    for (a, b) in streamed_ev.iter().zip(batch_ev.iter()) {
        assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-8);
    }

    let outputs = batch.transform_source(&source).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1].dim().0, 3_000);
}

/// Timescales follow -lag / ln|λ| and diverge at |λ| = 1
#[test]
fn test_timescale_formula() {
    let eigenvalues: Array1<Complex64> = array![
        Complex64::new(1.0, 0.0),
        Complex64::new(0.5, 0.0),
        Complex64::new(0.0, 0.25)
    ];
    let t = implied_timescales(&eigenvalues, 4);
    assert!(t[0].is_infinite() && t[0] > 0.0);
    assert_abs_diff_eq!(t[1], -4.0 / 0.5f64.ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(t[2], -4.0 / 0.25f64.ln(), epsilon = 1e-12);
}

/// Conflicting options are rejected
#[test]
fn test_configuration_conflicts() {
    assert!(matches!(
        Tica::new(TicaConfig::with_lag(1).with_dim(2).with_var_cutoff(0.5)),
        Err(TicaError::Configuration(_))
    ));
    assert!(matches!(Tica::new(TicaConfig::with_lag(0)), Err(TicaError::Configuration(_))));

    let mut tica = Tica::new(TicaConfig::with_lag(1).with_dim(1)).unwrap();
    tica.estimate(&mixed_ar1(2_000, 4)).unwrap();
    tica.set_commute_map(true);
    let data = mixed_ar1(10, 5);
    assert!(matches!(tica.transform(data.view()), Err(TicaError::Configuration(_))));

    tica.set_kinetic_map(false);
    assert!(tica.transform(data.view()).is_ok());
}

/// Too few frames for a single pair
#[test]
fn test_insufficient_data() {
    let mut tica = Tica::new(TicaConfig::with_lag(10)).unwrap();
    let data = mixed_ar1(5, 1);
    assert!(matches!(tica.estimate(&data), Err(TicaError::InsufficientData(_))));
}

/// Feature correlations of a unit-norm basis lie in [-1, 1]
#[test]
fn test_feature_correlation_bounds() {
    let mut tica = Tica::new(TicaConfig::with_lag(1).with_dim(2)).unwrap();
    tica.estimate(&mixed_ar1(10_000, 13)).unwrap();

    let corr = tica.feature_correlation().unwrap().into_real().unwrap();
    assert_eq!(corr.dim(), (3, 2));
    assert!(corr.iter().all(|c| c.abs() <= 1.0 + 1e-8));
}

/// Equilibrium correction recovers the dynamics from a trajectory started far
/// from equilibrium
#[test]
fn test_equilibrium_corrected_ar1() {
    let process = Ar1Process::new(vec![0.9, 0.5]).with_mixing(array![[1.0, 0.5], [0.0, 1.0]]);
    let data = process.generate_from(array![3.0, 3.0], 50_000, 17);

    let config = TicaConfig::with_lag(1).unscaled();
    let mut tica = Tica::equilibrium_corrected(config).unwrap();
    tica.estimate(&data).unwrap();
    assert_eq!(tica.state(), EstimationState::Diagonalized);

    let eigenvalues = tica.eigenvalues().unwrap().clone();
    assert_abs_diff_eq!(eigenvalues[0].re, 1.0, epsilon = 0.02);
    assert_abs_diff_eq!(eigenvalues[1].re, 0.9, epsilon = 0.05);

    let weights = tica.koopman_weights().unwrap().weights(data.view());
    assert_eq!(weights.len(), data.nrows());

    let dim = tica.dimension().unwrap();
    let y = tica.transform(data.slice(s![..20, ..])).unwrap();
    assert!(y.is_real());
    assert_eq!(y.dim(), (20, dim));
    assert_eq!(tica.offset().unwrap().len(), tica.projection().unwrap().ncols());
}
