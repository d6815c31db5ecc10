//! Trajectory sources and time-lagged chunk iteration

use crate::config::TicaConfig;
use crate::error::{Result, TicaError};
use ndarray::{Array2, ArrayView2, Axis, Slice};
use tracing::warn;

/// Parameters for walking a source in time-lagged chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Offset between the two halves of a pair
    pub lag: usize,
    /// Step between consecutive time origins
    pub stride: usize,
    /// Frames dropped at the start of each trajectory
    pub skip: usize,
    /// Maximum number of pairs per chunk
    pub chunksize: usize,
}

impl ChunkParams {
    pub fn new(lag: usize) -> Self {
        Self {
            lag,
            stride: 1,
            skip: 0,
            chunksize: 5000,
        }
    }

    /// Number of time-lagged pairs a trajectory of `n_frames` yields
    pub fn n_pairs(&self, n_frames: usize) -> usize {
        let first_invalid = self.skip + self.lag;
        if n_frames <= first_invalid {
            0
        } else {
            (n_frames - first_invalid - 1) / self.stride + 1
        }
    }
}

impl From<&TicaConfig> for ChunkParams {
    fn from(config: &TicaConfig) -> Self {
        Self {
            lag: config.lag,
            stride: config.stride,
            skip: config.skip,
            chunksize: config.chunksize,
        }
    }
}

/// One chunk of time-lagged pairs: row `i` of `y` is `lag` frames after row `i` of `x`
#[derive(Debug, Clone, Copy)]
pub struct LaggedChunk<'a> {
    pub x: ArrayView2<'a, f64>,
    pub y: ArrayView2<'a, f64>,
}

impl<'a> LaggedChunk<'a> {
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

/// A source of multivariate time series
pub trait DataSource {
    /// Number of features per frame
    fn dimension(&self) -> usize;

    /// Views of all trajectories, frames as rows
    fn trajectories(&self) -> Vec<ArrayView2<'_, f64>>;

    /// Total number of frames over all trajectories
    fn n_frames(&self) -> usize {
        self.trajectories().iter().map(|t| t.nrows()).sum()
    }

    /// Iterate over time-lagged pairs in chunks. Pairs never cross trajectory boundaries.
    fn lagged_chunks(&self, params: ChunkParams) -> LaggedChunks<'_> {
        LaggedChunks::new(self.trajectories(), params)
    }
}

/// A single trajectory
impl DataSource for Array2<f64> {
    fn dimension(&self) -> usize {
        self.ncols()
    }

    fn trajectories(&self) -> Vec<ArrayView2<'_, f64>> {
        vec![self.view()]
    }
}

/// Independent trajectories sharing the same feature space
#[derive(Debug, Clone)]
pub struct TrajectorySource {
    trajectories: Vec<Array2<f64>>,
    dimension: usize,
}

impl TrajectorySource {
    /// Create a source from trajectories. All must have the same number of columns.
    pub fn new(trajectories: Vec<Array2<f64>>) -> Result<Self> {
        let dimension = trajectories.first().map(|t| t.ncols()).ok_or_else(|| {
            TicaError::InsufficientData("a trajectory source needs at least one trajectory".into())
        })?;

        if let Some(bad) = trajectories.iter().find(|t| t.ncols() != dimension) {
            return Err(TicaError::FeatureMismatch {
                expected: dimension,
                found: bad.ncols(),
            });
        }

        Ok(Self {
            trajectories,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn get(&self, itraj: usize) -> Option<&Array2<f64>> {
        self.trajectories.get(itraj)
    }
}

impl DataSource for TrajectorySource {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn trajectories(&self) -> Vec<ArrayView2<'_, f64>> {
        self.trajectories.iter().map(|t| t.view()).collect()
    }
}

/// Iterator over `LaggedChunk`s of a list of trajectories
pub struct LaggedChunks<'a> {
    trajectories: Vec<ArrayView2<'a, f64>>,
    params: ChunkParams,
    itraj: usize,
    next_pair: usize,
}

impl<'a> LaggedChunks<'a> {
    pub fn new(trajectories: Vec<ArrayView2<'a, f64>>, params: ChunkParams) -> Self {
        Self {
            trajectories,
            params,
            itraj: 0,
            next_pair: 0,
        }
    }

    fn rows(
        &self,
        traj: ArrayView2<'a, f64>,
        first_pair: usize,
        n: usize,
        offset: usize,
    ) -> ArrayView2<'a, f64> {
        let stride = self.params.stride;
        let start = self.params.skip + first_pair * stride + offset;
        let end = start + (n - 1) * stride + 1;
        let mut rows = traj;
        rows.slice_axis_inplace(
            Axis(0),
            Slice::new(start as isize, Some(end as isize), stride as isize),
        );
        rows
    }
}

impl<'a> Iterator for LaggedChunks<'a> {
    type Item = LaggedChunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.itraj < self.trajectories.len() {
            let traj = self.trajectories[self.itraj];
            let total = self.params.n_pairs(traj.nrows());

            if total == 0 && self.next_pair == 0 {
                warn!(
                    "trajectory {} has {} frames, too short for lag {} (skip {}); ignoring it",
                    self.itraj,
                    traj.nrows(),
                    self.params.lag,
                    self.params.skip
                );
            }

            if self.next_pair < total {
                let n = (total - self.next_pair).min(self.params.chunksize.max(1));
                let x = self.rows(traj, self.next_pair, n, 0);
                let y = self.rows(traj, self.next_pair, n, self.params.lag);
                self.next_pair += n;
                return Some(LaggedChunk { x, y });
            }

            self.itraj += 1;
            self.next_pair = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn ramp(n: usize, dim: usize) -> Array2<f64> {
        Array::from_shape_fn((n, dim), |(i, j)| (i * 10 + j) as f64)
    }

    #[test]
    fn test_n_pairs() {
        let params = ChunkParams::new(2);
        assert_eq!(params.n_pairs(10), 8);
        assert_eq!(params.n_pairs(2), 0);

        let params = ChunkParams {
            lag: 1,
            stride: 3,
            skip: 2,
            chunksize: 100,
        };
        // origins 2, 5, 8 (8 + 1 < 10)
        assert_eq!(params.n_pairs(10), 3);
    }

    #[test]
    fn test_lagged_pairs_are_offset_by_lag() {
        let data = ramp(10, 2);
        let params = ChunkParams {
            chunksize: 3,
            ..ChunkParams::new(2)
        };
        let chunks: Vec<_> = data.lagged_chunks(params).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 8);
        for chunk in &chunks {
            for (x, y) in chunk.x.outer_iter().zip(chunk.y.outer_iter()) {
                assert_eq!(y[0] - x[0], 20.0);
            }
        }
    }

    #[test]
    fn test_stride_and_skip() {
        let data = ramp(10, 1);
        let params = ChunkParams {
            lag: 1,
            stride: 3,
            skip: 2,
            chunksize: 100,
        };
        let chunk = data.lagged_chunks(params).next().unwrap();
        let x: Vec<f64> = chunk.x.column(0).to_vec();
        let y: Vec<f64> = chunk.y.column(0).to_vec();
        assert_eq!(x, vec![20.0, 50.0, 80.0]);
        assert_eq!(y, vec![30.0, 60.0, 90.0]);
    }

    #[test]
    fn test_pairs_do_not_cross_trajectories() {
        let source = TrajectorySource::new(vec![ramp(4, 1), ramp(1, 1), ramp(3, 1)]).unwrap();
        let n: usize = source.lagged_chunks(ChunkParams::new(1)).map(|c| c.len()).sum();
        assert_eq!(n, 3 + 0 + 2);
        assert_eq!(source.n_frames(), 8);
    }

    #[test]
    fn test_source_rejects_mixed_dimensions() {
        let result = TrajectorySource::new(vec![ramp(4, 2), ramp(4, 3)]);
        assert!(matches!(
            result,
            Err(TicaError::FeatureMismatch { expected: 2, found: 3 })
        ));
        assert!(TrajectorySource::new(vec![]).is_err());
    }
}
