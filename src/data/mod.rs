//! Input data sources
//!
//! - `DataSource` - trait for anything that can be iterated in time-lagged chunks
//! - `TrajectorySource` - a set of independent trajectories held in memory

mod source;

pub use source::{ChunkParams, DataSource, LaggedChunk, LaggedChunks, TrajectorySource};
