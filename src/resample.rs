//! Resampling of grids onto a destination earth transform.
//!
//! A [`ResamplingMapFactory`] provides, for every destination
//! chunk, the source pixel each destination pixel takes its
//! value from. A [`ResamplingOperation`] applies one map to
//! any number of variables and runs on the usual
//! [`PoolProcessor`](crate::pipeline::PoolProcessor).

mod diagnostic;
mod map;
mod operation;
mod runner;

pub use diagnostic::{
    DiagnosticSample, DiagnosticSummary, ResamplingDiagnostic, DEFAULT_SAMPLING_FACTOR, DEFAULT_SEARCH_WINDOW,
    MAX_LISTED_SAMPLES,
};
pub use map::{AffineResamplingMapFactory, GridDataResamplingMapFactory, ResamplingMap, ResamplingMapFactory, TableMap};
pub use operation::ResamplingOperation;
pub use runner::{run_register, RegisterConfig, RegisterSummary, SavedMap, DEFAULT_TILE_DIMS, SOURCE_COL, SOURCE_ROW};
