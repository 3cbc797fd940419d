//! The chunk computation engine.
//!
//! A computation for one chunk position reads one chunk from
//! each of a list of [`ChunkProducer`]s (through a
//! [`Collector`]), reduces them with a [`ChunkFunction`] and
//! hands the result to a [`ChunkConsumer`]. The
//! [`PoolProcessor`] runs a [`ChunkOperation`] over a list of
//! positions, serially or on a bounded worker pool.
//!
//! Positions of one run are independent: an operation must
//! never depend on the outcome of another position of the
//! same run. Producers and consumers are shared across
//! workers and must support concurrent access for distinct
//! positions.

mod collector;
mod computation;
mod consumer;
mod function;
mod pool;
mod producer;

pub use collector::{ChunkCollector, Collector};
pub use computation::{ChunkComputation, ChunkOperation, ComputationTimes, TimesSummary};
pub use consumer::ChunkConsumer;
pub use function::ChunkFunction;
pub use pool::{run_operation, Execution, PoolProcessor, PoolState, ProgressFactory, ProgressFn};
pub use producer::{ChunkProducer, GridChunkProducer, SyntheticChunkProducer};
