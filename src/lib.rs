//! Chunked grid computation for earth data.
//!
//! The crate splits a destination grid into rectangular
//! chunks, gathers the input chunks each position needs from
//! a set of [`ChunkProducer`]s, runs a [`ChunkFunction`] on
//! them and hands the result to a [`ChunkConsumer`]. The
//! [`PoolProcessor`] runs such a computation over every
//! position of a [`ChunkingScheme`], either serially or on a
//! bounded worker pool.
//!
//! Compositing (pixel-wise reductions and the coherent
//! map-then-apply protocol) and resampling onto a master grid
//! are built on top of that engine.
//!
//! [`ChunkProducer`]: pipeline::ChunkProducer
//! [`ChunkConsumer`]: pipeline::ChunkConsumer
//! [`ChunkFunction`]: pipeline::ChunkFunction
//! [`PoolProcessor`]: pipeline::PoolProcessor
//! [`ChunkingScheme`]: chunking::ChunkingScheme

pub mod chunking;
pub mod composite;
pub mod context;
pub mod data;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod prelude;
pub mod resample;
pub mod stats;

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
