//! Compositing several datasets into one.
//!
//! A plain composite reduces the valid values of every input
//! at each pixel with a [`CompositeFunction`]. A coherent
//! composite instead takes all variables of a pixel from one
//! input file: pass 1 computes a source index map with a
//! [`CompositeMapFunction`], pass 2 applies it to every
//! variable with a [`CompositeMapApplicationFunction`].
//! [`run_composite`] drives either mode over whole datasets.

mod apply;
mod coherent;
mod function;
mod map;
mod reduction;
mod runner;

pub use apply::{CompositeMapApplicationCollector, CompositeMapApplicationFunction};
pub use coherent::{CoherentMap, CoherentMapBuilder, ComputedMap, MapStorage, INPUT_FILES_ATTR, SOURCE_INDEX};
pub use function::CompositeFunction;
pub use map::{CompositeMapFunction, Optimization, NO_SOURCE};
pub use reduction::{Method, ReduceFn, Reduction, ValidThreshold};
pub use runner::{find_zenith_variable, run_composite, CompositeConfig, OptimalVariable};
