//! Command-line drivers over the `cwchunk` engine.

pub mod utils;
pub use cwchunk::{Error, Result};

pub mod proc;
pub use proc::*;

pub mod cli;
