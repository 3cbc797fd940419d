pub use crate::{Error, Result};

pub use crate::chunking::*;
pub use crate::context::LogContext;
pub use crate::data::*;
pub use crate::dataset::*;
pub use crate::error::ToolError;
pub use crate::geometry::*;
pub use crate::pipeline::*;

pub use crate::stats::*;
