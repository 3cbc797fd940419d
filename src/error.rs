//! Failure classes that drivers need to tell apart.
//!
//! Most of the crate reports errors as plain
//! [`anyhow::Error`] values with context attached. The
//! variants here are raised where a failure belongs to a
//! class that changes how it is reported: bad option
//! combinations, inputs that don't fit together, and
//! allocation failure.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    /// Option combination that can't be run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inputs that are inconsistent with each other or with
    /// the requested operation.
    #[error("validation error: {0}")]
    Validation(String),

    /// A buffer could not be allocated.
    #[error("out of memory allocating {values} values of {type_name}")]
    ResourceExhausted {
        values: usize,
        type_name: &'static str,
    },
}

impl ToolError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        ToolError::Configuration(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        ToolError::Validation(msg.into())
    }

    /// Search an error chain for an out-of-memory failure.
    pub fn is_resource_exhausted(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<ToolError>(),
                Some(ToolError::ResourceExhausted { .. })
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn resource_exhaustion_found_under_context() {
        let err: anyhow::Error = ToolError::ResourceExhausted {
            values: 10,
            type_name: "f32",
        }
        .into();
        let err = Err::<(), _>(err).context("compositing sst").unwrap_err();
        assert!(ToolError::is_resource_exhausted(&err));

        let other = anyhow::Error::from(ToolError::validation("no variables"));
        assert!(!ToolError::is_resource_exhausted(&other));
    }
}
