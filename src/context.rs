//! Per-run logging context.
//!
//! Each pipeline run owns a [`LogContext`] instead of
//! consulting process-wide verbosity state. Verbose messages
//! are the user-facing progress lines printed with `-v`;
//! everything finer goes straight to `tracing::debug!`.

use std::fmt;

#[derive(Clone, Debug)]
pub struct LogContext {
    prog: &'static str,
    verbose: bool,
}

impl LogContext {
    pub fn new(prog: &'static str, verbose: bool) -> Self {
        LogContext { prog, verbose }
    }

    /// A context that never prints verbose messages.
    pub fn quiet(prog: &'static str) -> Self {
        LogContext::new(prog, false)
    }

    pub fn prog(&self) -> &'static str {
        self.prog
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        if self.verbose {
            tracing::info!(prog = self.prog, "{}", args);
        }
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(prog = self.prog, "{}", args);
    }
}

/// Emit a verbose message through a [`LogContext`].
#[macro_export]
macro_rules! verbose {
    ($ctx:expr, $($arg:tt)+) => {
        $ctx.info(format_args!($($arg)+))
    };
}
