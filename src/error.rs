//! Rich diagnostic error types for the persona shell.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. [`ShellError`] wraps them so a caller
//! at the REPL boundary sees the full diagnostic chain.
//!
//! Only [`ShellError::Cancelled`] is allowed to unwind an interactive turn;
//! every other error is converted into a user-visible string before it
//! reaches the loop.

use miette::Diagnostic;
use thiserror::Error;

pub use crate::advisory::AdvisoryError;
pub use crate::backend::BackendError;
pub use crate::config::ConfigError;
pub use crate::paths::PathError;
pub use crate::pipeline::PipelineError;
pub use crate::router::capabilities::CapabilityError;
pub use crate::snapshot::SnapshotError;

/// Top-level error type for the shell.
#[derive(Debug, Error, Diagnostic)]
pub enum ShellError {
    #[error("turn cancelled")]
    #[diagnostic(
        code(persona::turn::cancelled),
        help("The turn was interrupted before a reply was produced. Enter a new message to continue.")
    )]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Advisory(#[from] AdvisoryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ShellError {
    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience alias for shell operations.
pub type ShellResult<T> = std::result::Result<T, ShellError>;

/// Render the innermost cause of an error chain.
///
/// Walks `source()` to the last link so a failing pipeline step reports what
/// actually went wrong rather than the wrapper that carried it.
pub fn innermost_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Middle);

    #[derive(Debug, Error)]
    #[error("middle")]
    struct Middle(#[source] std::io::Error);

    #[test]
    fn innermost_cause_walks_the_chain() {
        let err = Outer(Middle(std::io::Error::other("disk on fire")));
        assert_eq!(innermost_cause(&err), "disk on fire");
    }

    #[test]
    fn innermost_cause_of_leaf_is_itself() {
        let err = std::io::Error::other("leaf");
        assert_eq!(innermost_cause(&err), "leaf");
    }

    #[test]
    fn cancelled_is_distinguished() {
        assert!(ShellError::Cancelled.is_cancelled());
        let other: ShellError = PipelineError::EmptyPipeline.into();
        assert!(!other.is_cancelled());
    }
}
