//! Pipe-chained token DSL.
//!
//! `Name 'arg' | Name2 "arg2" | Name3 trailing text` runs left to right over
//! one shared [`PipelineState`]. Unknown or failing steps are reported and
//! skipped; the chain always runs to the end.

pub mod interpreter;
pub mod parse;
pub mod registry;
pub mod state;
pub mod tokens;
pub mod translate;

use miette::Diagnostic;
use thiserror::Error;

use crate::backend::BackendError;
use crate::router::capabilities::CapabilityError;
use crate::web::WebError;

pub use interpreter::{PipelineReport, StepOutcome, StepStatus, run_pipeline, run_single};
pub use registry::{TokenInfo, TokenOperation, TokenRegistry};
pub use state::{InMemoryVectorStore, PipelineState, VectorStore};

/// Errors raised by pipeline tokens and the interpreter.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("empty pipeline")]
    #[diagnostic(
        code(persona::pipeline::empty),
        help("Write at least one step, e.g. `WikiSearch 'rust'`.")
    )]
    EmptyPipeline,

    #[error("{token} needs an argument or a non-empty {field}")]
    #[diagnostic(
        code(persona::pipeline::missing_argument),
        help("Pass an argument in quotes, or run a step before this one that fills `{field}`.")
    )]
    MissingArgument { token: String, field: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Web(#[from] WebError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Longest `state.output` excerpt included in a pipeline report.
pub const OUTPUT_EXCERPT_CHARS: usize = 300;
