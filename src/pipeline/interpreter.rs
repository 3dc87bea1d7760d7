//! Best-effort execution of parsed pipelines.

use tokio_util::sync::CancellationToken;

use super::parse::{Step, parse_step, split_pipeline};
use super::registry::TokenRegistry;
use super::state::PipelineState;
use super::{OUTPUT_EXCERPT_CHARS, PipelineError};
use crate::error::{ShellError, ShellResult, innermost_cause};
use crate::fuzzy::containment_suggestions;
use crate::text::truncate;

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    /// The operation returned an error; the innermost cause is kept.
    Failed(String),
    Unknown { suggestions: Vec<String> },
    Unparsable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// Token name, or the raw segment when it could not be parsed.
    pub token: String,
    pub status: StepStatus,
}

/// Result of running a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub steps: Vec<StepOutcome>,
    /// Final `state.output`, untruncated.
    pub output: String,
}

impl PipelineReport {
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Ok).count()
    }

    /// Narrative summary: one line per step plus a truncated output excerpt.
    pub fn narrative(&self) -> String {
        let mut out = format!(
            "Pipeline ran {} step(s), {} succeeded.\n",
            self.steps.len(),
            self.succeeded()
        );
        for (i, step) in self.steps.iter().enumerate() {
            let line = match &step.status {
                StepStatus::Ok => format!("{}: ok", step.token),
                StepStatus::Failed(cause) => format!("{}: error: {cause}", step.token),
                StepStatus::Unknown { suggestions } if suggestions.is_empty() => {
                    format!("{}: unknown token", step.token)
                }
                StepStatus::Unknown { suggestions } => format!(
                    "{}: unknown token (did you mean {}?)",
                    step.token,
                    suggestions.join(", ")
                ),
                StepStatus::Unparsable => format!("could not parse step \"{}\"", step.token),
            };
            out.push_str(&format!("  {}. {line}\n", i + 1));
        }
        if self.output.trim().is_empty() {
            out.push_str("Output: (empty)");
        } else {
            out.push_str("Output: ");
            out.push_str(&truncate(self.output.trim(), OUTPUT_EXCERPT_CHARS));
        }
        out
    }
}

/// Run a `|`-separated pipeline against `state`.
///
/// Every step runs even if an earlier one failed. Only cancellation aborts.
pub async fn run_pipeline(
    registry: &TokenRegistry,
    state: &mut PipelineState,
    text: &str,
    cancel: &CancellationToken,
) -> ShellResult<PipelineReport> {
    let segments = split_pipeline(text);
    if segments.is_empty() {
        return Err(PipelineError::EmptyPipeline.into());
    }

    let mut steps = Vec::with_capacity(segments.len());
    for segment in segments {
        steps.push(execute_segment(registry, state, segment, cancel).await?);
    }
    Ok(PipelineReport {
        steps,
        output: state.output.clone(),
    })
}

/// Run exactly one step, no chaining.
pub async fn run_single(
    registry: &TokenRegistry,
    state: &mut PipelineState,
    text: &str,
    cancel: &CancellationToken,
) -> ShellResult<PipelineReport> {
    if text.trim().is_empty() {
        return Err(PipelineError::EmptyPipeline.into());
    }
    let outcome = execute_segment(registry, state, text, cancel).await?;
    Ok(PipelineReport {
        steps: vec![outcome],
        output: state.output.clone(),
    })
}

async fn execute_segment(
    registry: &TokenRegistry,
    state: &mut PipelineState,
    segment: &str,
    cancel: &CancellationToken,
) -> ShellResult<StepOutcome> {
    if cancel.is_cancelled() {
        return Err(ShellError::Cancelled);
    }

    let Some(Step { name, argument }) = parse_step(segment) else {
        tracing::warn!(segment, "unparsable pipeline step");
        return Ok(StepOutcome {
            token: segment.to_string(),
            status: StepStatus::Unparsable,
        });
    };

    let Some(info) = registry.get(&name) else {
        let suggestions = containment_suggestions(&name, registry.names(), 3);
        tracing::warn!(token = %name, ?suggestions, "unknown pipeline token");
        return Ok(StepOutcome {
            token: name,
            status: StepStatus::Unknown { suggestions },
        });
    };

    if let Some(arg) = &argument {
        state.query = arg.clone();
        state.prompt = arg.clone();
    }

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ShellError::Cancelled),
        r = info.operation.invoke(state.clone(), argument.as_deref(), cancel) => r,
    };

    let status = match result {
        Ok(next) => {
            *state = next;
            tracing::debug!(token = %name, "pipeline step ok");
            StepStatus::Ok
        }
        Err(e) => {
            let cause = innermost_cause(&e);
            tracing::warn!(token = %name, error = %cause, "pipeline step failed");
            StepStatus::Failed(cause)
        }
    };
    Ok(StepOutcome { token: name, status })
}
