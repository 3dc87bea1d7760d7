//! The Cognitive Annotation Aggregator.
//!
//! Consults every advisory subsystem in a fixed sequence, one at a time,
//! and assembles the generation prompt from whatever they produced. A stage
//! that fails is logged, recorded as a [`StageFailure`], and contributes
//! nothing. Only two things stop a turn here: the ethics gate refusing, which
//! is an ordinary [`Annotation::Refused`] value, and cancellation, which is
//! returned as [`ShellError::Cancelled`].

use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::language::language_instruction;
use super::notes::{AdvisoryNotes, StageFailure};
use super::prompt::{PromptParts, assemble, pipeline_hint};
use super::topic::{classify_topic, extract_causal_terms, looks_pipeline_related};
use crate::advisory::{
    ActionDescriptor, AdvisoryResult, Advisors, CausalGraph, EthicsContext, EthicsLevel, Pathway, ReasoningMode,
};
use crate::backend::{BackendChoice, BackendSet};
use crate::error::{ShellError, ShellResult};
use crate::session::{Role, Session};
use crate::text::truncate;

pub const MAX_THOUGHTS: usize = 3;
pub const MEMORY_TOP_K: usize = 3;
pub const MEMORY_MIN_SIMILARITY: f64 = 0.65;
pub const LEAP_COMPRESSION: f64 = 0.3;
pub const SYMBOLIC_MIN_TOKENS: usize = 10;
pub const SYMBOLIC_NOTE_CHARS: usize = 120;
pub const CAUSAL_NOTE_CHARS: usize = 150;
pub const ORCHESTRATED_MIN_SCORE: f64 = 0.5;
pub const BASE_MAX_SCORE: f64 = 0.2;

const GENERIC_AI_PHRASES: &[&str] = &[
    "as an ai",
    "i am an ai",
    "i'm an ai",
    "language model",
    "artificial intelligence",
    "i don't have feelings",
    "i do not have feelings",
];

const TAG_PREFIXES: &[&str] = &["symbolic-processing-note:", "inference-available:"];

/// Outcome of annotating a turn.
#[derive(Debug)]
pub enum Annotation {
    /// The ethics gate refused; no backend may be called for this turn.
    Refused { reply: String },
    Proceeded(PreparedTurn),
}

/// A prompt ready for the backend, with everything that went into it.
#[derive(Debug)]
pub struct PreparedTurn {
    pub prompt: String,
    pub backend: BackendChoice,
    pub notes: AdvisoryNotes,
    pub thoughts: Vec<String>,
    pub topic: Option<String>,
    pub failures: Vec<StageFailure>,
}

/// Pick the backend for the next generation from an integration score.
pub fn select_backend(score: f64, backends: &BackendSet, requested: BackendChoice) -> BackendChoice {
    if score >= ORCHESTRATED_MIN_SCORE && backends.has_orchestrated() {
        BackendChoice::Orchestrated
    } else if score < BASE_MAX_SCORE && backends.has_base() {
        BackendChoice::Base
    } else {
        requested
    }
}

fn keep_thought(thought: &str) -> bool {
    let lower = thought.trim().to_lowercase();
    !lower.is_empty()
        && !GENERIC_AI_PHRASES.iter().any(|p| lower.contains(p))
        && !TAG_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Run one advisory call under the turn's cancellation token.
///
/// Failure becomes `Ok(None)` plus a recorded [`StageFailure`];
/// cancellation becomes `Err(Cancelled)`.
async fn stage<T, F>(
    name: &'static str,
    failures: &mut Vec<StageFailure>,
    cancel: &CancellationToken,
    call: F,
) -> ShellResult<Option<T>>
where
    F: Future<Output = AdvisoryResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ShellError::Cancelled),
        result = call => match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(stage = name, error = %e, "advisory stage failed");
                failures.push(StageFailure {
                    stage: name,
                    message: e.to_string(),
                });
                Ok(None)
            }
        },
    }
}

/// Sequences the advisory subsystems for conversational turns.
#[derive(Debug, Clone)]
pub struct Aggregator {
    advisors: Advisors,
    default_locale: String,
    history_window: usize,
}

impl Aggregator {
    pub fn new(advisors: Advisors, default_locale: impl Into<String>, history_window: usize) -> Self {
        Self {
            advisors,
            default_locale: default_locale.into(),
            history_window,
        }
    }

    pub fn advisors(&self) -> &Advisors {
        &self.advisors
    }

    /// Annotate `input` and assemble its prompt.
    ///
    /// `session.history` is expected to already hold the user's turn.
    pub async fn annotate(
        &self,
        session: &mut Session,
        input: &str,
        backends: &BackendSet,
        requested: BackendChoice,
        token_names: &[&str],
        cancel: &CancellationToken,
    ) -> ShellResult<Annotation> {
        let a = &self.advisors;
        let mut failures = Vec::new();
        let mut notes = AdvisoryNotes::default();

        // Pre-thought.
        let thoughts: Vec<String> = stage("thoughts", &mut failures, cancel, a.persona.inner_thoughts(input, MAX_THOUGHTS))
            .await?
            .unwrap_or_default()
            .into_iter()
            .filter(|t| keep_thought(t))
            .take(MAX_THOUGHTS)
            .collect();
        let approach = stage("approach", &mut failures, cancel, a.persona.approach(input))
            .await?
            .filter(|label| !label.trim().is_empty() && label.trim() != "default");

        // Episodic recall.
        if let Some(episodes) = stage(
            "memory",
            &mut failures,
            cancel,
            a.memory.retrieve_similar(input, MEMORY_TOP_K, MEMORY_MIN_SIMILARITY),
        )
        .await?
        {
            let summaries: Vec<String> = episodes
                .iter()
                .filter(|e| e.similarity >= MEMORY_MIN_SIMILARITY)
                .take(MEMORY_TOP_K)
                .map(|e| e.episode.summary())
                .collect();
            if !summaries.is_empty() {
                notes.memory = Some(format!("[Related memories: {}]", summaries.join("; ")));
            }
        }

        // Metacognitive trace.
        session.traces.start(input);

        // Ethics gate.
        let topic = classify_topic(input).or_else(|| session.last_topic.clone());
        let action = ActionDescriptor {
            kind: "respond".into(),
            description: input.to_string(),
            topic: topic.clone(),
        };
        let context = EthicsContext {
            persona_name: session.persona_name.clone(),
            interaction_count: session.interaction_count,
        };
        if let Some(verdict) = stage("ethics", &mut failures, cancel, a.ethics.evaluate(&action, &context)).await? {
            if !verdict.permitted {
                tracing::info!(reasoning = %verdict.reasoning, "ethics gate refused the turn");
                session.traces.append("Decision", format!("refused: {}", verdict.reasoning));
                return Ok(Annotation::Refused {
                    reply: format!("I'm not going to help with that: {}.", verdict.reasoning),
                });
            }
            if verdict.level == EthicsLevel::RequiresApproval {
                notes.ethics = Some(format!(
                    "Caution, this needs human approval before acting: {}.",
                    verdict.reasoning
                ));
            }
        }

        // Context shift.
        let previous = session.last_topic.clone();
        if let Some(next) = stage(
            "context_shift",
            &mut failures,
            cancel,
            a.context.advance(&session.context_state, topic.as_deref()),
        )
        .await?
        {
            let changed = topic.is_some() && topic != previous;
            if changed && next.compression > LEAP_COMPRESSION {
                notes.context_shift = Some(format!(
                    "Conceptual leap from {} to {}: resources at {:.0}%, compression {:.2}.",
                    previous.as_deref().unwrap_or("nothing in particular"),
                    topic.as_deref().unwrap_or_default(),
                    next.resources * 100.0,
                    next.compression
                ));
            }
            session.context_state = next;
        }
        session.last_topic = topic.clone();

        // Symbolic reasoning.
        if input.contains('?') || input.split_whitespace().count() > SYMBOLIC_MIN_TOKENS {
            if let Some(answer) = stage(
                "symbolic",
                &mut failures,
                cancel,
                a.symbolic.hybrid_reason(input, ReasoningMode::Hybrid),
            )
            .await?
            .and_then(|s| s.answer)
            .filter(|s| !s.trim().is_empty())
            {
                notes.symbolic = Some(truncate(&answer, SYMBOLIC_NOTE_CHARS));
            }
        }

        // Causal reasoning.
        if let Some((effect, causes)) = extract_causal_terms(input) {
            let graph = CausalGraph::star(&effect, &causes);
            if let Some(explanation) =
                stage("causal", &mut failures, cancel, a.causal.explain(&effect, &causes, &graph)).await?
            {
                notes.causal = Some(truncate(&explanation.narrative, CAUSAL_NOTE_CHARS));
            }
        }

        // Integration.
        let mut backend = requested;
        let recent = session.history.recent(self.history_window);
        let users = recent.iter().filter(|t| t.role == Role::User).count();
        let assistants = recent.len() - users;
        if users > 0 && assistants > 0 {
            let total = recent.len() as f64;
            let pathways = [
                Pathway {
                    label: "user".into(),
                    weight: 1.0,
                    activity: users as f64 / total,
                },
                Pathway {
                    label: "assistant".into(),
                    weight: 1.0,
                    activity: assistants as f64 / total,
                },
            ];
            if let Some(score) = stage("integration", &mut failures, cancel, a.integration.compute(&pathways)).await? {
                backend = select_backend(score.score, backends, requested);
                notes.integration = Some(format!(
                    "Integration (phi) {:.2}; generating with the {} backend.",
                    score.score,
                    backend.label()
                ));
            }
        }

        session.traces.record_annotations(notes.count());
        session
            .traces
            .append("Plan", format!("{} note(s), {} backend", notes.count(), backend.label()));

        let language = language_instruction(input, &self.default_locale);
        let hint = (looks_pipeline_related(input) || session.pipeline_context_sticky).then(|| pipeline_hint(token_names));
        session.pipeline_context_sticky = false;

        let system_prompt = a.persona.system_prompt();
        let prompt = assemble(&PromptParts {
            system_prompt: &system_prompt,
            emotion: &session.emotion,
            approach: approach.as_deref(),
            language: &language,
            thoughts: &thoughts,
            notes: &notes,
            pipeline_hint: hint.as_deref(),
            history: session.history.recent(usize::MAX),
        });
        tracing::debug!(notes = notes.count(), failures = failures.len(), ?backend, "prompt assembled");

        Ok(Annotation::Proceeded(PreparedTurn {
            prompt,
            backend,
            notes,
            thoughts,
            topic,
            failures,
        }))
    }
}
