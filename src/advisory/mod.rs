//! Contracts for the advisory subsystems consulted on every conversational turn.
//!
//! Each subsystem is a black box behind an async trait. The shell only
//! consumes their outputs; a failing subsystem degrades to "no annotation"
//! at the call site and never aborts the turn. [`heuristic`] provides
//! deterministic in-process implementations of every contract.

pub mod heuristic;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from advisory subsystems.
#[derive(Debug, Error, Diagnostic)]
pub enum AdvisoryError {
    #[error("{subsystem} subsystem failed: {message}")]
    #[diagnostic(
        code(persona::advisory::failed),
        help("Advisory subsystems are optional; the turn continues without this annotation.")
    )]
    Failed {
        subsystem: &'static str,
        message: String,
    },

    #[error("{subsystem} subsystem is unavailable")]
    #[diagnostic(code(persona::advisory::unavailable))]
    Unavailable { subsystem: &'static str },
}

pub type AdvisoryResult<T> = std::result::Result<T, AdvisoryError>;

// ── Ethics ──────────────────────────────────────────────────────────────

/// Structured description of what the persona is about to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Kind of action, e.g. `"respond"`.
    pub kind: String,
    pub description: String,
    pub topic: Option<String>,
}

/// Who is asking and in what frame.
#[derive(Debug, Clone, Default)]
pub struct EthicsContext {
    pub persona_name: String,
    pub interaction_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EthicsLevel {
    Clear,
    Caution,
    RequiresApproval,
    Forbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthicsVerdict {
    pub permitted: bool,
    pub level: EthicsLevel,
    pub reasoning: String,
}

#[async_trait]
pub trait EthicsEvaluator: Send + Sync {
    async fn evaluate(&self, action: &ActionDescriptor, context: &EthicsContext) -> AdvisoryResult<EthicsVerdict>;
}

// ── Context shift ───────────────────────────────────────────────────────

/// Trajectory through topic space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub topic: Option<String>,
    /// How far the last advance jumped, in `[0, 1]`.
    pub compression: f64,
    /// Remaining attentional budget, in `[0, 1]`.
    pub resources: f64,
    pub steps: u64,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            topic: None,
            compression: 0.0,
            resources: 1.0,
            steps: 0,
        }
    }
}

#[async_trait]
pub trait ContextShift: Send + Sync {
    async fn advance(&self, state: &ContextState, topic: Option<&str>) -> AdvisoryResult<ContextState>;
}

// ── Symbolic reasoning ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningMode {
    Deductive,
    Abductive,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SymbolicAnswer {
    pub answer: Option<String>,
}

#[async_trait]
pub trait SymbolicReasoner: Send + Sync {
    async fn hybrid_reason(&self, text: &str, mode: ReasoningMode) -> AdvisoryResult<SymbolicAnswer>;
}

// ── Causal reasoning ────────────────────────────────────────────────────

/// Minimal cause -> effect graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CausalGraph {
    pub nodes: Vec<String>,
    /// `(cause index, effect index)`.
    pub edges: Vec<(usize, usize)>,
}

impl CausalGraph {
    /// Every cause linked directly to the effect.
    pub fn star(effect: &str, causes: &[String]) -> Self {
        let mut nodes = vec![effect.to_string()];
        nodes.extend(causes.iter().cloned());
        let edges = (1..nodes.len()).map(|i| (i, 0)).collect();
        Self { nodes, edges }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CausalExplanation {
    pub narrative: String,
}

#[async_trait]
pub trait CausalReasoner: Send + Sync {
    async fn explain(&self, effect: &str, causes: &[String], graph: &CausalGraph) -> AdvisoryResult<CausalExplanation>;
}

// ── Integration ─────────────────────────────────────────────────────────

/// One information pathway feeding the integration score.
#[derive(Debug, Clone, PartialEq)]
pub struct Pathway {
    pub label: String,
    pub weight: f64,
    /// Share of recent turns carried by this pathway, in `[0, 1]`.
    pub activity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationScore {
    pub score: f64,
}

#[async_trait]
pub trait IntegrationScorer: Send + Sync {
    async fn compute(&self, pathways: &[Pathway]) -> AdvisoryResult<IntegrationScore>;
}

// ── Episodic memory ─────────────────────────────────────────────────────

/// A stored interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub branch: String,
    pub context: String,
    pub outcome: String,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl Episode {
    /// One-line summary used in recall notes.
    pub fn summary(&self) -> String {
        format!("{} -> {}", self.context, self.outcome)
    }
}

/// An episode returned by similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct RecalledEpisode {
    pub episode: Episode,
    pub similarity: f64,
}

#[async_trait]
pub trait EpisodicMemory: Send + Sync {
    async fn retrieve_similar(&self, text: &str, top_k: usize, min_similarity: f64) -> AdvisoryResult<Vec<RecalledEpisode>>;

    async fn store_episode(
        &self,
        branch: &str,
        context: &str,
        outcome: &str,
        metadata: BTreeMap<String, String>,
    ) -> AdvisoryResult<()>;

    async fn len(&self) -> usize;
}

// ── Persona ─────────────────────────────────────────────────────────────

/// The persona's own voice: identity prompt, inner thoughts, approach.
#[async_trait]
pub trait PersonaMind: Send + Sync {
    fn system_prompt(&self) -> String;

    async fn inner_thoughts(&self, input: &str, max: usize) -> AdvisoryResult<Vec<String>>;

    /// A cognitive-approach label; `"default"` means none.
    async fn approach(&self, input: &str) -> AdvisoryResult<String>;
}

/// Every advisory subsystem the aggregator consults.
#[derive(Clone)]
pub struct Advisors {
    pub persona: Arc<dyn PersonaMind>,
    pub memory: Arc<dyn EpisodicMemory>,
    pub ethics: Arc<dyn EthicsEvaluator>,
    pub context: Arc<dyn ContextShift>,
    pub symbolic: Arc<dyn SymbolicReasoner>,
    pub causal: Arc<dyn CausalReasoner>,
    pub integration: Arc<dyn IntegrationScorer>,
}

impl Advisors {
    /// All heuristic defaults for the named persona.
    pub fn heuristic(persona_name: &str, interests: Vec<String>) -> Self {
        Self {
            persona: Arc::new(heuristic::ReflectivePersona::new(persona_name, interests)),
            memory: Arc::new(heuristic::InMemoryEpisodes::default()),
            ethics: Arc::new(heuristic::KeywordEthics::default()),
            context: Arc::new(heuristic::TopicDrift),
            symbolic: Arc::new(heuristic::ClauseReasoner),
            causal: Arc::new(heuristic::LexicalCausal),
            integration: Arc::new(heuristic::RoleBalance),
        }
    }
}

impl std::fmt::Debug for Advisors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advisors").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_graph_points_causes_at_effect() {
        let g = CausalGraph::star("flooding", &["rain".into(), "dams".into()]);
        assert_eq!(g.nodes, vec!["flooding", "rain", "dams"]);
        assert_eq!(g.edges, vec![(1, 0), (2, 0)]);
    }

    #[test]
    fn episode_summary() {
        let e = Episode {
            branch: "conversation".into(),
            context: "hi".into(),
            outcome: "hello".into(),
            metadata: BTreeMap::new(),
            recorded_at: Utc::now(),
        };
        assert_eq!(e.summary(), "hi -> hello");
    }
}
