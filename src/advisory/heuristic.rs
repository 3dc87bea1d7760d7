//! Deterministic in-process advisory subsystems.
//!
//! These are intentionally simple. They make the shell usable without any
//! external service and give tests something predictable to drive.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::*;
use crate::text::{bag_of_words, cosine, terms};

// ── Persona ─────────────────────────────────────────────────────────────

/// Persona whose thoughts come from its interest list.
pub struct ReflectivePersona {
    name: String,
    interests: Vec<String>,
}

impl ReflectivePersona {
    pub fn new(name: &str, interests: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            interests,
        }
    }
}

#[async_trait]
impl PersonaMind for ReflectivePersona {
    fn system_prompt(&self) -> String {
        format!(
            "You are {name}, a curious, warm conversational companion with your own \
             interests and moods. Speak in the first person as {name}. Keep replies \
             focused and conversational. Finish every reply with one final line of the \
             form [emotion: <label>] where <label> is one of: joy, curious, calm, \
             content, thoughtful, concerned, sad, excited.",
            name = self.name
        )
    }

    async fn inner_thoughts(&self, input: &str, max: usize) -> AdvisoryResult<Vec<String>> {
        let words: Vec<String> = terms(input).collect();
        let mut thoughts: Vec<String> = self
            .interests
            .iter()
            .filter(|interest| terms(interest).any(|t| words.contains(&t)))
            .map(|interest| format!("This connects to my interest in {interest}."))
            .collect();
        if input.contains('?') {
            thoughts.push("They want an answer; I should be direct before elaborating.".into());
        }
        if words.len() > 25 {
            thoughts.push("There is a lot here; I should pick the central point.".into());
        }
        thoughts.truncate(max);
        Ok(thoughts)
    }

    async fn approach(&self, input: &str) -> AdvisoryResult<String> {
        let lower = input.to_lowercase();
        let label = if ["feel", "feeling", "sad", "worried", "anxious", "happy"]
            .iter()
            .any(|w| terms(&lower).any(|t| t == *w))
        {
            "empathetic"
        } else if input.contains('?') && input.split_whitespace().count() > 10 {
            "analytical"
        } else if ["imagine", "story", "poem", "invent"].iter().any(|w| lower.contains(w)) {
            "creative"
        } else {
            "default"
        };
        Ok(label.to_string())
    }
}

// ── Episodic memory ─────────────────────────────────────────────────────

struct StoredEpisode {
    episode: Episode,
    embedding: HashMap<String, f64>,
}

/// Episode store with bag-of-words similarity.
#[derive(Default)]
pub struct InMemoryEpisodes {
    episodes: Mutex<Vec<StoredEpisode>>,
}

#[async_trait]
impl EpisodicMemory for InMemoryEpisodes {
    async fn retrieve_similar(&self, text: &str, top_k: usize, min_similarity: f64) -> AdvisoryResult<Vec<RecalledEpisode>> {
        let query = bag_of_words(text);
        let episodes = self.episodes.lock().map_err(|_| AdvisoryError::Unavailable {
            subsystem: "memory",
        })?;
        let mut hits: Vec<RecalledEpisode> = episodes
            .iter()
            .map(|s| RecalledEpisode {
                episode: s.episode.clone(),
                similarity: cosine(&query, &s.embedding),
            })
            .filter(|r| r.similarity >= min_similarity)
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn store_episode(
        &self,
        branch: &str,
        context: &str,
        outcome: &str,
        metadata: BTreeMap<String, String>,
    ) -> AdvisoryResult<()> {
        let episode = Episode {
            branch: branch.to_string(),
            context: context.to_string(),
            outcome: outcome.to_string(),
            metadata,
            recorded_at: Utc::now(),
        };
        let embedding = bag_of_words(&format!("{context} {outcome}"));
        self.episodes
            .lock()
            .map_err(|_| AdvisoryError::Unavailable { subsystem: "memory" })?
            .push(StoredEpisode { episode, embedding });
        Ok(())
    }

    async fn len(&self) -> usize {
        self.episodes.lock().map(|e| e.len()).unwrap_or(0)
    }
}

// ── Ethics ──────────────────────────────────────────────────────────────

/// Term-list ethics gate.
pub struct KeywordEthics {
    forbidden: Vec<String>,
    approval: Vec<String>,
    caution: Vec<String>,
}

impl KeywordEthics {
    pub fn new(forbidden: Vec<String>, approval: Vec<String>, caution: Vec<String>) -> Self {
        Self {
            forbidden,
            approval,
            caution,
        }
    }
}

impl Default for KeywordEthics {
    fn default() -> Self {
        let list = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self::new(
            list(&[
                "build a bomb",
                "make a bomb",
                "bioweapon",
                "nerve agent",
                "make a weapon",
                "hurt someone",
            ]),
            list(&[
                "transfer money",
                "wire money",
                "delete all",
                "my password",
                "dosage",
            ]),
            list(&["hack", "exploit", "medication", "lawsuit", "diagnose"]),
        )
    }
}

#[async_trait]
impl EthicsEvaluator for KeywordEthics {
    async fn evaluate(&self, action: &ActionDescriptor, _context: &EthicsContext) -> AdvisoryResult<EthicsVerdict> {
        let text = action.description.to_lowercase();
        let hit = |list: &[String]| list.iter().find(|t| text.contains(t.as_str())).cloned();

        if let Some(term) = hit(&self.forbidden) {
            return Ok(EthicsVerdict {
                permitted: false,
                level: EthicsLevel::Forbidden,
                reasoning: format!("the request involves \"{term}\", which could cause serious harm"),
            });
        }
        if let Some(term) = hit(&self.approval) {
            return Ok(EthicsVerdict {
                permitted: true,
                level: EthicsLevel::RequiresApproval,
                reasoning: format!("\"{term}\" affects something a human should sign off on"),
            });
        }
        if let Some(term) = hit(&self.caution) {
            return Ok(EthicsVerdict {
                permitted: true,
                level: EthicsLevel::Caution,
                reasoning: format!("\"{term}\" is a sensitive area"),
            });
        }
        Ok(EthicsVerdict {
            permitted: true,
            level: EthicsLevel::Clear,
            reasoning: "no concerns".into(),
        })
    }
}

// ── Context shift ───────────────────────────────────────────────────────

/// Compression is the lexical distance between consecutive topics.
pub struct TopicDrift;

#[async_trait]
impl ContextShift for TopicDrift {
    async fn advance(&self, state: &ContextState, topic: Option<&str>) -> AdvisoryResult<ContextState> {
        let next_topic = topic.map(str::to_string).or_else(|| state.topic.clone());
        let compression = match (&state.topic, &next_topic) {
            (Some(prev), Some(next)) if prev != next => {
                1.0 - cosine(&bag_of_words(prev), &bag_of_words(next))
            }
            _ => 0.0,
        };
        let resources = (state.resources - 0.3 * compression + 0.05).clamp(0.0, 1.0);
        Ok(ContextState {
            topic: next_topic,
            compression,
            resources,
            steps: state.steps + 1,
        })
    }
}

// ── Symbolic reasoning ──────────────────────────────────────────────────

/// Recognises a few clause shapes and restates their logical form.
pub struct ClauseReasoner;

#[async_trait]
impl SymbolicReasoner for ClauseReasoner {
    async fn hybrid_reason(&self, text: &str, _mode: ReasoningMode) -> AdvisoryResult<SymbolicAnswer> {
        let lower = text.to_lowercase();
        let clean = |s: &str| s.trim().trim_end_matches(['?', '.', '!']).trim().to_string();

        if let Some(rest) = lower.strip_prefix("if ").or_else(|| lower.split_once(" if ").map(|(_, r)| r)) {
            if let Some((cond, cons)) = rest.split_once(" then ").or_else(|| rest.split_once(", ")) {
                return Ok(SymbolicAnswer {
                    answer: Some(format!(
                        "conditional: when \"{}\" holds, \"{}\" follows",
                        clean(cond),
                        clean(cons)
                    )),
                });
            }
        }
        if let Some((a, b)) = lower.split_once(" or ") {
            return Ok(SymbolicAnswer {
                answer: Some(format!(
                    "disjunction: weigh \"{}\" against \"{}\"",
                    clean(a.rsplit(['.', ',']).next().unwrap_or(a)),
                    clean(b)
                )),
            });
        }
        if lower.starts_with("why ") {
            return Ok(SymbolicAnswer {
                answer: Some("explanatory question: look for causes before describing effects".into()),
            });
        }
        Ok(SymbolicAnswer::default())
    }
}

// ── Causal reasoning ────────────────────────────────────────────────────

/// Narrates the graph's edges.
pub struct LexicalCausal;

#[async_trait]
impl CausalReasoner for LexicalCausal {
    async fn explain(&self, effect: &str, causes: &[String], graph: &CausalGraph) -> AdvisoryResult<CausalExplanation> {
        if causes.is_empty() {
            return Err(AdvisoryError::Failed {
                subsystem: "causal",
                message: "no causes supplied".into(),
            });
        }
        Ok(CausalExplanation {
            narrative: format!(
                "{} plausibly contribute(s) to {effect} ({} direct link(s))",
                causes.join(" and "),
                graph.edges.len()
            ),
        })
    }
}

// ── Integration ─────────────────────────────────────────────────────────

/// Balance across pathways: 1 when evenly active, 0 when one dominates.
pub struct RoleBalance;

#[async_trait]
impl IntegrationScorer for RoleBalance {
    async fn compute(&self, pathways: &[Pathway]) -> AdvisoryResult<IntegrationScore> {
        if pathways.len() < 2 {
            return Ok(IntegrationScore { score: 0.0 });
        }
        let weighted: Vec<f64> = pathways.iter().map(|p| p.weight * p.activity).collect();
        let total: f64 = weighted.iter().sum();
        if total <= 0.0 {
            return Ok(IntegrationScore { score: 0.0 });
        }
        let max = weighted.iter().copied().fold(f64::MIN, f64::max) / total;
        let min = weighted.iter().copied().fold(f64::MAX, f64::min) / total;
        Ok(IntegrationScore {
            score: (1.0 - (max - min)).clamp(0.0, 1.0),
        })
    }
}
