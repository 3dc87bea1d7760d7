//! Per-process conversational state.
//!
//! A [`Session`] is created once at start-up and lives for the whole
//! interactive loop. It owns the persona identity, the interaction counter,
//! the emotional state mutated after every reply, the ordered conversation
//! history, the single-slot [`PendingConfirmation`], and the cognitive
//! carry-over that links one turn's annotations to the next.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::advisory::ContextState;
use crate::cognition::trace::TraceLog;

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used in assembled prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// A single utterance in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Insertion-ordered conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Drop turns past `len`.
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// A natural-language tool-creation request awaiting a "yes".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub topic: String,
    pub description: String,
}

/// An emotion reported by the generation backend alongside its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReading {
    pub label: String,
    pub valence: f64,
    pub arousal: f64,
}

/// The persona's affective state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub dominant_emotion: String,
    /// In `[-1, 1]`.
    pub valence: f64,
    /// In `[0, 1]`.
    pub arousal: f64,
    pub focus: Option<String>,
    /// In `[0, 1]`, grows slowly with every reply.
    pub awareness: f64,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self {
            dominant_emotion: "neutral".into(),
            valence: 0.0,
            arousal: 0.3,
            focus: None,
            awareness: 0.5,
        }
    }
}

const NEUTRAL_AROUSAL: f64 = 0.3;
const DECAY: f64 = 0.1;
const AWARENESS_STEP: f64 = 0.01;

impl EmotionalState {
    /// Apply one reply's worth of change.
    ///
    /// A reported emotion replaces the dominant label and pulls valence and
    /// arousal halfway toward the reported values. Without a report both
    /// decay 10% toward neutral.
    pub fn update(&mut self, reported: Option<&EmotionReading>, topic: Option<&str>) {
        match reported {
            Some(r) => {
                self.dominant_emotion = r.label.clone();
                self.valence += (r.valence - self.valence) * 0.5;
                self.arousal += (r.arousal - self.arousal) * 0.5;
            }
            None => {
                self.valence -= self.valence * DECAY;
                self.arousal -= (self.arousal - NEUTRAL_AROUSAL) * DECAY;
            }
        }
        self.valence = self.valence.clamp(-1.0, 1.0);
        self.arousal = self.arousal.clamp(0.0, 1.0);
        if let Some(t) = topic {
            self.focus = Some(t.to_string());
        }
        self.awareness = (self.awareness + AWARENESS_STEP).min(1.0);
    }
}

/// Explicit context object for one interactive process.
#[derive(Debug)]
pub struct Session {
    pub persona_id: String,
    pub persona_name: String,
    pub interaction_count: u64,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub emotion: EmotionalState,
    pub history: History,
    pub pending: Option<PendingConfirmation>,
    /// Topic classified on the previous conversational turn.
    pub last_topic: Option<String>,
    /// Trajectory state carried between context-shift advances.
    pub context_state: ContextState,
    /// Set after a pipeline command so the next prompt includes DSL hints.
    pub pipeline_context_sticky: bool,
    pub traces: TraceLog,
}

impl Session {
    pub fn new(persona_id: impl Into<String>, persona_name: impl Into<String>) -> Self {
        Self {
            persona_id: persona_id.into(),
            persona_name: persona_name.into(),
            interaction_count: 0,
            started_at: Utc::now(),
            started: Instant::now(),
            emotion: EmotionalState::default(),
            history: History::new(),
            pending: None,
            last_topic: None,
            context_state: ContextState::default(),
            pipeline_context_sticky: false,
            traces: TraceLog::default(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Overwrites any earlier request.
    pub fn set_pending(&mut self, topic: impl Into<String>, description: impl Into<String>) {
        self.pending = Some(PendingConfirmation {
            topic: topic.into(),
            description: description.into(),
        });
    }

    pub fn take_pending(&mut self) -> Option<PendingConfirmation> {
        self.pending.take()
    }

    /// Record what a conversational turn may change before it completes.
    pub fn checkpoint(&self) -> TurnCheckpoint {
        TurnCheckpoint {
            interaction_count: self.interaction_count,
            history_len: self.history.len(),
            last_topic: self.last_topic.clone(),
            context_state: self.context_state.clone(),
            pipeline_context_sticky: self.pipeline_context_sticky,
        }
    }

    /// Undo an unfinished turn: restore the carry-over state, drop turns
    /// pushed since `checkpoint` and discard the open trace.
    pub fn rollback(&mut self, checkpoint: TurnCheckpoint) {
        self.interaction_count = checkpoint.interaction_count;
        self.history.truncate(checkpoint.history_len);
        self.last_topic = checkpoint.last_topic;
        self.context_state = checkpoint.context_state;
        self.pipeline_context_sticky = checkpoint.pipeline_context_sticky;
        self.traces.discard();
    }
}

/// Session fields a turn mutates before its reply exists.
#[derive(Debug, Clone)]
pub struct TurnCheckpoint {
    interaction_count: u64,
    history_len: usize,
    last_topic: Option<String>,
    context_state: ContextState,
    pipeline_context_sticky: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_recent_returns_tail_in_order() {
        let mut h = History::new();
        for i in 0..5 {
            h.push(ConversationTurn::user(format!("m{i}")));
        }
        let tail: Vec<_> = h.recent(2).iter().map(|t| t.content.as_str()).collect();
        assert_eq!(tail, vec!["m3", "m4"]);
        assert_eq!(h.recent(100).len(), 5);
    }

    #[test]
    fn rollback_restores_carry_over() {
        let mut s = Session::new("aria", "Aria");
        s.history.push(ConversationTurn::user("earlier"));
        s.last_topic = Some("music".into());
        let cp = s.checkpoint();

        s.interaction_count += 1;
        s.history.push(ConversationTurn::user("tell me about jazz"));
        s.traces.start("tell me about jazz");
        s.last_topic = Some("jazz".into());
        s.context_state.steps += 1;
        s.rollback(cp);

        assert_eq!(s.interaction_count, 0);
        assert_eq!(s.history.len(), 1);
        assert!(s.traces.active().is_none());
        assert_eq!(s.last_topic.as_deref(), Some("music"));
        assert_eq!(s.context_state, ContextState::default());
    }

    #[test]
    fn later_pending_request_overwrites() {
        let mut s = Session::new("aria", "Aria");
        s.set_pending("quantum", "first");
        s.set_pending("biology", "second");
        let p = s.take_pending().unwrap();
        assert_eq!(p.topic, "biology");
        assert!(s.take_pending().is_none());
    }

    #[test]
    fn reported_emotion_pulls_halfway() {
        let mut e = EmotionalState::default();
        e.update(
            Some(&EmotionReading {
                label: "joy".into(),
                valence: 1.0,
                arousal: 0.9,
            }),
            Some("music"),
        );
        assert_eq!(e.dominant_emotion, "joy");
        assert!((e.valence - 0.5).abs() < 1e-9);
        assert!((e.arousal - 0.6).abs() < 1e-9);
        assert_eq!(e.focus.as_deref(), Some("music"));
    }

    #[test]
    fn unreported_emotion_decays_toward_neutral() {
        let mut e = EmotionalState {
            valence: -0.8,
            arousal: 0.9,
            ..Default::default()
        };
        e.update(None, None);
        assert!(e.valence > -0.8 && e.valence < 0.0);
        assert!(e.arousal < 0.9 && e.arousal > NEUTRAL_AROUSAL);
    }

    #[test]
    fn awareness_is_capped() {
        let mut e = EmotionalState {
            awareness: 0.995,
            ..Default::default()
        };
        e.update(None, None);
        e.update(None, None);
        assert_eq!(e.awareness, 1.0);
    }
}
