//! Metacognitive traces of conversational turns.
//!
//! Every conversational turn opens a trace with an "Observation" step and
//! closes it with a "Conclusion" step once the reply is sanitized. Every
//! fifth completed trace yields a [`QualityReflection`] over the last five.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::truncate;

/// Characters of the input kept in the observation step.
pub const OBSERVATION_CHARS: usize = 80;
/// Completed traces between two reflections, and the reflection window.
pub const REFLECTION_EVERY: u64 = 5;
/// Number of advisory note kinds a turn can carry.
pub const ANNOTATION_KINDS: usize = 6;

const RETAINED: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub kind: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<TraceStep>,
    /// Advisory notes attached during the turn.
    pub annotations: usize,
    /// Length of the final reply in characters.
    pub reply_chars: usize,
}

/// Summary statistics over the most recent completed traces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReflection {
    pub window: usize,
    pub average_steps: f64,
    /// Share of possible advisory notes actually attached, in `[0, 1]`.
    pub annotation_coverage: f64,
    pub average_reply_chars: f64,
}

impl fmt::Display for QualityReflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reflection over the last {} replies: {:.1} trace steps on average, \
             {:.0}% annotation coverage, {:.0} characters per reply.",
            self.window,
            self.average_steps,
            self.annotation_coverage * 100.0,
            self.average_reply_chars
        )
    }
}

/// Active trace plus a bounded window of completed ones.
#[derive(Debug, Clone, Default)]
pub struct TraceLog {
    active: Option<Trace>,
    completed: VecDeque<Trace>,
    next_id: u64,
    completed_total: u64,
}

impl TraceLog {
    /// Open a trace for `input`, replacing any trace left open.
    pub fn start(&mut self, input: &str) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(stale) = self.active.take() {
            tracing::debug!(trace = stale.id, "discarding unfinished trace");
        }
        self.active = Some(Trace {
            id,
            started_at: Utc::now(),
            steps: Vec::new(),
            annotations: 0,
            reply_chars: 0,
        });
        self.append("Observation", truncate(input, OBSERVATION_CHARS));
        id
    }

    /// Add a step to the open trace. No-op when nothing is open.
    pub fn append(&mut self, kind: &str, detail: impl Into<String>) {
        if let Some(trace) = self.active.as_mut() {
            trace.steps.push(TraceStep {
                kind: kind.to_string(),
                detail: detail.into(),
            });
        }
    }

    pub fn record_annotations(&mut self, count: usize) {
        if let Some(trace) = self.active.as_mut() {
            trace.annotations = count;
        }
    }

    pub fn active(&self) -> Option<&Trace> {
        self.active.as_ref()
    }

    /// Drop the open trace without completing it.
    pub fn discard(&mut self) {
        if let Some(trace) = self.active.take() {
            tracing::debug!(trace = trace.id, "discarding cancelled trace");
        }
    }

    /// Close the open trace with its reply.
    ///
    /// Returns a reflection when this completes a multiple of
    /// [`REFLECTION_EVERY`] traces.
    pub fn end(&mut self, reply: &str) -> Option<QualityReflection> {
        let mut trace = self.active.take()?;
        trace.reply_chars = reply.chars().count();
        self.completed.push_back(trace);
        while self.completed.len() > RETAINED {
            self.completed.pop_front();
        }
        self.completed_total += 1;
        (self.completed_total % REFLECTION_EVERY == 0).then(|| self.reflect())
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total
    }

    fn reflect(&self) -> QualityReflection {
        let window = REFLECTION_EVERY as usize;
        let recent: Vec<&Trace> = self.completed.iter().rev().take(window).collect();
        let n = recent.len().max(1) as f64;
        let sum = |f: &dyn Fn(&Trace) -> f64| recent.iter().map(|t| f(*t)).sum::<f64>();
        QualityReflection {
            window: recent.len(),
            average_steps: sum(&|t| t.steps.len() as f64) / n,
            annotation_coverage: sum(&|t| t.annotations as f64 / ANNOTATION_KINDS as f64) / n,
            average_reply_chars: sum(&|t| t.reply_chars as f64) / n,
        }
    }
}
