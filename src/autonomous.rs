//! Background exploration of the persona's interests.
//!
//! The [`Explorer`] runs on its own tokio interval. Each epoch it picks the
//! next interest round-robin, asks the generation backend for one short fact,
//! and records it as a [`Discovery`]. It only ever touches
//! [`ExplorationState`], which the router's think/interest/emergence rules
//! share through the same lock. The lock is never held across an await.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendResult, GenerationBackend};
use crate::message::{MessageSink, ShellMessage};
use crate::text::{squash_whitespace, terms, truncate};

/// Oldest discoveries are dropped beyond this.
pub const MAX_DISCOVERIES: usize = 50;

const FACT_CHARS: usize = 280;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discovery {
    pub interest: String,
    pub fact: String,
    pub at: DateTime<Utc>,
}

/// Fields owned by background exploration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorationState {
    pub interests: Vec<String>,
    pub discoveries: VecDeque<Discovery>,
    pub epoch: u64,
}

impl ExplorationState {
    pub fn new(interests: Vec<String>) -> Self {
        Self {
            interests,
            ..Default::default()
        }
    }

    /// Add an interest unless an equal one (ignoring case) exists.
    pub fn add_interest(&mut self, interest: &str) -> bool {
        let interest = interest.trim();
        if interest.is_empty() || self.interests.iter().any(|i| i.eq_ignore_ascii_case(interest)) {
            return false;
        }
        self.interests.push(interest.to_string());
        true
    }

    /// The interest for the current epoch, round-robin.
    pub fn next_interest(&self) -> Option<String> {
        if self.interests.is_empty() {
            return None;
        }
        let i = (self.epoch % self.interests.len() as u64) as usize;
        Some(self.interests[i].clone())
    }

    pub fn record(&mut self, interest: &str, fact: &str) -> Discovery {
        let discovery = Discovery {
            interest: interest.to_string(),
            fact: fact.to_string(),
            at: Utc::now(),
        };
        self.discoveries.push_back(discovery.clone());
        while self.discoveries.len() > MAX_DISCOVERIES {
            self.discoveries.pop_front();
        }
        discovery
    }

    /// Discoveries sharing a term with `topic`, newest first.
    pub fn related(&self, topic: &str) -> Vec<&Discovery> {
        let wanted: Vec<String> = terms(topic).collect();
        self.discoveries
            .iter()
            .rev()
            .filter(|d| {
                terms(&d.interest)
                    .chain(terms(&d.fact))
                    .any(|t| wanted.contains(&t))
            })
            .collect()
    }

    /// What has emerged about `topic` across discoveries.
    pub fn emergence(&self, topic: &str) -> String {
        let related = self.related(topic);
        if related.is_empty() {
            return format!(
                "Nothing has emerged about \"{topic}\" yet ({} discoveries so far).",
                self.discoveries.len()
            );
        }
        let mut out = format!("Emerging around \"{topic}\" ({} connection(s)):", related.len());
        for d in related.iter().take(5) {
            out.push_str(&format!("\n- [{}] {}", d.interest, d.fact));
        }
        out
    }
}

/// Handle shared between the explorer and the router.
pub type SharedExploration = Arc<Mutex<ExplorationState>>;

/// Periodic interest explorer.
pub struct Explorer {
    state: SharedExploration,
    backend: Arc<dyn GenerationBackend>,
    interval: Duration,
}

impl Explorer {
    pub fn new(state: SharedExploration, backend: Arc<dyn GenerationBackend>, interval: Duration) -> Self {
        Self {
            state,
            backend,
            interval,
        }
    }

    /// Ask the backend for one fact about `interest` and record it.
    pub async fn explore(&self, interest: &str, cancel: &CancellationToken) -> BackendResult<Discovery> {
        let prompt = format!(
            "State one surprising, true fact about {interest} in a single sentence. \
             Output only the sentence."
        );
        let generation = self.backend.generate(&prompt, cancel).await?;
        let fact = truncate(&squash_whitespace(generation.text.trim()), FACT_CHARS);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        Ok(state.record(interest, &fact))
    }

    /// Advance one epoch. `None` when there are no interests.
    pub async fn step(&self, cancel: &CancellationToken) -> BackendResult<Option<Discovery>> {
        let interest = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let next = state.next_interest();
            state.epoch += 1;
            next
        };
        let Some(interest) = interest else {
            return Ok(None);
        };
        self.explore(&interest, cancel).await.map(Some)
    }

    /// Run until `cancel` fires. The first tick is one full interval away.
    pub fn spawn(self, cancel: CancellationToken, sink: Arc<dyn MessageSink>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut tick = tokio::time::interval_at(start, self.interval);
            tracing::info!(interval_secs = self.interval.as_secs(), "explorer started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => match self.step(&cancel).await {
                        Ok(Some(d)) => {
                            tracing::debug!(interest = %d.interest, "discovery recorded");
                            sink.emit(&ShellMessage::Discovery {
                                interest: d.interest,
                                fact: d.fact,
                            });
                        }
                        Ok(None) => tracing::debug!("no interests to explore"),
                        Err(e) => tracing::warn!(error = %e, "exploration step failed"),
                    },
                }
            }
            tracing::info!("explorer stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Generation;
    use async_trait::async_trait;

    struct Fact;

    #[async_trait]
    impl GenerationBackend for Fact {
        fn name(&self) -> &str {
            "fact"
        }

        async fn generate(&self, prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
            let about = prompt.split(" about ").nth(1).unwrap_or("").split(" in a ").next().unwrap_or("");
            Ok(Generation::text(format!("  {about} is\n fascinating. ")))
        }
    }

    fn explorer(interests: &[&str]) -> (Explorer, SharedExploration) {
        let state = Arc::new(Mutex::new(ExplorationState::new(
            interests.iter().map(|s| s.to_string()).collect(),
        )));
        (
            Explorer::new(Arc::clone(&state), Arc::new(Fact), Duration::from_secs(60)),
            state,
        )
    }

    #[test]
    fn interests_are_deduplicated() {
        let mut s = ExplorationState::new(vec!["Jazz".into()]);
        assert!(!s.add_interest("jazz"));
        assert!(s.add_interest("tides"));
        assert_eq!(s.interests.len(), 2);
    }

    #[test]
    fn discoveries_are_capped() {
        let mut s = ExplorationState::default();
        for i in 0..(MAX_DISCOVERIES + 5) {
            s.record("x", &format!("fact {i}"));
        }
        assert_eq!(s.discoveries.len(), MAX_DISCOVERIES);
        assert_eq!(s.discoveries.front().unwrap().fact, "fact 5");
    }

    #[tokio::test]
    async fn steps_round_robin_through_interests() {
        let (ex, state) = explorer(&["jazz", "tides"]);
        let cancel = CancellationToken::new();
        let a = ex.step(&cancel).await.unwrap().unwrap();
        let b = ex.step(&cancel).await.unwrap().unwrap();
        let c = ex.step(&cancel).await.unwrap().unwrap();
        assert_eq!((a.interest.as_str(), b.interest.as_str(), c.interest.as_str()), ("jazz", "tides", "jazz"));
        assert_eq!(a.fact, "jazz is fascinating.");
        let s = state.lock().unwrap();
        assert_eq!(s.epoch, 3);
        assert_eq!(s.discoveries.len(), 3);
    }

    #[tokio::test]
    async fn no_interests_no_discovery() {
        let (ex, _) = explorer(&[]);
        assert!(ex.step(&CancellationToken::new()).await.unwrap().is_none());
    }

    #[test]
    fn emergence_finds_related_discoveries() {
        let mut s = ExplorationState::default();
        s.record("oceans", "tides follow the moon");
        s.record("jazz", "bebop is fast");
        assert!(s.emergence("moon").contains("tides follow the moon"));
        assert!(s.emergence("volcanoes").starts_with("Nothing has emerged"));
    }
}
