//! Per-turn orchestration.
//!
//! [`Shell`] owns the session and the pipeline state and resolves one input
//! at a time: the router gets the first look, conversational input goes
//! through the aggregator, the chosen backend and the sanitizer. Everything
//! that happens after the reply is decided (episode persistence, snapshot
//! publication) stays off the reply's path.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::advisory::{Advisors, EpisodicMemory};
use crate::autonomous::{ExplorationState, Explorer, SharedExploration};
use crate::backend::sanitize::{sanitize, split_emotion_tag};
use crate::backend::{BackendChoice, BackendError, BackendSet};
use crate::cognition::{Aggregator, Annotation};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::message::{MessageSink, ShellMessage};
use crate::paths::ShellPaths;
use crate::pipeline::tokens::{TokenDeps, register_builtin_tokens};
use crate::pipeline::{self, PipelineReport, PipelineState, TokenRegistry, VectorStore};
use crate::router::capabilities::{Capabilities, LocalCapabilities};
use crate::router::{CommandRouter, RouterDeps};
use crate::session::{ConversationTurn, Session};
use crate::snapshot::{self, SessionSummary};
use crate::text::truncate;

/// Reply used when the generation backend fails for a reason other than
/// cancellation.
pub const TROUBLE_REPLY: &str = "I'm having trouble thinking right now. Could you try again in a moment?";

const CONCLUSION_CHARS: usize = 80;

/// What a shell is built from.
pub struct ShellDeps {
    pub config: Arc<ShellConfig>,
    pub paths: ShellPaths,
    pub backends: BackendSet,
    pub advisors: Advisors,
    pub store: Arc<dyn VectorStore>,
    /// `None` builds [`LocalCapabilities`] over the primary backend.
    pub capabilities: Option<Arc<dyn Capabilities>>,
}

pub struct Shell {
    config: Arc<ShellConfig>,
    paths: ShellPaths,
    session: Session,
    pipeline: PipelineState,
    router: CommandRouter,
    aggregator: Aggregator,
    backends: BackendSet,
    memory: Arc<dyn EpisodicMemory>,
    exploration: SharedExploration,
    summaries: watch::Sender<SessionSummary>,
}

impl Shell {
    pub fn new(deps: ShellDeps) -> Self {
        let ShellDeps {
            config,
            paths,
            backends,
            advisors,
            store,
            capabilities,
        } = deps;
        let memory = Arc::clone(&advisors.memory);
        let capabilities = capabilities.unwrap_or_else(|| {
            Arc::new(LocalCapabilities::new(
                Arc::clone(&backends.primary),
                Arc::clone(&memory),
                config.http_timeout_secs,
            ))
        });

        let mut registry = TokenRegistry::new();
        register_builtin_tokens(
            &mut registry,
            TokenDeps {
                backend: Arc::clone(&backends.primary),
                capabilities: Arc::clone(&capabilities),
                http_timeout_secs: config.http_timeout_secs,
            },
        );

        let exploration = Arc::new(Mutex::new(ExplorationState::new(config.interests.clone())));
        let explorer = Explorer::new(
            Arc::clone(&exploration),
            Arc::clone(&backends.primary),
            Duration::from_secs(config.exploration_interval_secs),
        );
        let router = CommandRouter::new(RouterDeps {
            registry: Arc::new(registry),
            capabilities,
            explorer: Arc::new(explorer),
            exploration: Arc::clone(&exploration),
            memory: Arc::clone(&memory),
            config: Arc::clone(&config),
            paths: paths.clone(),
        });

        let session = Session::new(config.persona_id.clone(), config.persona_name.clone());
        let (summaries, _) = watch::channel(SessionSummary::of(&session));
        let aggregator = Aggregator::new(advisors, config.default_locale.clone(), config.history_window);

        tracing::info!(
            persona = %session.persona_name,
            backends = ?backends,
            tokens = router.registry().len(),
            "shell ready"
        );

        Self {
            config,
            paths,
            session,
            pipeline: PipelineState::new(store),
            router,
            aggregator,
            backends,
            memory,
            exploration,
            summaries,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    pub fn registry(&self) -> &TokenRegistry {
        self.router.registry()
    }

    pub fn exploration(&self) -> SharedExploration {
        Arc::clone(&self.exploration)
    }

    /// Latest session summary, updated after every turn.
    pub fn summaries(&self) -> watch::Receiver<SessionSummary> {
        self.summaries.subscribe()
    }

    /// Start the explorer and the periodic snapshot writer.
    ///
    /// An interval of zero leaves that task off.
    pub fn spawn_background(&self, cancel: &CancellationToken, sink: Arc<dyn MessageSink>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        if self.config.exploration_interval_secs > 0 {
            let explorer = Explorer::new(
                Arc::clone(&self.exploration),
                Arc::clone(&self.backends.primary),
                Duration::from_secs(self.config.exploration_interval_secs),
            );
            handles.push(explorer.spawn(cancel.clone(), sink));
        }
        if self.config.snapshot_interval_secs > 0 {
            handles.push(snapshot::spawn_periodic(
                self.paths.clone(),
                self.summaries(),
                Arc::clone(&self.exploration),
                Duration::from_secs(self.config.snapshot_interval_secs),
                cancel.clone(),
            ));
        }
        handles
    }

    /// Write a snapshot of the current session now.
    pub async fn snapshot(&self) -> ShellResult<PathBuf> {
        Ok(snapshot::write_now(&self.paths, &SessionSummary::of(&self.session), &self.exploration).await?)
    }

    /// Run a DSL expression directly, bypassing the router.
    pub async fn run_pipeline(&mut self, expr: &str, cancel: &CancellationToken) -> ShellResult<PipelineReport> {
        pipeline::run_pipeline(self.router.registry(), &mut self.pipeline, expr, cancel).await
    }

    /// Resolve one input completely.
    ///
    /// Only [`ShellError::Cancelled`] escapes; every other failure has already
    /// become a message by the time this returns.
    pub async fn handle_turn(&mut self, input: &str, cancel: &CancellationToken) -> ShellResult<Vec<ShellMessage>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let checkpoint = self.session.checkpoint();
        self.session.interaction_count += 1;

        let messages = match self.resolve(input, cancel).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::info!(error = %e, "turn unwound");
                self.session.rollback(checkpoint);
                return Err(e);
            }
        };

        self.summaries.send_replace(SessionSummary::of(&self.session));
        Ok(messages)
    }

    async fn resolve(&mut self, input: &str, cancel: &CancellationToken) -> ShellResult<Vec<ShellMessage>> {
        let routed = self
            .router
            .route(input, &mut self.session, &mut self.pipeline, cancel)
            .await?;
        match routed {
            Some(text) => Ok(vec![ShellMessage::action(text)]),
            None => self.converse(input, cancel).await,
        }
    }

    async fn converse(&mut self, input: &str, cancel: &CancellationToken) -> ShellResult<Vec<ShellMessage>> {
        self.session.history.push(ConversationTurn::user(input));

        let token_names: Vec<&str> = self.router.registry().names().collect();
        let annotation = self
            .aggregator
            .annotate(
                &mut self.session,
                input,
                &self.backends,
                BackendChoice::Primary,
                &token_names,
                cancel,
            )
            .await?;

        let prepared = match annotation {
            Annotation::Refused { reply } => {
                self.session.traces.end(&reply);
                self.session.history.push(ConversationTurn::assistant(reply.as_str()));
                return Ok(vec![ShellMessage::Refusal { text: reply }]);
            }
            Annotation::Proceeded(prepared) => prepared,
        };
        for failure in &prepared.failures {
            tracing::debug!(stage = failure.stage, error = %failure.message, "turn continued without stage");
        }

        let backend = self.backends.get(prepared.backend);
        tracing::debug!(backend = backend.name(), choice = prepared.backend.label(), "generating");
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ShellError::Cancelled),
            r = backend.generate(&prepared.prompt, cancel) => r,
        };

        let (reply, reading) = match generated {
            Ok(generation) => {
                let (text, tagged) = split_emotion_tag(&generation.text);
                let reading = generation.emotion.or(tagged);
                (sanitize(&text, &self.session.persona_name), reading)
            }
            Err(BackendError::Cancelled) => return Err(ShellError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, backend = backend.name(), "generation failed");
                (TROUBLE_REPLY.to_string(), None)
            }
        };

        let mut messages = Vec::new();
        self.session
            .traces
            .append("Conclusion", truncate(&reply, CONCLUSION_CHARS));
        let reflection = self.session.traces.end(&reply);
        self.session
            .emotion
            .update(reading.as_ref(), prepared.topic.as_deref());
        self.session.history.push(ConversationTurn::assistant(reply.as_str()));

        if reply != TROUBLE_REPLY {
            self.persist_episode(input, &reply, prepared.topic.as_deref());
        }

        messages.push(ShellMessage::Reply {
            persona: self.session.persona_name.clone(),
            text: reply,
            emotion: Some(self.session.emotion.dominant_emotion.clone()),
        });
        if let Some(r) = reflection {
            tracing::info!(window = r.window, average_steps = r.average_steps, "quality reflection");
            messages.push(ShellMessage::Reflection { text: r.to_string() });
        }
        Ok(messages)
    }

    /// Fire-and-forget; a failure is logged and never reaches the reply.
    fn persist_episode(&self, input: &str, reply: &str, topic: Option<&str>) {
        let memory = Arc::clone(&self.memory);
        let context = input.to_string();
        let outcome = reply.to_string();
        let mut metadata = BTreeMap::new();
        metadata.insert("persona".to_string(), self.session.persona_id.clone());
        metadata.insert("emotion".to_string(), self.session.emotion.dominant_emotion.clone());
        if let Some(t) = topic {
            metadata.insert("topic".to_string(), t.to_string());
        }
        tokio::spawn(async move {
            if let Err(e) = memory.store_episode("conversation", &context, &outcome, metadata).await {
                tracing::warn!(error = %e, "failed to persist episode");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{AdvisoryError, AdvisoryResult, RecalledEpisode};
    use crate::backend::{BackendResult, Generation, GenerationBackend};
    use crate::pipeline::InMemoryVectorStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: &'static str,
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
            Ok(Generation::text(self.reply))
        }
    }

    struct Down;

    #[async_trait]
    impl GenerationBackend for Down {
        fn name(&self) -> &str {
            "down"
        }

        async fn generate(&self, _prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
            Err(BackendError::Unavailable {
                url: "http://localhost:1".into(),
            })
        }
    }

    /// Waits for cancellation and never produces text.
    struct Stalled;

    #[async_trait]
    impl GenerationBackend for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn generate(&self, _prompt: &str, cancel: &CancellationToken) -> BackendResult<Generation> {
            cancel.cancelled().await;
            Err(BackendError::Cancelled)
        }
    }

    /// Remembers nothing and rejects every write.
    struct ReadOnlyMemory {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl EpisodicMemory for ReadOnlyMemory {
        async fn retrieve_similar(&self, _text: &str, _top_k: usize, _min: f64) -> AdvisoryResult<Vec<RecalledEpisode>> {
            Ok(Vec::new())
        }

        async fn store_episode(&self, _b: &str, _c: &str, _o: &str, _m: BTreeMap<String, String>) -> AdvisoryResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(AdvisoryError::Failed {
                subsystem: "memory",
                message: "disk full".into(),
            })
        }

        async fn len(&self) -> usize {
            0
        }
    }

    fn shell(backend: Arc<dyn GenerationBackend>, dir: &std::path::Path) -> Shell {
        let config = ShellConfig::default()
            .build(crate::config::ConfigOverrides::default())
            .unwrap();
        let advisors = Advisors::heuristic(&config.persona_name, config.interests.clone());
        shell_with_advisors(backend, advisors, config, dir)
    }

    fn shell_with_advisors(
        backend: Arc<dyn GenerationBackend>,
        advisors: Advisors,
        config: ShellConfig,
        dir: &std::path::Path,
    ) -> Shell {
        Shell::new(ShellDeps {
            config: Arc::new(config),
            paths: ShellPaths::rooted_at(dir),
            backends: BackendSet::single(backend),
            advisors,
            store: Arc::new(InMemoryVectorStore::new()),
            capabilities: None,
        })
    }

    #[tokio::test]
    async fn conversational_turn_produces_a_sanitized_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(
            Arc::new(Scripted {
                reply: "### Assistant: The tides follow the moon.\n[emotion: curious]",
            }),
            dir.path(),
        );
        let msgs = sh.handle_turn("tell me about tides", &CancellationToken::new()).await.unwrap();
        match &msgs[0] {
            ShellMessage::Reply { text, emotion, .. } => {
                assert_eq!(text, "The tides follow the moon.");
                assert_eq!(emotion.as_deref(), Some("curious"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(sh.session().history.len(), 2);
        assert_eq!(sh.session().interaction_count, 1);
    }

    #[tokio::test]
    async fn backend_failure_becomes_trouble_reply() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Down), dir.path());
        let msgs = sh.handle_turn("hello there", &CancellationToken::new()).await.unwrap();
        assert_eq!(msgs[0].text(), TROUBLE_REPLY);
    }

    #[tokio::test]
    async fn commands_become_actions() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Scripted { reply: "unused" }), dir.path());
        let msgs = sh.handle_turn("list tokens", &CancellationToken::new()).await.unwrap();
        assert!(matches!(&msgs[0], ShellMessage::Action { text } if text.contains("ArxivSearch")));
        assert!(sh.session().history.is_empty());
    }

    #[tokio::test]
    async fn every_fifth_reply_reflects() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Scripted { reply: "Sure." }), dir.path());
        let cancel = CancellationToken::new();
        for i in 0..4 {
            let msgs = sh.handle_turn(&format!("message number {i}"), &cancel).await.unwrap();
            assert_eq!(msgs.len(), 1);
        }
        let msgs = sh.handle_turn("message number 4", &cancel).await.unwrap();
        assert!(matches!(msgs.last(), Some(ShellMessage::Reflection { .. })));
    }

    #[tokio::test]
    async fn summary_is_published_after_each_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Scripted { reply: "Hi!" }), dir.path());
        let rx = sh.summaries();
        sh.handle_turn("hi", &CancellationToken::new()).await.unwrap();
        assert_eq!(rx.borrow().interaction_count, 1);
        assert_eq!(rx.borrow().recent_turns.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_turn_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Scripted { reply: "never" }), dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sh.handle_turn("what do you think about music", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancelling_mid_generation_leaves_no_half_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = shell(Arc::new(Stalled), dir.path());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = sh.handle_turn("tell me about jazz", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());

        let session = sh.session();
        assert!(session.history.is_empty());
        assert!(session.traces.active().is_none());
        assert_eq!(session.traces.completed_total(), 0);
        assert_eq!(session.interaction_count, 0);
        assert_eq!(session.last_topic, None);
        assert_eq!(session.context_state, crate::advisory::ContextState::default());
    }

    #[tokio::test]
    async fn failed_episode_write_does_not_touch_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShellConfig::default()
            .build(crate::config::ConfigOverrides::default())
            .unwrap();
        let memory = Arc::new(ReadOnlyMemory {
            writes: AtomicUsize::new(0),
        });
        let mut advisors = Advisors::heuristic(&config.persona_name, config.interests.clone());
        advisors.memory = memory.clone();
        let mut sh = shell_with_advisors(Arc::new(Scripted { reply: "Jazz swings." }), advisors, config, dir.path());

        let cancel = CancellationToken::new();
        let msgs = sh.handle_turn("tell me about jazz", &cancel).await.unwrap();
        assert_eq!(msgs[0].text(), "Jazz swings.");

        // Let the background write run and fail.
        for _ in 0..10 {
            if memory.writes.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(memory.writes.load(Ordering::SeqCst), 1);

        let msgs = sh.handle_turn("and bebop", &cancel).await.unwrap();
        assert_eq!(msgs[0].text(), "Jazz swings.");
        assert_eq!(sh.session().history.len(), 4);
    }
}
