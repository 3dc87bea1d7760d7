//! The Command Router.
//!
//! [`rules::parse_command`] decides what the input means; [`CommandRouter`]
//! carries it out against the capability set, the pipeline interpreter and
//! the exploration state. `Ok(None)` means the input is conversational and
//! belongs to the annotation aggregator. Failures other than cancellation
//! come back as user-facing text.

pub mod capabilities;
pub mod rules;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::advisory::EpisodicMemory;
use crate::autonomous::{Explorer, SharedExploration};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::paths::ShellPaths;
use crate::pipeline::{PipelineState, TokenRegistry, run_pipeline, run_single};
use crate::session::Session;
use crate::snapshot::{SessionSummary, write_now};
use capabilities::{Capabilities, CapabilityError, ToolKind, slugify};
use rules::{Command, parse_command};

const INDEX_SEARCH_RESULTS: usize = 5;

/// Everything the router acts on besides the per-turn state.
#[derive(Clone)]
pub struct RouterDeps {
    pub registry: Arc<TokenRegistry>,
    pub capabilities: Arc<dyn Capabilities>,
    pub explorer: Arc<Explorer>,
    pub exploration: SharedExploration,
    pub memory: Arc<dyn EpisodicMemory>,
    pub config: Arc<ShellConfig>,
    pub paths: ShellPaths,
}

pub struct CommandRouter {
    deps: RouterDeps,
}

impl CommandRouter {
    pub fn new(deps: RouterDeps) -> Self {
        Self { deps }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.deps.registry
    }

    /// Route one input. `Ok(None)` means "not a command".
    pub async fn route(
        &self,
        input: &str,
        session: &mut Session,
        pipeline: &mut PipelineState,
        cancel: &CancellationToken,
    ) -> ShellResult<Option<String>> {
        let Some(command) = parse_command(input, session.pending.is_some(), &self.deps.registry) else {
            return Ok(None);
        };
        tracing::debug!(?command, "routed command");
        let result = self.execute(command, session, pipeline, cancel).await;
        settle(result, cancel).map(Some)
    }

    async fn execute(
        &self,
        command: Command,
        session: &mut Session,
        pipeline: &mut PipelineState,
        cancel: &CancellationToken,
    ) -> ShellResult<String> {
        let caps = &self.deps.capabilities;
        match command {
            Command::Help => Ok(HELP_TEXT.to_string()),
            Command::ListTokens => Ok(self
                .deps
                .registry
                .render_listing(self.deps.config.token_listing_limit)
                .trim_end()
                .to_string()),
            Command::PipelineHelp => Ok(format!(
                "{PIPELINE_HELP_TEXT}\n\n{}",
                self.deps
                    .registry
                    .render_listing(self.deps.config.token_listing_limit)
                    .trim_end()
            )),
            Command::Stats => Ok(self.stats(session, pipeline).await),
            Command::ListSkills => Ok(caps
                .list_skills()
                .iter()
                .map(|(name, description)| format!("  {name:<12} {description}"))
                .collect::<Vec<_>>()
                .join("\n")),
            Command::Snapshot => {
                let path = write_now(&self.deps.paths, &SessionSummary::of(session), &self.deps.exploration).await?;
                Ok(format!("Snapshot saved to {}", path.display()))
            }
            Command::Confirm => {
                let Some(request) = session.take_pending() else {
                    return Ok("There is nothing waiting for confirmation.".into());
                };
                tracing::info!(topic = %request.topic, "confirmed tool request");
                Ok(caps.create_tool(&slugify(&request.topic), &request.description).await?)
            }
            Command::RunTool { name, args } | Command::UseTool { name, args } => {
                Ok(caps.run_tool(&name, &args, cancel).await?)
            }
            Command::WebSearch { query } => Ok(caps.web_search(&query).await?),
            Command::Learn { topic } => Ok(caps.learn_about(&topic).await?),
            Command::CreateTool { name, description } => Ok(caps.create_tool(&name, &description).await?),
            Command::RequestTool { topic, description } => {
                let name = slugify(&topic);
                let reply = format!(
                    "Shall I create a tool \"{name}\" that {description}? Say \"yes\" to confirm."
                );
                session.set_pending(topic, description);
                Ok(reply)
            }
            Command::SmartTool { topic } => Ok(caps.create_smart_tool(&topic, cancel).await?),
            Command::Recall { query } => Ok(caps.recall(&query).await?),
            Command::MindState => Ok(self.mind_state(session)),
            Command::Think { topic } => {
                self.add_interest(&topic);
                let discovery = self.deps.explorer.explore(&topic, cancel).await?;
                Ok(format!("Thinking about {topic}: {}", discovery.fact))
            }
            Command::AddInterest { topic } => Ok(if self.add_interest(&topic) {
                format!("Added \"{topic}\" to my interests.")
            } else {
                format!("\"{topic}\" is already one of my interests.")
            }),
            Command::Reindex => {
                let n = caps.reindex(pipeline.store.as_ref()).await?;
                Ok(format!("Reindexed {n} document(s)."))
            }
            Command::IndexSearch { query } => {
                let hits = pipeline.store.search(&query, INDEX_SEARCH_RESULTS);
                Ok(if hits.is_empty() {
                    format!("Nothing in the index matches \"{query}\".")
                } else {
                    hits.iter()
                        .map(|(text, score)| format!("{score:.2}  {text}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
            Command::Emergence { topic } => Ok(self
                .deps
                .exploration
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .emergence(&topic)),
            Command::Pipeline { expr } => {
                let report = run_pipeline(&self.deps.registry, pipeline, &expr, cancel).await?;
                session.pipeline_context_sticky = true;
                Ok(report.narrative())
            }
            Command::Step { expr } => {
                let report = run_single(&self.deps.registry, pipeline, &expr, cancel).await?;
                session.pipeline_context_sticky = true;
                Ok(report.narrative())
            }
            Command::ListTools => Ok(caps
                .list_tools()
                .iter()
                .map(|t| {
                    let kind = match t.kind {
                        ToolKind::Native => "native",
                        ToolKind::Created => "created",
                        ToolKind::Smart => "smart",
                    };
                    format!("  {:<20} [{kind}] {}", t.name, t.description)
                })
                .collect::<Vec<_>>()
                .join("\n")),
            Command::SelfModificationHelp => Ok(caps.self_modification_help()),
            Command::Rebuild => Ok(caps.rebuild().await?),
            Command::ModificationHistory => {
                let history = caps.modification_history();
                Ok(if history.is_empty() {
                    "No modifications yet.".to_string()
                } else {
                    history
                        .iter()
                        .map(|r| format!("{} {}: {}", r.at.format("%Y-%m-%d %H:%M:%S"), r.action, r.detail))
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
        }
    }

    fn add_interest(&self, topic: &str) -> bool {
        self.deps
            .exploration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add_interest(topic)
    }

    fn mind_state(&self, session: &Session) -> String {
        let e = &session.emotion;
        let state = self.deps.exploration.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = format!(
            "Feeling {} (valence {:+.2}, arousal {:.2}), awareness {:.2}.\nFocused on {}.",
            e.dominant_emotion,
            e.valence,
            e.arousal,
            e.awareness,
            e.focus.as_deref().unwrap_or("nothing in particular")
        );
        if !state.interests.is_empty() {
            out.push_str(&format!("\nInterests: {}.", state.interests.join(", ")));
        }
        match state.discoveries.back() {
            Some(d) => out.push_str(&format!(
                "\n{} discoveries so far; latest, about {}: {}",
                state.discoveries.len(),
                d.interest,
                d.fact
            )),
            None => out.push_str("\nNo discoveries yet."),
        }
        out
    }

    async fn stats(&self, session: &Session, pipeline: &PipelineState) -> String {
        let cfg = &self.deps.config;
        let uptime = session.uptime().as_secs();
        let memories = self.deps.memory.len().await;
        let (interests, discoveries, epoch) = {
            let s = self.deps.exploration.lock().unwrap_or_else(|e| e.into_inner());
            (s.interests.len(), s.discoveries.len(), s.epoch)
        };
        let on_off = |b: bool| if b { "on" } else { "off" };
        format!(
            "Persona: {} ({})\n\
             Interactions: {}, uptime {}m {}s\n\
             Model: {} at {}, embeddings {}\n\
             Vector store: in-memory, {} document(s){}\n\
             Episodic memories: {memories}\n\
             Tokens: {}, tools: {}, skills: {}\n\
             Interests: {interests}, discoveries: {discoveries}, exploration epoch: {epoch}\n\
             Voice: {}, avatar: {}",
            session.persona_name,
            session.persona_id,
            session.interaction_count,
            uptime / 60,
            uptime % 60,
            cfg.model,
            cfg.endpoint,
            cfg.embedding_model,
            pipeline.store.len(),
            cfg.vector_store_url
                .as_deref()
                .map(|u| format!(" (configured endpoint {u} not in use)"))
                .unwrap_or_default(),
            self.deps.registry.len(),
            self.deps.capabilities.list_tools().len(),
            self.deps.capabilities.list_skills().len(),
            on_off(cfg.voice_enabled),
            on_off(cfg.avatar_enabled),
        )
    }
}

/// Keep cancellation as an error; turn every other failure into a reply.
fn settle(result: ShellResult<String>, cancel: &CancellationToken) -> ShellResult<String> {
    match result {
        Ok(text) => Ok(text),
        Err(_) if cancel.is_cancelled() => Err(ShellError::Cancelled),
        Err(ShellError::Cancelled) => Err(ShellError::Cancelled),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            Ok(describe_failure(&e))
        }
    }
}

fn describe_failure(err: &ShellError) -> String {
    match err {
        ShellError::Capability(CapabilityError::UnknownTool {
            name,
            suggestion: Some(s),
        }) => format!("I don't have a tool called \"{name}\". Did you mean \"{s}\"?"),
        other => format!("That didn't work: {other}"),
    }
}

const HELP_TEXT: &str = "\
Talk to me normally, or use a command:
  list tokens | pipeline help      the pipeline DSL, e.g. WikiSearch 'otters' | Summarize
  list tools | run <tool> [args]   tools; `create tool <name> <description>` adds one
  create a tool that <...>         describe a tool in plain words, then confirm with yes
  smart tool for <topic>           let me design a tool
  google search <query>            quick web answer
  learn about <topic>              read up and remember it
  remember <query>                 recall past conversations
  think about <topic>              explore a topic now
  add interest <topic>             explore it in the background
  emergence <topic>                what has emerged from exploration
  search the index for <query>     search remembered text; `reindex` rebuilds it
  skills | use skill <name> <text> prompt skills
  how are you feeling              my current state
  stats | snapshot                 session statistics, save a snapshot
  self modification help | rebuild | modification history";

const PIPELINE_HELP_TEXT: &str = "\
Pipelines chain tokens with |, left to right, over one shared state:
  Name['bracketed'] | Name 'single quoted' | Name \"double quoted\" | Name bare text
Each step may read and rewrite the query, prompt, output and topic. An
argument also becomes the new query and prompt. A failing or unknown step
is reported and the chain carries on.";
