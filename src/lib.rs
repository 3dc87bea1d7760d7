// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # persona-shell
//!
//! An interactive conversational agent shell. Each input either becomes a
//! structured action against a small set of capabilities, or a reply from a
//! text-generation backend, annotated along the way by several independent
//! advisory subsystems.
//!
//! ## Architecture
//!
//! - **Command router** (`router`): ordered rules that claim an input, plus
//!   the capability contract they drive (tools, skills, recall, search)
//! - **Pipeline DSL** (`pipeline`): `Name 'arg' | Name2 "arg2"` chains over a
//!   shared state, a token registry, and a natural-language translator
//! - **Annotation** (`cognition`): ethics gate, context shift, memory,
//!   symbolic and causal notes, integration-driven backend choice, prompt
//!   assembly, metacognitive traces
//! - **Generation** (`backend`): Ollama client and the output sanitizer
//! - **Background** (`autonomous`, `snapshot`): interest exploration and
//!   periodic persona snapshots
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use persona_shell::advisory::Advisors;
//! use persona_shell::backend::BackendSet;
//! use persona_shell::backend::ollama::{OllamaBackend, OllamaConfig};
//! use persona_shell::config::ShellConfig;
//! use persona_shell::paths::ShellPaths;
//! use persona_shell::pipeline::InMemoryVectorStore;
//! use persona_shell::shell::{Shell, ShellDeps};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> persona_shell::error::ShellResult<()> {
//! let config = ShellConfig::default();
//! let backend = OllamaBackend::new(OllamaConfig {
//!     base_url: config.endpoint.clone(),
//!     model: config.model.clone(),
//!     timeout_secs: config.timeout_secs,
//! });
//! let mut shell = Shell::new(ShellDeps {
//!     advisors: Advisors::heuristic(&config.persona_name, config.interests.clone()),
//!     config: Arc::new(config),
//!     paths: ShellPaths::resolve()?,
//!     backends: BackendSet::single(Arc::new(backend)),
//!     store: Arc::new(InMemoryVectorStore::new()),
//!     capabilities: None,
//! });
//! for msg in shell.handle_turn("WikiSearch 'Otter' | Summarize", &CancellationToken::new()).await? {
//!     println!("{}", msg.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod advisory;
pub mod autonomous;
pub mod backend;
pub mod cognition;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod message;
pub mod paths;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod shell;
pub mod snapshot;
pub mod text;
pub mod web;
