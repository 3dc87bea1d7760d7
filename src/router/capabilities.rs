//! Actions the command router can take on the user's behalf.
//!
//! [`Capabilities`] is the seam between routing and doing. [`LocalCapabilities`]
//! is the in-process implementation: a handful of native tools, tools created
//! during the session (described in prose and executed through the generation
//! backend), prompt-template skills, web lookups, episodic recall, and an
//! append-only modification history.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::advisory::EpisodicMemory;
use crate::backend::{BackendError, GenerationBackend};
use crate::fuzzy::nearest_by_edit_distance;
use crate::pipeline::VectorStore;
use crate::web::{self, WebError};

/// Errors from capability actions.
#[derive(Debug, Error, Diagnostic)]
pub enum CapabilityError {
    #[error("no tool named \"{name}\"")]
    #[diagnostic(
        code(persona::capability::unknown_tool),
        help("List tools with `list tools`, or create one with `create tool <name> <description>`.")
    )]
    UnknownTool {
        name: String,
        suggestion: Option<String>,
    },

    #[error("a tool named \"{name}\" already exists")]
    #[diagnostic(code(persona::capability::duplicate_tool))]
    DuplicateTool { name: String },

    #[error("invalid tool name \"{name}\"")]
    #[diagnostic(
        code(persona::capability::invalid_name),
        help("Tool names start with a letter and use letters, digits, `_` or `-`.")
    )]
    InvalidName { name: String },

    #[error("no skill named \"{name}\"")]
    #[diagnostic(
        code(persona::capability::unknown_skill),
        help("List skills with `skills`.")
    )]
    UnknownSkill { name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Web(#[from] WebError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error("memory lookup failed: {message}")]
    #[diagnostic(code(persona::capability::memory))]
    Memory { message: String },
}

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// How a tool is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Native,
    Created,
    Smart,
}

#[derive(Debug, Clone)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub kind: ToolKind,
}

#[derive(Debug, Clone)]
pub struct ModificationRecord {
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: String,
}

/// What the router can ask for.
#[async_trait]
pub trait Capabilities: Send + Sync {
    fn list_tools(&self) -> Vec<ToolSummary>;

    fn tool_names(&self) -> Vec<String> {
        self.list_tools().into_iter().map(|t| t.name).collect()
    }

    async fn run_tool(&self, name: &str, args: &str, cancel: &CancellationToken) -> CapabilityResult<String>;

    async fn create_tool(&self, name: &str, description: &str) -> CapabilityResult<String>;

    async fn create_smart_tool(&self, topic: &str, cancel: &CancellationToken) -> CapabilityResult<String>;

    async fn web_search(&self, query: &str) -> CapabilityResult<String>;

    async fn learn_about(&self, topic: &str) -> CapabilityResult<String>;

    fn list_skills(&self) -> Vec<(String, String)>;

    async fn invoke_skill(&self, name: &str, arg: &str, cancel: &CancellationToken) -> CapabilityResult<String>;

    async fn recall(&self, query: &str) -> CapabilityResult<String>;

    async fn reindex(&self, store: &dyn VectorStore) -> CapabilityResult<usize>;

    fn self_modification_help(&self) -> String;

    async fn rebuild(&self) -> CapabilityResult<String>;

    fn modification_history(&self) -> Vec<ModificationRecord>;
}

struct CreatedTool {
    name: String,
    description: String,
    kind: ToolKind,
}

struct Skill {
    name: &'static str,
    description: &'static str,
    template: &'static str,
}

const SKILLS: &[Skill] = &[
    Skill {
        name: "define",
        description: "Define a word or phrase in plain language.",
        template: "Define \"{input}\" in two plain sentences, then give one example of its use.",
    },
    Skill {
        name: "translate",
        description: "Translate text; start with the target language.",
        template: "Translate the following. The first word names the target language; \
                   output only the translation.\n\n{input}",
    },
    Skill {
        name: "brainstorm",
        description: "List five distinct ideas about a topic.",
        template: "List five distinct, concrete ideas about: {input}\nOne per line, no preamble.",
    },
    Skill {
        name: "explain",
        description: "Explain a concept to a curious beginner.",
        template: "Explain {input} to a curious beginner in one short paragraph.",
    },
];

const NATIVE_TOOLS: &[(&str, &str)] = &[
    ("clock", "Current date and time in UTC."),
    ("echo", "Repeat the arguments back."),
    ("word_count", "Count words and characters in the arguments."),
];

/// In-process capability set.
pub struct LocalCapabilities {
    backend: Arc<dyn GenerationBackend>,
    memory: Arc<dyn EpisodicMemory>,
    http_timeout_secs: u64,
    tools: Mutex<Vec<CreatedTool>>,
    history: Mutex<Vec<ModificationRecord>>,
}

impl LocalCapabilities {
    pub fn new(backend: Arc<dyn GenerationBackend>, memory: Arc<dyn EpisodicMemory>, http_timeout_secs: u64) -> Self {
        Self {
            backend,
            memory,
            http_timeout_secs,
            tools: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, action: &str, detail: impl Into<String>) {
        let record = ModificationRecord {
            at: Utc::now(),
            action: action.to_string(),
            detail: detail.into(),
        };
        tracing::info!(action, detail = %record.detail, "self-modification");
        self.history.lock().unwrap_or_else(|e| e.into_inner()).push(record);
    }

    fn find_created(&self, name: &str) -> Option<(String, ToolKind)> {
        self.tools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| (t.description.clone(), t.kind))
    }

    fn unknown_tool(&self, name: &str) -> CapabilityError {
        let names = self.tool_names();
        CapabilityError::UnknownTool {
            name: name.to_string(),
            suggestion: nearest_by_edit_distance(name, names.iter().map(String::as_str)),
        }
    }
}

fn valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `quantum computing` -> `quantum_computing`.
pub fn slugify(text: &str) -> String {
    let mut out = String::new();
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

#[async_trait]
impl Capabilities for LocalCapabilities {
    fn list_tools(&self) -> Vec<ToolSummary> {
        let mut out: Vec<ToolSummary> = NATIVE_TOOLS
            .iter()
            .map(|(name, description)| ToolSummary {
                name: name.to_string(),
                description: description.to_string(),
                kind: ToolKind::Native,
            })
            .collect();
        out.extend(
            self.tools
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .map(|t| ToolSummary {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    kind: t.kind,
                }),
        );
        out
    }

    async fn run_tool(&self, name: &str, args: &str, cancel: &CancellationToken) -> CapabilityResult<String> {
        match name {
            "clock" => return Ok(Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            "echo" => return Ok(args.to_string()),
            "word_count" => {
                return Ok(format!(
                    "{} words, {} characters",
                    args.split_whitespace().count(),
                    args.chars().count()
                ));
            }
            _ => {}
        }
        let Some((description, _)) = self.find_created(name) else {
            return Err(self.unknown_tool(name));
        };
        let prompt = format!(
            "You are a tool named {name}. Your job: {description}\n\
             Input: {args}\n\
             Respond with the tool's output only."
        );
        let generation = self.backend.generate(&prompt, cancel).await?;
        Ok(generation.text.trim().to_string())
    }

    async fn create_tool(&self, name: &str, description: &str) -> CapabilityResult<String> {
        let name = name.trim();
        if !valid_tool_name(name) {
            return Err(CapabilityError::InvalidName { name: name.to_string() });
        }
        if NATIVE_TOOLS.iter().any(|(n, _)| n.eq_ignore_ascii_case(name)) || self.find_created(name).is_some() {
            return Err(CapabilityError::DuplicateTool { name: name.to_string() });
        }
        let description = if description.trim().is_empty() {
            format!("Helps with {name}.")
        } else {
            description.trim().to_string()
        };
        self.tools.lock().unwrap_or_else(|e| e.into_inner()).push(CreatedTool {
            name: name.to_string(),
            description: description.clone(),
            kind: ToolKind::Created,
        });
        self.record("create_tool", format!("{name}: {description}"));
        Ok(format!("Created tool \"{name}\": {description}"))
    }

    async fn create_smart_tool(&self, topic: &str, cancel: &CancellationToken) -> CapabilityResult<String> {
        let name = format!("smart_{}", slugify(topic));
        if !valid_tool_name(&name) || name == "smart_" {
            return Err(CapabilityError::InvalidName { name });
        }
        if self.find_created(&name).is_some() {
            return Err(CapabilityError::DuplicateTool { name });
        }
        let prompt = format!(
            "Describe, in one sentence starting with a verb, a useful text tool about {topic}."
        );
        let description = self.backend.generate(&prompt, cancel).await?.text.trim().to_string();
        self.tools.lock().unwrap_or_else(|e| e.into_inner()).push(CreatedTool {
            name: name.clone(),
            description: description.clone(),
            kind: ToolKind::Smart,
        });
        self.record("create_smart_tool", format!("{name}: {description}"));
        Ok(format!("Created smart tool \"{name}\": {description}"))
    }

    async fn web_search(&self, query: &str) -> CapabilityResult<String> {
        let q = query.to_string();
        let timeout = self.http_timeout_secs;
        let answers = web::run_blocking(move || web::instant_answer(&q, timeout)).await?;
        Ok(answers
            .iter()
            .enumerate()
            .map(|(i, a)| format!("{}. {a}", i + 1))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn learn_about(&self, topic: &str) -> CapabilityResult<String> {
        let t = topic.to_string();
        let timeout = self.http_timeout_secs;
        let extract = web::run_blocking(move || web::wikipedia_extract(&t, timeout)).await?;
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "wikipedia".to_string());
        self.memory
            .store_episode("learning", topic, &extract, metadata)
            .await
            .map_err(|e| CapabilityError::Memory { message: e.to_string() })?;
        Ok(format!("Learned about {topic}:\n{extract}"))
    }

    fn list_skills(&self) -> Vec<(String, String)> {
        SKILLS
            .iter()
            .map(|s| (s.name.to_string(), s.description.to_string()))
            .collect()
    }

    async fn invoke_skill(&self, name: &str, arg: &str, cancel: &CancellationToken) -> CapabilityResult<String> {
        let skill = SKILLS
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CapabilityError::UnknownSkill { name: name.to_string() })?;
        let prompt = skill.template.replace("{input}", arg);
        let generation = self.backend.generate(&prompt, cancel).await?;
        Ok(generation.text.trim().to_string())
    }

    async fn recall(&self, query: &str) -> CapabilityResult<String> {
        let hits = self
            .memory
            .retrieve_similar(query, 5, 0.2)
            .await
            .map_err(|e| CapabilityError::Memory { message: e.to_string() })?;
        if hits.is_empty() {
            return Ok(format!("I don't remember anything about \"{query}\"."));
        }
        Ok(hits
            .iter()
            .map(|h| {
                format!(
                    "[From {}]: {}",
                    h.episode.recorded_at.format("%Y-%m-%d %H:%M"),
                    h.episode.summary()
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn reindex(&self, store: &dyn VectorStore) -> CapabilityResult<usize> {
        let n = store.reindex();
        self.record("reindex", format!("{n} documents"));
        Ok(n)
    }

    fn self_modification_help(&self) -> String {
        "I can extend myself during a session:\n\
         - create tool <name> <description>   define a tool in plain language\n\
         - create a tool that <does something> describe it and confirm with \"yes\"\n\
         - smart tool for <topic>             let me draft the tool description\n\
         - run <tool> [args]                  run a tool\n\
         - rebuild                            reload all created tools\n\
         - modification history               what has changed so far"
            .to_string()
    }

    async fn rebuild(&self) -> CapabilityResult<String> {
        let n = self.tools.lock().unwrap_or_else(|e| e.into_inner()).len();
        self.record("rebuild", format!("{n} created tool(s) reloaded"));
        Ok(format!(
            "Rebuilt tool set: {} native, {n} created.",
            NATIVE_TOOLS.len()
        ))
    }

    fn modification_history(&self) -> Vec<ModificationRecord> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::heuristic::InMemoryEpisodes;
    use crate::backend::{BackendResult, Generation};

    struct Canned(&'static str);

    #[async_trait]
    impl GenerationBackend for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
            Ok(Generation::text(self.0))
        }
    }

    fn caps() -> LocalCapabilities {
        LocalCapabilities::new(
            Arc::new(Canned("Converts units.")),
            Arc::new(InMemoryEpisodes::default()),
            5,
        )
    }

    #[tokio::test]
    async fn created_tools_are_listed_and_recorded() {
        let c = caps();
        c.create_tool("converter", "convert units").await.unwrap();
        assert!(c.tool_names().contains(&"converter".to_string()));
        assert!(matches!(
            c.create_tool("converter", "again").await,
            Err(CapabilityError::DuplicateTool { .. })
        ));
        let history = c.modification_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "create_tool");
    }

    #[tokio::test]
    async fn unknown_tool_suggests_nearest() {
        let c = caps();
        let err = c.run_tool("clokc", "", &CancellationToken::new()).await.unwrap_err();
        match err {
            CapabilityError::UnknownTool { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("clock"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn created_tool_runs_through_backend() {
        let c = caps();
        c.create_tool("units", "convert units").await.unwrap();
        let out = c.run_tool("units", "3 feet", &CancellationToken::new()).await.unwrap();
        assert_eq!(out, "Converts units.");
    }

    #[tokio::test]
    async fn smart_tool_takes_backend_description() {
        let c = caps();
        let msg = c.create_smart_tool("Unit conversion", &CancellationToken::new()).await.unwrap();
        assert!(msg.contains("smart_unit_conversion"));
        assert!(msg.contains("Converts units."));
    }

    #[tokio::test]
    async fn native_tools_run_locally() {
        let c = caps();
        let cancel = CancellationToken::new();
        assert_eq!(c.run_tool("echo", "hi there", &cancel).await.unwrap(), "hi there");
        assert_eq!(
            c.run_tool("word_count", "a bb ccc", &cancel).await.unwrap(),
            "3 words, 8 characters"
        );
    }

    #[tokio::test]
    async fn recall_prefixes_timestamps() {
        let c = caps();
        c.memory
            .store_episode("conversation", "jazz history", "talked about bebop", BTreeMap::new())
            .await
            .unwrap();
        let out = c.recall("jazz").await.unwrap();
        assert!(out.starts_with("[From "));
        assert!(out.contains("jazz history -> talked about bebop"));
    }

    #[tokio::test]
    async fn skills_are_case_insensitive() {
        let c = caps();
        let out = c.invoke_skill("Define", "entropy", &CancellationToken::new()).await.unwrap();
        assert_eq!(out, "Converts units.");
        assert!(c.invoke_skill("juggle", "x", &CancellationToken::new()).await.is_err());
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Quantum  Computing! "), "quantum_computing");
        assert!(valid_tool_name("unit-conv_2"));
        assert!(!valid_tool_name("2fast"));
    }
}
