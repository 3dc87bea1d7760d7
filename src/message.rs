//! Structured output messages.
//!
//! Everything the shell shows the user goes through a [`MessageSink`] as a
//! typed [`ShellMessage`]: styled terminal text, newline-delimited JSON, or
//! an in-memory collector for tests.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// ── Message types ───────────────────────────────────────────────────────

/// A structured message emitted by the shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShellMessage {
    /// Conversational reply from the persona.
    Reply {
        persona: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        emotion: Option<String>,
    },
    /// Result of a routed command or pipeline.
    Action { text: String },
    /// The ethics gate declined to generate a reply.
    Refusal { text: String },
    /// Periodic quality reflection over recent replies.
    Reflection { text: String },
    /// Something learned by background exploration.
    Discovery { interest: String, fact: String },
    /// Status or informational message.
    System { text: String },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
}

// ── MessageSink trait ───────────────────────────────────────────────────

/// A destination for shell messages.
pub trait MessageSink: Send + Sync {
    fn emit(&self, msg: &ShellMessage);

    fn emit_batch(&self, msgs: &[ShellMessage]) {
        for m in msgs {
            self.emit(m);
        }
    }
}

// ── StdoutSink ──────────────────────────────────────────────────────────

/// Renders messages as terminal output. Errors go to stderr.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn emit(&self, msg: &ShellMessage) {
        match msg {
            ShellMessage::Reply { persona, text, .. } => println!("{persona}: {text}"),
            ShellMessage::Action { text } => println!("{text}"),
            ShellMessage::Refusal { text } => println!("[declined] {text}"),
            ShellMessage::Reflection { text } => println!("[reflection] {text}"),
            ShellMessage::Discovery { interest, fact } => println!("[discovery:{interest}] {fact}"),
            ShellMessage::System { text } => println!("{text}"),
            ShellMessage::Error { code, message, help } => {
                eprintln!("[error:{code}] {message}");
                if let Some(h) = help {
                    eprintln!("  help: {h}");
                }
            }
        }
    }
}

// ── JsonSink ────────────────────────────────────────────────────────────

/// Emits messages as newline-delimited JSON.
pub struct JsonSink;

impl MessageSink for JsonSink {
    fn emit(&self, msg: &ShellMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            println!("{json}");
        }
    }
}

// ── VecSink ─────────────────────────────────────────────────────────────

/// Collects messages for testing.
#[derive(Default)]
pub struct VecSink {
    messages: Mutex<Vec<ShellMessage>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ShellMessage> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSink for VecSink {
    fn emit(&self, msg: &ShellMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(msg.clone());
    }
}

// ── Convenience constructors ────────────────────────────────────────────

impl ShellMessage {
    pub fn reply(persona: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Reply {
            persona: persona.into(),
            text: text.into(),
            emotion: None,
        }
    }

    pub fn action(text: impl Into<String>) -> Self {
        Self::Action { text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
            help: None,
        }
    }

    /// Build an error message from a miette diagnostic.
    pub fn from_diagnostic(err: &dyn miette::Diagnostic) -> Self {
        Self::Error {
            code: err.code().map_or_else(|| "persona::error".to_string(), |c| c.to_string()),
            message: err.to_string(),
            help: err.help().map(|h| h.to_string()),
        }
    }

    /// The main text of the message.
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { text, .. }
            | Self::Action { text }
            | Self::Refusal { text }
            | Self::Reflection { text }
            | Self::System { text } => text,
            Self::Discovery { fact, .. } => fact,
            Self::Error { message, .. } => message,
        }
    }
}
