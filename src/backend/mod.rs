//! Text-generation backends.
//!
//! A [`GenerationBackend`] turns an assembled prompt into raw text plus an
//! optional emotion side channel. [`BackendSet`] holds the primary backend
//! and the optional orchestrated/base alternates the integration score can
//! switch to. Raw output is always passed through [`sanitize::sanitize`]
//! before it reaches the user.

pub mod ollama;
pub mod sanitize;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::session::EmotionReading;

/// Errors from a generation backend.
#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("generation backend is not available at {url}")]
    #[diagnostic(
        code(persona::backend::unavailable),
        help("Start Ollama with `ollama serve`, or pass --endpoint to point at a running server.")
    )]
    Unavailable { url: String },

    #[error("generation request failed: {message}")]
    #[diagnostic(
        code(persona::backend::request_failed),
        help("Check that the server is running and the model is pulled.")
    )]
    RequestFailed { message: String },

    #[error("failed to parse generation response: {message}")]
    #[diagnostic(
        code(persona::backend::parse_error),
        help("The model returned an unexpected response format.")
    )]
    ParseError { message: String },

    #[error("generation request timed out after {timeout_secs}s")]
    #[diagnostic(
        code(persona::backend::timeout),
        help("Increase timeout_secs in the config or use a smaller model.")
    )]
    Timeout { timeout_secs: u64 },

    #[error("generation cancelled")]
    #[diagnostic(code(persona::backend::cancelled))]
    Cancelled,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Raw backend output.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub emotion: Option<EmotionReading>,
}

impl Generation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            emotion: None,
        }
    }
}

/// Anything that can complete a prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier for logs and `stats` (usually the model name).
    fn name(&self) -> &str;

    /// Complete `prompt`. Must return promptly with
    /// [`BackendError::Cancelled`] once `cancel` fires.
    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> BackendResult<Generation>;
}

/// Which configured backend a turn should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Primary,
    Orchestrated,
    Base,
}

impl BackendChoice {
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Orchestrated => "orchestrated",
            Self::Base => "base",
        }
    }
}

/// Primary backend plus optional alternates.
#[derive(Clone)]
pub struct BackendSet {
    pub primary: Arc<dyn GenerationBackend>,
    pub orchestrated: Option<Arc<dyn GenerationBackend>>,
    pub base: Option<Arc<dyn GenerationBackend>>,
}

impl BackendSet {
    pub fn single(primary: Arc<dyn GenerationBackend>) -> Self {
        Self {
            primary,
            orchestrated: None,
            base: None,
        }
    }

    pub fn has_orchestrated(&self) -> bool {
        self.orchestrated.is_some()
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    /// Resolve a choice; an unconfigured alternate resolves to the primary.
    pub fn get(&self, choice: BackendChoice) -> &Arc<dyn GenerationBackend> {
        match choice {
            BackendChoice::Primary => &self.primary,
            BackendChoice::Orchestrated => self.orchestrated.as_ref().unwrap_or(&self.primary),
            BackendChoice::Base => self.base.as_ref().unwrap_or(&self.primary),
        }
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSet")
            .field("primary", &self.primary.name())
            .field("orchestrated", &self.orchestrated.as_ref().map(|b| b.name().to_string()))
            .field("base", &self.base.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl GenerationBackend for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn generate(&self, _prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
            Ok(Generation::text(self.0))
        }
    }

    #[test]
    fn missing_alternates_fall_back_to_primary() {
        let set = BackendSet::single(Arc::new(Named("main")));
        assert_eq!(set.get(BackendChoice::Orchestrated).name(), "main");
        assert_eq!(set.get(BackendChoice::Base).name(), "main");
    }

    #[test]
    fn configured_alternates_resolve() {
        let set = BackendSet {
            primary: Arc::new(Named("main")),
            orchestrated: Some(Arc::new(Named("big"))),
            base: Some(Arc::new(Named("small"))),
        };
        assert_eq!(set.get(BackendChoice::Orchestrated).name(), "big");
        assert_eq!(set.get(BackendChoice::Base).name(), "small");
        assert_eq!(set.get(BackendChoice::Primary).name(), "main");
    }
}
