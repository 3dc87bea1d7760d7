//! Ollama client for reply generation.
//!
//! Requests are plain blocking `ureq` calls executed on tokio's blocking pool
//! and raced against the turn's cancellation token. A cancelled request is
//! abandoned; its thread finishes in the background and the result is dropped.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{BackendError, BackendResult, Generation, GenerationBackend};

/// Configuration for one Ollama model.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

/// [`GenerationBackend`] over the Ollama `/api/generate` endpoint.
pub struct OllamaBackend {
    config: OllamaConfig,
}

impl OllamaBackend {
    pub fn new(config: OllamaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Check `/api/tags` and whether the configured model is pulled.
    ///
    /// Blocking; call from `spawn_blocking` inside the runtime.
    pub fn probe(&self) -> BackendResult<bool> {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        let resp = agent.get(&url).call().map_err(|_| BackendError::Unavailable {
            url: self.config.base_url.clone(),
        })?;
        let json: serde_json::Value = resp.into_json().map_err(|e| BackendError::ParseError {
            message: e.to_string(),
        })?;
        let target = &self.config.model;
        let has_model = json["models"]
            .as_array()
            .map(|models| {
                models.iter().filter_map(|m| m["name"].as_str()).any(|name| {
                    name == target || name.split(':').next() == Some(target.as_str())
                })
            })
            .unwrap_or(false);
        Ok(has_model)
    }

    fn generate_blocking(config: &OllamaConfig, prompt: &str) -> BackendResult<String> {
        let url = format!("{}/api/generate", config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs + 5))
            .build();

        let body = serde_json::json!({
            "model": config.model,
            "prompt": prompt,
            "stream": false,
        });

        let resp = agent
            .post(&url)
            .send_json(body)
            .map_err(|e| match e {
                ureq::Error::Transport(t) if t.kind() == ureq::ErrorKind::ConnectionFailed => {
                    BackendError::Unavailable {
                        url: config.base_url.clone(),
                    }
                }
                other => BackendError::RequestFailed {
                    message: other.to_string(),
                },
            })?;

        let json: serde_json::Value = resp.into_json().map_err(|e| BackendError::ParseError {
            message: e.to_string(),
        })?;

        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str, cancel: &CancellationToken) -> BackendResult<Generation> {
        let config = self.config.clone();
        let prompt = prompt.to_string();
        let timeout_secs = config.timeout_secs;
        let request = tokio::task::spawn_blocking(move || Self::generate_blocking(&config, &prompt));

        let raw = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            r = tokio::time::timeout(Duration::from_secs(timeout_secs), request) => match r {
                Err(_) => return Err(BackendError::Timeout { timeout_secs }),
                Ok(Err(join)) => return Err(BackendError::RequestFailed { message: join.to_string() }),
                Ok(Ok(result)) => result?,
            },
        };

        tracing::debug!(model = %self.config.model, chars = raw.len(), "generation complete");
        Ok(Generation::text(raw))
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let backend = OllamaBackend::new(OllamaConfig {
            base_url: "http://127.0.0.1:1".into(), // unreachable port
            timeout_secs: 5,
            ..Default::default()
        });
        let result = backend.generate("hello", &CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_cancelled() {
        let backend = OllamaBackend::new(OllamaConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = backend.generate("hello", &cancel).await;
        assert!(matches!(result, Err(BackendError::Cancelled)));
    }

    #[test]
    fn probe_unreachable_is_unavailable() {
        let backend = OllamaBackend::new(OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        });
        assert!(matches!(backend.probe(), Err(BackendError::Unavailable { .. })));
    }
}
