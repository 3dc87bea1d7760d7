//! Shell configuration: persona identity, generation endpoints, toggles.
//!
//! Persisted as TOML in `$XDG_CONFIG_HOME/persona-shell/config.toml`. Command
//! line flags are applied on top with [`ConfigOverrides`]; the result is frozen
//! behind an `Arc` and never mutated for the life of the process.

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(persona::config::read),
        help("Ensure the config file exists and is readable, or omit --config to use defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(persona::config::parse),
        help("Check the TOML syntax. Every key is optional; unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(persona::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for {field}: {message}")]
    #[diagnostic(code(persona::config::invalid))]
    Invalid { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Immutable shell configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    /// Display name of the persona.
    pub persona_name: String,
    /// Stable identifier used for snapshots. Empty means "derive from name".
    pub persona_id: String,
    /// Primary generation model.
    pub model: String,
    /// Generation endpoint (Ollama-compatible).
    pub endpoint: String,
    /// Embedding model name, reported to the vector store.
    pub embedding_model: String,
    /// Optional external vector-store endpoint.
    pub vector_store_url: Option<String>,
    /// Model used when the integration score is high.
    pub orchestrated_model: Option<String>,
    /// Model used when the integration score is low.
    pub base_model: Option<String>,
    /// Locale treated as "default"; replies mirror the user otherwise.
    pub default_locale: String,
    /// Per-request generation timeout.
    pub timeout_secs: u64,
    /// Timeout for web lookups made by tokens and tools.
    pub http_timeout_secs: u64,
    /// Seed interests for inner thoughts and background exploration.
    pub interests: Vec<String>,
    pub voice_enabled: bool,
    pub tts_voice: Option<String>,
    pub avatar_enabled: bool,
    /// Background exploration period; 0 disables.
    pub exploration_interval_secs: u64,
    /// Periodic snapshot period; 0 disables.
    pub snapshot_interval_secs: u64,
    /// Turns considered for integration scoring.
    pub history_window: usize,
    /// Tokens shown by `list tokens` before truncating.
    pub token_listing_limit: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            persona_name: "Aria".into(),
            persona_id: String::new(),
            model: "llama3.2".into(),
            endpoint: "http://localhost:11434".into(),
            embedding_model: "nomic-embed-text".into(),
            vector_store_url: None,
            orchestrated_model: None,
            base_model: None,
            default_locale: "en".into(),
            timeout_secs: 120,
            http_timeout_secs: 20,
            interests: ["astronomy", "music", "philosophy", "the ocean"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            voice_enabled: false,
            tts_voice: None,
            avatar_enabled: false,
            exploration_interval_secs: 300,
            snapshot_interval_secs: 600,
            history_window: 10,
            token_listing_limit: 25,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub persona_name: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub embedding_model: Option<String>,
    pub vector_store_url: Option<String>,
    pub voice_enabled: Option<bool>,
    pub avatar_enabled: Option<bool>,
}

impl ShellConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.is_file() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Apply overrides and validate, producing the frozen configuration.
    pub fn build(mut self, overrides: ConfigOverrides) -> ConfigResult<Self> {
        if let Some(v) = overrides.persona_name {
            self.persona_name = v;
        }
        if let Some(v) = overrides.model {
            self.model = v;
        }
        if let Some(v) = overrides.endpoint {
            self.endpoint = v;
        }
        if let Some(v) = overrides.embedding_model {
            self.embedding_model = v;
        }
        if overrides.vector_store_url.is_some() {
            self.vector_store_url = overrides.vector_store_url;
        }
        if let Some(v) = overrides.voice_enabled {
            self.voice_enabled = v;
        }
        if let Some(v) = overrides.avatar_enabled {
            self.avatar_enabled = v;
        }

        if self.persona_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "persona_name".into(),
                message: "must not be empty".into(),
            });
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "endpoint".into(),
                message: format!("\"{}\" is not an http(s) URL", self.endpoint),
            });
        }
        if self.persona_id.is_empty() {
            self.persona_id = derive_persona_id(&self.persona_name);
        }
        Ok(self)
    }
}

/// Lowercase, alphanumerics kept, everything else collapsed to `-`.
fn derive_persona_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            id.extend(c.to_lowercase());
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build_cleanly() {
        let cfg = ShellConfig::default().build(ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.persona_name, "Aria");
        assert_eq!(cfg.persona_id, "aria");
        assert_eq!(cfg.default_locale, "en");
    }

    #[test]
    fn overrides_take_precedence() {
        let cfg = ShellConfig::default()
            .build(ConfigOverrides {
                persona_name: Some("Dr. Nova Lee".into()),
                model: Some("mistral".into()),
                voice_enabled: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.persona_name, "Dr. Nova Lee");
        assert_eq!(cfg.persona_id, "dr-nova-lee");
        assert_eq!(cfg.model, "mistral");
        assert!(cfg.voice_enabled);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let err = ShellConfig::default()
            .build(ConfigOverrides {
                endpoint: Some("localhost:11434".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn toml_round_trip_through_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut cfg = ShellConfig::default();
        cfg.orchestrated_model = Some("big-model".into());
        cfg.save(&path).unwrap();

        let loaded = ShellConfig::load(&path).unwrap();
        assert_eq!(loaded.orchestrated_model.as_deref(), Some("big-model"));
        assert_eq!(loaded.model, cfg.model);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "persona_name = \"Sol\"\nbase_model = \"tiny\"\n").unwrap();
        let cfg = ShellConfig::load(&path).unwrap();
        assert_eq!(cfg.persona_name, "Sol");
        assert_eq!(cfg.base_model.as_deref(), Some("tiny"));
        assert_eq!(cfg.history_window, 10);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = ShellConfig::load_or_default(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(cfg.model, "llama3.2");
    }
}
