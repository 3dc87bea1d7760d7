//! XDG-compliant path resolution for the persona shell.
//!
//! Provides [`ShellPaths`]: the config and data directories, plus the
//! per-user snapshot directory and snapshot file naming.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;

const APP_DIR: &str = "persona-shell";

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(persona::paths::no_home),
        help("Set the HOME environment variable or ensure a valid user profile exists.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(persona::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for the shell.
#[derive(Debug, Clone)]
pub struct ShellPaths {
    /// `$XDG_CONFIG_HOME/persona-shell/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/persona-shell/`
    pub data_dir: PathBuf,
}

impl ShellPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(APP_DIR);

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join(APP_DIR);

        Ok(Self { config_dir, data_dir })
    }

    /// All directories rooted under one base (tests, portable installs).
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            config_dir: base.join("config"),
            data_dir: base.join("data"),
        }
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.snapshot_dir()] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the global config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory holding persona snapshots.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// `snapshot_dir/persona_snapshot_<id>_<yyyyMMdd_HHmmss>.json` (UTC).
    pub fn snapshot_file(&self, persona_id: &str, at: DateTime<Utc>) -> PathBuf {
        self.snapshot_dir().join(format!(
            "persona_snapshot_{}_{}.json",
            persona_id,
            at.format("%Y%m%d_%H%M%S")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolved_paths_use_app_dir() {
        // Avoid mutating env vars (unsafe in edition 2024); just check suffixes.
        let paths = ShellPaths::resolve().unwrap();
        assert!(paths.config_dir.ends_with(APP_DIR));
        assert!(paths.data_dir.ends_with(APP_DIR));
    }

    #[test]
    fn snapshot_file_name_format() {
        let paths = ShellPaths::rooted_at("/base");
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        assert_eq!(
            paths.snapshot_file("aria", at),
            PathBuf::from("/base/data/snapshots/persona_snapshot_aria_20240309_070502.json")
        );
    }

    #[test]
    fn ensure_dirs_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = ShellPaths::rooted_at(dir.path());
        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();
        assert!(paths.snapshot_dir().is_dir());
        assert!(paths.config_dir.is_dir());
        let mut created: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        created.sort();
        assert_eq!(created, vec!["config", "data"]);
    }
}
