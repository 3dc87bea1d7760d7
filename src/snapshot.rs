//! Persisted persona snapshots.
//!
//! A snapshot is a pretty-printed JSON document written to
//! `<data dir>/snapshots/persona_snapshot_<id>_<yyyyMMdd_HHmmss>.json`.
//! After every turn the shell publishes a [`SessionSummary`] on a watch
//! channel; [`spawn_periodic`] writes the latest one on each interval tick,
//! off the turn's critical path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::autonomous::{Discovery, ExplorationState, SharedExploration};
use crate::paths::ShellPaths;
use crate::session::{ConversationTurn, EmotionalState, Session};

/// Errors from snapshot persistence.
#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("failed to write snapshot {path}")]
    #[diagnostic(
        code(persona::snapshot::write),
        help("Check that the data directory exists and is writable.")
    )]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read snapshot {path}")]
    #[diagnostic(code(persona::snapshot::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot is not valid JSON")]
    #[diagnostic(code(persona::snapshot::format))]
    Format(#[from] serde_json::Error),

    #[error("snapshot task failed: {message}")]
    #[diagnostic(code(persona::snapshot::task))]
    Task { message: String },
}

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

/// Turns kept in a snapshot.
pub const SNAPSHOT_TURNS: usize = 20;

/// The session fields a snapshot needs, detached from the live session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub persona_id: String,
    pub persona_name: String,
    pub interaction_count: u64,
    pub uptime_secs: u64,
    pub emotion: EmotionalState,
    pub recent_turns: Vec<ConversationTurn>,
}

impl SessionSummary {
    pub fn of(session: &Session) -> Self {
        Self {
            persona_id: session.persona_id.clone(),
            persona_name: session.persona_name.clone(),
            interaction_count: session.interaction_count,
            uptime_secs: session.uptime().as_secs(),
            emotion: session.emotion.clone(),
            recent_turns: session.history.recent(SNAPSHOT_TURNS).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub persona_id: String,
    pub persona_name: String,
    pub taken_at: DateTime<Utc>,
    pub interaction_count: u64,
    pub uptime_secs: u64,
    pub emotion: EmotionalState,
    pub interests: Vec<String>,
    pub discoveries: Vec<Discovery>,
    pub epoch: u64,
    pub recent_turns: Vec<ConversationTurn>,
}

impl PersonaSnapshot {
    pub fn capture(summary: &SessionSummary, exploration: &ExplorationState, taken_at: DateTime<Utc>) -> Self {
        Self {
            persona_id: summary.persona_id.clone(),
            persona_name: summary.persona_name.clone(),
            taken_at,
            interaction_count: summary.interaction_count,
            uptime_secs: summary.uptime_secs,
            emotion: summary.emotion.clone(),
            interests: exploration.interests.clone(),
            discoveries: exploration.discoveries.iter().cloned().collect(),
            epoch: exploration.epoch,
            recent_turns: summary.recent_turns.clone(),
        }
    }

    /// Write to the snapshot directory, creating it if needed.
    pub fn write(&self, paths: &ShellPaths) -> SnapshotResult<PathBuf> {
        let dir = paths.snapshot_dir();
        std::fs::create_dir_all(&dir).map_err(|source| SnapshotError::Write {
            path: dir.clone(),
            source,
        })?;
        let path = paths.snapshot_file(&self.persona_id, self.taken_at);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| SnapshotError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "snapshot written");
        Ok(path)
    }

    pub fn read(path: &Path) -> SnapshotResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Capture and write a snapshot now, on the blocking pool.
pub async fn write_now(
    paths: &ShellPaths,
    summary: &SessionSummary,
    exploration: &SharedExploration,
) -> SnapshotResult<PathBuf> {
    let snapshot = {
        let state = exploration.lock().unwrap_or_else(|e| e.into_inner());
        PersonaSnapshot::capture(summary, &state, Utc::now())
    };
    let paths = paths.clone();
    tokio::task::spawn_blocking(move || snapshot.write(&paths))
        .await
        .map_err(|e| SnapshotError::Task { message: e.to_string() })?
}

/// Write the latest published summary every `interval` until cancelled.
pub fn spawn_periodic(
    paths: ShellPaths,
    summaries: watch::Receiver<SessionSummary>,
    exploration: SharedExploration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut tick = tokio::time::interval_at(start, interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    let summary = summaries.borrow().clone();
                    if let Err(e) = write_now(&paths, &summary, &exploration).await {
                        tracing::warn!(error = %e, "periodic snapshot failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn summary() -> SessionSummary {
        let mut s = Session::new("dr-nova", "Dr. Nova");
        s.interaction_count = 7;
        s.history.push(ConversationTurn::user("hi"));
        SessionSummary::of(&s)
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ShellPaths::rooted_at(dir.path());
        let exploration = Arc::new(Mutex::new(ExplorationState::new(vec!["tides".into()])));
        exploration.lock().unwrap().record("tides", "the moon pulls");

        let path = write_now(&paths, &summary(), &exploration).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("persona_snapshot_dr-nova_"));
        assert!(name.ends_with(".json"));

        let back = PersonaSnapshot::read(&path).unwrap();
        assert_eq!(back.interaction_count, 7);
        assert_eq!(back.interests, vec!["tides"]);
        assert_eq!(back.discoveries.len(), 1);
        assert_eq!(back.recent_turns.len(), 1);
    }

    #[tokio::test]
    async fn periodic_task_writes_latest_summary() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ShellPaths::rooted_at(dir.path());
        let (tx, rx) = watch::channel(summary());
        let exploration = Arc::new(Mutex::new(ExplorationState::default()));
        let cancel = CancellationToken::new();

        let mut later = summary();
        later.interaction_count = 42;
        tx.send(later).unwrap();

        let handle = spawn_periodic(
            paths.clone(),
            rx,
            exploration,
            Duration::from_millis(50),
            cancel.clone(),
        );
        for _ in 0..100 {
            if std::fs::read_dir(paths.snapshot_dir()).is_ok_and(|mut d| d.next().is_some()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let entry = std::fs::read_dir(paths.snapshot_dir()).unwrap().next().unwrap().unwrap();
        let snap = PersonaSnapshot::read(&entry.path()).unwrap();
        assert_eq!(snap.interaction_count, 42);
    }
}
