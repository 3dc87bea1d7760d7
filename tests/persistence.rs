//! Persistence tests for the persona shell.
//!
//! These verify that snapshots capture the session and exploration state
//! after real turns, and that configuration survives a save/load cycle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use persona_shell::advisory::Advisors;
use persona_shell::backend::{BackendResult, BackendSet, Generation, GenerationBackend};
use persona_shell::config::{ConfigOverrides, ShellConfig};
use persona_shell::paths::ShellPaths;
use persona_shell::pipeline::InMemoryVectorStore;
use persona_shell::session::Role;
use persona_shell::shell::{Shell, ShellDeps};
use persona_shell::snapshot::PersonaSnapshot;

struct Cheerful;

#[async_trait]
impl GenerationBackend for Cheerful {
    fn name(&self) -> &str {
        "cheerful"
    }

    async fn generate(&self, _prompt: &str, _cancel: &CancellationToken) -> BackendResult<Generation> {
        Ok(Generation::text("What a lovely thought!\n[emotion: joy]"))
    }
}

fn shell(dir: &std::path::Path, name: &str) -> Shell {
    let config = ShellConfig::default()
        .build(ConfigOverrides {
            persona_name: Some(name.to_string()),
            ..Default::default()
        })
        .unwrap();
    let advisors = Advisors::heuristic(&config.persona_name, config.interests.clone());
    Shell::new(ShellDeps {
        config: Arc::new(config),
        paths: ShellPaths::rooted_at(dir),
        backends: BackendSet::single(Arc::new(Cheerful)),
        advisors,
        store: Arc::new(InMemoryVectorStore::new()),
        capabilities: None,
    })
}

#[tokio::test]
async fn snapshot_captures_turns_emotion_and_interests() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut sh = shell(dir.path(), "Dr. Nova");
    let cancel = CancellationToken::new();

    sh.handle_turn("I saw a comet last night", &cancel).await.unwrap();
    sh.handle_turn("add interest comets", &cancel).await.unwrap();

    let path = sh.snapshot().await.unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("persona_snapshot_dr-nova_"), "{name}");
    assert!(path.starts_with(dir.path().join("data").join("snapshots")));

    let snap = PersonaSnapshot::read(&path).unwrap();
    assert_eq!(snap.persona_name, "Dr. Nova");
    assert_eq!(snap.interaction_count, 2);
    assert_eq!(snap.emotion.dominant_emotion, "joy");
    assert!(snap.interests.iter().any(|i| i == "comets"));
    assert_eq!(snap.recent_turns.len(), 2);
    assert_eq!(snap.recent_turns[0].role, Role::User);
    assert_eq!(snap.recent_turns[1].content, "What a lovely thought!");
}

#[tokio::test]
async fn snapshot_phrase_writes_through_the_router() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut sh = shell(dir.path(), "Aria");
    let msgs = sh.handle_turn("snapshot", &CancellationToken::new()).await.unwrap();
    assert!(msgs[0].text().starts_with("Snapshot saved to"));

    let written: Vec<_> = std::fs::read_dir(dir.path().join("data").join("snapshots"))
        .unwrap()
        .collect();
    assert_eq!(written.len(), 1);
}

#[test]
fn config_survives_save_and_reload() {
    let dir = tempfile::TempDir::new().unwrap();
    let paths = ShellPaths::rooted_at(dir.path());

    let mut config = ShellConfig::default();
    config.model = "mistral".into();
    config.orchestrated_model = Some("llama3.1:70b".into());
    config.interests = vec!["glaciers".into()];
    config.save(&paths.config_file()).unwrap();

    let back = ShellConfig::load_or_default(&paths.config_file())
        .unwrap()
        .build(ConfigOverrides {
            model: Some("phi3".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(back.model, "phi3");
    assert_eq!(back.orchestrated_model.as_deref(), Some("llama3.1:70b"));
    assert_eq!(back.interests, vec!["glaciers"]);
    assert_eq!(back.persona_id, "aria");
}
