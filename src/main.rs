//! persona CLI: conversational agent shell.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use persona_shell::advisory::Advisors;
use persona_shell::backend::ollama::{OllamaBackend, OllamaConfig};
use persona_shell::backend::{BackendSet, GenerationBackend};
use persona_shell::config::{ConfigOverrides, ShellConfig};
use persona_shell::message::{JsonSink, MessageSink, ShellMessage, StdoutSink};
use persona_shell::paths::ShellPaths;
use persona_shell::pipeline::InMemoryVectorStore;
use persona_shell::shell::{Shell, ShellDeps};

#[derive(Parser)]
#[command(name = "persona", version, about = "Conversational persona shell")]
struct Cli {
    /// Persona name.
    #[arg(long, global = true)]
    persona: Option<String>,

    /// Generation model name.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Generation endpoint URL (Ollama).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Embedding model name.
    #[arg(long, global = true)]
    embedding_model: Option<String>,

    /// Vector-store endpoint URL.
    #[arg(long, global = true)]
    vector_store: Option<String>,

    /// Enable text-to-speech.
    #[arg(long, global = true)]
    voice: bool,

    /// Enable the avatar.
    #[arg(long, global = true)]
    avatar: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/persona-shell/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit newline-delimited JSON messages instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation (default).
    Chat,

    /// Run one pipeline expression and print its report.
    Pipe {
        /// e.g. "WikiSearch 'Otter' | Summarize"
        expr: String,
    },

    /// List the registered pipeline tokens.
    Tokens,

    /// Write a persona snapshot and print its path.
    Snapshot,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = ShellPaths::resolve()?;
    paths.ensure_dirs()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = ShellConfig::load_or_default(&config_path)?.build(ConfigOverrides {
        persona_name: cli.persona.clone(),
        model: cli.model.clone(),
        endpoint: cli.endpoint.clone(),
        embedding_model: cli.embedding_model.clone(),
        vector_store_url: cli.vector_store.clone(),
        voice_enabled: cli.voice.then_some(true),
        avatar_enabled: cli.avatar.then_some(true),
    })?;
    let config = Arc::new(config);

    let sink: Arc<dyn MessageSink> = if cli.json {
        Arc::new(JsonSink)
    } else {
        Arc::new(StdoutSink)
    };

    let primary = ollama(&config, &config.model);
    let mut shell = Shell::new(ShellDeps {
        config: Arc::clone(&config),
        paths,
        backends: BackendSet {
            primary: Arc::clone(&primary) as Arc<dyn GenerationBackend>,
            orchestrated: config
                .orchestrated_model
                .as_deref()
                .map(|m| ollama(&config, m) as Arc<dyn GenerationBackend>),
            base: config
                .base_model
                .as_deref()
                .map(|m| ollama(&config, m) as Arc<dyn GenerationBackend>),
        },
        advisors: Advisors::heuristic(&config.persona_name, config.interests.clone()),
        store: Arc::new(InMemoryVectorStore::new()),
        capabilities: None,
    });

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            check_backend(&primary, sink.as_ref()).await;
            repl(&mut shell, sink, !cli.json).await?;
        }

        Commands::Pipe { expr } => {
            let report = shell.run_pipeline(&expr, &CancellationToken::new()).await?;
            sink.emit(&ShellMessage::action(report.narrative()));
        }

        Commands::Tokens => {
            let listing = shell.registry().render_listing(usize::MAX);
            sink.emit(&ShellMessage::system(listing.trim_end()));
        }

        Commands::Snapshot => {
            let path = shell.snapshot().await?;
            sink.emit(&ShellMessage::system(format!("Snapshot saved to {}", path.display())));
        }
    }

    Ok(())
}

fn ollama(config: &ShellConfig, model: &str) -> Arc<OllamaBackend> {
    Arc::new(OllamaBackend::new(OllamaConfig {
        base_url: config.endpoint.clone(),
        model: model.to_string(),
        timeout_secs: config.timeout_secs,
    }))
}

/// Warn, without failing, when the backend is unreachable or lacks the model.
async fn check_backend(backend: &Arc<OllamaBackend>, sink: &dyn MessageSink) {
    let probe = {
        let backend = Arc::clone(backend);
        tokio::task::spawn_blocking(move || backend.probe()).await
    };
    match probe {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => sink.emit(&ShellMessage::system(format!(
            "Model \"{}\" is not pulled; run `ollama pull {}`.",
            backend.config().model,
            backend.config().model
        ))),
        Ok(Err(e)) => sink.emit(&ShellMessage::from_diagnostic(&e)),
        Err(e) => tracing::warn!(error = %e, "backend probe task failed"),
    }
}

async fn repl(shell: &mut Shell, sink: Arc<dyn MessageSink>, show_prompt: bool) -> Result<()> {
    let background = CancellationToken::new();
    let handles = shell.spawn_background(&background, Arc::clone(&sink));

    sink.emit(&ShellMessage::system(format!(
        "{} is listening. Type `help` for commands, Ctrl+C or Ctrl+D to leave.",
        shell.session().persona_name
    )));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        if show_prompt {
            stdout.write_all(b"> ").await.into_diagnostic()?;
            stdout.flush().await.into_diagnostic()?;
        }

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line.into_diagnostic()? {
                Some(line) => line,
                None => break,
            },
        };
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let result = {
            let turn = shell.handle_turn(&line, &cancel);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    r = &mut turn => break r,
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("cancelling turn");
                        cancel.cancel();
                    }
                }
            }
        };

        match result {
            Ok(messages) => sink.emit_batch(&messages),
            Err(e) if e.is_cancelled() => sink.emit(&ShellMessage::system("(turn cancelled)")),
            Err(e) => sink.emit(&ShellMessage::from_diagnostic(&e)),
        }
    }

    background.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }

    match shell.snapshot().await {
        Ok(path) => sink.emit(&ShellMessage::system(format!("Snapshot saved to {}", path.display()))),
        Err(e) => sink.emit(&ShellMessage::from_diagnostic(&e)),
    }
    Ok(())
}
