//! Built-in pipeline tokens.
//!
//! Network tokens run blocking lookups on the blocking pool; generation
//! tokens go through the primary backend; the rest are synchronous and touch
//! only the state and its vector store.

use std::sync::Arc;

use futures_util::FutureExt;

use super::registry::TokenRegistry;
use super::state::PipelineState;
use super::{PipelineError, PipelineResult};
use crate::backend::GenerationBackend;
use crate::router::capabilities::Capabilities;
use crate::web;

/// What the built-in tokens need from the rest of the shell.
#[derive(Clone)]
pub struct TokenDeps {
    pub backend: Arc<dyn GenerationBackend>,
    pub capabilities: Arc<dyn Capabilities>,
    pub http_timeout_secs: u64,
}

const SEARCH_RESULTS: usize = 5;

/// The argument if present, else the named state field, else an error.
fn arg_or<'a>(token: &str, arg: Option<&'a str>, fallback: &'a str, field: &'static str) -> PipelineResult<&'a str> {
    match arg {
        Some(a) if !a.trim().is_empty() => Ok(a),
        _ if !fallback.trim().is_empty() => Ok(fallback),
        _ => Err(PipelineError::MissingArgument {
            token: token.to_string(),
            field,
        }),
    }
}

fn numbered(lines: impl IntoIterator<Item = String>) -> String {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {l}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Register every built-in token.
pub fn register_builtin_tokens(registry: &mut TokenRegistry, deps: TokenDeps) {
    let timeout = deps.http_timeout_secs;

    registry.register_async(
        "ArxivSearch",
        "Search arXiv; output is a numbered list of paper titles.",
        move |mut state, arg, _cancel| {
            async move {
                let query = arg_or("ArxivSearch", arg.as_deref(), &state.query, "query")?.to_string();
                let titles = web::run_blocking(move || web::arxiv_search(&query, SEARCH_RESULTS, timeout)).await?;
                state.output = numbered(titles);
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    registry.register_async(
        "WikiSearch",
        "Look up a Wikipedia article; output is its introduction.",
        move |mut state, arg, _cancel| {
            async move {
                let title = arg_or("WikiSearch", arg.as_deref(), &state.query, "query")?.to_string();
                let topic = title.clone();
                state.output = web::run_blocking(move || web::wikipedia_extract(&title, timeout)).await?;
                if state.topic.is_empty() {
                    state.topic = topic;
                }
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    registry.register_async(
        "CitationSearch",
        "Search Crossref; output is title (year), DOI per line.",
        move |mut state, arg, _cancel| {
            async move {
                let query = arg_or("CitationSearch", arg.as_deref(), &state.query, "query")?.to_string();
                let items =
                    web::run_blocking(move || web::crossref_search(&query, SEARCH_RESULTS, timeout)).await?;
                state.output = items.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    registry.register_async(
        "FetchUrl",
        "HTTP GET a URL (256 KB cap); HTML is reduced to text.",
        move |mut state, arg, _cancel| {
            async move {
                let url = arg_or("FetchUrl", arg.as_deref(), &state.query, "query")?
                    .trim()
                    .to_string();
                state.output = web::run_blocking(move || web::fetch_url(&url, timeout)).await?;
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    let backend = Arc::clone(&deps.backend);
    registry.register_async(
        "Generate",
        "Complete the current prompt with the generation backend.",
        move |mut state, _arg, cancel| {
            let backend = Arc::clone(&backend);
            async move {
                let prompt = arg_or("Generate", None, &state.prompt, "prompt")?.to_string();
                let generation = backend.generate(&prompt, &cancel).await?;
                state.output = generation.text.trim().to_string();
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    let backend = Arc::clone(&deps.backend);
    registry.register_async(
        "Summarize",
        "Summarize the argument, or the previous step's output.",
        move |mut state, arg, cancel| {
            let backend = Arc::clone(&backend);
            async move {
                let text = arg_or("Summarize", arg.as_deref(), &state.output, "output")?;
                let prompt = format!("Summarize the following in at most three sentences:\n\n{text}");
                let generation = backend.generate(&prompt, &cancel).await?;
                state.output = generation.text.trim().to_string();
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    let capabilities = Arc::clone(&deps.capabilities);
    registry.register_async(
        "Skill",
        "Invoke a skill: Skill '<name> <input>'.",
        move |mut state, arg, cancel| {
            let capabilities = Arc::clone(&capabilities);
            async move {
                let spec = arg_or("Skill", arg.as_deref(), "", "query")?.trim().to_string();
                let (name, input) = spec.split_once(char::is_whitespace).unwrap_or((spec.as_str(), ""));
                let input = if input.trim().is_empty() { state.output.as_str() } else { input.trim() };
                let output = capabilities.invoke_skill(name, input, &cancel).await?;
                state.output = output;
                Ok::<_, PipelineError>(state)
            }
            .boxed()
        },
    );

    registry.register_sync(
        "Remember",
        "Add the argument, or the current output, to the vector store.",
        |state, arg| {
            let text = arg_or("Remember", arg, &state.output, "output")?;
            let n = state.store.add(text);
            tracing::debug!(documents = n, "remembered text");
            Ok(state)
        },
    );

    registry.register_sync(
        "Search",
        "Similarity search over remembered text.",
        |mut state, arg| {
            let query = arg_or("Search", arg, &state.query, "query")?.to_string();
            let hits = state.store.search(&query, SEARCH_RESULTS);
            state.output = if hits.is_empty() {
                format!("No remembered text matches \"{query}\".")
            } else {
                hits.iter()
                    .map(|(text, score)| format!("{score:.2}  {text}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            Ok(state)
        },
    );

    registry.register_sync("Topic", "Set the pipeline topic.", |mut state, arg| {
        state.topic = arg_or("Topic", arg, "", "query")?.to_string();
        Ok(state)
    });

    registry.register_sync("Show", "Show the current query, topic and output.", |mut state, _arg| {
        state.output = format!(
            "query: {}\ntopic: {}\noutput: {}",
            state.query, state.topic, state.output
        );
        Ok(state)
    });
}
