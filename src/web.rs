//! Blocking HTTP lookups against public knowledge services.
//!
//! Every function here blocks; async callers go through [`run_blocking`].
//! Response bodies are capped at [`MAX_RESPONSE_SIZE`].

use std::io::Read;
use std::sync::LazyLock;
use std::time::Duration;

use miette::Diagnostic;
use regex::Regex;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::text::squash_whitespace;

/// Maximum response body size (256 KB).
pub const MAX_RESPONSE_SIZE: u64 = 256 * 1024;

const ARXIV_API: &str = "http://export.arxiv.org/api/query";
const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";
const CROSSREF_API: &str = "https://api.crossref.org/works";
const DUCKDUCKGO_API: &str = "https://api.duckduckgo.com/";

/// Errors from remote lookups.
#[derive(Debug, Error, Diagnostic)]
pub enum WebError {
    #[error("invalid URL \"{url}\"")]
    #[diagnostic(
        code(persona::web::invalid_url),
        help("URLs must start with http:// or https://.")
    )]
    InvalidUrl { url: String },

    #[error("request to {url} failed")]
    #[diagnostic(
        code(persona::web::http),
        help("Check network connectivity; the remote service may be rate limiting.")
    )]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("failed to read response from {url}")]
    #[diagnostic(code(persona::web::read))]
    Read {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected response from {service}: {message}")]
    #[diagnostic(code(persona::web::format))]
    Format { service: &'static str, message: String },

    #[error("no results from {service} for \"{query}\"")]
    #[diagnostic(code(persona::web::no_results))]
    NoResults { service: &'static str, query: String },

    #[error("background task failed: {message}")]
    #[diagnostic(code(persona::web::task))]
    Task { message: String },
}

pub type WebResult<T> = std::result::Result<T, WebError>;

/// Run a blocking lookup on tokio's blocking pool.
pub async fn run_blocking<T, F>(f: F) -> WebResult<T>
where
    F: FnOnce() -> WebResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WebError::Task {
            message: e.to_string(),
        })?
}

fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

fn read_capped(url: &str, resp: ureq::Response) -> WebResult<String> {
    let mut body = Vec::new();
    resp.into_reader()
        .take(MAX_RESPONSE_SIZE)
        .read_to_end(&mut body)
        .map_err(|e| WebError::Read {
            url: url.to_string(),
            source: e,
        })?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn get_json(request: ureq::Request, url: &str, service: &'static str) -> WebResult<serde_json::Value> {
    let resp = request.call().map_err(|e| WebError::Http {
        url: url.to_string(),
        source: Box::new(e),
    })?;
    let body = read_capped(url, resp)?;
    serde_json::from_str(&body).map_err(|e| WebError::Format {
        service,
        message: e.to_string(),
    })
}

// ── arXiv ───────────────────────────────────────────────────────────────

static ATOM_ENTRY_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry>.*?<title[^>]*>(.*?)</title>").unwrap());

/// Titles of the top `max` arXiv matches.
pub fn arxiv_search(query: &str, max: usize, timeout_secs: u64) -> WebResult<Vec<String>> {
    let request = agent(timeout_secs)
        .get(ARXIV_API)
        .query("search_query", &format!("all:{query}"))
        .query("start", "0")
        .query("max_results", &max.to_string());
    let resp = request.call().map_err(|e| WebError::Http {
        url: ARXIV_API.into(),
        source: Box::new(e),
    })?;
    let feed = read_capped(ARXIV_API, resp)?;
    let titles = parse_atom_titles(&feed);
    if titles.is_empty() {
        return Err(WebError::NoResults {
            service: "arXiv",
            query: query.to_string(),
        });
    }
    Ok(titles)
}

/// Entry titles from an Atom feed, whitespace-normalized.
pub fn parse_atom_titles(feed: &str) -> Vec<String> {
    ATOM_ENTRY_TITLE_RE
        .captures_iter(feed)
        .filter_map(|c| c.get(1))
        .map(|m| squash_whitespace(m.as_str()))
        .filter(|t| !t.is_empty())
        .collect()
}

// ── Wikipedia ───────────────────────────────────────────────────────────

/// Plain-text intro of the best-matching Wikipedia article.
pub fn wikipedia_extract(title: &str, timeout_secs: u64) -> WebResult<String> {
    let request = agent(timeout_secs)
        .get(WIKIPEDIA_API)
        .query("action", "query")
        .query("prop", "extracts")
        .query("exintro", "1")
        .query("explaintext", "1")
        .query("redirects", "1")
        .query("format", "json")
        .query("titles", title);
    let json = get_json(request, WIKIPEDIA_API, "Wikipedia")?;
    parse_wikipedia_extract(&json).ok_or_else(|| WebError::NoResults {
        service: "Wikipedia",
        query: title.to_string(),
    })
}

/// First non-empty `extract` in a `query.pages` response.
pub fn parse_wikipedia_extract(json: &serde_json::Value) -> Option<String> {
    json["query"]["pages"]
        .as_object()?
        .values()
        .filter_map(|page| page["extract"].as_str())
        .map(str::trim)
        .find(|e| !e.is_empty())
        .map(str::to_string)
}

// ── Crossref ────────────────────────────────────────────────────────────

/// One bibliographic match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub year: Option<i64>,
    pub doi: String,
}

impl std::fmt::Display for Citation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.year {
            Some(y) => write!(f, "{} ({y}), doi:{}", self.title, self.doi),
            None => write!(f, "{}, doi:{}", self.title, self.doi),
        }
    }
}

pub fn crossref_search(query: &str, rows: usize, timeout_secs: u64) -> WebResult<Vec<Citation>> {
    let request = agent(timeout_secs)
        .get(CROSSREF_API)
        .query("query", query)
        .query("rows", &rows.to_string());
    let json = get_json(request, CROSSREF_API, "Crossref")?;
    let citations = parse_crossref_items(&json);
    if citations.is_empty() {
        return Err(WebError::NoResults {
            service: "Crossref",
            query: query.to_string(),
        });
    }
    Ok(citations)
}

pub fn parse_crossref_items(json: &serde_json::Value) -> Vec<Citation> {
    let Some(items) = json["message"]["items"].as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let title = item["title"][0].as_str()?.trim().to_string();
            let doi = item["DOI"].as_str()?.to_string();
            let year = item["issued"]["date-parts"][0][0].as_i64();
            Some(Citation { title, year, doi })
        })
        .collect()
}

// ── URL fetch ───────────────────────────────────────────────────────────

static HTML_SNIFF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:<!doctype html|<html)").unwrap());

/// GET a URL; HTML bodies are reduced to readable text.
pub fn fetch_url(url: &str, timeout_secs: u64) -> WebResult<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(WebError::InvalidUrl {
            url: url.to_string(),
        });
    }
    let resp = agent(timeout_secs).get(url).call().map_err(|e| WebError::Http {
        url: url.to_string(),
        source: Box::new(e),
    })?;
    let is_html = resp.content_type().contains("html");
    let body = read_capped(url, resp)?;
    if is_html || HTML_SNIFF_RE.is_match(&body) {
        Ok(html_to_text(&body))
    } else {
        Ok(body)
    }
}

/// Title plus headings, paragraphs and list items, in document order.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();

    if let Ok(sel) = Selector::parse("title") {
        if let Some(el) = document.select(&sel).next() {
            let title = squash_whitespace(&el.text().collect::<String>());
            if !title.is_empty() {
                parts.push(title);
            }
        }
    }

    if let Ok(sel) = Selector::parse("h1, h2, h3, h4, p, li, blockquote, pre") {
        for el in document.select(&sel) {
            let text = squash_whitespace(&el.text().collect::<String>());
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join("\n")
}

// ── Web search ──────────────────────────────────────────────────────────

/// DuckDuckGo instant answer: abstract first, then related topics.
pub fn instant_answer(query: &str, timeout_secs: u64) -> WebResult<Vec<String>> {
    let request = agent(timeout_secs)
        .get(DUCKDUCKGO_API)
        .query("q", query)
        .query("format", "json")
        .query("no_html", "1")
        .query("skip_disambig", "1");
    let json = get_json(request, DUCKDUCKGO_API, "DuckDuckGo")?;
    let answers = parse_instant_answer(&json, 5);
    if answers.is_empty() {
        return Err(WebError::NoResults {
            service: "DuckDuckGo",
            query: query.to_string(),
        });
    }
    Ok(answers)
}

pub fn parse_instant_answer(json: &serde_json::Value, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(a) = json["AbstractText"].as_str().filter(|a| !a.is_empty()) {
        out.push(a.to_string());
    }
    if let Some(topics) = json["RelatedTopics"].as_array() {
        out.extend(
            topics
                .iter()
                .filter_map(|t| t["Text"].as_str())
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    out.truncate(max);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn atom_titles_skip_feed_title() {
        let feed = r#"<feed><title>ArXiv Query</title>
            <entry><id>1</id><title>Attention Is
              All You Need</title></entry>
            <entry><title type="html">Deep Residual Learning</title></entry></feed>"#;
        assert_eq!(
            parse_atom_titles(feed),
            vec!["Attention Is All You Need", "Deep Residual Learning"]
        );
    }

    #[test]
    fn wikipedia_extract_from_pages() {
        let j = json!({"query": {"pages": {"123": {"title": "Rust", "extract": " A language. "}}}});
        assert_eq!(parse_wikipedia_extract(&j).as_deref(), Some("A language."));
        let missing = json!({"query": {"pages": {"-1": {"missing": ""}}}});
        assert!(parse_wikipedia_extract(&missing).is_none());
    }

    #[test]
    fn crossref_items_render() {
        let j = json!({"message": {"items": [
            {"title": ["Paper One"], "DOI": "10.1/x", "issued": {"date-parts": [[2019, 5]]}},
            {"title": ["No Year"], "DOI": "10.1/y"},
            {"DOI": "10.1/untitled"}
        ]}});
        let items = parse_crossref_items(&j);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].to_string(), "Paper One (2019), doi:10.1/x");
        assert_eq!(items[1].to_string(), "No Year, doi:10.1/y");
    }

    #[test]
    fn html_reduced_to_text() {
        let html = "<html><head><title>T</title><script>x()</script></head>\
                    <body><h1>Head</h1><p>Para   one.</p><ul><li>Item</li></ul></body></html>";
        assert_eq!(html_to_text(html), "T\nHead\nPara one.\nItem");
    }

    #[test]
    fn instant_answer_prefers_abstract() {
        let j = json!({"AbstractText": "Abstract.", "RelatedTopics": [{"Text": "One"}, {"Name": "group"}, {"Text": "Two"}]});
        assert_eq!(parse_instant_answer(&j, 2), vec!["Abstract.", "One"]);
    }

    #[test]
    fn fetch_rejects_non_http() {
        assert!(matches!(fetch_url("ftp://x", 1), Err(WebError::InvalidUrl { .. })));
    }
}
