//! DSL grammar.
//!
//! ```text
//! pipeline := step ( '|' step )*
//! step     := IDENT ( '[' quoted ']' | quoted | WS rest )?
//! quoted   := '\'' text '\'' | '"' text '"'
//! ```
//!
//! Argument forms are tried in that order: bracketed, single quotes, double
//! quotes, bare remainder.

use std::sync::LazyLock;

use regex::Regex;

static STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<name>[A-Za-z_]\w*)(?:\s*\[\s*'(?P<bsq>[^']*)'\s*\]|\s*\[\s*"(?P<bdq>[^"]*)"\s*\]|\s*'(?P<sq>[^']*)'|\s*"(?P<dq>[^"]*)"|\s+(?P<bare>.+))?$"#,
    )
    .unwrap()
});

/// One parsed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    /// `None` when absent or empty.
    pub argument: Option<String>,
}

/// Parse a single step. `None` when the text is not `IDENT [arg]`.
pub fn parse_step(text: &str) -> Option<Step> {
    let caps = STEP_RE.captures(text.trim())?;
    let argument = ["bsq", "bdq", "sq", "dq", "bare"]
        .iter()
        .find_map(|g| caps.name(g))
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty());
    Some(Step {
        name: caps["name"].to_string(),
        argument,
    })
}

/// Split on `|`, trimming each segment and dropping empty ones.
pub fn split_pipeline(text: &str) -> Vec<&str> {
    text.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Whether `text` is shaped like a single DSL step (identifier plus optional
/// argument).
pub fn looks_like_step(text: &str) -> bool {
    STEP_RE.is_match(text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, arg: Option<&str>) -> Step {
        Step {
            name: name.into(),
            argument: arg.map(Into::into),
        }
    }

    #[test]
    fn argument_forms() {
        assert_eq!(parse_step("WikiSearch 'rust lang'"), Some(step("WikiSearch", Some("rust lang"))));
        assert_eq!(parse_step("WikiSearch['rust']"), Some(step("WikiSearch", Some("rust"))));
        assert_eq!(parse_step(r#"WikiSearch[ "rust" ]"#), Some(step("WikiSearch", Some("rust"))));
        assert_eq!(parse_step("Show['']"), Some(step("Show", None)));
        assert_eq!(parse_step("WikiSearch'rust'"), Some(step("WikiSearch", Some("rust"))));
        assert_eq!(parse_step(r#"Generate "it's fine""#), Some(step("Generate", Some("it's fine"))));
        assert_eq!(parse_step("Topic quantum computing"), Some(step("Topic", Some("quantum computing"))));
        assert_eq!(parse_step("Show"), Some(step("Show", None)));
        assert_eq!(parse_step("Show ''"), Some(step("Show", None)));
    }

    #[test]
    fn single_quotes_take_precedence_over_bare() {
        assert_eq!(parse_step("A 'x'"), Some(step("A", Some("x"))));
        // Trailing text after a quoted argument falls back to the bare form.
        assert_eq!(parse_step("A 'x' y"), Some(step("A", Some("'x' y"))));
    }

    #[test]
    fn rejects_non_identifiers() {
        assert_eq!(parse_step("42abc"), None);
        assert_eq!(parse_step("foo-bar"), None);
        assert_eq!(parse_step(""), None);
    }

    #[test]
    fn split_trims_and_drops_empties() {
        assert_eq!(split_pipeline(" A 'x' || B 'y' | "), vec!["A 'x'", "B 'y'"]);
        assert!(split_pipeline(" | ").is_empty());
    }
}
