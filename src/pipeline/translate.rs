//! Informal phrasing -> single canonical token invocation.
//!
//! Patterns are scanned in order; the first match wins. The captured group
//! becomes the argument of a synthesized `Token 'argument'` step.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    token: &'static str,
    group: usize,
}

fn rule(pattern: &str, token: &'static str, group: usize) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        token,
        group,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Papers.
        rule(
            r"(?i)^(?:search|find|look\s+up)\s+(?:on\s+)?arxiv\s+(?:for|about|on)\s+(.+?)[.?!]*$",
            "ArxivSearch",
            1,
        ),
        rule(
            r"(?i)^(?:find|search(?:\s+for)?|get|show\s+me)\s+(?:some\s+)?(?:research\s+|academic\s+)?papers?\s+(?:about|on|for|regarding)\s+(.+?)[.?!]*$",
            "ArxivSearch",
            1,
        ),
        // Wikipedia.
        rule(
            r"(?i)^(?:search\s+|look\s+up\s+|check\s+)?wiki(?:pedia)?\s+(?:for\s+|about\s+|on\s+)?(.+?)[.?!]*$",
            "WikiSearch",
            1,
        ),
        rule(
            r"(?i)^(?:look\s+up|search\s+for|find)\s+(.+?)\s+on\s+wikipedia[.?!]*$",
            "WikiSearch",
            1,
        ),
        rule(
            r"(?i)^what\s+does\s+wikipedia\s+say\s+about\s+(.+?)[.?!]*$",
            "WikiSearch",
            1,
        ),
        // Citations.
        rule(
            r"(?i)^(?:find\s+|get\s+|search\s+)?(?:citations?|references?|dois?)\s+(?:for|about|on)\s+(.+?)[.?!]*$",
            "CitationSearch",
            1,
        ),
        // URL fetch.
        rule(
            r"(?i)^(?:fetch|download|open|read|get)\s+(?:the\s+)?(?:url\s+|page\s+|site\s+)?(https?://\S+)$",
            "FetchUrl",
            1,
        ),
        // Text generation.
        rule(
            r"(?i)^(?:generate|compose|draft)\s+(.+)$",
            "Generate",
            1,
        ),
        rule(
            r"(?i)^write\s+(?:me\s+)?(an?\s+.+)$",
            "Generate",
            1,
        ),
        // Summarization.
        rule(
            r"(?i)^(?:summari[sz]e|tl;?dr|give\s+me\s+a\s+summary\s+of)\s*:?\s+(.+)$",
            "Summarize",
            1,
        ),
        // Skills.
        rule(
            r"(?i)^(?:use|invoke|apply|activate)\s+(?:the\s+)?skill\s+(.+)$",
            "Skill",
            1,
        ),
    ]
});

/// Canonical step text for the first matching phrasing, if any.
pub fn translate(input: &str) -> Option<String> {
    let input = input.trim();
    RULES.iter().find_map(|r| {
        let arg = r.pattern.captures(input)?.get(r.group)?.as_str().trim();
        if arg.is_empty() {
            return None;
        }
        tracing::debug!(token = r.token, argument = arg, "translated natural-language request");
        Some(canonical_step(r.token, arg))
    })
}

/// `Token 'arg'`, or `Token "arg"` when the argument holds a single quote,
/// or a bare `Token arg` when it holds both quote kinds.
pub fn canonical_step(token: &str, arg: &str) -> String {
    match (arg.contains('\''), arg.contains('"')) {
        (false, _) => format!("{token} '{arg}'"),
        (true, false) => format!("{token} \"{arg}\""),
        (true, true) => format!("{token} {arg}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::parse_step;

    #[test]
    fn common_phrasings() {
        let cases = [
            ("find papers about quantum error correction", "ArxivSearch 'quantum error correction'"),
            ("search arxiv for diffusion models", "ArxivSearch 'diffusion models'"),
            ("wikipedia Ada Lovelace", "WikiSearch 'Ada Lovelace'"),
            ("look up Alan Turing on wikipedia", "WikiSearch 'Alan Turing'"),
            ("citations for attention is all you need", "CitationSearch 'attention is all you need'"),
            ("fetch https://example.com/a?b=c", "FetchUrl 'https://example.com/a?b=c'"),
            ("write me a haiku about rain", "Generate 'a haiku about rain'"),
            ("summarize: the quick brown fox", "Summarize 'the quick brown fox'"),
            ("use skill translator hello", "Skill 'translator hello'"),
        ];
        for (input, expected) in cases {
            assert_eq!(translate(input).as_deref(), Some(expected), "input: {input}");
        }
    }

    #[test]
    fn first_match_wins() {
        // Both paper rules could apply; the arxiv one is listed first.
        assert_eq!(
            translate("search arxiv for papers about graphs").as_deref(),
            Some("ArxivSearch 'papers about graphs'")
        );
    }

    #[test]
    fn conversation_does_not_translate() {
        assert!(translate("how are you today?").is_none());
        assert!(translate("I wrote a poem yesterday").is_none());
    }

    #[test]
    fn quoting_survives_the_parser() {
        let step = canonical_step("Generate", "it's raining");
        assert_eq!(step, "Generate \"it's raining\"");
        assert_eq!(
            parse_step(&step).unwrap().argument.as_deref(),
            Some("it's raining")
        );
    }
}
