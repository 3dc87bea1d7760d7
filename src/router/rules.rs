//! Rule-ordered classification of user input into commands.
//!
//! Regex and phrase based; no generation backend is involved. Rules are tried
//! in a fixed priority order and the first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::TokenRegistry;
use crate::pipeline::parse::parse_step;
use crate::pipeline::translate::translate;
use crate::text::terms;

/// A routed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// "help" / "commands" / "?"
    Help,
    /// "list tokens" / "tokens"
    ListTokens,
    /// "pipeline help" / "dsl help"
    PipelineHelp,
    /// "stats" / "status"
    Stats,
    /// "skills" / "list skills"
    ListSkills,
    /// "snapshot" / "save snapshot"
    Snapshot,
    /// An affirmative answer while a tool request is pending.
    Confirm,
    /// "run X args" / "execute X args"
    RunTool { name: String, args: String },
    /// "google search X" / "web search X"
    WebSearch { query: String },
    /// "learn about X"
    Learn { topic: String },
    /// "create tool X description"
    CreateTool { name: String, description: String },
    /// "create a tool that/for/to ..." (needs confirmation).
    RequestTool { topic: String, description: String },
    /// "smart tool for X"
    SmartTool { topic: String },
    /// "remember X" / "recall X"
    Recall { query: String },
    /// "how are you feeling" / "what's on your mind"
    MindState,
    /// "think about X"
    Think { topic: String },
    /// "add interest X"
    AddInterest { topic: String },
    /// "reindex"
    Reindex,
    /// "search the index for X"
    IndexSearch { query: String },
    /// "emergence X"
    Emergence { topic: String },
    /// Input containing `|`.
    Pipeline { expr: String },
    /// One DSL step, typed directly or translated from natural language.
    Step { expr: String },
    /// "use tool X args"
    UseTool { name: String, args: String },
    /// "list tools" / "tools"
    ListTools,
    /// "self modification help"
    SelfModificationHelp,
    /// "rebuild"
    Rebuild,
    /// "modification history"
    ModificationHistory,
}

const HELP: &[&str] = &["help", "commands", "what can you do"];
const LIST_TOKENS: &[&str] = &["list tokens", "tokens", "show tokens", "pipeline tokens"];
const PIPELINE_HELP: &[&str] = &["pipeline help", "dsl help", "help pipeline", "how do pipelines work"];
const STATS: &[&str] = &["stats", "status", "show stats", "statistics"];
const LIST_SKILLS: &[&str] = &["skills", "list skills", "show skills"];
const SNAPSHOT: &[&str] = &["snapshot", "save snapshot", "take snapshot", "take a snapshot"];

const LIST_TOOLS: &[&str] = &["list tools", "tools", "show tools", "what tools do you have"];
const SELF_MOD_HELP: &[&str] = &[
    "self modification help",
    "self-modification help",
    "self modification",
    "how can you modify yourself",
];
const REBUILD: &[&str] = &["rebuild", "rebuild tools", "reload tools"];
const MOD_HISTORY: &[&str] = &[
    "modification history",
    "show modifications",
    "self modification history",
    "what have you changed",
];

macro_rules! rule {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).unwrap());
    };
}

rule!(AFFIRM_RE, r"(?i)^(?:yes|y|yeah|yep|sure|ok|okay|confirm|do it|go ahead|please do)[.!]*$");
rule!(RUN_RE, r"(?i)^(?:run|execute)\s+(?:tool\s+)?(?P<name>[A-Za-z][\w-]*)(?:\s+(?P<args>.+))?$");
rule!(
    WEB_SEARCH_RE,
    r"(?i)^(?:(?:google|web)\s+search(?:\s+for)?|search\s+the\s+web\s+for|google)\s+(?P<q>.+)$"
);
rule!(LEARN_RE, r"(?i)^learn\s+about\s+(?P<topic>.+)$");
rule!(
    CREATE_TOOL_RE,
    r"(?i)^(?:add|create|build)\s+tool\s+(?P<name>[A-Za-z][\w-]*)(?:\s+(?P<desc>.+))?$"
);
rule!(
    REQUEST_TOOL_RE,
    r"(?i)^(?:please\s+)?(?:create|build|make|write)\s+(?:me\s+)?an?\s+(?:new\s+)?tool\s+(?:that|for|to|which)\s+(?P<desc>.+)$"
);
rule!(
    SMART_TOOL_RE,
    r"(?i)^(?:(?:create|make|build)\s+an?\s+)?smart\s+tool\s+(?:for|about|on)\s+(?P<topic>.+)$"
);
rule!(
    RECALL_RE,
    r#"(?i)^(?:remember|recall)\s+(?:when\s+|about\s+)?(?P<q>[^'"|\s][^|]*)$"#
);
rule!(
    MIND_RE,
    r"(?i)^(?:how\s+are\s+you\s+feeling|how\s+do\s+you\s+feel|what(?:'s|\s+is)\s+on\s+your\s+mind|mind\s+state|inner\s+state|your\s+mood|mood)[?.!]*$"
);
rule!(THINK_RE, r"(?i)^think\s+about\s+(?P<topic>.+)$");
rule!(INTEREST_RE, r"(?i)^add\s+interest\s+(?:in\s+)?(?P<topic>.+)$");
rule!(
    REINDEX_RE,
    r"(?i)^(?:reindex|re-index|rebuild\s+(?:the\s+)?index|refresh\s+(?:the\s+)?index)[.!]*$"
);
rule!(
    INDEX_SEARCH_RE,
    r"(?i)^(?:index\s+search|search\s+(?:the\s+)?index(?:\s+for)?)\s+(?P<q>.+)$"
);
rule!(EMERGENCE_RE, r"(?i)^emergence\s+(?:of\s+|about\s+)?(?P<topic>.+)$");
rule!(USE_TOOL_RE, r"(?i)^use\s+(?:the\s+)?tool\s+(?P<name>[A-Za-z][\w-]*)(?:\s+(?P<args>.+))?$");

const TOPIC_STOPWORDS: &[&str] = &[
    "the", "a", "an", "that", "to", "for", "me", "my", "and", "of", "which", "can", "will", "it",
    "helps", "help", "lets", "let", "from", "into", "with", "is",
];

/// Up to three content words naming a requested tool.
pub fn request_topic(description: &str) -> String {
    terms(description)
        .filter(|t| !TOPIC_STOPWORDS.contains(&t.as_str()))
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_one_of(phrase: &str, set: &[&str]) -> bool {
    set.contains(&phrase)
}

fn capture(re: &Regex, input: &str, group: &str) -> Option<String> {
    re.captures(input)
        .and_then(|c| c.name(group).map(|m| m.as_str().trim().to_string()))
}

fn optional(c: &regex::Captures<'_>, group: &str) -> String {
    c.name(group).map_or_else(String::new, |m| m.as_str().trim().to_string())
}

/// Classify `input`; `None` means it is conversational.
///
/// `pending` says whether a tool-creation request awaits confirmation.
pub fn parse_command(input: &str, pending: bool, registry: &TokenRegistry) -> Option<Command> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    let phrase = lower.trim_end_matches(['?', '!', '.']).trim();

    // Exact phrases.
    if lower == "?" || is_one_of(phrase, HELP) {
        return Some(Command::Help);
    }
    if is_one_of(phrase, LIST_TOKENS) {
        return Some(Command::ListTokens);
    }
    if is_one_of(phrase, PIPELINE_HELP) {
        return Some(Command::PipelineHelp);
    }
    if is_one_of(phrase, STATS) {
        return Some(Command::Stats);
    }
    if is_one_of(phrase, LIST_SKILLS) {
        return Some(Command::ListSkills);
    }
    if is_one_of(phrase, SNAPSHOT) {
        return Some(Command::Snapshot);
    }

    // A pending confirmation overrides everything below.
    if pending && AFFIRM_RE.is_match(trimmed) {
        return Some(Command::Confirm);
    }

    // Anchored regex rules.
    if let Some(c) = RUN_RE.captures(trimmed) {
        return Some(Command::RunTool {
            name: optional(&c, "name"),
            args: optional(&c, "args"),
        });
    }
    if let Some(query) = capture(&WEB_SEARCH_RE, trimmed, "q") {
        return Some(Command::WebSearch { query });
    }
    if let Some(topic) = capture(&LEARN_RE, trimmed, "topic") {
        return Some(Command::Learn { topic });
    }
    if let Some(c) = CREATE_TOOL_RE.captures(trimmed) {
        return Some(Command::CreateTool {
            name: optional(&c, "name"),
            description: optional(&c, "desc"),
        });
    }
    if let Some(description) = capture(&REQUEST_TOOL_RE, trimmed, "desc") {
        let description = description.trim_end_matches(['.', '!']).to_string();
        return Some(Command::RequestTool {
            topic: request_topic(&description),
            description,
        });
    }
    if let Some(topic) = capture(&SMART_TOOL_RE, trimmed, "topic") {
        return Some(Command::SmartTool { topic });
    }
    if let Some(query) = capture(&RECALL_RE, trimmed, "q") {
        return Some(Command::Recall { query });
    }
    if MIND_RE.is_match(trimmed) {
        return Some(Command::MindState);
    }
    if let Some(topic) = capture(&THINK_RE, trimmed, "topic") {
        return Some(Command::Think { topic });
    }
    if let Some(topic) = capture(&INTEREST_RE, trimmed, "topic") {
        return Some(Command::AddInterest { topic });
    }
    if REINDEX_RE.is_match(trimmed) {
        return Some(Command::Reindex);
    }
    if let Some(query) = capture(&INDEX_SEARCH_RE, trimmed, "q") {
        return Some(Command::IndexSearch { query });
    }
    if let Some(topic) = capture(&EMERGENCE_RE, trimmed, "topic") {
        return Some(Command::Emergence { topic });
    }

    // Pipelines.
    if trimmed.contains('|') {
        return Some(Command::Pipeline {
            expr: trimmed.to_string(),
        });
    }

    // A single registered token.
    if parse_step(trimmed).is_some_and(|step| registry.contains(&step.name)) {
        return Some(Command::Step {
            expr: trimmed.to_string(),
        });
    }

    // Natural-language phrasing of a token.
    if let Some(expr) = translate(trimmed) {
        return Some(Command::Step { expr });
    }

    if let Some(c) = USE_TOOL_RE.captures(trimmed) {
        return Some(Command::UseTool {
            name: optional(&c, "name"),
            args: optional(&c, "args"),
        });
    }

    // Remaining phrases.
    if is_one_of(phrase, LIST_TOOLS) {
        return Some(Command::ListTools);
    }
    if is_one_of(phrase, SELF_MOD_HELP) {
        return Some(Command::SelfModificationHelp);
    }
    if is_one_of(phrase, REBUILD) {
        return Some(Command::Rebuild);
    }
    if is_one_of(phrase, MOD_HISTORY) {
        return Some(Command::ModificationHistory);
    }
    None
}
