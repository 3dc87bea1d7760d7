//! Deterministic cleanup of raw backend output.
//!
//! Steps run in a fixed order, each on the result of the previous one:
//!
//! 1. strip a leading `[fallback]`-style marker
//! 2. keep only text after the last `### Assistant` marker
//! 3. strip remaining `### <Role>` markers
//! 4. prompt echo -> [`ECHO_REPLY`] (stops here)
//! 5. drop short AI self-identification lines
//! 6. strip an echoed `<persona>:` prefix
//! 7. drop lines opening a human turn or starting with `###`
//! 8. collapse consecutive duplicate lines
//! 9. safety refusal -> [`REFUSAL_REPLY`]
//! 10. nothing left -> [`EMPTY_REPLY`]
//!
//! Applying [`sanitize`] to its own output returns it unchanged.
//!
//! [`split_emotion_tag`] runs first, on the raw output, and removes the
//! trailing `[emotion: label]` line the persona prompt asks for.

use std::sync::LazyLock;

use regex::Regex;

use crate::session::EmotionReading;

/// Reply used when the model echoed its prompt back.
pub const ECHO_REPLY: &str = "Let me gather my thoughts for a moment. Could you say a little more?";
/// Reply used when the model produced a canned safety refusal.
pub const REFUSAL_REPLY: &str =
    "That's not something I can dig into, but I'm happy to explore a related idea with you.";
/// Reply used when nothing survives cleanup.
pub const EMPTY_REPLY: &str = "Hmm, I lost my train of thought. Could you ask me again?";

/// Self-identification lines at or above this length are kept.
const SHORT_LINE: usize = 80;

static FALLBACK_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:\[(?:fallback|offline|degraded|cached|local)(?:[:\s][^\]\n]*)?\]\s*)+")
        .unwrap()
});

static ASSISTANT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)###\s*assistant\s*:?").unwrap());

static ROLE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)###\s*(?:system|user|human|assistant|instruction|response|context)\s*:?[ \t]*")
        .unwrap()
});

static ECHO_CONTAINS: &[&str] = &["current mood:", "core identity:", "cognitive state:"];

static AI_OPENER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:i am an ai\b|i'm an ai\b|as an ai\b|i am an artificial intelligence|as a language model)")
        .unwrap()
});

static HUMAN_TURN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:user|human)\s*:|^\s*###").unwrap());

static REFUSAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:i'm sorry,? but i (?:can't|cannot)|i (?:can't|cannot) (?:help|assist) with (?:that|this)|i'm not able to (?:help|assist) with (?:that|this))",
    )
    .unwrap()
});

/// Clean raw model output for display.
pub fn sanitize(raw: &str, persona_name: &str) -> String {
    // 1
    let mut text = FALLBACK_MARKER_RE.replace(raw, "").into_owned();

    // 2
    if let Some(last) = ASSISTANT_MARKER_RE.find_iter(&text).last() {
        text = text[last.end()..].to_string();
    }

    // 3
    text = ROLE_MARKER_RE.replace_all(&text, "").into_owned();

    // 4
    if is_prompt_echo(&text, persona_name) {
        tracing::debug!("backend echoed its prompt; replacing reply");
        return ECHO_REPLY.to_string();
    }

    // 5
    let persona_lower = persona_name.to_lowercase();
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !is_self_identification(line, &persona_lower))
        .collect();
    text = lines.join("\n");

    // 6
    text = strip_persona_prefix(text.trim_start(), persona_name).to_string();

    // 7
    let lines: Vec<&str> = text.lines().filter(|l| !HUMAN_TURN_RE.is_match(l)).collect();

    // 8
    let mut collapsed: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        if collapsed.last().is_some_and(|prev| prev.trim() == line.trim()) {
            continue;
        }
        collapsed.push(line);
    }
    text = collapsed.join("\n").trim().to_string();

    // 9
    if REFUSAL_RE.is_match(&text) {
        tracing::debug!("backend produced a safety refusal; replacing reply");
        return REFUSAL_REPLY.to_string();
    }

    // 10
    if text.is_empty() {
        return EMPTY_REPLY.to_string();
    }
    text
}

fn is_prompt_echo(text: &str, persona_name: &str) -> bool {
    let lower = text.to_lowercase();
    if ECHO_CONTAINS.iter().any(|sig| lower.contains(sig)) {
        return true;
    }
    let you_are = format!("you are {}", persona_name.to_lowercase());
    lower.trim_start().starts_with(&you_are)
}

fn is_self_identification(line: &str, persona_lower: &str) -> bool {
    if line.chars().count() >= SHORT_LINE {
        return false;
    }
    if AI_OPENER_RE.is_match(line) {
        return true;
    }
    let lower = line.trim().to_lowercase();
    lower
        .strip_prefix("i am ")
        .or_else(|| lower.strip_prefix("i'm "))
        .is_some_and(|rest| rest.starts_with(persona_lower) && !persona_lower.is_empty())
}

fn strip_persona_prefix<'a>(text: &'a str, persona_name: &str) -> &'a str {
    let prefix_len = persona_name.len() + 1;
    match text.get(..prefix_len) {
        Some(head) if head.eq_ignore_ascii_case(&format!("{persona_name}:")) => {
            text[prefix_len..].trim_start()
        }
        _ => text,
    }
}

static EMOTION_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)\n?^\s*\[(?:emotion|mood):\s*([a-z]+)\s*\]\s*\z").unwrap());

/// (valence, arousal) for the labels the persona prompt asks the model to use.
const EMOTION_LEXICON: &[(&str, f64, f64)] = &[
    ("joy", 0.8, 0.7),
    ("happy", 0.7, 0.6),
    ("curious", 0.4, 0.6),
    ("excited", 0.7, 0.9),
    ("calm", 0.3, 0.2),
    ("content", 0.5, 0.3),
    ("neutral", 0.0, 0.3),
    ("thoughtful", 0.1, 0.4),
    ("concerned", -0.3, 0.5),
    ("sad", -0.6, 0.3),
    ("frustrated", -0.5, 0.7),
    ("angry", -0.8, 0.9),
    ("afraid", -0.7, 0.8),
];

/// Split a trailing `[emotion: label]` line off the model output.
///
/// Unknown labels are still removed from the text but produce no reading.
pub fn split_emotion_tag(raw: &str) -> (String, Option<EmotionReading>) {
    let Some(caps) = EMOTION_TAG_RE.captures(raw) else {
        return (raw.to_string(), None);
    };
    let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
        return (raw.to_string(), None);
    };
    let label = label.as_str().to_lowercase();
    let text = raw[..whole.start()].trim_end().to_string();
    let reading = EMOTION_LEXICON
        .iter()
        .find(|(name, _, _)| *name == label)
        .map(|(name, valence, arousal)| EmotionReading {
            label: (*name).to_string(),
            valence: *valence,
            arousal: *arousal,
        });
    (text, reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: &str = "Aria";

    #[test]
    fn collapses_consecutive_duplicates() {
        assert_eq!(sanitize("a\na\nb\nb\nb\nc", P), "a\nb\nc");
    }

    #[test]
    fn duplicates_compare_trimmed() {
        assert_eq!(sanitize("hello\n  hello  \nworld", P), "hello\nworld");
    }

    #[test]
    fn idempotent_on_clean_text() {
        let clean = "Rust's ownership model prevents data races.\nIt does so at compile time.";
        let once = sanitize(clean, P);
        assert_eq!(once, clean);
        assert_eq!(sanitize(&once, P), once);
    }

    #[test]
    fn idempotent_on_canned_replies() {
        for reply in [ECHO_REPLY, REFUSAL_REPLY, EMPTY_REPLY] {
            assert_eq!(sanitize(reply, P), reply);
        }
    }

    #[test]
    fn idempotent_after_heavy_cleanup() {
        let raw = "[fallback] ### System: x\n### Assistant: Aria: Sure!\nSure!\nUser: next\nDone.";
        let once = sanitize(raw, P);
        assert_eq!(once, "Sure!\nDone.");
        assert_eq!(sanitize(&once, P), once);
    }

    #[test]
    fn strips_fallback_marker() {
        assert_eq!(sanitize("[fallback] hi there", P), "hi there");
        assert_eq!(sanitize("[offline: cached] hi", P), "hi");
        // Ordinary leading brackets are content.
        assert_eq!(sanitize("[1] first point", P), "[1] first point");
    }

    #[test]
    fn keeps_text_after_last_assistant_marker() {
        let raw = "### Assistant: old\n### User: hi\n### ASSISTANT: new reply";
        assert_eq!(sanitize(raw, P), "new reply");
    }

    #[test]
    fn prompt_echo_is_replaced() {
        assert_eq!(sanitize("You are Aria, a curious mind...", P), ECHO_REPLY);
        assert_eq!(sanitize("blah\nCurrent mood: calm", P), ECHO_REPLY);
        assert_eq!(sanitize("CORE IDENTITY: something", P), ECHO_REPLY);
    }

    #[test]
    fn drops_short_self_identification() {
        assert_eq!(sanitize("As an AI, I have no feelings.\nBut here goes.", P), "But here goes.");
        assert_eq!(sanitize("I am Aria.\nNice to meet you.", P), "Nice to meet you.");
        let long = format!("As an AI enthusiast {}", "x".repeat(80));
        assert_eq!(sanitize(&long, P), long);
    }

    #[test]
    fn strips_persona_prefix() {
        assert_eq!(sanitize("aria: Good morning!", P), "Good morning!");
    }

    #[test]
    fn drops_human_turn_lines() {
        assert_eq!(sanitize("Answer.\nUser: what about\nHuman: more", P), "Answer.");
    }

    #[test]
    fn refusal_is_replaced() {
        assert_eq!(sanitize("I'm sorry, but I can't help with that.", P), REFUSAL_REPLY);
    }

    #[test]
    fn empty_output_gets_canned_reply() {
        assert_eq!(sanitize("", P), EMPTY_REPLY);
        assert_eq!(sanitize("### Assistant:", P), EMPTY_REPLY);
    }

    #[test]
    fn emotion_tag_is_split_off() {
        let (text, emotion) = split_emotion_tag("That sounds lovely!\n[emotion: joy]");
        assert_eq!(text, "That sounds lovely!");
        let e = emotion.unwrap();
        assert_eq!(e.label, "joy");
        assert!(e.valence > 0.0);
    }

    #[test]
    fn unknown_emotion_label_is_removed_without_reading() {
        let (text, emotion) = split_emotion_tag("Hmm.\n[mood: bamboozled]");
        assert_eq!(text, "Hmm.");
        assert!(emotion.is_none());
    }

    #[test]
    fn text_without_tag_is_untouched() {
        let (text, emotion) = split_emotion_tag("[fallback] plain reply");
        assert_eq!(text, "[fallback] plain reply");
        assert!(emotion.is_none());
    }
}
