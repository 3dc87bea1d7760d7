//! Fixed-order prompt assembly.

use std::sync::LazyLock;

use regex::Regex;

use super::notes::AdvisoryNotes;
use crate::session::{ConversationTurn, EmotionalState};

/// History turns included in the prompt.
pub const HISTORY_TURNS: usize = 8;

static RECALL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\[From [^\]]*\]:\s*").unwrap());

/// Everything the prompt is assembled from. Absent parts are omitted.
#[derive(Debug)]
pub struct PromptParts<'a> {
    pub system_prompt: &'a str,
    pub emotion: &'a EmotionalState,
    /// Non-default cognitive approach label.
    pub approach: Option<&'a str>,
    pub language: &'a str,
    pub thoughts: &'a [String],
    pub notes: &'a AdvisoryNotes,
    pub pipeline_hint: Option<&'a str>,
    /// Full history; only the tail is used.
    pub history: &'a [ConversationTurn],
}

fn persona_block(parts: &PromptParts<'_>) -> String {
    let mut block = parts.system_prompt.trim().to_string();
    let e = parts.emotion;
    block.push_str(&format!(
        "\nCurrent mood: {} (valence {:+.2}, arousal {:.2}).",
        e.dominant_emotion, e.valence, e.arousal
    ));
    if let Some(focus) = &e.focus {
        block.push_str(&format!(" Current focus: {focus}."));
    }
    if let Some(approach) = parts.approach {
        block.push_str(&format!("\nCognitive approach for this reply: {approach}."));
    }
    block
}

/// The last [`HISTORY_TURNS`] turns, with consecutive duplicates and recall
/// prefixes removed.
pub fn history_lines(history: &[ConversationTurn]) -> Vec<String> {
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let mut lines = Vec::new();
    let mut previous: Option<&str> = None;
    for turn in &history[start..] {
        if previous == Some(turn.content.as_str()) {
            continue;
        }
        previous = Some(turn.content.as_str());
        let content = RECALL_PREFIX_RE.replace(&turn.content, "");
        lines.push(format!("### {}: {}", turn.role.label(), content.trim()));
    }
    lines
}

/// Join the blocks in their fixed order, ending with an open assistant turn.
pub fn assemble(parts: &PromptParts<'_>) -> String {
    let mut blocks = vec![persona_block(parts), parts.language.to_string()];
    if !parts.thoughts.is_empty() {
        let bullets: Vec<String> = parts.thoughts.iter().map(|t| format!("- {t}")).collect();
        blocks.push(format!("INNER THOUGHTS:\n{}", bullets.join("\n")));
    }
    if let Some(block) = parts.notes.render_block() {
        blocks.push(block);
    }
    if let Some(hint) = parts.pipeline_hint {
        blocks.push(hint.to_string());
    }
    let history = history_lines(parts.history);
    if !history.is_empty() {
        blocks.push(history.join("\n"));
    }
    blocks.push("### Assistant:".to_string());
    blocks.join("\n\n")
}

/// Hint shown when the user seems to be asking about pipelines.
pub fn pipeline_hint(token_names: &[&str]) -> String {
    format!(
        "PIPELINE CONTEXT: The user can chain commands with |, for example \
         WikiSearch 'octopus' | Summarize. Each step may take a 'quoted' or bare \
         argument. Available tokens: {}.",
        token_names.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>(
        emotion: &'a EmotionalState,
        notes: &'a AdvisoryNotes,
        thoughts: &'a [String],
        history: &'a [ConversationTurn],
    ) -> PromptParts<'a> {
        PromptParts {
            system_prompt: "You are Aria.",
            emotion,
            approach: None,
            language: "LANGUAGE: Mirror whatever language the user writes in.",
            thoughts,
            notes,
            pipeline_hint: None,
            history,
        }
    }

    #[test]
    fn consecutive_duplicate_turns_appear_once() {
        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("hi there"),
        ];
        let lines = history_lines(&history);
        assert_eq!(lines, vec!["### User: hello", "### Assistant: hi there"]);
    }

    #[test]
    fn recall_prefix_is_stripped() {
        let history = vec![ConversationTurn::assistant("[From 2024-01-02 10:00]: we talked about owls")];
        assert_eq!(history_lines(&history), vec!["### Assistant: we talked about owls"]);
    }

    #[test]
    fn only_last_eight_turns() {
        let history: Vec<_> = (0..12).map(|i| ConversationTurn::user(format!("m{i}"))).collect();
        let lines = history_lines(&history);
        assert_eq!(lines.len(), HISTORY_TURNS);
        assert_eq!(lines[0], "### User: m4");
    }

    #[test]
    fn blocks_in_fixed_order() {
        let emotion = EmotionalState::default();
        let notes = AdvisoryNotes {
            integration: Some("phi 0.40".into()),
            ..Default::default()
        };
        let thoughts = vec!["a thought".to_string()];
        let history = vec![ConversationTurn::user("hi")];
        let mut p = parts(&emotion, &notes, &thoughts, &history);
        let hint = pipeline_hint(&["Show"]);
        p.pipeline_hint = Some(&hint);
        let prompt = assemble(&p);

        let order = [
            "You are Aria.",
            "Current mood: neutral",
            "LANGUAGE:",
            "INNER THOUGHTS:",
            "COGNITIVE STATE:",
            "PIPELINE CONTEXT:",
            "### User: hi",
        ];
        let positions: Vec<usize> = order.iter().map(|m| prompt.find(m).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.ends_with("### Assistant:"));
    }

    #[test]
    fn empty_parts_are_omitted() {
        let emotion = EmotionalState::default();
        let notes = AdvisoryNotes::default();
        let prompt = assemble(&parts(&emotion, &notes, &[], &[]));
        assert!(!prompt.contains("INNER THOUGHTS"));
        assert!(!prompt.contains("COGNITIVE STATE"));
        assert!(!prompt.contains("PIPELINE"));
    }
}
