//! Lexical topic classification and cause/effect extraction.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::terms;

const TOPICS: &[(&str, &[&str])] = &[
    ("technology", &["code", "programming", "software", "computer", "rust", "python", "algorithm", "database", "ai", "robot", "internet"]),
    ("science", &["physics", "quantum", "chemistry", "biology", "experiment", "theory", "atom", "evolution", "molecule", "energy"]),
    ("space", &["space", "planet", "star", "galaxy", "universe", "astronomy", "moon", "orbit", "nasa", "telescope"]),
    ("music", &["music", "song", "jazz", "guitar", "piano", "melody", "album", "band", "concert", "rhythm"]),
    ("art", &["art", "painting", "drawing", "sculpture", "poem", "poetry", "novel", "story", "artist", "museum"]),
    ("philosophy", &["meaning", "ethics", "consciousness", "existence", "mind", "truth", "philosophy", "moral", "free", "will"]),
    ("emotions", &["feel", "feeling", "sad", "happy", "angry", "lonely", "anxious", "love", "afraid", "worried"]),
    ("health", &["health", "sleep", "exercise", "diet", "doctor", "medicine", "sick", "pain", "fitness"]),
    ("food", &["food", "cook", "cooking", "recipe", "cake", "dinner", "bread", "coffee", "tea", "restaurant"]),
    ("history", &["history", "war", "ancient", "empire", "century", "revolution", "king", "historical"]),
    ("nature", &["nature", "animal", "tree", "forest", "ocean", "weather", "climate", "river", "bird", "garden"]),
];

/// The best-matching topic label, if any keyword is present.
///
/// Ties go to the topic listed first.
pub fn classify_topic(input: &str) -> Option<String> {
    let words: Vec<String> = terms(input).collect();
    let mut best: Option<(&str, usize)> = None;
    for (label, keywords) in TOPICS {
        let hits = words.iter().filter(|w| keywords.contains(&w.as_str())).count();
        if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
            best = Some((label, hits));
        }
    }
    best.map(|(label, _)| label.to_string())
}

static CAUSE_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cause>[\w\s'-]+?)\s+(?:causes|caused|cause|leads\s+to|led\s+to|lead\s+to|results\s+in|resulted\s+in|triggers|triggered|produces)\s+(?P<effect>[\w\s'-]+)",
    )
    .unwrap()
});

static EFFECT_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<effect>[\w\s'-]+?)\s+(?:because\s+of|because|due\s+to|caused\s+by|as\s+a\s+result\s+of)\s+(?P<cause>[\w\s'-]+)",
    )
    .unwrap()
});

const STOPWORDS: &[&str] = &[
    "i", "think", "does", "do", "did", "the", "a", "an", "that", "why", "how", "what", "is", "are",
    "was", "it", "really", "maybe", "so",
];

/// Keep up to three trailing (for causes) or leading (for effects) content words.
fn clip(phrase: &str, from_end: bool) -> String {
    let words: Vec<&str> = phrase
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    let picked: Vec<&str> = if from_end {
        words.iter().rev().take(3).rev().copied().collect()
    } else {
        words.iter().take(3).copied().collect()
    };
    picked.join(" ").to_lowercase()
}

/// `(effect, causes)` when the input states a causal relation.
pub fn extract_causal_terms(input: &str) -> Option<(String, Vec<String>)> {
    let (effect, cause) = if let Some(c) = CAUSE_FIRST_RE.captures(input) {
        (clip(&c["effect"], false), c["cause"].to_string())
    } else if let Some(c) = EFFECT_FIRST_RE.captures(input) {
        (clip(&c["effect"], true), c["cause"].to_string())
    } else {
        return None;
    };
    let causes: Vec<String> = cause
        .split(" and ")
        .map(|c| clip(c, true))
        .filter(|c| !c.is_empty())
        .collect();
    if effect.is_empty() || causes.is_empty() {
        return None;
    }
    Some((effect, causes))
}

static PIPELINE_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:pipeline|pipe|tokens?|dsl|chain(?:ing)?|arxivsearch|wikisearch|citationsearch|fetchurl)\b|\|")
        .unwrap()
});

/// Whether the input talks about the pipeline DSL.
pub fn looks_pipeline_related(input: &str) -> bool {
    PIPELINE_HINT_RE.is_match(input)
}
