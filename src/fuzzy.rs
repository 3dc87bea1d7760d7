//! Near-miss identifier suggestions.
//!
//! Two strategies, which can disagree on the same input:
//!
//! - [`containment_suggestions`]: case-insensitive substring containment in
//!   either direction. Used for unknown DSL tokens.
//! - [`nearest_by_edit_distance`]: single nearest name by Levenshtein
//!   distance. Used for ad-hoc capability (tool) lookups.

/// Registry names where `candidate` contains, or is contained by, the name.
///
/// Comparison is case-insensitive. Results keep the order of `names` and are
/// capped at `limit`.
pub fn containment_suggestions<'a, I>(candidate: &str, names: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = candidate.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    names
        .into_iter()
        .filter(|name| {
            let hay = name.to_lowercase();
            hay.contains(&needle) || needle.contains(&hay)
        })
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Classic two-row Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// The single closest name, if it is close enough to be a plausible typo.
///
/// Distance is computed on lowercase forms. A name qualifies when its
/// distance is at most a third of the candidate's length (minimum 2). Ties
/// resolve to the earliest name.
pub fn nearest_by_edit_distance<'a, I>(candidate: &str, names: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = candidate.to_lowercase();
    let max = (needle.chars().count() / 3).max(2);
    let mut best: Option<(usize, &str)> = None;
    for name in names {
        let d = levenshtein(&needle, &name.to_lowercase());
        if d <= max && best.is_none_or(|(bd, _)| d < bd) {
            best = Some((d, name));
        }
    }
    best.map(|(_, name)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKENS: &[&str] = &["ArxivSearch", "WikiSearch", "CitationSearch", "FetchUrl"];

    #[test]
    fn unrelated_name_yields_no_suggestions() {
        assert!(containment_suggestions("Foo", TOKENS.iter().copied(), 3).is_empty());
    }

    #[test]
    fn prefix_suggests_containing_name() {
        assert_eq!(
            containment_suggestions("Arxiv", TOKENS.iter().copied(), 3),
            vec!["ArxivSearch"]
        );
    }

    #[test]
    fn containment_is_bidirectional_and_capped() {
        // "wikisearchplus" contains "WikiSearch".
        assert_eq!(
            containment_suggestions("wikisearchplus", TOKENS.iter().copied(), 3),
            vec!["WikiSearch"]
        );
        assert_eq!(
            containment_suggestions("search", TOKENS.iter().copied(), 2),
            vec!["ArxivSearch", "WikiSearch"]
        );
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn nearest_finds_typo_but_not_stranger() {
        let tools = ["weather", "calculator", "translate"];
        assert_eq!(
            nearest_by_edit_distance("calculater", tools.iter().copied()).as_deref(),
            Some("calculator")
        );
        assert!(nearest_by_edit_distance("zzzzzz", tools.iter().copied()).is_none());
    }

    #[test]
    fn strategies_diverge() {
        // Containment finds "FetchUrl" for "url"; edit distance does not.
        assert_eq!(
            containment_suggestions("url", TOKENS.iter().copied(), 3),
            vec!["FetchUrl"]
        );
        assert!(nearest_by_edit_distance("url", TOKENS.iter().copied()).is_none());
    }
}
