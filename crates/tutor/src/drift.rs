//! Topic drift detection.
//!
//! An utterance drifts when one of its whitespace-separated tokens is within
//! a small edit distance of another topic's label. The allowed distance is
//! `max(1, len(label) / 3)`, so longer labels tolerate more misspelling.
//! Multi-word labels are compared whole against each single token.

/// Levenshtein edit distance over Unicode scalar values.
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
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Largest edit distance at which a token still counts as a mention of `label`.
pub fn drift_threshold(label: &str) -> usize {
    (label.chars().count() / 3).max(1)
}

/// Detects references to topics other than the active one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriftDetector;

impl DriftDetector {
    pub fn new() -> Self {
        Self
    }

    /// Return the first topic in `known_topics` (other than `active_topic`)
    /// that the utterance mentions, allowing for misspellings.
    pub fn detect<'a, I>(&self, utterance: &str, active_topic: &str, known_topics: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let utterance = utterance.to_lowercase();
        let tokens: Vec<&str> = utterance.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }
        let active = active_topic.trim().to_lowercase();

        known_topics.into_iter().find(|topic| {
            let label = topic.trim().to_lowercase();
            if label == active {
                return false;
            }
            let threshold = drift_threshold(&label);
            tokens.iter().any(|token| levenshtein(token, &label) <= threshold)
        })
    }
}
