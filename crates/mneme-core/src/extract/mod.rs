//! Pure text-extraction helpers used at the ingest boundary: content hashing for
//! dedup, canonical name normalization, and deadline-phrase detection for
//! commitment memories. Nothing here touches the database.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of `content`, used by `memories.content_hash` and
/// `reflections.content_hash` for dedup and near-duplicate lookups.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn content_hash(content: &str) -> String {
    sha256_hex(content.as_bytes())
}

/// Canonical form of an entity name: lowercased and trimmed. Used for entity
/// dedup lookups (`entities.canonical_name`), not for display.
pub fn canonical_name(name: &str) -> String {
    name.to_lowercase().trim().to_string()
}

const WEEKDAYS: &[&str] = &["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];
const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september", "october",
    "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec",
];
const RELATIVE_PHRASES: &[&str] = &[
    "tomorrow",
    "tonight",
    "today",
    "this week",
    "next week",
    "this weekend",
    "next weekend",
    "eod",
    "end of day",
    "end of week",
];

/// True if `content` contains a recognizable deadline phrase: a weekday name,
/// a month name, a relative-time phrase, or a `MM/DD` or `MM-DD` date.
pub fn has_deadline_pattern(content: &str) -> bool {
    let lower = content.to_lowercase();

    if WEEKDAYS.iter().any(|w| lower.contains(w)) {
        return true;
    }
    if MONTHS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    if RELATIVE_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if has_numeric_date(&lower) {
        return true;
    }
    false
}

fn has_numeric_date(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'/' || b == b'-' {
            let before_digit = i > 0 && bytes[i - 1].is_ascii_digit();
            let after_digit = i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit();
            if before_digit && after_digit {
                return true;
            }
        }
    }
    false
}

/// Levenshtein-style near-duplicate check used by the entity guard: true if
/// `candidate` is within edit distance 2 of any name in `existing` (case-insensitive).
pub fn has_near_duplicate(candidate: &str, existing: &[String]) -> Option<String> {
    let candidate_lower = candidate.to_lowercase();
    existing
        .iter()
        .find(|other| {
            let other_lower = other.to_lowercase();
            other_lower != candidate_lower && levenshtein(&candidate_lower, &other_lower) <= 2
        })
        .cloned()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic_and_sensitive_to_input() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn canonical_name_lowercases_and_trims() {
        assert_eq!(canonical_name("  Sarah Chen  "), "sarah chen");
    }

    #[test]
    fn deadline_pattern_detects_weekday() {
        assert!(has_deadline_pattern("Finish report by Friday"));
    }

    #[test]
    fn deadline_pattern_absent_for_plain_commitment() {
        assert!(!has_deadline_pattern("I will finish the report"));
    }

    #[test]
    fn deadline_pattern_detects_relative_phrase_and_numeric_date() {
        assert!(has_deadline_pattern("Due tomorrow"));
        assert!(has_deadline_pattern("Due 3/15"));
    }

    #[test]
    fn near_duplicate_detects_small_typo() {
        let existing = vec!["sarah chenn".to_string(), "bob smith".to_string()];
        assert!(has_near_duplicate("Sarah Chen", &existing).is_some());
    }

    #[test]
    fn near_duplicate_absent_for_distinct_names() {
        let existing = vec!["bob smith".to_string()];
        assert!(has_near_duplicate("Sarah Chen", &existing).is_none());
    }
}
