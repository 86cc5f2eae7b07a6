//! Query/document tokenization for the lexical index.
//!
//! Lowercases, splits on non-alphanumeric characters, and drops
//! single-character tokens plus a fixed English stopword set. The same
//! function tokenizes both indexed chunks and incoming queries so term
//! statistics stay comparable.

use once_cell::sync::Lazy;
use std::collections::HashSet;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

/// Tokenize text into lowercase terms with punctuation stripped and
/// stopwords removed.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|token| !STOP_WORDS.contains(token.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lowercases_and_splits_on_punctuation() {
        let tokens = tokenize("Reset your VPN-client, please!");
        assert_eq!(tokens, vec!["reset", "your", "vpn", "client", "please"]);
    }

    #[test]
    fn removes_stopwords() {
        let tokens = tokenize("the quick brown fox and the lazy dog");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"and".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"fox".to_string()));
    }

    #[test]
    fn drops_single_character_tokens() {
        let tokens = tokenize("a b c word");
        assert_eq!(tokens, vec!["word"]);
    }

    #[test]
    fn empty_input_yields_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("  ,.;!  ").is_empty());
    }
}
