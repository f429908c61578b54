/// Condition text normalization.
///
/// Tokenization is the contract between training and inference: the same
/// rules must apply when the vocabulary is fitted and when a query is
/// transformed, or vocabulary slots stop lining up. Rules: lowercase,
/// extract alphanumeric runs (so punctuation splits tokens), drop tokens
/// shorter than `MIN_TOKEN_LEN`.
use std::sync::OnceLock;

use regex::Regex;

/// Tokens shorter than this are treated as noise (stray letters, list
/// markers) and discarded.
pub const MIN_TOKEN_LEN: usize = 2;

fn token_pattern() -> &'static Regex {
    static TOKEN_PATTERN: OnceLock<Regex> = OnceLock::new();
    TOKEN_PATTERN.get_or_init(|| Regex::new("[a-z0-9]+").expect("valid token pattern"))
}

/// Split free text into normalized tokens.
///
/// Deterministic: inputs that are byte-identical after lowercasing always
/// produce the same token sequence in the same order.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .filter(|m| m.as_str().len() >= MIN_TOKEN_LEN)
        .map(|m| m.as_str().to_string())
        .collect()
}
