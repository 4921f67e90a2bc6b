//! Text normalization for indexing and querying
//!
//! The same pipeline runs on both sides so index terms and query terms
//! meet in the middle:
//! 1. Lowercase
//! 2. Split on non-alphanumeric characters
//! 3. Drop tokens shorter than 2 characters
//! 4. Drop stop words
//! 5. Light suffix stemming

/// Words carrying no search signal
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "he", "her", "his", "if", "in", "into", "is", "it", "its", "no", "not", "of", "on", "or",
    "she", "such", "that", "the", "their", "then", "there", "these", "they", "this", "to", "was",
    "were", "will", "with",
];

/// True when the token is a stop word
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Light suffix-stripping stemmer
///
/// Strips, in order of precedence: `-ies`→`y`, `-ing`, `-ed`, `-ment`,
/// `-ly`, `-es`, `-s`. A suffix is only stripped when at least three
/// characters of stem remain, so short tokens pass through unchanged.
pub fn stem(token: &str) -> String {
    const MIN_STEM: usize = 3;

    if let Some(base) = token.strip_suffix("ies") {
        if base.len() >= MIN_STEM {
            return format!("{}y", base);
        }
    }
    for suffix in ["ing", "ed", "ment", "ly", "es", "s"] {
        if let Some(base) = token.strip_suffix(suffix) {
            if base.len() >= MIN_STEM {
                return base.to_string();
            }
        }
    }
    token.to_string()
}

/// Tokenize text into normalized, stemmed search terms
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() >= 2)
        .filter(|s| !is_stop_word(s))
        .map(stem)
        .collect()
}

/// Tokenize and deduplicate, preserving first-seen order
///
/// Query terms are deduplicated so a repeated word does not double its
/// own score.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
