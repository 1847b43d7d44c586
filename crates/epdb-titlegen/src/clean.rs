use std::sync::LazyLock;

use regex::Regex;

// Emoji variation selectors and joiners are marks, not symbols.
static SYMBOLS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{P}\p{S}\x{FE0F}\x{200D}]").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Decorative words dropped from generated titles.
const FILLER_WORDS: &[&str] = &[
    "넘치는",
    "가득한",
    "풍부한",
    "화려한",
    "만끽하는",
    "즐기는",
    "경험하는",
    "체험하는",
    "감상하는",
    "특별한",
    "독특한",
    "유니크한",
    "합리적",
    "가치",
    "역동적",
];

/// Strips punctuation and symbols, drops filler words, and collapses
/// whitespace.
#[must_use]
pub fn clean_title(raw: &str) -> String {
    let stripped = SYMBOLS.replace_all(raw.trim(), " ");
    let words: Vec<&str> = WHITESPACE
        .split(stripped.trim())
        .filter(|w| !w.is_empty() && !FILLER_WORDS.contains(w))
        .collect();
    words.join(" ")
}
