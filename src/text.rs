//! Small matching helpers shared by the classifier, builder and ranker.
//!
//! Everything here works on already-lowercased input unless noted; callers
//! lowercase once per request and keep the original casing for display.

/// Phrases that mean "show me everything in this domain".
const GENERAL_LISTING_PHRASES: &[&str] = &[
    "一覧",
    "全部",
    "全件",
    "すべて",
    "全て",
    "リスト",
    "list",
    "show all",
    "everything",
];

/// Request boilerplate that carries no search signal.
const FILLER_PHRASES: &[&str] = &[
    "について",
    "に関して",
    "を教えて",
    "教えて",
    "を見せて",
    "見せて",
    "を見たい",
    "見たい",
    "を知りたい",
    "知りたい",
    "ください",
    "下さい",
    "？",
    "?",
    "。",
    "、",
];

pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles
        .iter()
        .any(|needle| !needle.is_empty() && haystack.contains(needle))
}

/// Takes the raw query; casing does not matter.
pub fn is_general_listing(query: &str) -> bool {
    contains_any(&query.to_lowercase(), GENERAL_LISTING_PHRASES)
}

/// Bidirectional containment, the loose equality used for titles and sections.
pub fn overlaps(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(b) || b.contains(a)
}

pub fn strip_fillers(input: &str) -> String {
    FILLER_PHRASES
        .iter()
        .fold(input.to_string(), |acc, phrase| acc.replace(phrase, " "))
}

/// Whitespace tokens longer than one character.
pub fn tokenize(input: &str) -> Vec<String> {
    input
        .split_whitespace()
        .filter(|token| token.chars().count() > 1)
        .map(ToString::to_string)
        .collect()
}
