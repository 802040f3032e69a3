//! Placeholder token grammar: `[` + `[A-Z_]+` + `_` + digits + `]`.
//!
//! Tokens cross an untyped text boundary (chat input fields and the rendered
//! page), so the textual form is fixed.

use crate::detection::PiiType;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Pattern matching any placeholder-shaped token.
pub fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([A-Z_]+)_(\d+)\]").expect("Invalid placeholder regex"))
}

/// Format the token for the `n`-th value of a type, e.g. `[EMAIL_1]`.
pub fn format(pii_type: PiiType, n: u64) -> String {
    format!("[{}_{}]", pii_type.as_str(), n)
}

/// A placeholder-shaped token found in text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenMatch<'a> {
    pub start: usize,
    pub end: usize,
    /// Full token including brackets
    pub token: &'a str,
    /// Type label, e.g. `CREDIT_CARD`
    pub label: &'a str,
    /// Digit run of the suffix, unbounded in length
    pub digits: &'a str,
}

impl TokenMatch<'_> {
    /// Numeric suffix, or `None` if it does not fit in `u64`
    pub fn number(&self) -> Option<u64> {
        self.digits.parse().ok()
    }
}

/// Iterate over every placeholder-shaped token in `text`.
pub fn find_all(text: &str) -> impl Iterator<Item = TokenMatch<'_>> {
    pattern().captures_iter(text).filter_map(|caps| {
        let whole = caps.get(0)?;
        Some(TokenMatch {
            start: whole.start(),
            end: whole.end(),
            token: whole.as_str(),
            label: caps.get(1)?.as_str(),
            digits: caps.get(2)?.as_str(),
        })
    })
}

/// Split a token into its type label and numeric suffix.
///
/// Fails for text that is not exactly one token, and for suffixes that do
/// not fit in `u64`.
pub fn parse(token: &str) -> Result<(&str, u64)> {
    find_all(token)
        .next()
        .filter(|m| m.start == 0 && m.end == token.len())
        .and_then(|m| Some((m.label, m.number()?)))
        .ok_or_else(|| Error::InvalidPlaceholder(token.to_string()))
}

/// Byte ranges of all placeholder-shaped tokens in `text`.
pub fn token_ranges(text: &str) -> Vec<(usize, usize)> {
    if !text.contains('[') {
        return Vec::new();
    }
    find_all(text).map(|m| (m.start, m.end)).collect()
}

/// Whether `start..end` intersects any of `ranges`.
pub fn overlaps_any(ranges: &[(usize, usize)], start: usize, end: usize) -> bool {
    ranges.iter().any(|&(s, e)| start < e && s < end)
}
