//! Dictionary-based detection for free-form categories.
//!
//! Names, locations and organizations have no fixed shape, so they are
//! matched against user-configured term lists (case-insensitive, whole word).

use super::{resolve_overlaps, Detector, PiiSpan, PiiType};
use crate::redaction::placeholder;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use tracing::warn;

/// Detector matching configured terms per PII type
pub struct KeywordDetector {
    rules: Vec<(PiiType, Regex)>,
}

impl KeywordDetector {
    /// Build a detector from a map of category to terms.
    ///
    /// Blank terms are ignored. A category whose pattern cannot be compiled is
    /// skipped with a warning.
    pub fn new(keywords: &HashMap<PiiType, Vec<String>>) -> Self {
        let mut types: Vec<&PiiType> = keywords.keys().collect();
        types.sort();

        let mut rules = Vec::new();
        for pii_type in types {
            let mut terms: Vec<&str> = keywords[pii_type]
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect();
            if terms.is_empty() {
                continue;
            }
            // Longest first so alternation prefers "Ann Lee" over "Ann"
            terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            terms.dedup();

            let alternation = terms
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(r"\b(?:{})\b", alternation);

            match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                Ok(regex) => rules.push((*pii_type, regex)),
                Err(e) => warn!(pii_type = %pii_type, error = %e, "Skipping keyword rule"),
            }
        }

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Detector for KeywordDetector {
    fn name(&self) -> &str {
        "keywords"
    }

    fn detect(&self, text: &str) -> Vec<PiiSpan> {
        if text.is_empty() || self.rules.is_empty() {
            return Vec::new();
        }

        let reserved = placeholder::token_ranges(text);
        let mut spans = Vec::new();
        for (pii_type, regex) in &self.rules {
            for m in regex.find_iter(text) {
                if !placeholder::overlaps_any(&reserved, m.start(), m.end()) {
                    spans.push(PiiSpan::new(*pii_type, m.as_str(), m.start()));
                }
            }
        }

        resolve_overlaps(spans)
    }
}
