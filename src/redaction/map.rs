//! Per-conversation mapping between placeholder tokens and original values.

use super::placeholder;
use crate::detection::PiiType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// The value a placeholder token stands for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionEntry {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub original: String,
}

/// Bidirectional token ⇄ original mapping for one conversation.
///
/// Serialized as a JSON object keyed by token, e.g.
/// `{"[EMAIL_1]": {"type": "EMAIL", "original": "jane@example.com"}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedactionMap {
    entries: BTreeMap<String, RedactionEntry>,
}

impl RedactionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the token for `(pii_type, original)`, allocating one if needed.
    ///
    /// An existing pair keeps its token and leaves the map unchanged. A new
    /// pair gets the next suffix for its type, one past the highest suffix
    /// already present for that type. If that would pass `u64::MAX`, the
    /// smallest free suffix from 1 upwards is used instead.
    pub fn assign_or_reuse(&mut self, pii_type: PiiType, original: &str) -> String {
        if let Some(token) = self.token_for(pii_type, original) {
            return token.to_string();
        }

        let mut next = match self.highest_suffix(pii_type).checked_add(1) {
            Some(next) => next,
            None => {
                warn!(pii_type = %pii_type, "Placeholder suffixes exhausted, reusing free low suffix");
                1
            }
        };
        let mut token = placeholder::format(pii_type, next);
        while self.entries.contains_key(&token) {
            next = next.checked_add(1).unwrap_or(1);
            token = placeholder::format(pii_type, next);
        }

        self.entries.insert(
            token.clone(),
            RedactionEntry {
                pii_type,
                original: original.to_string(),
            },
        );
        token
    }

    /// Existing token for a `(type, original)` pair
    pub fn token_for(&self, pii_type: PiiType, original: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.pii_type == pii_type && e.original == original)
            .map(|(token, _)| token.as_str())
    }

    fn highest_suffix(&self, pii_type: PiiType) -> u64 {
        let label = pii_type.as_str();
        self.entries
            .keys()
            .filter_map(|token| placeholder::parse(token).ok())
            .filter(|(l, _)| *l == label)
            .map(|(_, n)| n)
            .max()
            .unwrap_or(0)
    }

    pub fn get(&self, token: &str) -> Option<&RedactionEntry> {
        self.entries.get(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RedactionEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy entries from `other` whose tokens are not yet present.
    ///
    /// Existing tokens are never overwritten. Returns the number of entries
    /// copied.
    pub fn merge_missing(&mut self, other: &RedactionMap) -> usize {
        let mut copied = 0;
        for (token, entry) in &other.entries {
            if !self.entries.contains_key(token) {
                self.entries.insert(token.clone(), entry.clone());
                copied += 1;
            }
        }
        copied
    }
}

impl FromIterator<(String, RedactionEntry)> for RedactionMap {
    fn from_iter<I: IntoIterator<Item = (String, RedactionEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
