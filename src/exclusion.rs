//! User-controlled exclusions.
//!
//! Values on a conversation's exclusion list are left untouched by the forward
//! pass and shown as "excluded" during restoration. Matching is case and
//! whitespace insensitive, and tolerates small typos.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Normalize a value for comparison: lower-cased and trimmed.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Normalized set of values the user does not want protected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExclusionList {
    values: BTreeSet<String>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the normalized value. Returns false if it was already present.
    pub fn add(&mut self, value: &str) -> bool {
        let normalized = normalize(value);
        if normalized.is_empty() {
            return false;
        }
        self.values.insert(normalized)
    }

    /// Remove the normalized value. Returns false if it was not present.
    pub fn remove(&mut self, value: &str) -> bool {
        self.values.remove(&normalize(value))
    }

    /// Remove every entry the matcher considers equivalent to `value`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_matching(&mut self, value: &str, matcher: &ExclusionMatcher) -> usize {
        let candidate = normalize(value);
        let before = self.values.len();
        self.values
            .retain(|entry| !matcher.matches_normalized(&candidate, entry));
        before - self.values.len()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&normalize(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for ExclusionList {
    fn from(values: Vec<String>) -> Self {
        let mut list = Self::new();
        for value in &values {
            list.add(value);
        }
        list
    }
}

impl From<ExclusionList> for Vec<String> {
    fn from(list: ExclusionList) -> Self {
        list.values.into_iter().collect()
    }
}

/// Strategy deciding whether two normalized values refer to the same thing
pub trait Similarity: Send + Sync {
    fn is_similar(&self, candidate: &str, entry: &str) -> bool;
}

/// Edit-distance similarity with a length-dependent threshold.
///
/// Candidates shorter than `short_len` characters tolerate `short_max`
/// edits, longer ones tolerate `long_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditDistance {
    pub short_len: usize,
    pub short_max: usize,
    pub long_max: usize,
}

impl Default for EditDistance {
    fn default() -> Self {
        Self {
            short_len: 6,
            short_max: 1,
            long_max: 2,
        }
    }
}

impl EditDistance {
    fn threshold(&self, candidate: &str) -> usize {
        if candidate.chars().count() < self.short_len {
            self.short_max
        } else {
            self.long_max
        }
    }
}

impl Similarity for EditDistance {
    fn is_similar(&self, candidate: &str, entry: &str) -> bool {
        let max = self.threshold(candidate);
        let (a, b) = (candidate.chars().count(), entry.chars().count());
        if a.abs_diff(b) > max {
            return false;
        }
        levenshtein(candidate, entry) <= max
    }
}

/// Levenshtein distance over Unicode scalar values
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
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Decides whether a value is on an exclusion list
#[derive(Clone)]
pub struct ExclusionMatcher {
    similarity: Arc<dyn Similarity>,
}

impl Default for ExclusionMatcher {
    fn default() -> Self {
        Self::new(Arc::new(EditDistance::default()))
    }
}

impl std::fmt::Debug for ExclusionMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusionMatcher").finish_non_exhaustive()
    }
}

impl ExclusionMatcher {
    pub fn new(similarity: Arc<dyn Similarity>) -> Self {
        Self { similarity }
    }

    /// Whether `candidate` matches any entry exactly or within tolerance
    pub fn is_excluded(&self, candidate: &str, list: &ExclusionList) -> bool {
        if list.is_empty() {
            return false;
        }
        let candidate = normalize(candidate);
        list.iter()
            .any(|entry| self.matches_normalized(&candidate, &normalize(entry)))
    }

    fn matches_normalized(&self, candidate: &str, entry: &str) -> bool {
        candidate == entry || self.similarity.is_similar(candidate, entry)
    }
}

/// [`ExclusionMatcher::is_excluded`] with the default edit-distance strategy
pub fn is_excluded(candidate: &str, list: &ExclusionList) -> bool {
    ExclusionMatcher::default().is_excluded(candidate, list)
}
