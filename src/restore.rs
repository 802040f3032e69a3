//! Inverse pass: find placeholder tokens in rendered text and turn them back
//! into chips carrying the original value.
//!
//! Rendered content arrives as a list of text fragments (one per text node).
//! Fragments that are already chips from an earlier pass are passed through
//! untouched, so restoration can run any number of times over its own output.

use crate::detection::PiiType;
use crate::exclusion::{ExclusionList, ExclusionMatcher};
use crate::redaction::{placeholder, RedactionMap};
use serde::{Deserialize, Serialize};

/// Protection state of a restored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiStatus {
    Protected,
    Excluded,
}

impl PiiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiStatus::Protected => "protected",
            PiiStatus::Excluded => "excluded",
        }
    }
}

/// A restored placeholder, displayed in place of the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chip {
    pub placeholder: String,
    pub original_value: String,
    pub pii_type: PiiType,
    pub is_excluded: bool,
}

impl Chip {
    pub fn status(&self) -> PiiStatus {
        if self.is_excluded {
            PiiStatus::Excluded
        } else {
            PiiStatus::Protected
        }
    }

    /// Flip the chip's exclusion state and record it in `exclusions`.
    ///
    /// Excluding adds the normalized original value. Including removes every
    /// entry the matcher treats as equal to it, so a fuzzy match cannot keep
    /// the value excluded. The redaction map is never touched.
    pub fn toggle_exclusion(
        &mut self,
        exclusions: &mut ExclusionList,
        matcher: &ExclusionMatcher,
    ) -> PiiStatus {
        if self.is_excluded {
            exclusions.remove_matching(&self.original_value, matcher);
            self.is_excluded = false;
        } else {
            exclusions.add(&self.original_value);
            self.is_excluded = true;
        }
        self.status()
    }
}

/// One piece of restored output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Text { text: String },
    Chip(Chip),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    pub fn as_chip(&self) -> Option<&Chip> {
        match self {
            Node::Chip(chip) => Some(chip),
            Node::Text { .. } => None,
        }
    }
}

/// Restored output for a single input fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestoredFragment {
    pub nodes: Vec<Node>,
}

impl RestoredFragment {
    pub fn has_chips(&self) -> bool {
        self.nodes.iter().any(|n| n.as_chip().is_some())
    }

    pub fn chips(&self) -> impl Iterator<Item = &Chip> {
        self.nodes.iter().filter_map(Node::as_chip)
    }

    /// Display text with every chip replaced by its original value
    pub fn render_plain(&self) -> String {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Text { text } => text.as_str(),
                Node::Chip(chip) => chip.original_value.as_str(),
            })
            .collect()
    }

    /// Text as it was before restoration, with chips turned back into tokens
    pub fn render_redacted(&self) -> String {
        self.nodes
            .iter()
            .map(|node| match node {
                Node::Text { text } => text.as_str(),
                Node::Chip(chip) => chip.placeholder.as_str(),
            })
            .collect()
    }
}

/// Walks rendered fragments and restores tokens known to a redaction map
pub struct Restorer<'a> {
    map: &'a RedactionMap,
    exclusions: &'a ExclusionList,
    matcher: &'a ExclusionMatcher,
}

impl<'a> Restorer<'a> {
    pub fn new(
        map: &'a RedactionMap,
        exclusions: &'a ExclusionList,
        matcher: &'a ExclusionMatcher,
    ) -> Self {
        Self {
            map,
            exclusions,
            matcher,
        }
    }

    /// Restore every fragment independently
    pub fn restore(&self, fragments: &[Node]) -> Vec<RestoredFragment> {
        fragments.iter().map(|f| self.restore_fragment(f)).collect()
    }

    /// Restore one fragment.
    ///
    /// Chips are returned as-is. Text is split into literal runs and chips;
    /// concatenating the literal runs and chip placeholders yields the input.
    pub fn restore_fragment(&self, fragment: &Node) -> RestoredFragment {
        let text = match fragment {
            Node::Chip(_) => {
                return RestoredFragment {
                    nodes: vec![fragment.clone()],
                }
            }
            Node::Text { text } => text,
        };

        let mut nodes = Vec::new();
        let mut last_end = 0;

        for m in placeholder::find_all(text) {
            let Some(entry) = self.map.get(m.token) else {
                continue;
            };

            if m.start > last_end {
                nodes.push(Node::text(&text[last_end..m.start]));
            }
            nodes.push(Node::Chip(Chip {
                placeholder: m.token.to_string(),
                original_value: entry.original.clone(),
                pii_type: entry.pii_type,
                is_excluded: self.matcher.is_excluded(&entry.original, self.exclusions),
            }));
            last_end = m.end;
        }

        if last_end < text.len() || nodes.is_empty() {
            nodes.push(Node::text(&text[last_end..]));
        }

        RestoredFragment { nodes }
    }

    /// Restore a flat node sequence, such as the output of an earlier pass
    pub fn restore_nodes(&self, nodes: &[Node]) -> Vec<Node> {
        self.restore(nodes)
            .into_iter()
            .flat_map(|f| f.nodes)
            .collect()
    }
}

/// Restore with the default exclusion matcher
pub fn restore(
    fragments: &[Node],
    map: &RedactionMap,
    exclusions: &ExclusionList,
) -> Vec<RestoredFragment> {
    let matcher = ExclusionMatcher::default();
    Restorer::new(map, exclusions, &matcher).restore(fragments)
}

/// Set the status of every chip with `placeholder` in place.
///
/// Returns the number of chips updated.
pub fn update_chip_status(nodes: &mut [Node], placeholder: &str, status: PiiStatus) -> usize {
    let mut updated = 0;
    for node in nodes.iter_mut() {
        if let Node::Chip(chip) = node {
            if chip.placeholder == placeholder {
                chip.is_excluded = status == PiiStatus::Excluded;
                updated += 1;
            }
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::RedactionEntry;

    fn map() -> RedactionMap {
        vec![
            (
                "[EMAIL_1]".to_string(),
                RedactionEntry {
                    pii_type: PiiType::Email,
                    original: "jane@example.com".to_string(),
                },
            ),
            (
                "[NAME_1]".to_string(),
                RedactionEntry {
                    pii_type: PiiType::Name,
                    original: "Jane Doe".to_string(),
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_restores_token_with_oversized_suffix() {
        let map: RedactionMap = vec![(
            "[EMAIL_99999999999999999999]".to_string(),
            RedactionEntry {
                pii_type: PiiType::Email,
                original: "big@example.com".to_string(),
            },
        )]
        .into_iter()
        .collect();

        let restored = restore(
            &[Node::text("x [EMAIL_99999999999999999999]")],
            &map,
            &ExclusionList::new(),
        );
        assert_eq!(restored[0].chips().count(), 1);
        assert_eq!(restored[0].render_plain(), "x big@example.com");
    }

    #[test]
    fn test_restores_known_tokens() {
        let map = map();
        let restored = restore(
            &[Node::text("Hi [NAME_1], mail [EMAIL_1].")],
            &map,
            &ExclusionList::new(),
        );
        assert_eq!(restored.len(), 1);
        let fragment = &restored[0];
        assert_eq!(fragment.nodes.len(), 5);
        assert_eq!(fragment.render_plain(), "Hi Jane Doe, mail jane@example.com.");
        assert_eq!(fragment.render_redacted(), "Hi [NAME_1], mail [EMAIL_1].");
        let chips: Vec<_> = fragment.chips().collect();
        assert_eq!(chips[0].pii_type, PiiType::Name);
        assert_eq!(chips[0].status(), PiiStatus::Protected);
    }

    #[test]
    fn test_unknown_and_foreign_brackets_stay_literal() {
        let map = map();
        let input = "See [NOT_A_TOKEN] and [EMAIL_9] here";
        let restored = restore(&[Node::text(input)], &map, &ExclusionList::new());
        assert_eq!(restored[0].nodes, vec![Node::text(input)]);
        assert!(!restored[0].has_chips());
    }

    #[test]
    fn test_token_only_fragment() {
        let map = map();
        let restored = restore(&[Node::text("[EMAIL_1]")], &map, &ExclusionList::new());
        assert_eq!(restored[0].nodes.len(), 1);
        assert!(restored[0].has_chips());
    }

    #[test]
    fn test_empty_fragment_is_kept() {
        let restored = restore(&[Node::text("")], &map(), &ExclusionList::new());
        assert_eq!(restored[0].nodes, vec![Node::text("")]);
    }

    #[test]
    fn test_live_exclusion_status() {
        let map = map();
        let exclusions: ExclusionList = vec!["jane  doe".to_string()].into();
        let restored = restore(&[Node::text("[NAME_1]")], &map, &exclusions);
        let chip = restored[0].chips().next().unwrap();
        assert!(chip.is_excluded);
        assert_eq!(chip.status(), PiiStatus::Excluded);
    }

    #[test]
    fn test_rerun_over_output_is_idempotent() {
        let map = map();
        let exclusions = ExclusionList::new();
        let matcher = ExclusionMatcher::default();
        let restorer = Restorer::new(&map, &exclusions, &matcher);

        let first = restorer.restore_nodes(&[Node::text("a [EMAIL_1] b"), Node::text("[NAME_1]")]);
        let second = restorer.restore_nodes(&first);
        assert_eq!(first, second);
    }

    #[test]
    fn test_chip_fragments_are_not_rescanned() {
        let map = map();
        let chip = Chip {
            placeholder: "[EMAIL_1]".to_string(),
            original_value: "contains [NAME_1] literally".to_string(),
            pii_type: PiiType::Email,
            is_excluded: false,
        };
        let restored = restore(&[Node::Chip(chip.clone())], &map, &ExclusionList::new());
        assert_eq!(restored[0].nodes, vec![Node::Chip(chip)]);
    }

    #[test]
    fn test_toggle_updates_exclusions_not_map() {
        let map = map();
        let mut exclusions = ExclusionList::new();
        let matcher = ExclusionMatcher::default();
        let restored = restore(&[Node::text("[NAME_1]")], &map, &exclusions);
        let mut chip = restored[0].chips().next().unwrap().clone();

        assert_eq!(chip.toggle_exclusion(&mut exclusions, &matcher), PiiStatus::Excluded);
        assert!(exclusions.contains("jane doe"));

        assert_eq!(chip.toggle_exclusion(&mut exclusions, &matcher), PiiStatus::Protected);
        assert!(exclusions.is_empty());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_update_chip_status_in_place() {
        let map = map();
        let mut nodes = restore(
            &[Node::text("[EMAIL_1] [EMAIL_1] [NAME_1]")],
            &map,
            &ExclusionList::new(),
        )
        .remove(0)
        .nodes;

        assert_eq!(update_chip_status(&mut nodes, "[EMAIL_1]", PiiStatus::Excluded), 2);
        let excluded = nodes
            .iter()
            .filter_map(Node::as_chip)
            .filter(|c| c.is_excluded)
            .count();
        assert_eq!(excluded, 2);
    }
}
