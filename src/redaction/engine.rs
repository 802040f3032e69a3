//! Forward pass: raw text to redacted text plus an updated redaction map.

use super::RedactionMap;
use crate::detection::{CompositeDetector, Detector, PiiSpan};
use crate::exclusion::{ExclusionList, ExclusionMatcher};
use serde::Serialize;
use tracing::debug;

/// Output of a single redaction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedactionResult {
    /// Spans that were actually replaced (excluded spans are not reported)
    pub detected_pii: Vec<PiiSpan>,
    /// The input map plus every token allocated during this pass
    pub redaction_map: RedactionMap,
    pub redacted_text: String,
}

/// Orchestrates detection, exclusion filtering and token assignment
pub struct RedactionEngine {
    detector: Box<dyn Detector>,
    matcher: ExclusionMatcher,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::new(Box::new(CompositeDetector::default()), ExclusionMatcher::default())
    }
}

impl RedactionEngine {
    pub fn new(detector: Box<dyn Detector>, matcher: ExclusionMatcher) -> Self {
        Self { detector, matcher }
    }

    pub fn matcher(&self) -> &ExclusionMatcher {
        &self.matcher
    }

    /// Redact `text` against an existing map and exclusion list.
    ///
    /// `existing` is not modified; the returned map contains its entries plus
    /// any new allocations. The output is rebuilt in one left-to-right scan, so
    /// token lengths never disturb the offsets of later spans.
    pub fn redact(
        &self,
        text: &str,
        existing: &RedactionMap,
        exclusions: &ExclusionList,
    ) -> RedactionResult {
        let mut redaction_map = existing.clone();
        let mut detected_pii = Vec::new();
        let mut redacted_text = String::with_capacity(text.len());
        let mut last_end = 0;

        for span in self.detector.detect(text) {
            if !is_valid_span(text, &span, last_end) {
                debug!(
                    detector = self.detector.name(),
                    index = span.index,
                    "Skipping span that does not match the source text"
                );
                continue;
            }

            if self.matcher.is_excluded(&span.value, exclusions) {
                debug!(pii_type = %span.pii_type, index = span.index, "Span excluded by user");
                continue;
            }

            let token = redaction_map.assign_or_reuse(span.pii_type, &span.value);
            redacted_text.push_str(&text[last_end..span.index]);
            redacted_text.push_str(&token);
            last_end = span.end();
            detected_pii.push(span);
        }

        redacted_text.push_str(&text[last_end..]);

        debug!(
            redacted = detected_pii.len(),
            map_entries = redaction_map.len(),
            "Redaction pass complete"
        );

        RedactionResult {
            detected_pii,
            redaction_map,
            redacted_text,
        }
    }
}

/// A span must point at its own value, in order, on char boundaries.
fn is_valid_span(text: &str, span: &PiiSpan, last_end: usize) -> bool {
    let end = span.end();
    span.index >= last_end
        && !span.value.is_empty()
        && end <= text.len()
        && text.is_char_boundary(span.index)
        && text.is_char_boundary(end)
        && text[span.index..end] == span.value
}
