//! Detection modules for PII in prompt text.
//!
//! Every detector produces spans ordered by ascending index with no
//! overlaps. When candidates overlap, the earliest-starting one wins, then
//! the longest.

pub mod keywords;
pub mod pii;

pub use keywords::KeywordDetector;
pub use pii::{PatternDetector, PiiSpan, PiiType};

use tracing::debug;

/// A source of typed PII spans.
///
/// Implementations must be pure functions of the input text and must never
/// panic: a span that cannot be produced is skipped instead.
pub trait Detector: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Detect PII spans in `text`, ascending by index, non-overlapping
    fn detect(&self, text: &str) -> Vec<PiiSpan>;
}

/// Sort spans and drop the ones overlapping an earlier (or longer) span.
pub fn resolve_overlaps(mut spans: Vec<PiiSpan>) -> Vec<PiiSpan> {
    spans.sort_by(|a, b| {
        a.index
            .cmp(&b.index)
            .then_with(|| b.value.len().cmp(&a.value.len()))
    });

    let mut resolved: Vec<PiiSpan> = Vec::with_capacity(spans.len());
    let mut last_end = 0;

    for span in spans {
        if span.value.is_empty() {
            continue;
        }
        if !resolved.is_empty() && span.index < last_end {
            continue;
        }
        last_end = span.end();
        resolved.push(span);
    }

    resolved
}

/// Runs several detectors over the same text and merges their spans
pub struct CompositeDetector {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for CompositeDetector {
    fn default() -> Self {
        Self::new(vec![Box::new(PatternDetector::new())])
    }
}

impl CompositeDetector {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Add another detector; later detectors lose ties against earlier ones
    pub fn with(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl Detector for CompositeDetector {
    fn name(&self) -> &str {
        "composite"
    }

    fn detect(&self, text: &str) -> Vec<PiiSpan> {
        let mut spans = Vec::new();
        for detector in &self.detectors {
            let found = detector.detect(text);
            debug!(detector = detector.name(), spans = found.len(), "Detector finished");
            spans.extend(found);
        }
        resolve_overlaps(spans)
    }
}
