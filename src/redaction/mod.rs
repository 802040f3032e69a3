//! Reversible redaction: placeholder tokens, the per-conversation map and
//! the forward pass that produces redacted prompt text.

pub mod engine;
pub mod map;
pub mod placeholder;

pub use engine::{RedactionEngine, RedactionResult};
pub use map::{RedactionEntry, RedactionMap};
