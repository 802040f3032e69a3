//! Error types for PromptGuard.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by storage backends and configuration parsing.
///
/// None of these are fatal to the host: the guard service logs them and
/// degrades to "not redacted / not restored".
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing a storage file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored or supplied JSON document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration value is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Text does not follow the `[TYPE_N]` placeholder grammar.
    #[error("invalid placeholder token: {0}")]
    InvalidPlaceholder(String),
}
