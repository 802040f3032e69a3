//! Conversation identity derived from the chat page URL.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Storage suffix used for conversations whose id is not known yet
pub const PENDING: &str = "pending";

/// Chat platforms supported out of the box
pub const DEFAULT_SUPPORTED_DOMAINS: &[&str] = &["chatgpt.com", "chat.openai.com"];

/// Identifier of a chat conversation.
///
/// A new chat has no id until the platform assigns one, so data is first
/// recorded under `Pending` and migrated once the id becomes `Known`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConversationId {
    #[default]
    Pending,
    Known(String),
}

impl ConversationId {
    /// Parse the conversation id from a page URL (`.../c/<id>`).
    pub fn from_url(url: &str) -> Self {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"(?i)/c/([a-f0-9-]+)").expect("Invalid chat id regex"));

        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| ConversationId::from(m.as_str().to_string()))
            .unwrap_or(ConversationId::Pending)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ConversationId::Pending)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConversationId::Pending => PENDING,
            ConversationId::Known(id) => id,
        }
    }

    /// Storage key of this conversation's redaction map
    pub fn redactions_key(&self) -> String {
        format!("chat_{}", self.as_str())
    }

    /// Storage key of this conversation's exclusion list
    pub fn exclusions_key(&self) -> String {
        format!("excludedPII_{}", self.as_str())
    }

    /// Whether moving from `self` to `next` carries data with it.
    ///
    /// Only `Pending -> Known` does; every other change is plain navigation.
    pub fn migrates_to(&self, next: &ConversationId) -> bool {
        self.is_pending() && !next.is_pending()
    }
}

impl From<String> for ConversationId {
    fn from(id: String) -> Self {
        let trimmed = id.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(PENDING) {
            ConversationId::Pending
        } else {
            ConversationId::Known(trimmed.to_string())
        }
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.as_str().to_string()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `url` belongs to one of the supported chat platforms.
///
/// Unparsable URLs are not supported.
pub fn is_supported_platform_url<S: AsRef<str>>(url: &str, domains: &[S]) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| domains.iter().any(|d| host.eq_ignore_ascii_case(d.as_ref())))
            .unwrap_or(false),
        Err(_) => false,
    }
}
