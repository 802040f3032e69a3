//! PromptGuard: local PII protection for chat prompts.
//!
//! Provides reversible redaction of personal data before a prompt leaves the
//! machine, and restoration of the original values when the conversation is
//! rendered again:
//! - Pluggable PII detection (patterns and keyword lists)
//! - Stable `[TYPE_N]` placeholder tokens per conversation
//! - Fuzzy, user-controlled exclusions
//! - Restoration of tokens in fragmented rendered text
//! - Pending-to-known conversation migration

pub mod conversation;
pub mod debounce;
pub mod detection;
pub mod error;
pub mod exclusion;
pub mod redaction;
pub mod restore;
pub mod storage;

pub use conversation::{is_supported_platform_url, ConversationId};
pub use detection::{Detector, PiiSpan, PiiType};
pub use error::{Error, Result};
pub use exclusion::{ExclusionList, ExclusionMatcher};
pub use redaction::{RedactionEngine, RedactionMap, RedactionResult};
pub use restore::{Chip, Node, PiiStatus, RestoredFragment};
pub use storage::{ConversationStorage, KeyValueStore, MigrationOutcome};

use conversation::DEFAULT_SUPPORTED_DOMAINS;
use debounce::Debouncer;
use detection::{CompositeDetector, KeywordDetector, PatternDetector};
use restore::Restorer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Whether the guard protects prompts on the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionStatus {
    /// Prompts are redacted before submission
    #[default]
    Enabled,
    /// The user switched protection off
    Disabled,
    /// The current page is not a supported chat platform
    Unsupported,
}

impl ExtensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Enabled => "enabled",
            ExtensionStatus::Disabled => "disabled",
            ExtensionStatus::Unsupported => "unsupported",
        }
    }

    /// Parse a status the user may choose. `unsupported` is derived from the
    /// page URL and is rejected.
    pub fn parse_setting(s: &str) -> Result<Self> {
        match s.parse::<ExtensionStatus>()? {
            ExtensionStatus::Unsupported => Err(Error::InvalidConfig(
                "status 'unsupported' is derived from the page URL and cannot be set".to_string(),
            )),
            status => Ok(status),
        }
    }
}

impl std::str::FromStr for ExtensionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "enabled" => Ok(ExtensionStatus::Enabled),
            "disabled" => Ok(ExtensionStatus::Disabled),
            "unsupported" => Ok(ExtensionStatus::Unsupported),
            _ => Err(Error::InvalidConfig(format!("unknown extension status '{}'", s))),
        }
    }
}

/// JSON-serializable configuration for the guard
///
/// Field names use kebab-case to match typical YAML/JSON config style.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GuardConfigJson {
    /// Status used when none has been stored: "enabled" or "disabled"
    #[serde(default = "default_status")]
    pub status: String,
    /// Quiet period before a restoration pass runs, in milliseconds
    #[serde(default = "default_restore_debounce_ms")]
    pub restore_debounce_ms: u64,
    /// Hostnames of supported chat platforms
    #[serde(default = "default_supported_domains")]
    pub supported_domains: Vec<String>,
    /// PII types that are never detected
    #[serde(default)]
    pub disabled_types: Vec<String>,
    /// Terms to detect per PII type, e.g. {"NAME": ["Jane Doe"]}
    #[serde(default)]
    pub keywords: HashMap<String, Vec<String>>,
}

fn default_status() -> String {
    "enabled".to_string()
}

fn default_restore_debounce_ms() -> u64 {
    300
}

fn default_supported_domains() -> Vec<String> {
    DEFAULT_SUPPORTED_DOMAINS
        .iter()
        .map(|d| d.to_string())
        .collect()
}

impl Default for GuardConfigJson {
    fn default() -> Self {
        Self {
            status: default_status(),
            restore_debounce_ms: default_restore_debounce_ms(),
            supported_domains: default_supported_domains(),
            disabled_types: Vec::new(),
            keywords: HashMap::new(),
        }
    }
}

impl From<GuardConfigJson> for GuardConfig {
    fn from(json: GuardConfigJson) -> Self {
        let status = ExtensionStatus::parse_setting(&json.status).unwrap_or_else(|e| {
            warn!("{}, defaulting to 'enabled'", e);
            ExtensionStatus::Enabled
        });

        let disabled_types = json
            .disabled_types
            .iter()
            .filter_map(|t| match t.parse::<PiiType>() {
                Ok(pii_type) => Some(pii_type),
                Err(e) => {
                    warn!("{}, ignoring", e);
                    None
                }
            })
            .collect();

        let keywords = json
            .keywords
            .into_iter()
            .filter_map(|(t, terms)| match t.parse::<PiiType>() {
                Ok(pii_type) => Some((pii_type, terms)),
                Err(e) => {
                    warn!("{}, ignoring keyword list", e);
                    None
                }
            })
            .collect();

        Self {
            status,
            restore_debounce: Duration::from_millis(json.restore_debounce_ms),
            supported_domains: json.supported_domains,
            disabled_types,
            keywords,
        }
    }
}

/// Configuration for the guard
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Status used when none has been stored
    pub status: ExtensionStatus,
    /// Quiet period before a restoration pass runs
    pub restore_debounce: Duration,
    /// Hostnames of supported chat platforms
    pub supported_domains: Vec<String>,
    /// PII types that are never detected
    pub disabled_types: Vec<PiiType>,
    /// Terms to detect per PII type
    pub keywords: HashMap<PiiType, Vec<String>>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfigJson::default().into()
    }
}

impl GuardConfig {
    /// Build the redaction engine described by this configuration
    pub fn build_engine(&self) -> RedactionEngine {
        let keywords: HashMap<PiiType, Vec<String>> = self
            .keywords
            .iter()
            .filter(|(t, _)| !self.disabled_types.contains(t))
            .map(|(t, terms)| (*t, terms.clone()))
            .collect();

        let mut detector =
            CompositeDetector::new(vec![Box::new(PatternDetector::without(&self.disabled_types))]);
        let keyword_detector = KeywordDetector::new(&keywords);
        if !keyword_detector.is_empty() {
            detector = detector.with(Box::new(keyword_detector));
        }

        RedactionEngine::new(Box::new(detector), ExclusionMatcher::default())
    }
}

/// Result of submitting a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    /// Text to send in place of the prompt
    pub text: String,
    /// Spans replaced by placeholders
    pub detected_pii: Vec<PiiSpan>,
    /// Message for the user, if anything was protected
    pub notification: Option<String>,
}

impl SubmitOutcome {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            detected_pii: Vec::new(),
            notification: None,
        }
    }
}

/// What is known about the page the guard is attached to
#[derive(Debug, Clone)]
struct PageState {
    conversation: ConversationId,
    supported: bool,
}

/// Coordinates detection, storage and restoration for one chat page
pub struct PromptGuard {
    config: RwLock<GuardConfig>,
    engine: RwLock<Arc<RedactionEngine>>,
    storage: ConversationStorage,
    page: RwLock<PageState>,
    debouncer: RwLock<Arc<Debouncer>>,
}

impl PromptGuard {
    /// Create a guard over the given store
    pub fn new(config: GuardConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            engine: RwLock::new(Arc::new(config.build_engine())),
            storage: ConversationStorage::new(store),
            page: RwLock::new(PageState {
                conversation: ConversationId::Pending,
                supported: true,
            }),
            debouncer: RwLock::new(Arc::new(Debouncer::new(config.restore_debounce))),
            config: RwLock::new(config),
        }
    }

    /// Reconfigure the guard with new settings
    pub async fn reconfigure(&self, config: GuardConfig) {
        info!("Reconfiguring PromptGuard");

        {
            let mut engine = self.engine.write().await;
            *engine = Arc::new(config.build_engine());
        }

        // A new quiet period replaces the debouncer and drops its pending pass
        let replaced = {
            let mut debouncer = self.debouncer.write().await;
            if debouncer.delay() == config.restore_debounce {
                None
            } else {
                Some(std::mem::replace(
                    &mut *debouncer,
                    Arc::new(Debouncer::new(config.restore_debounce)),
                ))
            }
        };
        if let Some(previous) = replaced {
            previous.cancel().await;
        }

        {
            let mut current = self.config.write().await;
            *current = config;
        }

        debug!("PromptGuard reconfigured successfully");
    }

    /// Apply a JSON configuration document; invalid documents fall back to
    /// defaults
    pub async fn configure_json(&self, value: serde_json::Value) {
        let json_config: GuardConfigJson = match serde_json::from_value(value) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "Failed to parse configuration, using defaults");
                GuardConfigJson::default()
            }
        };
        self.reconfigure(json_config.into()).await;
    }

    pub fn storage(&self) -> &ConversationStorage {
        &self.storage
    }

    pub async fn conversation(&self) -> ConversationId {
        self.page.read().await.conversation.clone()
    }

    /// Record a navigation to `url`.
    ///
    /// A URL revealing a conversation id pulls any pending data into it (once,
    /// never overwriting existing data).
    pub async fn navigate(&self, url: &str) -> ConversationId {
        let next = ConversationId::from_url(url);
        let supported = {
            let config = self.config.read().await;
            is_supported_platform_url(url, &config.supported_domains)
        };

        {
            let mut page = self.page.write().await;
            page.conversation = next.clone();
            page.supported = supported;
        }
        debug!(conversation = %next, supported = supported, "Navigated");

        if !next.is_pending() {
            match self
                .storage
                .migrate_conversation(&ConversationId::Pending, &next)
                .await
            {
                Ok(MigrationOutcome::Migrated) => {
                    info!(conversation = %next, "Pending redactions moved to conversation")
                }
                Ok(outcome) => debug!(?outcome, "No pending migration"),
                Err(e) => warn!(error = %e, "Pending migration failed"),
            }
        }

        next
    }

    /// Effective status on the current page
    pub async fn status(&self) -> ExtensionStatus {
        if !self.page.read().await.supported {
            return ExtensionStatus::Unsupported;
        }
        match self.storage.load_status().await {
            Some(status) => status,
            None => self.config.read().await.status,
        }
    }

    /// Persist the user's status choice
    pub async fn set_status(&self, status: ExtensionStatus) {
        if let Err(e) = self.storage.save_status(status).await {
            warn!(error = %e, "Failed to save extension status");
        }
        info!(status = status.as_str(), "Extension status changed");
    }

    pub async fn redaction_map(&self) -> RedactionMap {
        let id = self.conversation().await;
        self.storage.load_redaction_map(&id).await
    }

    pub async fn exclusion_list(&self) -> ExclusionList {
        let id = self.conversation().await;
        self.storage.load_exclusion_list(&id).await
    }

    /// Redact a prompt before it is submitted.
    ///
    /// Returns the text unchanged when protection is not enabled or the
    /// prompt is blank. The updated map is saved for the current
    /// conversation.
    pub async fn submit_prompt(&self, text: &str) -> SubmitOutcome {
        let status = self.status().await;
        if status != ExtensionStatus::Enabled {
            debug!(status = status.as_str(), "Protection inactive, prompt unchanged");
            return SubmitOutcome::unchanged(text);
        }
        if text.trim().is_empty() {
            return SubmitOutcome::unchanged(text);
        }

        let id = self.conversation().await;
        let (map, exclusions) = tokio::join!(
            self.storage.load_redaction_map(&id),
            self.storage.load_exclusion_list(&id)
        );

        let engine = self.engine.read().await.clone();
        let result = engine.redact(text, &map, &exclusions);

        if result.redaction_map != map {
            if let Err(e) = self
                .storage
                .save_redaction_map(&id, &result.redaction_map)
                .await
            {
                warn!(conversation = %id, error = %e, "Failed to save redactions");
            }
        }

        let count = result.detected_pii.len();
        let notification = if count > 0 {
            info!(conversation = %id, count = count, "Protected personal data");
            Some(format!("Protected {} personal data item(s).", count))
        } else {
            None
        };

        SubmitOutcome {
            text: result.redacted_text,
            detected_pii: result.detected_pii,
            notification,
        }
    }

    /// Restore placeholder tokens in rendered fragments.
    ///
    /// With an empty map every fragment is returned as-is.
    pub async fn restore(&self, fragments: &[Node]) -> Vec<RestoredFragment> {
        let id = self.conversation().await;
        let (map, exclusions) = tokio::join!(
            self.storage.load_redaction_map(&id),
            self.storage.load_exclusion_list(&id)
        );

        if map.is_empty() {
            return fragments
                .iter()
                .map(|f| RestoredFragment {
                    nodes: vec![f.clone()],
                })
                .collect();
        }

        let engine = self.engine.read().await.clone();
        let restored = Restorer::new(&map, &exclusions, engine.matcher()).restore(fragments);
        debug!(
            fragments = fragments.len(),
            chips = restored.iter().map(|f| f.chips().count()).sum::<usize>(),
            "Restoration pass complete"
        );
        restored
    }

    /// Schedule a debounced restoration pass over `fragments`.
    ///
    /// `on_restored` runs with the result once the quiet period has passed
    /// without another call. Superseded passes never call it.
    pub async fn schedule_restore<F>(self: &Arc<Self>, fragments: Vec<Node>, on_restored: F)
    where
        F: FnOnce(Vec<RestoredFragment>) + Send + 'static,
    {
        let guard = Arc::clone(self);
        let debouncer = self.debouncer.read().await.clone();
        debouncer
            .trigger(move || async move {
                let restored = guard.restore(&fragments).await;
                on_restored(restored);
            })
            .await;
    }

    /// Wait for a scheduled restoration pass to finish
    pub async fn flush_restore(&self) {
        let debouncer = self.debouncer.read().await.clone();
        debouncer.flush().await;
    }

    /// Exclude or include a value for the current conversation.
    ///
    /// Returns the notification to show the user.
    pub async fn set_excluded(&self, value: &str, excluded: bool) -> String {
        let id = self.conversation().await;
        let mut exclusions = self.storage.load_exclusion_list(&id).await;

        if excluded {
            exclusions.add(value);
        } else {
            let engine = self.engine.read().await.clone();
            exclusions.remove_matching(value, engine.matcher());
        }

        if let Err(e) = self.storage.save_exclusion_list(&id, &exclusions).await {
            warn!(conversation = %id, error = %e, "Failed to save exclusions");
        }
        exclusion_notification(value, excluded)
    }

    /// Flip a restored chip between protected and excluded.
    ///
    /// Updates the stored exclusion list and the chip itself; the redaction
    /// map is not changed.
    pub async fn toggle_chip(&self, chip: &mut Chip) -> String {
        let id = self.conversation().await;
        let mut exclusions = self.storage.load_exclusion_list(&id).await;
        let engine = self.engine.read().await.clone();

        let status = chip.toggle_exclusion(&mut exclusions, engine.matcher());
        if let Err(e) = self.storage.save_exclusion_list(&id, &exclusions).await {
            warn!(conversation = %id, error = %e, "Failed to save exclusions");
        }
        debug!(placeholder = %chip.placeholder, status = status.as_str(), "Chip toggled");

        exclusion_notification(&chip.original_value, status == PiiStatus::Excluded)
    }
}

fn exclusion_notification(value: &str, excluded: bool) -> String {
    if excluded {
        format!("\"{}\" excluded from protection.", value)
    } else {
        format!("\"{}\" included in protection.", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();
        assert_eq!(config.status, ExtensionStatus::Enabled);
        assert_eq!(config.restore_debounce, Duration::from_millis(300));
        assert_eq!(config.supported_domains, vec!["chatgpt.com", "chat.openai.com"]);
        assert!(config.disabled_types.is_empty());
    }

    #[test]
    fn test_extension_status_from_str() {
        assert_eq!(
            "enabled".parse::<ExtensionStatus>().unwrap(),
            ExtensionStatus::Enabled
        );
        assert_eq!(
            "DISABLED".parse::<ExtensionStatus>().unwrap(),
            ExtensionStatus::Disabled
        );
        assert!("paused".parse::<ExtensionStatus>().is_err());
    }

    #[test]
    fn test_status_setting_rejects_unsupported() {
        assert_eq!(
            ExtensionStatus::parse_setting("Disabled").unwrap(),
            ExtensionStatus::Disabled
        );
        assert!(matches!(
            ExtensionStatus::parse_setting("unsupported"),
            Err(Error::InvalidConfig(_))
        ));

        let json = GuardConfigJson {
            status: "unsupported".to_string(),
            ..GuardConfigJson::default()
        };
        let config: GuardConfig = json.into();
        assert_eq!(config.status, ExtensionStatus::Enabled);
    }

    #[test]
    fn test_config_json_parsing() {
        let json = serde_json::json!({
            "status": "disabled",
            "restore-debounce-ms": 50,
            "disabled-types": ["ip-address", "bogus"],
            "keywords": {"NAME": ["Jane Doe"], "PLANET": ["Mars"]}
        });
        let parsed: GuardConfigJson = serde_json::from_value(json).unwrap();
        let config: GuardConfig = parsed.into();
        assert_eq!(config.status, ExtensionStatus::Disabled);
        assert_eq!(config.restore_debounce, Duration::from_millis(50));
        assert_eq!(config.disabled_types, vec![PiiType::IpAddress]);
        assert_eq!(config.keywords.len(), 1);
        assert_eq!(config.supported_domains.len(), 2);
    }

    #[test]
    fn test_engine_honors_disabled_types_and_keywords() {
        let mut config = GuardConfig::default();
        config.disabled_types = vec![PiiType::Email];
        config
            .keywords
            .insert(PiiType::Name, vec!["Jane Doe".to_string()]);
        let engine = config.build_engine();

        let result = engine.redact(
            "Jane Doe <jane@example.com>",
            &RedactionMap::new(),
            &ExclusionList::new(),
        );
        assert_eq!(result.redacted_text, "[NAME_1] <jane@example.com>");
    }

    #[test]
    fn test_notifications() {
        assert_eq!(
            exclusion_notification("Bob", true),
            "\"Bob\" excluded from protection."
        );
        assert_eq!(
            exclusion_notification("Bob", false),
            "\"Bob\" included in protection."
        );
    }

    #[tokio::test]
    async fn test_unsupported_page_disables_protection() {
        let guard = PromptGuard::new(GuardConfig::default(), Arc::new(MemoryStore::new()));
        guard.navigate("https://example.com/c/abc").await;
        assert_eq!(guard.status().await, ExtensionStatus::Unsupported);

        let outcome = guard.submit_prompt("mail a@b.io").await;
        assert_eq!(outcome.text, "mail a@b.io");
        assert!(outcome.notification.is_none());
    }

    #[tokio::test]
    async fn test_configure_json_falls_back_to_defaults() {
        let guard = PromptGuard::new(GuardConfig::default(), Arc::new(MemoryStore::new()));
        guard
            .configure_json(serde_json::json!({"status": "disabled"}))
            .await;
        assert_eq!(guard.status().await, ExtensionStatus::Disabled);

        guard.configure_json(serde_json::json!({"status": 7})).await;
        assert_eq!(guard.status().await, ExtensionStatus::Enabled);
    }

    fn counting_callback(runs: &Arc<AtomicUsize>) -> impl FnOnce(Vec<RestoredFragment>) + Send + 'static {
        let runs = Arc::clone(runs);
        move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_does_not_wait_for_flush() {
        let guard = Arc::new(PromptGuard::new(
            GuardConfig::default(),
            Arc::new(MemoryStore::new()),
        ));
        let runs = Arc::new(AtomicUsize::new(0));
        guard
            .schedule_restore(vec![Node::text("[EMAIL_1]")], counting_callback(&runs))
            .await;

        let flushing = {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.flush_restore().await })
        };
        tokio::task::yield_now().await;

        let start = tokio::time::Instant::now();
        let config = GuardConfig {
            restore_debounce: Duration::from_millis(1000),
            ..GuardConfig::default()
        };
        guard.reconfigure(config).await;
        assert!(start.elapsed() < Duration::from_millis(300));

        flushing.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_keeps_pending_restore_when_delay_unchanged() {
        let guard = Arc::new(PromptGuard::new(
            GuardConfig::default(),
            Arc::new(MemoryStore::new()),
        ));
        let runs = Arc::new(AtomicUsize::new(0));
        guard
            .schedule_restore(vec![Node::text("[EMAIL_1]")], counting_callback(&runs))
            .await;

        guard.reconfigure(GuardConfig::default()).await;
        guard.flush_restore().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_with_new_delay_drops_pending_restore() {
        let guard = Arc::new(PromptGuard::new(
            GuardConfig::default(),
            Arc::new(MemoryStore::new()),
        ));
        let runs = Arc::new(AtomicUsize::new(0));
        guard
            .schedule_restore(vec![Node::text("[EMAIL_1]")], counting_callback(&runs))
            .await;

        let config = GuardConfig {
            restore_debounce: Duration::from_millis(50),
            ..GuardConfig::default()
        };
        guard.reconfigure(config).await;
        guard.flush_restore().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
