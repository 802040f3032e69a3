//! Persistence of redaction maps, exclusion lists and the extension status.
//!
//! Backends implement a small JSON key-value interface. [`ConversationStorage`]
//! layers the typed per-conversation operations on top of it and treats
//! missing or corrupt values as empty.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::conversation::ConversationId;
use crate::error::Result;
use crate::exclusion::ExclusionList;
use crate::redaction::RedactionMap;
use crate::ExtensionStatus;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key of the extension status
pub const STATUS_KEY: &str = "status";

/// A JSON key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, keys: &[String]) -> Result<()>;
}

/// Result of moving one conversation's data into another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Data was copied to the destination and removed from the source
    Migrated,
    /// The source had nothing to move
    NothingToMigrate,
    /// The destination already had data; nothing was changed
    DestinationHasData,
    /// Only pending conversations can be migrated into known ones
    NotAllowed,
}

/// Typed per-conversation storage operations
#[derive(Clone)]
pub struct ConversationStorage {
    store: Arc<dyn KeyValueStore>,
}

impl ConversationStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load a conversation's redaction map; missing or corrupt data is empty
    pub async fn load_redaction_map(&self, id: &ConversationId) -> RedactionMap {
        self.load_or_default(&id.redactions_key()).await
    }

    pub async fn save_redaction_map(&self, id: &ConversationId, map: &RedactionMap) -> Result<()> {
        self.save(&id.redactions_key(), map).await
    }

    /// Load a conversation's exclusion list; missing or corrupt data is empty
    pub async fn load_exclusion_list(&self, id: &ConversationId) -> ExclusionList {
        self.load_or_default(&id.exclusions_key()).await
    }

    pub async fn save_exclusion_list(
        &self,
        id: &ConversationId,
        list: &ExclusionList,
    ) -> Result<()> {
        self.save(&id.exclusions_key(), list).await
    }

    /// Stored extension status, if any
    pub async fn load_status(&self) -> Option<ExtensionStatus> {
        match self.store.get(STATUS_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(error = %e, "Ignoring corrupt extension status");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read extension status");
                None
            }
        }
    }

    pub async fn save_status(&self, status: ExtensionStatus) -> Result<()> {
        self.save(STATUS_KEY, &status).await
    }

    /// Move `from`'s map and exclusions into `to`.
    ///
    /// Only `Pending -> Known` is allowed. The copy happens only when `to`
    /// has no data of its own; the source keys are deleted afterwards.
    pub async fn migrate_conversation(
        &self,
        from: &ConversationId,
        to: &ConversationId,
    ) -> Result<MigrationOutcome> {
        if !from.migrates_to(to) {
            return Ok(MigrationOutcome::NotAllowed);
        }

        let map = self.load_redaction_map(from).await;
        let exclusions = self.load_exclusion_list(from).await;
        if map.is_empty() && exclusions.is_empty() {
            return Ok(MigrationOutcome::NothingToMigrate);
        }

        let existing_map = self.load_redaction_map(to).await;
        let existing_exclusions = self.load_exclusion_list(to).await;
        if !existing_map.is_empty() || !existing_exclusions.is_empty() {
            info!(to = %to, "Destination conversation already has data, skipping migration");
            return Ok(MigrationOutcome::DestinationHasData);
        }

        self.save_redaction_map(to, &map).await?;
        self.save_exclusion_list(to, &exclusions).await?;
        self.store
            .remove(&[from.redactions_key(), from.exclusions_key()])
            .await?;

        info!(
            from = %from,
            to = %to,
            redactions = map.len(),
            exclusions = exclusions.len(),
            "Migrated conversation data"
        );
        Ok(MigrationOutcome::Migrated)
    }

    async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.get(key).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(key = key, error = %e, "Ignoring corrupt stored value");
                T::default()
            }),
            Ok(None) => {
                debug!(key = key, "No stored value");
                T::default()
            }
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read stored value");
                T::default()
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(key, value).await
    }
}
