//! JSON file store, used by the command-line front end.
//!
//! The whole store is one JSON object. Every write replaces the file through
//! a temporary sibling and a rename.

use super::KeyValueStore;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document; a missing file is an empty store and a
    /// corrupt one is ignored with a warning.
    async fn read_all(&self) -> Result<Map<String, Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => {
                warn!(path = %self.path.display(), "Store file is not a JSON object, starting empty");
                Ok(Map::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Store file is corrupt, starting empty");
                Ok(Map::new())
            }
        }
    }

    async fn write_all(&self, values: Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(&Value::Object(values))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value);
        self.write_all(values).await
    }

    async fn remove(&self, keys: &[String]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        let before = values.len();
        for key in keys {
            values.remove(key);
        }
        if values.len() == before {
            return Ok(());
        }
        self.write_all(values).await
    }
}
