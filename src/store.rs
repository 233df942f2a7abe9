//! Device-local persisted engine state
//!
//! All state lives behind a [`KeyValueStore`] so callers decide where it goes:
//! [`JsonFileStore`] for the real application, [`MemoryStore`] for tests and
//! embedders. [`StateRepository`] layers typed snapshots on top. Each value is
//! read whole at the start of an operation and written back whole at the end.

use crate::models::{ProviderHealth, SelectionRecord};
use crate::Result;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const PREFERRED_PROVIDER_KEY: &str = "iptv_preferred_provider";
pub const FAILED_PROVIDERS_KEY: &str = "iptv_failed_providers";
pub const PROVIDER_HEALTH_KEY: &str = "iptv_provider_health";
pub const PROVIDER_HISTORY_KEY: &str = "iptv_provider_history";

/// Selection history keeps only the most recent entries
pub const HISTORY_CAPACITY: usize = 100;

/// String key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Key-value map persisted as one pretty-printed JSON document
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store, starting empty when the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = if path.exists() {
            fs::read_to_string(&path)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .unwrap_or_else(|| {
                    warn!("Discarding unreadable state file {}", path.display());
                    BTreeMap::new()
                })
        } else {
            BTreeMap::new()
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Typed view over the persisted keys
#[derive(Clone)]
pub struct StateRepository {
    store: Arc<dyn KeyValueStore>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    fn read<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.store.get(key) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Discarding corrupt state under {}: {}", key, e);
                T::default()
            }),
            None => T::default(),
        }
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw)
    }

    pub fn preferred_provider(&self) -> Option<String> {
        self.store
            .get(PREFERRED_PROVIDER_KEY)
            .filter(|id| !id.is_empty())
    }

    pub fn set_preferred_provider(&self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => self.store.set(PREFERRED_PROVIDER_KEY, id),
            None => self.store.remove(PREFERRED_PROVIDER_KEY),
        }
    }

    pub fn failed_providers(&self) -> BTreeSet<String> {
        self.read(FAILED_PROVIDERS_KEY)
    }

    pub fn save_failed_providers(&self, failed: &BTreeSet<String>) -> Result<()> {
        if failed.is_empty() {
            self.store.remove(FAILED_PROVIDERS_KEY)
        } else {
            self.write(FAILED_PROVIDERS_KEY, failed)
        }
    }

    pub fn mark_failed(&self, id: &str) -> Result<()> {
        let mut failed = self.failed_providers();
        if failed.insert(id.to_string()) {
            self.save_failed_providers(&failed)?;
        }
        Ok(())
    }

    pub fn clear_failed(&self, id: &str) -> Result<()> {
        let mut failed = self.failed_providers();
        if failed.remove(id) {
            self.save_failed_providers(&failed)?;
        }
        Ok(())
    }

    pub fn reset_failed_providers(&self) -> Result<()> {
        self.store.remove(FAILED_PROVIDERS_KEY)
    }

    /// Health map with entries older than `retention_ms` pruned
    pub fn health_map(&self, retention_ms: i64, now: i64) -> HashMap<String, ProviderHealth> {
        let mut map: HashMap<String, ProviderHealth> = self.read(PROVIDER_HEALTH_KEY);
        map.retain(|_, h| now - h.last_checked < retention_ms);
        map
    }

    pub fn save_health_map(&self, map: &HashMap<String, ProviderHealth>) -> Result<()> {
        // BTreeMap keeps the stored document stable across writes
        let ordered: BTreeMap<&String, &ProviderHealth> = map.iter().collect();
        self.write(PROVIDER_HEALTH_KEY, &ordered)
    }

    pub fn clear_health(&self) -> Result<()> {
        self.store.remove(PROVIDER_HEALTH_KEY)
    }

    pub fn history(&self) -> VecDeque<SelectionRecord> {
        self.read(PROVIDER_HISTORY_KEY)
    }

    pub fn push_history(&self, record: SelectionRecord) -> Result<()> {
        let mut history = self.history();
        history.push_back(record);
        while history.len() > HISTORY_CAPACITY {
            history.pop_front();
        }
        self.write(PROVIDER_HISTORY_KEY, &history)
    }
}
