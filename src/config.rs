//! Configuration management

use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of external slots that may replace a seeded provider url
pub const MAX_OVERRIDE_SLOTS: usize = 9;

/// Replaces the url of a seeded provider by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOverride {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    // Hard abort for health probes
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_health_ttl")]
    pub health_ttl_secs: u64,
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold_ms: u64,
    #[serde(default = "default_batch_concurrency")]
    pub health_concurrency: usize,
    #[serde(default = "default_batch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_availability_concurrency")]
    pub availability_concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_failover_backoff")]
    pub failover_backoff_ms: u64,
    #[serde(default = "default_probe_sample")]
    pub probe_sample_bytes: usize,
    #[serde(default = "default_max_playlist")]
    pub max_playlist_bytes: u64,
    // Client context: route every request through this proxy
    #[serde(default)]
    pub proxy_endpoint: Option<String>,
    #[serde(default)]
    pub provider_overrides: Vec<ProviderOverride>,
}

fn default_user_agent() -> String { "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string() }
fn default_fetch_timeout() -> u64 { 30 }
fn default_connect_timeout() -> u64 { 10 }
fn default_probe_timeout() -> u64 { 10 }
fn default_health_ttl() -> u64 { 300 } // 5 minutes
fn default_degraded_threshold() -> u64 { 5_000 }
fn default_batch_concurrency() -> usize { 5 }
fn default_availability_concurrency() -> usize { 10 }
fn default_max_retries() -> usize { 3 }
fn default_failover_backoff() -> u64 { 1_000 }
fn default_probe_sample() -> usize { 16 * 1024 }
fn default_max_playlist() -> u64 { 64 * 1024 * 1024 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            health_ttl_secs: default_health_ttl(),
            degraded_threshold_ms: default_degraded_threshold(),
            health_concurrency: default_batch_concurrency(),
            fetch_concurrency: default_batch_concurrency(),
            availability_concurrency: default_availability_concurrency(),
            max_retries: default_max_retries(),
            failover_backoff_ms: default_failover_backoff(),
            probe_sample_bytes: default_probe_sample(),
            max_playlist_bytes: default_max_playlist(),
            proxy_endpoint: None,
            provider_overrides: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Directory holding config and persisted engine state
    pub fn data_dir() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("iptv_hub");
        fs::create_dir_all(&path).ok();
        path
    }

    fn config_path() -> PathBuf {
        Self::data_dir().join("config.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Missing or unreadable files fall back to defaults
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!("Ignoring malformed config {}: {}", path.display(), e),
                },
                Err(e) => warn!("Cannot read config {}: {}", path.display(), e),
            }
        }

        Self::default()
    }

    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl_secs)
    }

    pub fn failover_backoff(&self) -> Duration {
        Duration::from_millis(self.failover_backoff_ms)
    }

    /// Overrides that fit in the slot budget, in declaration order
    pub fn active_overrides(&self) -> &[ProviderOverride] {
        if self.provider_overrides.len() > MAX_OVERRIDE_SLOTS {
            warn!(
                "{} provider overrides configured, only the first {} are applied",
                self.provider_overrides.len(),
                MAX_OVERRIDE_SLOTS
            );
            &self.provider_overrides[..MAX_OVERRIDE_SLOTS]
        } else {
            &self.provider_overrides
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.health_ttl(), Duration::from_secs(300));
        assert_eq!(config.health_concurrency, 5);
        assert_eq!(config.availability_concurrency, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.probe_timeout_secs, 10);
    }

    #[test]
    fn test_partial_json_uses_field_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_retries": 5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.degraded_threshold_ms, 5_000);
        assert!(config.proxy_endpoint.is_none());
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(EngineConfig::load_from(&path).max_retries, 3);

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(EngineConfig::load_from(&path).max_retries, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = EngineConfig::default();
        config.proxy_endpoint = Some("http://localhost:3000/api/proxy".to_string());
        config.save_to(&path).unwrap();

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded.proxy_endpoint, config.proxy_endpoint);
    }

    #[test]
    fn test_override_slot_cap() {
        let mut config = EngineConfig::default();
        config.provider_overrides = (0..12)
            .map(|i| ProviderOverride {
                id: format!("p{}", i),
                url: format!("http://example.com/{}.m3u", i),
            })
            .collect();
        let active = config.active_overrides();
        assert_eq!(active.len(), MAX_OVERRIDE_SLOTS);
        assert_eq!(active[8].id, "p8");
    }
}
