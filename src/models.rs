//! Data models shared across the engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Current wall-clock time as unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Provider classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    Main,
    Regional,
    Specialty,
    ThirdParty,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderType::Main => "main",
            ProviderType::Regional => "regional",
            ProviderType::Specialty => "specialty",
            ProviderType::ThirdParty => "third-party",
        };
        f.write_str(label)
    }
}

/// Upstream playlist source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    #[serde(default)]
    pub region: Option<String>,
    pub enabled: bool,
    /// Lower is preferred
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Offline,
    Degraded,
    #[default]
    Unknown,
    Checking,
}

impl HealthStatus {
    /// Online or degraded providers can serve a playlist
    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Online | HealthStatus::Degraded)
    }
}

/// Reliability state of a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    /// Unix milliseconds
    pub last_checked: i64,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub channel_count: Option<usize>,
    #[serde(default)]
    pub error: Option<String>,
    pub success_rate: f64,
    #[serde(default)]
    pub consecutive_failures: u32,
}

impl ProviderHealth {
    pub fn unknown(provider_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            status: HealthStatus::Unknown,
            last_checked: 0,
            response_time_ms: None,
            channel_count: None,
            error: None,
            success_rate: crate::health::INITIAL_SUCCESS_RATE,
            consecutive_failures: 0,
        }
    }

    pub fn is_fresh(&self, ttl_ms: i64, now: i64) -> bool {
        self.status != HealthStatus::Checking && now - self.last_checked < ttl_ms
    }
}

/// Channel parsed from a single provider playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tvg_id: Option<String>,
    #[serde(default)]
    pub tvg_logo: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    /// e.g. "1080p"
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Channel {
    /// Numeric part of the quality tag ("720p" -> 720)
    pub fn quality_value(&self) -> Option<u32> {
        let quality = self.quality.as_deref()?;
        quality.trim_end_matches(['p', 'P']).parse().ok()
    }
}

/// One provider's copy of an aggregated channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSource {
    pub provider_id: String,
    pub url: String,
    #[serde(default)]
    pub quality: Option<String>,
}

/// Channel merged across providers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedChannel {
    #[serde(flatten)]
    pub channel: Channel,
    pub providers: BTreeSet<String>,
    pub primary_provider: String,
    pub sources: Vec<ChannelSource>,
}

impl AggregatedChannel {
    pub fn new(channel: Channel, provider_id: &str) -> Self {
        let source = ChannelSource {
            provider_id: provider_id.to_string(),
            url: channel.url.clone(),
            quality: channel.quality.clone(),
        };
        Self {
            channel,
            providers: BTreeSet::from([provider_id.to_string()]),
            primary_provider: provider_id.to_string(),
            sources: vec![source],
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Stream url served by the given provider, if it contributed one
    pub fn source_url(&self, provider_id: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.provider_id == provider_id)
            .map(|s| s.url.as_str())
    }
}

/// Entry in the persisted selection history ring buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub provider_id: String,
    pub timestamp: i64,
    pub success: bool,
}
