//! Multi-provider IPTV channel directory engine
//!
//! Pulls channel playlists from many unreliable upstream providers, keeps a
//! health score for each one, picks the best source with automatic failover,
//! merges overlapping catalogues and ranks channels against free-text
//! queries. [`ProviderManager`] is the entry point.

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod m3u_parser;
pub mod manager;
pub mod models;
pub mod playlist;
pub mod pool;
pub mod registry;
pub mod search;
pub mod selector;
pub mod store;
pub mod xspf_parser;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use manager::ProviderManager;
pub use models::{AggregatedChannel, Channel, HealthStatus, ProviderConfig, ProviderHealth, ProviderType};
