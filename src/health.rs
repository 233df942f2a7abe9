//! Provider reachability tracking
//!
//! Each provider moves `unknown -> checking -> online | degraded | offline`.
//! Results are blended into a running success rate instead of replacing the
//! previous record, and a provider that failed three times in a row stays
//! offline for one more check even if that probe succeeds.

use crate::config::EngineConfig;
use crate::fetcher::{validate_url, PlaylistFetcher};
use crate::models::{now_millis, HealthStatus, ProviderConfig, ProviderHealth};
use crate::pool::bounded_map;
use crate::store::StateRepository;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Success rate assumed for a provider that was never checked
pub const INITIAL_SUCCESS_RATE: f64 = 0.5;

/// Stale entries are kept this long as priors for blending
pub const HEALTH_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Failure streak that pins a provider offline
pub const OFFLINE_STREAK: u32 = 3;

/// One probe or fetch result before it is blended into health state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HealthObservation {
    pub success: bool,
    pub response_time_ms: Option<u64>,
    pub channel_count: Option<usize>,
    pub error: Option<String>,
    /// Latency comes from a header probe; full downloads are not graded
    pub probe: bool,
}

impl HealthObservation {
    /// Successful probe
    pub fn success(response_time_ms: u64, channel_count: Option<usize>) -> Self {
        Self {
            success: true,
            response_time_ms: Some(response_time_ms),
            channel_count,
            error: None,
            probe: true,
        }
    }

    /// Successful full playlist download
    pub fn fetched(response_time_ms: u64, channel_count: usize) -> Self {
        Self {
            probe: false,
            ..Self::success(response_time_ms, Some(channel_count))
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response_time_ms: None,
            channel_count: None,
            error: Some(error.into()),
            probe: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub online: usize,
    pub degraded: usize,
    pub offline: usize,
    pub unknown: usize,
}

/// Blend an observation into the previous record
pub fn update_health(
    prior: &ProviderHealth,
    observation: &HealthObservation,
    now: i64,
    degraded_threshold: Duration,
) -> ProviderHealth {
    if observation.success {
        let response_time_ms = observation.response_time_ms.unwrap_or_default();
        let status = if prior.consecutive_failures >= OFFLINE_STREAK {
            HealthStatus::Offline
        } else if observation.probe && response_time_ms >= degraded_threshold.as_millis() as u64 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Online
        };
        let error = (status == HealthStatus::Offline).then(|| {
            format!("recovering after {} consecutive failures", prior.consecutive_failures)
        });

        ProviderHealth {
            provider_id: prior.provider_id.clone(),
            status,
            last_checked: now,
            response_time_ms: Some(response_time_ms),
            channel_count: observation.channel_count.or(prior.channel_count),
            error,
            success_rate: (prior.success_rate * 0.9 + 0.1).clamp(0.0, 1.0),
            consecutive_failures: 0,
        }
    } else {
        ProviderHealth {
            provider_id: prior.provider_id.clone(),
            status: HealthStatus::Offline,
            last_checked: now,
            response_time_ms: observation.response_time_ms,
            channel_count: prior.channel_count,
            error: observation
                .error
                .clone()
                .or_else(|| Some("unknown error".to_string())),
            success_rate: (prior.success_rate * 0.95).clamp(0.0, 1.0),
            consecutive_failures: prior.consecutive_failures.saturating_add(1),
        }
    }
}

/// Ranking key for provider selection, higher is better
pub fn priority_score(provider: &ProviderConfig, health: &ProviderHealth) -> f64 {
    let priority_rank = 100i32.saturating_sub(provider.priority).max(0) as f64;
    let health_bonus = match health.status {
        HealthStatus::Online => 1_000.0,
        HealthStatus::Degraded => 500.0,
        HealthStatus::Offline => -10_000.0,
        HealthStatus::Unknown | HealthStatus::Checking => 0.0,
    };
    let response_penalty = health.response_time_ms.unwrap_or_default() as f64 / 10.0;
    let channel_bonus = (health.channel_count.unwrap_or_default() as f64 / 10.0).min(500.0);

    priority_rank * 1_000.0 + health_bonus + health.success_rate * 500.0 - response_penalty
        + channel_bonus
        - health.consecutive_failures as f64 * 2_000.0
}

/// Best-effort entry count from the leading bytes of a playlist
///
/// When the body is longer than the sample, the count found in the sample is
/// scaled up by `content_length`. Compressed bodies report their wire size,
/// so the estimate never drops below what the sample itself holds.
pub fn estimate_channel_count(sample: &str, content_length: Option<u64>) -> Option<usize> {
    let count = match sample.matches("#EXTINF").count() {
        0 => sample.matches("<track>").count(),
        n => n,
    };
    if count == 0 {
        return None;
    }

    let scaled = match content_length {
        Some(total) if total > sample.len() as u64 => {
            (count as u128 * total as u128 / sample.len() as u128).min(usize::MAX as u128) as usize
        }
        _ => count,
    };
    Some(scaled.max(count))
}

pub struct HealthMonitor {
    fetcher: Arc<dyn PlaylistFetcher>,
    state: StateRepository,
    ttl: Duration,
    degraded_threshold: Duration,
    concurrency: usize,
    availability_concurrency: usize,
    sample_bytes: usize,
}

impl HealthMonitor {
    pub fn new(fetcher: Arc<dyn PlaylistFetcher>, state: StateRepository, config: &EngineConfig) -> Self {
        Self {
            fetcher,
            state,
            ttl: config.health_ttl(),
            degraded_threshold: Duration::from_millis(config.degraded_threshold_ms),
            concurrency: config.health_concurrency,
            availability_concurrency: config.availability_concurrency,
            sample_bytes: config.probe_sample_bytes,
        }
    }

    fn ttl_ms(&self) -> i64 {
        self.ttl.as_millis() as i64
    }

    fn load(&self, now: i64) -> HashMap<String, ProviderHealth> {
        self.state.health_map(HEALTH_RETENTION.as_millis() as i64, now)
    }

    fn save(&self, map: &HashMap<String, ProviderHealth>) {
        if let Err(e) = self.state.save_health_map(map) {
            warn!("Failed to persist provider health: {}", e);
        }
    }

    /// Probe a provider without touching health state
    pub fn probe(&self, provider: &ProviderConfig) -> HealthObservation {
        if let Err(e) = validate_url(&provider.url) {
            return HealthObservation::failure(e.to_string());
        }

        match self.fetcher.probe(&provider.url, self.sample_bytes) {
            Ok(response) if response.is_success() => {
                let channel_count = response
                    .sample
                    .as_deref()
                    .and_then(|sample| estimate_channel_count(sample, response.content_length));
                HealthObservation::success(response.elapsed.as_millis() as u64, channel_count)
            }
            Ok(response) => HealthObservation {
                success: false,
                response_time_ms: Some(response.elapsed.as_millis() as u64),
                channel_count: None,
                error: Some(format!("HTTP error: {}", response.status)),
                probe: true,
            },
            Err(e) => HealthObservation::failure(e.to_string()),
        }
    }

    /// Probe one provider and record the result; never fails
    pub fn check_health(&self, provider: &ProviderConfig) -> ProviderHealth {
        let mut map = self.load(now_millis());
        mark_checking(&mut map, &provider.id);
        self.save(&map);

        let observation = self.probe(provider);
        let health = self.blend(&mut map, &provider.id, &observation, now_millis());
        self.save(&map);
        log_transition(&health);
        health
    }

    /// Health for every provider, probing only stale or missing entries
    pub fn check_all(&self, providers: &[ProviderConfig]) -> HashMap<String, ProviderHealth> {
        let started = now_millis();
        let mut map = self.load(started);
        let ttl_ms = self.ttl_ms();

        let stale: Vec<&ProviderConfig> = providers
            .iter()
            .filter(|p| !map.get(&p.id).is_some_and(|h| h.is_fresh(ttl_ms, started)))
            .collect();

        if !stale.is_empty() {
            info!(
                "Checking {} of {} providers ({} cached)",
                stale.len(),
                providers.len(),
                providers.len() - stale.len()
            );
            for provider in &stale {
                mark_checking(&mut map, &provider.id);
            }
            self.save(&map);

            let observations = bounded_map(&stale, self.concurrency, |p| self.probe(p));

            let now = now_millis();
            for (provider, observation) in stale.iter().zip(&observations) {
                let health = self.blend(&mut map, &provider.id, observation, now);
                log_transition(&health);
            }
            self.save(&map);
        }

        providers
            .iter()
            .filter_map(|p| map.get(&p.id).map(|h| (p.id.clone(), h.clone())))
            .collect()
    }

    /// Reachability only, with no health bookkeeping
    pub fn test_availability(&self, providers: &[ProviderConfig]) -> HashMap<String, bool> {
        let reachable = bounded_map(providers, self.availability_concurrency, |provider| {
            if validate_url(&provider.url).is_err() {
                return false;
            }
            match self.fetcher.probe(&provider.url, 0) {
                Ok(response) => response.is_success(),
                Err(e) => {
                    debug!("{} unreachable: {}", provider.id, e);
                    false
                }
            }
        });

        providers
            .iter()
            .map(|p| p.id.clone())
            .zip(reachable)
            .collect()
    }

    /// Feed a real fetch result through the same blending rules
    pub fn record_fetch_outcome(&self, provider_id: &str, observation: &HealthObservation) -> ProviderHealth {
        let now = now_millis();
        let mut map = self.load(now);
        let health = self.blend(&mut map, provider_id, observation, now);
        self.save(&map);
        log_transition(&health);
        health
    }

    /// Apply several results with a single state write
    pub fn record_fetch_outcomes(&self, outcomes: &[(String, HealthObservation)]) {
        if outcomes.is_empty() {
            return;
        }
        let now = now_millis();
        let mut map = self.load(now);
        for (provider_id, observation) in outcomes {
            let health = self.blend(&mut map, provider_id, observation, now);
            log_transition(&health);
        }
        self.save(&map);
    }

    fn blend(
        &self,
        map: &mut HashMap<String, ProviderHealth>,
        provider_id: &str,
        observation: &HealthObservation,
        now: i64,
    ) -> ProviderHealth {
        let prior = map
            .get(provider_id)
            .cloned()
            .unwrap_or_else(|| ProviderHealth::unknown(provider_id));
        let health = update_health(&prior, observation, now, self.degraded_threshold);
        map.insert(provider_id.to_string(), health.clone());
        health
    }

    /// Fresh record for a provider, `None` once it has expired
    pub fn get(&self, provider_id: &str) -> Option<ProviderHealth> {
        let now = now_millis();
        self.load(now)
            .remove(provider_id)
            .filter(|h| h.is_fresh(self.ttl_ms(), now))
    }

    /// Every known record, with expired ones reported as unknown
    ///
    /// Expired records keep their success rate and failure streak so the
    /// ranking still remembers a flaky provider.
    pub fn fresh_view(&self) -> HashMap<String, ProviderHealth> {
        let now = now_millis();
        let ttl_ms = self.ttl_ms();
        let mut map = self.load(now);
        for health in map.values_mut() {
            if !health.is_fresh(ttl_ms, now) {
                health.status = HealthStatus::Unknown;
            }
        }
        map
    }

    pub fn summary(&self, providers: &[ProviderConfig]) -> HealthSummary {
        let view = self.fresh_view();
        let mut summary = HealthSummary {
            total: providers.len(),
            ..Default::default()
        };
        for provider in providers {
            match view.get(&provider.id).map(|h| h.status) {
                Some(HealthStatus::Online) => summary.online += 1,
                Some(HealthStatus::Degraded) => summary.degraded += 1,
                Some(HealthStatus::Offline) => summary.offline += 1,
                _ => summary.unknown += 1,
            }
        }
        summary
    }

    pub fn clear(&self) {
        if let Err(e) = self.state.clear_health() {
            warn!("Failed to clear provider health: {}", e);
        }
    }
}

fn mark_checking(map: &mut HashMap<String, ProviderHealth>, provider_id: &str) {
    map.entry(provider_id.to_string())
        .or_insert_with(|| ProviderHealth::unknown(provider_id))
        .status = HealthStatus::Checking;
}

fn log_transition(health: &ProviderHealth) {
    match health.status {
        HealthStatus::Offline => warn!(
            "{} offline ({} consecutive failures): {}",
            health.provider_id,
            health.consecutive_failures,
            health.error.as_deref().unwrap_or("unknown error")
        ),
        status => debug!(
            "{} {:?} in {:?} ms, success rate {:.2}",
            health.provider_id, status, health.response_time_ms, health.success_rate
        ),
    }
}
