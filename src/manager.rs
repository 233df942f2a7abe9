//! Caller-owned entry point tying the engine together
//!
//! Network work inside a batch runs on worker threads and never touches
//! persisted state; outcomes are recorded one after another once the batch
//! has joined.

use crate::aggregator::{aggregate_with_summary, AggregationSummary};
use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::fetcher::{validate_url, HttpFetcher, PlaylistFetcher};
use crate::health::{HealthMonitor, HealthObservation, HealthSummary};
use crate::models::{AggregatedChannel, Channel, ProviderConfig, ProviderHealth, SelectionRecord};
use crate::playlist;
use crate::pool::bounded_map;
use crate::registry::ProviderRegistry;
use crate::search::{self, SearchHit, SearchOptions, Searchable};
use crate::selector::{select_provider, ProviderSelector, SelectionOptions};
use crate::store::{JsonFileStore, StateRepository};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Channels obtained through failover
#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub provider_id: String,
    pub channels: Vec<Channel>,
    /// Providers tried, including the one that succeeded
    pub attempts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub channels: Vec<AggregatedChannel>,
    pub summary: AggregationSummary,
    /// Requested providers that produced nothing
    pub failed_providers: Vec<String>,
}

/// One download, not yet recorded anywhere
struct Download {
    provider_id: String,
    result: Result<Vec<Channel>>,
    elapsed: Duration,
}

impl Download {
    fn observation(&self) -> HealthObservation {
        match &self.result {
            Ok(channels) => HealthObservation::fetched(self.elapsed.as_millis() as u64, channels.len()),
            Err(e) => HealthObservation::failure(e.to_string()),
        }
    }
}

pub struct ProviderManager {
    config: EngineConfig,
    registry: ProviderRegistry,
    fetcher: Arc<dyn PlaylistFetcher>,
    state: StateRepository,
    health: HealthMonitor,
    selector: ProviderSelector,
    classifier: Classifier,
}

impl ProviderManager {
    pub fn new(
        config: EngineConfig,
        registry: ProviderRegistry,
        fetcher: Arc<dyn PlaylistFetcher>,
        state: StateRepository,
    ) -> Self {
        let health = HealthMonitor::new(fetcher.clone(), state.clone(), &config);
        let selector = ProviderSelector::new(state.clone());
        Self {
            config,
            registry,
            fetcher,
            state,
            health,
            selector,
            classifier: Classifier::default(),
        }
    }

    /// Saved config, built-in providers, HTTP fetcher and on-disk state
    pub fn with_defaults() -> Self {
        let config = EngineConfig::load();
        let registry = ProviderRegistry::from_config(&config);
        let fetcher: Arc<dyn PlaylistFetcher> = Arc::new(HttpFetcher::new(&config));
        let store = JsonFileStore::open(EngineConfig::data_dir().join("state.json"));
        Self::new(config, registry, fetcher, StateRepository::new(Arc::new(store)))
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---- Providers ----

    pub fn list_providers(&self) -> &[ProviderConfig] {
        self.registry.all()
    }

    pub fn enabled_providers(&self) -> Vec<ProviderConfig> {
        self.registry.sorted_by_priority().into_iter().cloned().collect()
    }

    pub fn get_provider(&self, id: &str) -> Result<&ProviderConfig> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::UnknownProvider(id.to_string()))
    }

    fn resolve(&self, ids: &[String]) -> Vec<ProviderConfig> {
        ids.iter()
            .filter_map(|id| match self.registry.get(id) {
                Some(provider) => Some(provider.clone()),
                None => {
                    warn!("Skipping unknown provider {}", id);
                    None
                }
            })
            .collect()
    }

    /// Requested providers, or every enabled one when none are named
    fn resolve_or_enabled(&self, ids: &[String]) -> Vec<ProviderConfig> {
        if ids.is_empty() {
            self.enabled_providers()
        } else {
            self.resolve(ids)
        }
    }

    pub fn select_best_provider(&self, min_channel_count: Option<usize>) -> Result<ProviderConfig> {
        let candidates = self.enabled_providers();
        self.selector
            .select(&candidates, &self.health.fresh_view(), min_channel_count)
            .ok_or(Error::NoProviders)
    }

    pub fn suggest_next_provider(&self, current_id: &str) -> Result<ProviderConfig> {
        let candidates = self.enabled_providers();
        self.selector
            .suggest_next_provider(current_id, &candidates, &self.health.fresh_view())
            .ok_or(Error::NoProviders)
    }

    // ---- Fetching ----

    fn download(&self, provider: &ProviderConfig) -> Download {
        let started = Instant::now();
        let result = validate_url(&provider.url)
            .and_then(|_| self.fetcher.fetch(&provider.url))
            .and_then(|body| playlist::parse(&body));

        Download {
            provider_id: provider.id.clone(),
            result,
            elapsed: started.elapsed(),
        }
    }

    fn record_failed_set(&self, provider_id: &str, success: bool) {
        let outcome = if success {
            self.state.clear_failed(provider_id)
        } else {
            self.state.mark_failed(provider_id)
        };
        if let Err(e) = outcome {
            warn!("Failed to update failed providers: {}", e);
        }
    }

    fn record(&self, download: &Download) {
        let success = download.result.is_ok();
        self.health
            .record_fetch_outcome(&download.provider_id, &download.observation());
        self.record_failed_set(&download.provider_id, success);
        self.selector.record(&download.provider_id, success);
    }

    /// Fetch and parse one provider, recording the outcome
    pub fn fetch_channels_from_provider(&self, provider: &ProviderConfig) -> Result<Vec<Channel>> {
        let download = self.download(provider);
        self.record(&download);
        match &download.result {
            Ok(channels) => info!(
                "{}: {} channels in {:?}",
                provider.id,
                channels.len(),
                download.elapsed
            ),
            Err(e) => warn!("{}: fetch failed: {}", provider.id, e),
        }
        download.result
    }

    pub fn fetch_channels_from(&self, provider_id: &str) -> Result<Vec<Channel>> {
        let provider = self.get_provider(provider_id)?.clone();
        self.fetch_channels_from_provider(&provider)
    }

    /// Try the best untried provider until one returns channels
    ///
    /// Makes at most `min(max_retries, enabled candidates)` attempts.
    pub fn fetch_channels_with_failover(
        &self,
        candidates: &[ProviderConfig],
        max_retries: usize,
    ) -> Result<FetchResult> {
        let enabled: Vec<ProviderConfig> = candidates.iter().filter(|p| p.enabled).cloned().collect();
        if enabled.is_empty() {
            return Err(Error::NoProviders);
        }

        let max_attempts = max_retries.min(enabled.len());
        let mut tried: BTreeSet<String> = BTreeSet::new();
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                thread::sleep(self.config.failover_backoff());
            }

            let untried: Vec<ProviderConfig> = enabled
                .iter()
                .filter(|p| !tried.contains(&p.id))
                .cloned()
                .collect();
            let opts = SelectionOptions {
                preferred: self.state.preferred_provider(),
                exclude: self.state.failed_providers(),
                min_channel_count: None,
            };
            let Some(provider) = select_provider(&untried, &self.health.fresh_view(), &opts).cloned() else {
                break;
            };
            tried.insert(provider.id.clone());
            info!("Attempt {}/{}: {}", attempt, max_attempts, provider.id);

            let mut download = self.download(&provider);
            // An empty list counts as a failed attempt
            if matches!(&download.result, Ok(channels) if channels.is_empty()) {
                download.result = Err(Error::Parse(format!("{} returned no channels", provider.id)));
            }
            self.record(&download);

            match download.result {
                Ok(channels) => {
                    info!("{}: {} channels in {:?}", provider.id, channels.len(), download.elapsed);
                    return Ok(FetchResult {
                        provider_id: provider.id,
                        channels,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    warn!("{}: fetch failed: {}", provider.id, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(Error::Exhausted {
            attempts: tried.len(),
            last_error,
        })
    }

    /// Failover across every enabled provider with the configured retry budget
    pub fn fetch_channels(&self) -> Result<FetchResult> {
        self.fetch_channels_with_failover(&self.enabled_providers(), self.config.max_retries)
    }

    /// Fetch several providers at once; failures are left out of the map
    pub fn fetch_channels_from_multiple_providers(&self, ids: &[String]) -> HashMap<String, Vec<Channel>> {
        let providers = self.resolve(ids);
        self.fetch_many(&providers)
    }

    fn fetch_many(&self, providers: &[ProviderConfig]) -> HashMap<String, Vec<Channel>> {
        let downloads = bounded_map(providers, self.config.fetch_concurrency, |p| self.download(p));

        let outcomes: Vec<(String, HealthObservation)> = downloads
            .iter()
            .map(|d| (d.provider_id.clone(), d.observation()))
            .collect();
        self.health.record_fetch_outcomes(&outcomes);

        let mut results = HashMap::new();
        for download in downloads {
            let success = download.result.is_ok();
            self.record_failed_set(&download.provider_id, success);
            self.selector.record(&download.provider_id, success);
            match download.result {
                Ok(channels) => {
                    debug!("{}: {} channels", download.provider_id, channels.len());
                    results.insert(download.provider_id, channels);
                }
                Err(e) => warn!("{}: skipped: {}", download.provider_id, e),
            }
        }
        results
    }

    /// Fetch the named providers (all enabled ones when empty) and merge them
    pub fn fetch_and_aggregate(&self, ids: &[String]) -> Result<AggregationResult> {
        let providers = self.resolve_or_enabled(ids);
        if providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let fetched = self.fetch_many(&providers);
        let failed_providers: Vec<String> = providers
            .iter()
            .filter(|p| !fetched.contains_key(&p.id))
            .map(|p| p.id.clone())
            .collect();

        let (channels, summary) = aggregate_with_summary(&fetched, self.registry.all());
        info!(
            "Aggregated {} channels into {} entries from {} providers",
            summary.input_channels, summary.total_channels, summary.providers
        );

        Ok(AggregationResult {
            channels,
            summary,
            failed_providers,
        })
    }

    // ---- Health ----

    /// Health for the named providers (all enabled ones when empty)
    pub fn run_health_checks(&self, ids: &[String]) -> HashMap<String, ProviderHealth> {
        self.health.check_all(&self.resolve_or_enabled(ids))
    }

    pub fn check_provider_health(&self, id: &str) -> Result<ProviderHealth> {
        let provider = self.get_provider(id)?;
        Ok(self.health.check_health(provider))
    }

    pub fn test_availability(&self, ids: &[String]) -> HashMap<String, bool> {
        self.health.test_availability(&self.resolve_or_enabled(ids))
    }

    pub fn provider_health(&self, id: &str) -> Option<ProviderHealth> {
        self.health.get(id)
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.health.summary(&self.enabled_providers())
    }

    pub fn clear_health(&self) {
        self.health.clear();
    }

    // ---- Catalogue helpers ----

    pub fn classify(&self, channel: &Channel) -> String {
        self.classifier.classify(channel)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Rank a catalogue against a free-text query
    pub fn search<'a, T: Searchable>(
        &self,
        catalogue: &'a [T],
        query: &str,
        opts: &SearchOptions,
    ) -> Vec<SearchHit<'a, T>> {
        let hits = search::search(catalogue, query, opts);
        debug!("{:?}: {} of {} entries matched", query, hits.len(), catalogue.len());
        hits
    }

    pub fn search_suggestions<T: Searchable>(&self, catalogue: &[T], query: &str, limit: usize) -> Vec<String> {
        search::get_search_suggestions(catalogue, query, limit)
    }

    // ---- Preferences ----

    pub fn preferred_provider(&self) -> Option<String> {
        self.state.preferred_provider()
    }

    pub fn set_preferred_provider(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            self.get_provider(id)?;
        }
        self.state.set_preferred_provider(id)
    }

    pub fn failed_providers(&self) -> BTreeSet<String> {
        self.state.failed_providers()
    }

    pub fn reset_failed_providers(&self) -> Result<()> {
        self.state.reset_failed_providers()
    }

    pub fn selection_history(&self) -> Vec<SelectionRecord> {
        self.state.history().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthStatus;
    use crate::test_support::{playlist, provider, MockFetcher};

    fn manager(providers: Vec<ProviderConfig>) -> (ProviderManager, Arc<MockFetcher>, StateRepository) {
        let fetcher = Arc::new(MockFetcher::new());
        let state = StateRepository::in_memory();
        let config = EngineConfig {
            failover_backoff_ms: 0,
            ..EngineConfig::default()
        };
        let manager = ProviderManager::new(
            config,
            ProviderRegistry::new(providers),
            fetcher.clone(),
            state.clone(),
        );
        (manager, fetcher, state)
    }

    #[test]
    fn test_fetch_records_success() {
        let a = provider("a", 1);
        let (manager, fetcher, state) = manager(vec![a.clone()]);
        fetcher.respond(&a.url, &playlist("Alpha", 4));
        state.mark_failed("a").unwrap();

        let channels = manager.fetch_channels_from_provider(&a).unwrap();
        assert_eq!(channels.len(), 4);

        let health = manager.provider_health("a").unwrap();
        assert_eq!(health.status, HealthStatus::Online);
        assert_eq!(health.channel_count, Some(4));
        assert!(state.failed_providers().is_empty(), "success heals the failed set");
        assert!(state.history()[0].success);
    }

    #[test]
    fn test_fetch_records_failure() {
        let a = provider("a", 1);
        let (manager, fetcher, state) = manager(vec![a.clone()]);
        fetcher.fail(&a.url, "connection reset");

        let err = manager.fetch_channels_from_provider(&a).unwrap_err();
        assert!(matches!(err, Error::Network(_)));

        let health = manager.provider_health("a").unwrap();
        assert_eq!(health.status, HealthStatus::Offline);
        assert_eq!(health.consecutive_failures, 1);
        assert_eq!(health.error.as_deref(), Some("network error: connection reset"));
        assert!(state.failed_providers().contains("a"));
    }

    #[test]
    fn test_parse_errors_count_as_failures() {
        let a = provider("a", 1);
        let (manager, fetcher, _) = manager(vec![a.clone()]);
        fetcher.respond(&a.url, "<html>maintenance</html>");

        assert!(matches!(manager.fetch_channels_from_provider(&a), Err(Error::Parse(_))));
        assert_eq!(manager.provider_health("a").unwrap().status, HealthStatus::Offline);
    }

    #[test]
    fn test_invalid_url_never_hits_network() {
        let mut a = provider("a", 1);
        a.url = "file:///etc/passwd".to_string();
        let (manager, fetcher, _) = manager(vec![a.clone()]);

        assert!(matches!(manager.fetch_channels_from_provider(&a), Err(Error::Validation { .. })));
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn test_failover_moves_to_next_provider() {
        let providers = vec![provider("a", 1), provider("b", 2), provider("c", 3)];
        let (manager, fetcher, _) = manager(providers.clone());
        fetcher.fail(&providers[0].url, "down");
        fetcher.respond(&providers[1].url, &playlist("Beta", 2));

        let result = manager.fetch_channels_with_failover(&providers, 3).unwrap();
        assert_eq!(result.provider_id, "b");
        assert_eq!(result.attempts, 2);
        assert_eq!(fetcher.call_count(&providers[2].url), 0);
    }

    #[test]
    fn test_failover_attempts_are_bounded() {
        let providers: Vec<ProviderConfig> = (0..5).map(|i| provider(&format!("p{}", i), i)).collect();
        let (manager, fetcher, _) = manager(providers.clone());
        for p in &providers {
            fetcher.fail(&p.url, &format!("{} down", p.id));
        }

        let err = manager.fetch_channels_with_failover(&providers, 3).unwrap_err();
        match err {
            Error::Exhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("down"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[test]
    fn test_failover_with_fewer_providers_than_retries() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let (manager, fetcher, _) = manager(providers.clone());
        fetcher.timeout(&providers[0].url);
        fetcher.timeout(&providers[1].url);

        let err = manager.fetch_channels_with_failover(&providers, 3).unwrap_err();
        assert!(matches!(err, Error::Exhausted { attempts: 2, .. }));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[test]
    fn test_failover_skips_empty_playlists() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let (manager, fetcher, state) = manager(providers.clone());
        fetcher.respond(&providers[0].url, "#EXTM3U\n");
        fetcher.respond(&providers[1].url, &playlist("Beta", 1));

        let result = manager.fetch_channels_with_failover(&providers, 3).unwrap();
        assert_eq!(result.provider_id, "b");
        assert_eq!(result.attempts, 2);
        assert!(state.failed_providers().contains("a"));

        // Recorded once, as a failure
        let health = manager.provider_health("a").unwrap();
        assert_eq!(health.status, HealthStatus::Offline);
        assert_eq!(health.consecutive_failures, 1);
        assert_ne!(health.channel_count, Some(0));
        assert_eq!(health.error.as_deref(), Some("parse error: a returned no channels"));

        let history = state.history();
        let a_records: Vec<_> = history.iter().filter(|r| r.provider_id == "a").collect();
        assert_eq!(a_records.len(), 1);
        assert!(!a_records[0].success);
        assert!(history.iter().any(|r| r.provider_id == "b" && r.success));
    }

    #[test]
    fn test_failover_without_enabled_providers() {
        let mut a = provider("a", 1);
        a.enabled = false;
        let (manager, _, _) = manager(vec![a.clone()]);
        assert!(matches!(
            manager.fetch_channels_with_failover(&[a], 3),
            Err(Error::NoProviders)
        ));
    }

    #[test]
    fn test_multiple_providers_swallow_failures() {
        let providers = vec![provider("a", 1), provider("b", 2), provider("c", 3)];
        let (manager, fetcher, state) = manager(providers.clone());
        fetcher.respond(&providers[0].url, &playlist("Alpha", 2));
        fetcher.fail(&providers[1].url, "down");
        fetcher.respond(&providers[2].url, &playlist("Gamma", 3));

        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "missing".into()];
        let results = manager.fetch_channels_from_multiple_providers(&ids);
        assert_eq!(results.len(), 2);
        assert_eq!(results["c"].len(), 3);
        assert!(!results.contains_key("b"));
        assert!(state.failed_providers().contains("b"));
        assert_eq!(state.history().len(), 3);
    }

    #[test]
    fn test_fetch_and_aggregate() {
        let providers = vec![provider("a", 1), provider("b", 2), provider("c", 3)];
        let (manager, fetcher, _) = manager(providers.clone());
        fetcher.respond(&providers[0].url, &playlist("Shared", 3));
        fetcher.respond(&providers[1].url, &playlist("Shared", 2));
        fetcher.fail(&providers[2].url, "down");

        let result = manager
            .fetch_and_aggregate(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(result.channels.len(), 3);
        assert_eq!(result.summary.multi_source_channels, 2);
        assert_eq!(result.failed_providers, vec!["c".to_string()]);
        assert!(result.channels.iter().all(|c| c.primary_provider == "a"));
    }

    #[test]
    fn test_select_best_provider_uses_health() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let (manager, fetcher, _) = manager(providers.clone());
        fetcher.fail(&providers[0].url, "down");
        fetcher.respond(&providers[1].url, &playlist("Beta", 2));

        manager.run_health_checks(&[]);
        assert_eq!(manager.select_best_provider(None).unwrap().id, "b");
        assert_eq!(manager.health_summary().online, 1);
    }

    #[test]
    fn test_preferences() {
        let (manager, _, _) = manager(vec![provider("a", 1)]);
        assert!(matches!(
            manager.set_preferred_provider(Some("zzz")),
            Err(Error::UnknownProvider(_))
        ));
        manager.set_preferred_provider(Some("a")).unwrap();
        assert_eq!(manager.preferred_provider().as_deref(), Some("a"));
        manager.set_preferred_provider(None).unwrap();
        assert_eq!(manager.preferred_provider(), None);
    }

    #[test]
    fn test_search_over_aggregated_catalogue() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let (manager, fetcher, _) = manager(providers.clone());
        fetcher.respond(&providers[0].url, &playlist("Sports Hub", 2));
        fetcher.respond(&providers[1].url, &playlist("News Desk", 2));

        let catalogue = manager.fetch_and_aggregate(&[]).unwrap().channels;
        let hits = manager.search(&catalogue, "news desk", &SearchOptions::default());
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.item.primary_provider == "b"));

        assert_eq!(manager.search_suggestions(&catalogue, "sports", 1), vec!["Sports Hub 0"]);
    }

    #[test]
    fn test_suggest_next_provider() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let (manager, _, _) = manager(providers);
        assert_eq!(manager.suggest_next_provider("a").unwrap().id, "b");
        assert!(manager.failed_providers().contains("a"));
        manager.reset_failed_providers().unwrap();
        assert!(manager.failed_providers().is_empty());
    }
}
