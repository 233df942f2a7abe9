//! Best-provider selection

use crate::health::priority_score;
use crate::models::{now_millis, ProviderConfig, ProviderHealth, SelectionRecord};
use crate::store::StateRepository;
use log::{debug, warn};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct SelectionOptions {
    /// Returned as-is when enabled and usable
    pub preferred: Option<String>,
    pub exclude: BTreeSet<String>,
    pub min_channel_count: Option<usize>,
}

fn meets_min_count(health: Option<&ProviderHealth>, min: Option<usize>, strict: bool) -> bool {
    let Some(min) = min else {
        return true;
    };
    match health.and_then(|h| h.channel_count) {
        Some(count) => count >= min,
        // Unknown size only disqualifies the preferred shortcut
        None => !strict,
    }
}

/// Providers ordered best first by priority score
///
/// Ties break on configured priority, then id.
pub fn rank_providers<'a>(
    candidates: &[&'a ProviderConfig],
    health: &HashMap<String, ProviderHealth>,
) -> Vec<(&'a ProviderConfig, f64)> {
    let mut ranked: Vec<(&ProviderConfig, f64)> = candidates
        .iter()
        .map(|&p| {
            let score = match health.get(&p.id) {
                Some(h) => priority_score(p, h),
                None => priority_score(p, &ProviderHealth::unknown(&p.id)),
            };
            (p, score)
        })
        .collect();

    ranked.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.priority.cmp(&b.priority))
            .then_with(|| a.id.cmp(&b.id))
    });
    ranked
}

/// Pick the provider to fetch from
///
/// Returns `None` only when no candidate is enabled.
pub fn select_provider<'a>(
    candidates: &'a [ProviderConfig],
    health: &HashMap<String, ProviderHealth>,
    opts: &SelectionOptions,
) -> Option<&'a ProviderConfig> {
    let enabled: Vec<&ProviderConfig> = candidates.iter().filter(|p| p.enabled).collect();
    let first = *enabled.first()?;

    if let Some(preferred_id) = opts.preferred.as_deref() {
        if let Some(&preferred) = enabled.iter().find(|p| p.id == preferred_id) {
            let h = health.get(preferred_id);
            if h.is_some_and(|h| h.status.is_usable())
                && meets_min_count(h, opts.min_channel_count, true)
            {
                debug!("Using preferred provider {}", preferred_id);
                return Some(preferred);
            }
        }
    }

    let mut pool: Vec<&ProviderConfig> = enabled
        .iter()
        .copied()
        .filter(|p| !opts.exclude.contains(&p.id))
        .collect();
    if pool.is_empty() {
        debug!("Every enabled provider is excluded, ignoring exclusions");
        pool = enabled.clone();
    }
    pool.retain(|p| meets_min_count(health.get(&p.id), opts.min_channel_count, false));

    match rank_providers(&pool, health).first() {
        Some(&(best, score)) => {
            debug!("Selected {} with score {:.1}", best.id, score);
            Some(best)
        }
        None => Some(first),
    }
}

/// Selection backed by persisted preference, failed set and history
#[derive(Clone)]
pub struct ProviderSelector {
    state: StateRepository,
}

impl ProviderSelector {
    pub fn new(state: StateRepository) -> Self {
        Self { state }
    }

    pub fn select(
        &self,
        candidates: &[ProviderConfig],
        health: &HashMap<String, ProviderHealth>,
        min_channel_count: Option<usize>,
    ) -> Option<ProviderConfig> {
        let opts = SelectionOptions {
            preferred: self.state.preferred_provider(),
            exclude: self.state.failed_providers(),
            min_channel_count,
        };
        select_provider(candidates, health, &opts).cloned()
    }

    /// Mark `current_id` failed and pick a replacement
    pub fn suggest_next_provider(
        &self,
        current_id: &str,
        candidates: &[ProviderConfig],
        health: &HashMap<String, ProviderHealth>,
    ) -> Option<ProviderConfig> {
        if let Err(e) = self.state.mark_failed(current_id) {
            warn!("Failed to persist failed provider {}: {}", current_id, e);
        }

        let exclude = self.state.failed_providers();
        let preferred = self
            .state
            .preferred_provider()
            .filter(|id| !exclude.contains(id));
        let opts = SelectionOptions {
            preferred,
            exclude,
            min_channel_count: None,
        };
        select_provider(candidates, health, &opts).cloned()
    }

    pub fn record(&self, provider_id: &str, success: bool) {
        let record = SelectionRecord {
            provider_id: provider_id.to_string(),
            timestamp: now_millis(),
            success,
        };
        if let Err(e) = self.state.push_history(record) {
            warn!("Failed to persist selection history: {}", e);
        }
    }
}
