//! Cross-provider channel deduplication
//!
//! Providers are merged in configured priority order. Each incoming channel
//! is compared against the entries merged so far; candidates come from url,
//! external id, compact name and name token indexes so large catalogues do
//! not degrade into pairwise comparison.

use crate::models::{AggregatedChannel, Channel, ChannelSource, ProviderConfig};
use crate::search::similarity;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use url::Url;

/// Token overlap at which two names are the same channel outright
pub const NAME_MATCH_THRESHOLD: f64 = 0.85;
/// Score given to whole-word containment ("CNN" in "CNN International")
pub const CONTAINMENT_SCORE: f64 = 0.8;
/// Group similarity that reinforces a containment match
pub const GROUP_MATCH_THRESHOLD: f64 = 0.9;

const MIN_CONTAINED_LEN: usize = 3;
const HOST_SCAN_LIMIT: usize = 256;
const TOKEN_POSTING_LIMIT: usize = 256;
const QUALITY_TOKENS: &[&str] = &["hd", "fhd", "uhd", "sd", "4k"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
    pub providers: usize,
    pub input_channels: usize,
    pub total_channels: usize,
    /// Entries served by two or more providers
    pub multi_source_channels: usize,
    pub duplicates_merged: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStatistics {
    pub provider_id: String,
    pub total: usize,
    /// Channels no other provider carries
    pub unique: usize,
    pub shared: usize,
}

#[derive(Debug, Clone)]
struct UrlKey {
    raw: String,
    host: Option<String>,
    path: String,
}

impl UrlKey {
    fn new(raw: &str) -> Self {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) if !host.is_empty() => Self {
                    raw: raw.to_string(),
                    host: Some(host.to_lowercase()),
                    path: parsed.path().to_string(),
                },
                _ => Self::opaque(raw),
            },
            Err(_) => Self::opaque(raw),
        }
    }

    fn opaque(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            host: None,
            path: raw.to_string(),
        }
    }

    /// Same host and one path equal to or containing the other
    fn matches(&self, other: &UrlKey) -> bool {
        match (&self.host, &other.host) {
            (Some(a), Some(b)) if a == b => {
                if self.path == other.path {
                    return true;
                }
                let (short, long) = if self.path.len() <= other.path.len() {
                    (&self.path, &other.path)
                } else {
                    (&other.path, &self.path)
                };
                short.len() > 1 && long.contains(short.as_str())
            }
            (None, None) => self.raw == other.raw,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct NameKey {
    /// Lowercase words separated by single spaces
    normalized: String,
    compact: String,
    tokens: Vec<String>,
    tvg_id: Option<String>,
    group: Option<String>,
}

impl NameKey {
    fn new(channel: &Channel) -> Self {
        let normalized = normalize_name(&channel.name);
        let compact = normalized.replace(' ', "");
        let mut tokens: Vec<String> = normalized.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect();
        tokens.sort();
        tokens.dedup();

        Self {
            normalized,
            compact,
            tokens,
            tvg_id: channel
                .tvg_id
                .as_deref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            group: channel
                .group
                .as_deref()
                .map(normalize_name)
                .filter(|g| !g.is_empty()),
        }
    }
}

/// Lowercased alphanumeric words with quality markers removed
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !QUALITY_TOKENS.contains(w))
        .collect();

    // A name made only of markers keeps them
    if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    }
}

fn name_similarity(a: &NameKey, b: &NameKey) -> f64 {
    if a.normalized.is_empty() || b.normalized.is_empty() {
        return 0.0;
    }
    if a.compact == b.compact {
        return 1.0;
    }

    let shared = shared_tokens(&a.tokens, &b.tokens);
    let union = a.tokens.len() + b.tokens.len() - shared;
    let overlap = if union == 0 { 0.0 } else { shared as f64 / union as f64 };

    let (short, long) = if a.normalized.len() <= b.normalized.len() {
        (a.normalized.as_str(), b.normalized.as_str())
    } else {
        (b.normalized.as_str(), a.normalized.as_str())
    };

    if short.chars().count() >= MIN_CONTAINED_LEN && contains_words(long, short) {
        overlap.max(CONTAINMENT_SCORE)
    } else {
        overlap
    }
}

/// Count of common entries in two sorted, deduplicated token lists
fn shared_tokens(a: &[String], b: &[String]) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}

/// `needle` occurs in `haystack` on word boundaries
fn contains_words(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = start == 0 || haystack.as_bytes()[start - 1] == b' ';
        let after_ok = end == haystack.len() || haystack.as_bytes()[end] == b' ';
        before_ok && after_ok
    })
}

fn group_similarity(a: &NameKey, b: &NameKey) -> f64 {
    match (&a.group, &b.group) {
        (Some(x), Some(y)) => similarity(x, y),
        _ => 0.0,
    }
}

/// Name-only duplicate score, `None` when the names do not qualify
fn name_match(existing: &NameKey, incoming: &NameKey) -> Option<f64> {
    let same_tvg = match (&existing.tvg_id, &incoming.tvg_id) {
        (Some(a), Some(b)) if a != b => return None,
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    let score = name_similarity(existing, incoming);
    if score >= NAME_MATCH_THRESHOLD {
        return Some(score);
    }
    if score >= CONTAINMENT_SCORE && (same_tvg || group_similarity(existing, incoming) >= GROUP_MATCH_THRESHOLD) {
        return Some(score);
    }
    None
}

/// New channel takes over as primary on higher quality or on metadata the
/// current primary lacks, checked in that order
fn should_reassign(current: &Channel, incoming: &Channel) -> bool {
    let incoming_quality = incoming.quality_value().unwrap_or(0);
    let current_quality = current.quality_value().unwrap_or(0);

    incoming_quality > current_quality
        || (incoming.tvg_id.is_some() && current.tvg_id.is_none())
        || (incoming.tvg_logo.is_some() && current.tvg_logo.is_none())
        || (incoming.country.is_some() && current.country.is_none())
        || (incoming.group.is_some() && current.group.is_none())
}

/// `/ch/123/index.m3u8` yields `/ch`, `/ch/123` and the full path
fn path_prefixes(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(i, _)| &path[..i])
        .filter(|prefix| prefix.len() > 1)
        .chain(std::iter::once(path))
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

struct Entry {
    channel: AggregatedChannel,
    name: NameKey,
    urls: Vec<UrlKey>,
}

/// Incremental deduplicating merge
#[derive(Default)]
pub struct ChannelAggregator {
    entries: Vec<Entry>,
    by_url: HashMap<(String, String), Vec<usize>>,
    /// (host, each '/'-bounded prefix of a path, full path included)
    by_path_prefix: HashMap<(String, String), Vec<usize>>,
    /// (host, last non-empty path segment)
    by_segment: HashMap<(String, String), Vec<usize>>,
    by_host: HashMap<String, Vec<usize>>,
    by_raw_url: HashMap<String, Vec<usize>>,
    by_tvg_id: HashMap<String, Vec<usize>>,
    by_compact: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
    providers_seen: usize,
    input_channels: usize,
}

fn push_posting<K: Hash + Eq>(index: &mut HashMap<K, Vec<usize>>, key: K, entry: usize) {
    let postings = index.entry(key).or_default();
    if postings.last() != Some(&entry) {
        postings.push(entry);
    }
}

impl ChannelAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one provider's channels into the catalogue
    pub fn add_provider(&mut self, provider_id: &str, channels: &[Channel]) {
        self.providers_seen += 1;
        self.input_channels += channels.len();
        let before = self.entries.len();

        for channel in channels {
            self.add_channel(provider_id, channel);
        }

        debug!(
            "{}: {} channels, {} new entries",
            provider_id,
            channels.len(),
            self.entries.len() - before
        );
    }

    fn add_channel(&mut self, provider_id: &str, channel: &Channel) {
        let url = UrlKey::new(&channel.url);
        let name = NameKey::new(channel);

        match self.find_duplicate(&url, &name) {
            Some(index) => self.merge_into(index, provider_id, channel, url, name),
            None => {
                let index = self.entries.len();
                self.entries.push(Entry {
                    channel: AggregatedChannel::new(channel.clone(), provider_id),
                    name: name.clone(),
                    urls: Vec::new(),
                });
                self.index_url(index, url);
                self.index_name(index, &name);
            }
        }
    }

    fn candidates(&self, url: &UrlKey, name: &NameKey) -> Vec<usize> {
        let mut found: Vec<usize> = Vec::new();

        match &url.host {
            Some(host) => {
                // Shorter known paths that prefix this one
                for prefix in path_prefixes(&url.path) {
                    if let Some(hits) = self.by_url.get(&(host.clone(), prefix.to_string())) {
                        found.extend(hits);
                    }
                }
                // Longer known paths under this one
                if let Some(hits) = self.by_path_prefix.get(&(host.clone(), url.path.clone())) {
                    found.extend(hits);
                }
                if let Some(segment) = last_segment(&url.path) {
                    if let Some(hits) = self.by_segment.get(&(host.clone(), segment.to_string())) {
                        if hits.len() <= HOST_SCAN_LIMIT {
                            found.extend(hits);
                        }
                    }
                }
                // Small hosts are scanned whole for any other containment
                if let Some(hits) = self.by_host.get(host) {
                    if hits.len() <= HOST_SCAN_LIMIT {
                        found.extend(hits);
                    }
                }
            }
            None => {
                if let Some(hits) = self.by_raw_url.get(&url.raw) {
                    found.extend(hits);
                }
            }
        }

        if let Some(hits) = name.tvg_id.as_ref().and_then(|t| self.by_tvg_id.get(t)) {
            found.extend(hits);
        }
        if let Some(hits) = self.by_compact.get(&name.compact) {
            found.extend(hits);
        }

        let postings: Vec<&Vec<usize>> = name.tokens.iter().filter_map(|t| self.by_token.get(t)).collect();
        let rarest = postings.iter().map(|p| p.len()).min();
        for posting in postings {
            if posting.len() <= TOKEN_POSTING_LIMIT || Some(posting.len()) == rarest {
                found.extend(posting);
            }
        }

        found.sort_unstable();
        found.dedup();
        found
    }

    /// Earliest url match, else the best qualifying name match
    fn find_duplicate(&self, url: &UrlKey, name: &NameKey) -> Option<usize> {
        let candidates = self.candidates(url, name);

        if let Some(&index) = candidates
            .iter()
            .find(|&&i| self.entries[i].urls.iter().any(|u| u.matches(url)))
        {
            return Some(index);
        }

        let mut best: Option<(usize, f64)> = None;
        for &index in &candidates {
            if let Some(score) = name_match(&self.entries[index].name, name) {
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((index, score));
                }
            }
        }
        best.map(|(index, _)| index)
    }

    fn merge_into(&mut self, index: usize, provider_id: &str, channel: &Channel, url: UrlKey, name: NameKey) {
        let entry = &mut self.entries[index];
        let aggregated = &mut entry.channel;

        aggregated.providers.insert(provider_id.to_string());
        if !aggregated.sources.iter().any(|s| s.provider_id == provider_id) {
            aggregated.sources.push(ChannelSource {
                provider_id: provider_id.to_string(),
                url: channel.url.clone(),
                quality: channel.quality.clone(),
            });
        }

        let reassigned = should_reassign(&aggregated.channel, channel);
        if reassigned {
            let previous = std::mem::replace(&mut aggregated.channel, channel.clone());
            let primary = &mut aggregated.channel;
            // Entry id stays the first-seen id
            primary.id = previous.id;
            primary.tvg_id = primary.tvg_id.take().or(previous.tvg_id);
            primary.tvg_logo = primary.tvg_logo.take().or(previous.tvg_logo);
            primary.group = primary.group.take().or(previous.group);
            primary.quality = primary.quality.take().or(previous.quality);
            primary.country = primary.country.take().or(previous.country);
            aggregated.primary_provider = provider_id.to_string();
            entry.name = NameKey::new(&aggregated.channel);
        }

        self.index_url(index, url);
        self.index_name(index, &name);
        if reassigned {
            let primary_name = self.entries[index].name.clone();
            self.index_name(index, &primary_name);
        }
    }

    fn index_url(&mut self, index: usize, url: UrlKey) {
        match &url.host {
            Some(host) => {
                push_posting(&mut self.by_url, (host.clone(), url.path.clone()), index);
                for prefix in path_prefixes(&url.path) {
                    push_posting(&mut self.by_path_prefix, (host.clone(), prefix.to_string()), index);
                }
                if let Some(segment) = last_segment(&url.path) {
                    push_posting(&mut self.by_segment, (host.clone(), segment.to_string()), index);
                }
                push_posting(&mut self.by_host, host.clone(), index);
            }
            None => push_posting(&mut self.by_raw_url, url.raw.clone(), index),
        }
        self.entries[index].urls.push(url);
    }

    fn index_name(&mut self, index: usize, name: &NameKey) {
        if let Some(tvg_id) = &name.tvg_id {
            push_posting(&mut self.by_tvg_id, tvg_id.clone(), index);
        }
        if !name.compact.is_empty() {
            push_posting(&mut self.by_compact, name.compact.clone(), index);
        }
        for token in &name.tokens {
            push_posting(&mut self.by_token, token.clone(), index);
        }
    }

    pub fn summary(&self) -> AggregationSummary {
        let total_channels = self.entries.len();
        AggregationSummary {
            providers: self.providers_seen,
            input_channels: self.input_channels,
            total_channels,
            multi_source_channels: self
                .entries
                .iter()
                .filter(|e| e.channel.provider_count() > 1)
                .count(),
            duplicates_merged: self.input_channels - total_channels,
        }
    }

    pub fn into_channels(self) -> Vec<AggregatedChannel> {
        self.entries.into_iter().map(|e| e.channel).collect()
    }
}

/// Provider ids in merge order: configured priority, then id
///
/// Ids with no configuration go last.
pub fn merge_order<'a>(provider_ids: impl IntoIterator<Item = &'a String>, providers: &[ProviderConfig]) -> Vec<&'a str> {
    let priority: HashMap<&str, i32> = providers.iter().map(|p| (p.id.as_str(), p.priority)).collect();
    let mut ids: Vec<&str> = provider_ids.into_iter().map(String::as_str).collect();
    ids.sort_by(|a, b| {
        let pa = priority.get(a).copied().unwrap_or(i32::MAX);
        let pb = priority.get(b).copied().unwrap_or(i32::MAX);
        pa.cmp(&pb).then_with(|| a.cmp(b))
    });
    ids
}

pub fn aggregate_with_summary(
    provider_channels: &HashMap<String, Vec<Channel>>,
    providers: &[ProviderConfig],
) -> (Vec<AggregatedChannel>, AggregationSummary) {
    let mut aggregator = ChannelAggregator::new();
    for id in merge_order(provider_channels.keys(), providers) {
        if let Some(channels) = provider_channels.get(id) {
            aggregator.add_provider(id, channels);
        }
    }
    let summary = aggregator.summary();
    (aggregator.into_channels(), summary)
}

/// Merge per-provider channel lists into one deduplicated catalogue
pub fn aggregate_channels(
    provider_channels: &HashMap<String, Vec<Channel>>,
    providers: &[ProviderConfig],
) -> Vec<AggregatedChannel> {
    aggregate_with_summary(provider_channels, providers).0
}

/// Most widely carried first, then by name
pub fn sort_channels_by_availability(channels: &mut [AggregatedChannel]) {
    channels.sort_by(|a, b| {
        b.provider_count()
            .cmp(&a.provider_count())
            .then_with(|| a.channel.name.to_lowercase().cmp(&b.channel.name.to_lowercase()))
            .then_with(|| a.channel.name.cmp(&b.channel.name))
    });
}

pub fn get_provider_statistics(channels: &[AggregatedChannel], provider_id: &str) -> ProviderStatistics {
    let mut stats = ProviderStatistics {
        provider_id: provider_id.to_string(),
        ..Default::default()
    };
    for channel in channels.iter().filter(|c| c.providers.contains(provider_id)) {
        stats.total += 1;
        if channel.provider_count() == 1 {
            stats.unique += 1;
        } else {
            stats.shared += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::provider;

    fn channel(name: &str, url: &str) -> Channel {
        Channel {
            id: format!("id-{}", url),
            name: name.to_string(),
            url: url.to_string(),
            tvg_id: None,
            tvg_logo: None,
            group: None,
            quality: None,
            country: None,
        }
    }

    fn aggregate(lists: Vec<(&str, Vec<Channel>)>) -> Vec<AggregatedChannel> {
        let providers: Vec<ProviderConfig> = lists
            .iter()
            .enumerate()
            .map(|(i, (id, _))| provider(id, i as i32 + 1))
            .collect();
        let map: HashMap<String, Vec<Channel>> = lists
            .into_iter()
            .map(|(id, channels)| (id.to_string(), channels))
            .collect();
        aggregate_channels(&map, &providers)
    }

    #[test]
    fn test_url_with_query_merges() {
        let merged = aggregate(vec![
            ("a", vec![channel("Channel 123", "https://cdn.example.com/ch/123.m3u8")]),
            ("b", vec![channel("Totally Different", "https://cdn.example.com/ch/123.m3u8?x=1")]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].providers.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(merged[0].primary_provider, "a");
        assert_eq!(merged[0].source_url("b"), Some("https://cdn.example.com/ch/123.m3u8?x=1"));
    }

    #[test]
    fn test_different_hosts_do_not_merge_on_url() {
        let merged = aggregate(vec![
            ("a", vec![channel("Alpha", "https://one.example.com/ch/1.m3u8")]),
            ("b", vec![channel("Beta", "https://two.example.com/ch/1.m3u8")]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_name_match_across_providers() {
        let merged = aggregate(vec![
            ("a", vec![channel("BBC One HD", "https://a.example.com/bbc1.m3u8")]),
            ("b", vec![channel("bbc one", "https://b.example.com/live/bbc.m3u8")]),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].provider_count(), 2);
    }

    #[test]
    fn test_containment_needs_reinforcement() {
        // Containment alone scores 0.8, below the outright threshold
        let merged = aggregate(vec![
            ("a", vec![channel("CNN", "https://a.example.com/1.m3u8")]),
            ("b", vec![channel("CNN International", "https://b.example.com/2.m3u8")]),
        ]);
        assert_eq!(merged.len(), 2);

        let mut cnn = channel("CNN", "https://a.example.com/1.m3u8");
        cnn.group = Some("News".to_string());
        let mut intl = channel("CNN International", "https://b.example.com/2.m3u8");
        intl.group = Some("news".to_string());
        let merged = aggregate(vec![("a", vec![cnn]), ("b", vec![intl])]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_containment_with_matching_tvg_id() {
        let mut cnn = channel("CNN", "https://a.example.com/1.m3u8");
        cnn.tvg_id = Some("CNN.us".to_string());
        let mut intl = channel("CNN International", "https://b.example.com/2.m3u8");
        intl.tvg_id = Some("cnn.us".to_string());
        let merged = aggregate(vec![("a", vec![cnn]), ("b", vec![intl])]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_conflicting_tvg_ids_veto_name_match() {
        let mut one = channel("Fox News", "https://a.example.com/1.m3u8");
        one.tvg_id = Some("FoxNews.us".to_string());
        let mut two = channel("Fox News", "https://b.example.com/2.m3u8");
        two.tvg_id = Some("FoxNewsTalk.us".to_string());
        let merged = aggregate(vec![("a", vec![one]), ("b", vec![two])]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_short_names_do_not_contain() {
        let merged = aggregate(vec![
            ("a", vec![channel("TV", "https://a.example.com/1.m3u8")]),
            ("b", vec![channel("TV Brasil", "https://b.example.com/2.m3u8")]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_higher_quality_takes_primary() {
        let mut low = channel("ESPN", "https://a.example.com/espn.m3u8");
        low.quality = Some("720p".to_string());
        low.tvg_logo = Some("https://logo/espn.png".to_string());
        let mut high = channel("ESPN", "https://b.example.com/espn.m3u8");
        high.quality = Some("1080p".to_string());

        let merged = aggregate(vec![("a", vec![low]), ("b", vec![high])]);
        assert_eq!(merged.len(), 1);
        let entry = &merged[0];
        assert_eq!(entry.primary_provider, "b");
        assert_eq!(entry.channel.url, "https://b.example.com/espn.m3u8");
        assert_eq!(entry.channel.quality.as_deref(), Some("1080p"));
        // Metadata the new primary lacks is kept
        assert_eq!(entry.channel.tvg_logo.as_deref(), Some("https://logo/espn.png"));
        assert_eq!(entry.channel.id, "id-https://a.example.com/espn.m3u8");
        assert!(entry.providers.contains(&entry.primary_provider));
    }

    #[test]
    fn test_metadata_takes_primary() {
        let bare = channel("Euronews", "https://a.example.com/euronews.m3u8");
        let mut rich = channel("Euronews", "https://b.example.com/euronews.m3u8");
        rich.tvg_id = Some("Euronews.fr".to_string());

        let merged = aggregate(vec![("a", vec![bare]), ("b", vec![rich])]);
        assert_eq!(merged[0].primary_provider, "b");
        assert_eq!(merged[0].channel.url, "https://b.example.com/euronews.m3u8");
    }

    #[test]
    fn test_lower_quality_keeps_primary() {
        let mut high = channel("ESPN", "https://a.example.com/espn.m3u8");
        high.quality = Some("1080p".to_string());
        let mut low = channel("ESPN", "https://b.example.com/espn.m3u8");
        low.quality = Some("480p".to_string());

        let merged = aggregate(vec![("a", vec![high]), ("b", vec![low])]);
        assert_eq!(merged[0].primary_provider, "a");
        assert_eq!(merged[0].sources.len(), 2);
    }

    #[test]
    fn test_merge_order_follows_priority() {
        let providers = vec![provider("late", 50), provider("early", 1)];
        let ids = vec!["late".to_string(), "unknown".to_string(), "early".to_string()];
        assert_eq!(merge_order(&ids, &providers), vec!["early", "late", "unknown"]);

        let map = HashMap::from([
            ("late".to_string(), vec![channel("Same", "https://x.example.com/a.m3u8")]),
            ("early".to_string(), vec![channel("Same", "https://y.example.com/b.m3u8")]),
        ]);
        let merged = aggregate_channels(&map, &providers);
        assert_eq!(merged[0].primary_provider, "early");
    }

    #[test]
    fn test_summary() {
        let providers = vec![provider("a", 1), provider("b", 2)];
        let map = HashMap::from([
            (
                "a".to_string(),
                vec![
                    channel("One", "https://a.example.com/1.m3u8"),
                    channel("Two", "https://a.example.com/2.m3u8"),
                ],
            ),
            ("b".to_string(), vec![channel("One", "https://b.example.com/1.m3u8")]),
        ]);
        let (channels, summary) = aggregate_with_summary(&map, &providers);
        assert_eq!(channels.len(), 2);
        assert_eq!(summary.providers, 2);
        assert_eq!(summary.input_channels, 3);
        assert_eq!(summary.multi_source_channels, 1);
        assert_eq!(summary.duplicates_merged, 1);
    }

    #[test]
    fn test_sort_and_statistics() {
        let mut merged = aggregate(vec![
            (
                "a",
                vec![
                    channel("Zeta", "https://a.example.com/z.m3u8"),
                    channel("alpha", "https://a.example.com/a.m3u8"),
                    channel("Shared", "https://a.example.com/s.m3u8"),
                ],
            ),
            ("b", vec![channel("Shared", "https://b.example.com/s.m3u8")]),
        ]);
        sort_channels_by_availability(&mut merged);
        let names: Vec<&str> = merged.iter().map(|c| c.channel.name.as_str()).collect();
        assert_eq!(names, vec!["Shared", "alpha", "Zeta"]);

        let stats = get_provider_statistics(&merged, "a");
        assert_eq!((stats.total, stats.unique, stats.shared), (3, 2, 1));
        let stats = get_provider_statistics(&merged, "b");
        assert_eq!((stats.total, stats.unique, stats.shared), (1, 0, 1));
    }

    #[test]
    fn test_large_catalogue_stays_distinct() {
        let list: Vec<Channel> = (0..2_000)
            .map(|i| channel(&format!("Station {}", i), &format!("https://a.example.com/live/{}/index.m3u8", i)))
            .collect();
        let merged = aggregate(vec![("a", list.clone()), ("b", list)]);
        assert_eq!(merged.len(), 2_000);
        assert!(merged.iter().all(|c| c.provider_count() == 2));
    }

    #[test]
    fn test_path_containment_on_busy_host() {
        let busy = |head: Channel| -> Vec<Channel> {
            let mut list = vec![head];
            list.extend((0..300).map(|i| channel(&format!("Filler {}", i), &format!("https://cdn.example.com/f/{}.m3u8", i))));
            list
        };
        let short = channel("Channel 123", "https://cdn.example.com/ch/123");
        let long = channel("Totally Different", "https://cdn.example.com/ch/123/index.m3u8");

        // Known path is the shorter one
        let merged = aggregate(vec![("a", busy(short.clone())), ("b", vec![long.clone()])]);
        assert_eq!(merged.len(), 301);
        assert_eq!(merged[0].provider_count(), 2);

        // Known path is the longer one
        let merged = aggregate(vec![("a", busy(long)), ("b", vec![short])]);
        assert_eq!(merged.len(), 301);
        assert_eq!(merged[0].source_url("b"), Some("https://cdn.example.com/ch/123"));
    }

    #[test]
    fn test_same_stream_file_under_other_folder_on_busy_host() {
        let mut list: Vec<Channel> = (0..300)
            .map(|i| channel(&format!("Filler {}", i), &format!("https://cdn.example.com/f/{}.m3u8", i)))
            .collect();
        list.push(channel("Sport 7", "https://cdn.example.com/user/pass/live/7.ts"));
        let merged = aggregate(vec![("a", list), ("b", vec![channel("Other", "https://cdn.example.com/live/7.ts")])]);
        assert_eq!(merged.len(), 301);
        assert_eq!(merged[300].provider_count(), 2);
    }

    #[test]
    fn test_path_prefixes() {
        let prefixes: Vec<&str> = path_prefixes("/ch/123/index.m3u8").collect();
        assert_eq!(prefixes, vec!["/ch", "/ch/123", "/ch/123/index.m3u8"]);
        assert_eq!(path_prefixes("/").collect::<Vec<_>>(), vec!["/"]);
        assert_eq!(last_segment("/live/7.ts"), Some("7.ts"));
        assert_eq!(last_segment("/ch/123/"), Some("123"));
        assert_eq!(last_segment("/"), None);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("BBC One HD"), "bbc one");
        assert_eq!(normalize_name("  Sky-Sports   Main "), "sky sports main");
        assert_eq!(normalize_name("HD"), "hd");
    }
}
