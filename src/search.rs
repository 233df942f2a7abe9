//! Typo tolerant channel search

use crate::models::{AggregatedChannel, Channel};
use std::collections::HashSet;

const NAME_WEIGHT: f64 = 10.0;
const GROUP_WEIGHT: f64 = 5.0;
const COUNTRY_WEIGHT: f64 = 2.0;

/// Default cap for [`get_search_suggestions`]
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

/// Fields a catalogue record exposes to search
pub trait Searchable {
    fn search_name(&self) -> &str;
    fn search_group(&self) -> Option<&str>;
    fn search_country(&self) -> Option<&str>;
}

impl Searchable for Channel {
    fn search_name(&self) -> &str {
        &self.name
    }

    fn search_group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    fn search_country(&self) -> Option<&str> {
        self.country.as_deref()
    }
}

impl Searchable for AggregatedChannel {
    fn search_name(&self) -> &str {
        self.channel.search_name()
    }

    fn search_group(&self) -> Option<&str> {
        self.channel.search_group()
    }

    fn search_country(&self) -> Option<&str> {
        self.channel.search_country()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    /// Final cut-off, in tenths of a name weight
    pub threshold: f64,
    /// Early cut-off applied before sorting
    pub min_score: f64,
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_score: 0.3,
            max_results: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a, T> {
    pub item: &'a T,
    pub score: f64,
}

/// Edit distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// 1.0 for identical strings, 0.0 for nothing in common
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Substring match, or every query char appears in order in the text
pub fn fuzzy_contains(text: &str, query: &str) -> bool {
    let text = text.to_lowercase();
    let query = query.to_lowercase();
    if text.contains(&query) {
        return true;
    }

    let mut remaining = text.chars();
    query.chars().all(|q| remaining.any(|t| t == q))
}

fn field_score(value: &str, query: &str, weight: f64) -> f64 {
    let value = value.to_lowercase();
    if value == query {
        weight
    } else if value.starts_with(query) {
        weight * 0.9
    } else if value.contains(query) {
        weight * 0.8
    } else if fuzzy_contains(&value, query) {
        similarity(&value, query) * 0.8 * weight
    } else {
        let sim = similarity(&value, query);
        if sim > 0.6 {
            weight * 0.6
        } else {
            0.0
        }
    }
}

/// Weighted relevance of one record, summed over name, group and country
pub fn score<T: Searchable>(item: &T, query: &str) -> f64 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0.0;
    }

    let mut total = field_score(item.search_name(), &query, NAME_WEIGHT);
    if let Some(group) = item.search_group() {
        total += field_score(group, &query, GROUP_WEIGHT);
    }
    if let Some(country) = item.search_country() {
        total += field_score(country, &query, COUNTRY_WEIGHT);
    }
    total
}

/// Records ranked by relevance, best first
pub fn search<'a, T: Searchable>(items: &'a [T], query: &str, opts: &SearchOptions) -> Vec<SearchHit<'a, T>> {
    if query.trim().is_empty() {
        return Vec::new();
    }

    let floor = opts.min_score * NAME_WEIGHT;
    let mut hits: Vec<SearchHit<'a, T>> = items
        .iter()
        .map(|item| SearchHit {
            item,
            score: score(item, query),
        })
        .filter(|hit| hit.score >= floor)
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    let cut = opts.threshold * NAME_WEIGHT;
    hits.retain(|hit| hit.score >= cut);
    hits.truncate(opts.max_results);
    hits
}

/// Distinct names containing the query, in catalogue order
pub fn get_search_suggestions<T: Searchable>(items: &[T], query: &str, limit: usize) -> Vec<String> {
    let query = query.trim().to_lowercase();
    if query.chars().count() < 2 {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut suggestions = Vec::new();
    for item in items {
        if suggestions.len() >= limit {
            break;
        }
        let name = item.search_name();
        if name.to_lowercase().contains(&query) && seen.insert(name) {
            suggestions.push(name.to_string());
        }
    }
    suggestions
}
