//! Keyword based channel categories
//!
//! Rules are checked in order and the first match wins, so a channel called
//! "Sky Sports News" lands in News, not Sports.

use crate::models::Channel;
use std::collections::BTreeMap;
use std::fmt;

/// Category used when no rule matches and the channel has no group
pub const DEFAULT_CATEGORY: &str = "General";

type Predicate = Box<dyn Fn(&Channel) -> bool + Send + Sync>;

pub struct CategoryRule {
    category: String,
    predicate: Predicate,
}

impl CategoryRule {
    pub fn new<F>(category: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Channel) -> bool + Send + Sync + 'static,
    {
        Self {
            category: category.into(),
            predicate: Box::new(predicate),
        }
    }

    /// Matches when any keyword appears in the lowercased name or group
    pub fn keywords(category: impl Into<String>, keywords: &[&str]) -> Self {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
        Self::new(category, move |channel: &Channel| {
            let name = channel.name.to_lowercase();
            let group = channel.group.as_deref().unwrap_or_default().to_lowercase();
            keywords
                .iter()
                .any(|k| name.contains(k.as_str()) || group.contains(k.as_str()))
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        (self.predicate)(channel)
    }
}

impl fmt::Debug for CategoryRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryRule")
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::with_rules(vec![
            CategoryRule::keywords("News", &["news", "cnn", "bbc world", "weather", "business", "politic"]),
            CategoryRule::keywords("Sports", &["sport", "espn", "football", "soccer", "nba", "nfl", "golf", "tennis", "racing", "fight"]),
            CategoryRule::keywords("Movies", &["movie", "film", "cinema"]),
            CategoryRule::keywords("Music", &["music", "mtv", "vh1", "concert"]),
            CategoryRule::keywords("Entertainment", &["entertainment", "comedy", "drama", "reality", "series", "lifestyle"]),
            CategoryRule::keywords("Documentary", &["documentar", "discovery", "history", "nature", "science", "nat geo"]),
            CategoryRule::keywords("Kids", &["kids", "cartoon", "children", "junior", "disney", "nick"]),
        ])
    }
}

impl Classifier {
    pub fn with_rules(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// First matching rule, else the channel's own group, else [`DEFAULT_CATEGORY`]
    pub fn classify(&self, channel: &Channel) -> String {
        if let Some(rule) = self.rules.iter().find(|r| r.matches(channel)) {
            return rule.category.clone();
        }

        channel
            .group
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string()
    }

    /// Channels bucketed by category, categories in sorted order
    pub fn group_by_category<'a>(&self, channels: &'a [Channel]) -> BTreeMap<String, Vec<&'a Channel>> {
        let mut groups: BTreeMap<String, Vec<&'a Channel>> = BTreeMap::new();
        for channel in channels {
            groups.entry(self.classify(channel)).or_default().push(channel);
        }
        groups
    }
}
