//! Static catalogue of upstream playlist providers

use crate::config::{EngineConfig, ProviderOverride};
use crate::fetcher::validate_url;
use crate::models::{ProviderConfig, ProviderType};
use log::{info, warn};

const IPTV_ORG: &str = "https://iptv-org.github.io/iptv";

const MAIN_SEEDS: &[(&str, &str, &str, i32)] = &[
    ("iptv-org-all", "IPTV-org (All Channels)", "https://iptv-org.github.io/iptv/index.m3u", 1),
    ("iptv-org-categories", "IPTV-org (By Category)", "https://iptv-org.github.io/iptv/index.category.m3u", 2),
    ("iptv-org-languages", "IPTV-org (By Language)", "https://iptv-org.github.io/iptv/index.language.m3u", 3),
    ("iptv-org-countries", "IPTV-org (By Country)", "https://iptv-org.github.io/iptv/index.country.m3u", 4),
    ("free-tv", "Free-TV IPTV", "https://raw.githubusercontent.com/Free-TV/IPTV/master/playlist.m3u8", 5),
];

// (id, name, url, enabled, priority)
const THIRD_PARTY_SEEDS: &[(&str, &str, &str, bool, i32)] = &[
    ("pluto-tv", "Pluto TV", "https://i.mjh.nz/PlutoTV/all.m3u8", true, 10),
    ("samsung-tv-plus", "Samsung TV Plus", "https://i.mjh.nz/SamsungTVPlus/all.m3u8", true, 11),
    ("plex", "Plex Live TV", "https://i.mjh.nz/Plex/all.m3u8", true, 12),
    ("roku", "The Roku Channel", "https://i.mjh.nz/Roku/all.m3u8", false, 13),
    ("stirr", "Stirr", "https://i.mjh.nz/Stirr/all.m3u8", true, 14),
];

const CATEGORY_SEEDS: &[(&str, &str)] = &[
    ("animation", "Animation"),
    ("auto", "Auto"),
    ("business", "Business"),
    ("classic", "Classic"),
    ("comedy", "Comedy"),
    ("cooking", "Cooking"),
    ("culture", "Culture"),
    ("documentary", "Documentary"),
    ("education", "Education"),
    ("entertainment", "Entertainment"),
    ("family", "Family"),
    ("general", "General"),
    ("kids", "Kids"),
    ("legislative", "Legislative"),
    ("lifestyle", "Lifestyle"),
    ("movies", "Movies"),
    ("music", "Music"),
    ("news", "News"),
    ("outdoor", "Outdoor"),
    ("relax", "Relax"),
    ("religious", "Religious"),
    ("science", "Science"),
    ("series", "Series"),
    ("shop", "Shop"),
    ("sports", "Sports"),
    ("travel", "Travel"),
    ("weather", "Weather"),
];

const COUNTRY_SEEDS: &[(&str, &str)] = &[
    ("us", "United States"),
    ("uk", "United Kingdom"),
    ("ca", "Canada"),
    ("au", "Australia"),
    ("de", "Germany"),
    ("fr", "France"),
    ("es", "Spain"),
    ("it", "Italy"),
    ("br", "Brazil"),
    ("mx", "Mexico"),
    ("in", "India"),
    ("jp", "Japan"),
    ("kr", "South Korea"),
    ("nl", "Netherlands"),
    ("se", "Sweden"),
    ("no", "Norway"),
    ("dk", "Denmark"),
    ("fi", "Finland"),
    ("pl", "Poland"),
    ("pt", "Portugal"),
    ("ar", "Argentina"),
    ("tr", "Turkey"),
    ("ru", "Russia"),
    ("za", "South Africa"),
    ("ie", "Ireland"),
    ("nz", "New Zealand"),
    ("ch", "Switzerland"),
    ("at", "Austria"),
    ("be", "Belgium"),
    ("gr", "Greece"),
    ("ph", "Philippines"),
    ("id", "Indonesia"),
    ("eg", "Egypt"),
    ("sa", "Saudi Arabia"),
    ("ae", "United Arab Emirates"),
];

/// Built-in provider table
pub fn default_providers() -> Vec<ProviderConfig> {
    let mut providers = Vec::with_capacity(
        MAIN_SEEDS.len() + THIRD_PARTY_SEEDS.len() + CATEGORY_SEEDS.len() + COUNTRY_SEEDS.len(),
    );

    for &(id, name, url, priority) in MAIN_SEEDS {
        providers.push(ProviderConfig {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            provider_type: ProviderType::Main,
            region: None,
            enabled: true,
            priority,
        });
    }

    for &(id, name, url, enabled, priority) in THIRD_PARTY_SEEDS {
        providers.push(ProviderConfig {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            provider_type: ProviderType::ThirdParty,
            region: None,
            enabled,
            priority,
        });
    }

    for (i, &(slug, label)) in CATEGORY_SEEDS.iter().enumerate() {
        providers.push(ProviderConfig {
            id: format!("iptv-org-category-{}", slug),
            name: format!("IPTV-org {}", label),
            url: format!("{}/categories/{}.m3u", IPTV_ORG, slug),
            provider_type: ProviderType::Specialty,
            region: None,
            enabled: true,
            priority: 20 + i as i32,
        });
    }

    for (i, &(code, country)) in COUNTRY_SEEDS.iter().enumerate() {
        providers.push(ProviderConfig {
            id: format!("iptv-org-country-{}", code),
            name: format!("IPTV-org {}", country),
            url: format!("{}/countries/{}.m3u", IPTV_ORG, code),
            provider_type: ProviderType::Regional,
            region: Some(code.to_uppercase()),
            enabled: true,
            priority: 50 + i as i32,
        });
    }

    providers
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(default_providers())
    }
}

impl ProviderRegistry {
    /// Later duplicates of an id are dropped
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        let mut unique: Vec<ProviderConfig> = Vec::with_capacity(providers.len());
        for provider in providers {
            if unique.iter().any(|p| p.id == provider.id) {
                warn!("Duplicate provider id {}, keeping the first entry", provider.id);
                continue;
            }
            unique.push(provider);
        }
        Self { providers: unique }
    }

    /// Built-in table with the configured url overrides applied
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::default().with_overrides(config.active_overrides())
    }

    /// Replace seeded urls by provider id
    ///
    /// Overrides for unknown ids or with invalid urls are skipped.
    pub fn with_overrides(mut self, overrides: &[ProviderOverride]) -> Self {
        for slot in overrides {
            if let Err(e) = validate_url(&slot.url) {
                warn!("Ignoring override for {}: {}", slot.id, e);
                continue;
            }
            match self.providers.iter_mut().find(|p| p.id == slot.id) {
                Some(provider) => {
                    info!("Provider {} url overridden", provider.id);
                    provider.url = slot.url.trim().to_string();
                }
                None => warn!("Ignoring override for unknown provider {}", slot.id),
            }
        }
        self
    }

    pub fn all(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub fn enabled(&self) -> Vec<&ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled).collect()
    }

    pub fn get(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn by_type(&self, provider_type: ProviderType) -> Vec<&ProviderConfig> {
        self.providers
            .iter()
            .filter(|p| p.provider_type == provider_type)
            .collect()
    }

    pub fn by_region(&self, region: &str) -> Vec<&ProviderConfig> {
        self.providers
            .iter()
            .filter(|p| p.region.as_deref().is_some_and(|r| r.eq_ignore_ascii_case(region)))
            .collect()
    }

    /// Enabled providers ordered by priority, then id
    pub fn sorted_by_priority(&self) -> Vec<&ProviderConfig> {
        let mut enabled = self.enabled();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        enabled
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
