//! Scripted fetcher for network-free tests

use crate::fetcher::{PlaylistFetcher, ProbeResponse};
use crate::models::{ProviderConfig, ProviderType};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Playlist(String),
    Network(String),
    Timeout,
    Status(u16),
}

#[derive(Debug, Clone)]
struct Route {
    response: Scripted,
    latency: Duration,
}

/// Per-url canned responses; unrouted urls fail with a network error
#[derive(Debug, Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, url: &str, response: Scripted) {
        let mut routes = self.routes.lock().unwrap();
        let latency = routes.get(url).map(|r| r.latency).unwrap_or(Duration::from_millis(120));
        routes.insert(url.to_string(), Route { response, latency });
    }

    pub fn respond(&self, url: &str, body: &str) {
        self.route(url, Scripted::Playlist(body.to_string()));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.route(url, Scripted::Network(message.to_string()));
    }

    pub fn timeout(&self, url: &str) {
        self.route(url, Scripted::Timeout);
    }

    pub fn status(&self, url: &str, code: u16) {
        self.route(url, Scripted::Status(code));
    }

    /// Reported probe latency; nothing actually sleeps
    pub fn latency(&self, url: &str, latency: Duration) {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.entry(url.to_string()).or_insert(Route {
            response: Scripted::Network("no route".to_string()),
            latency,
        });
        route.latency = latency;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    fn lookup(&self, url: &str) -> Option<Route> {
        self.calls.lock().unwrap().push(url.to_string());
        self.routes.lock().unwrap().get(url).cloned()
    }
}

impl PlaylistFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        match self.lookup(url).map(|r| r.response) {
            Some(Scripted::Playlist(body)) => Ok(body),
            Some(Scripted::Network(message)) => Err(Error::Network(message)),
            Some(Scripted::Timeout) => Err(Error::Timeout(Duration::from_secs(30))),
            Some(Scripted::Status(code)) => Err(Error::Network(format!("HTTP error: {}", code))),
            None => Err(Error::Network(format!("no route for {}", url))),
        }
    }

    fn probe(&self, url: &str, sample_bytes: usize) -> Result<ProbeResponse> {
        let Some(route) = self.lookup(url) else {
            return Err(Error::Network(format!("no route for {}", url)));
        };
        match route.response {
            Scripted::Playlist(body) => {
                let sample = (sample_bytes > 0)
                    .then(|| body.chars().take(sample_bytes).collect::<String>());
                Ok(ProbeResponse {
                    status: 200,
                    elapsed: route.latency,
                    sample,
                    content_length: Some(body.len() as u64),
                })
            }
            Scripted::Status(code) => Ok(ProbeResponse {
                status: code,
                elapsed: route.latency,
                sample: None,
                content_length: None,
            }),
            Scripted::Network(message) => Err(Error::Network(message)),
            Scripted::Timeout => Err(Error::Timeout(Duration::from_secs(10))),
        }
    }
}

pub fn provider(id: &str, priority: i32) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        name: format!("Provider {}", id),
        url: provider_url(id),
        provider_type: ProviderType::Main,
        region: None,
        enabled: true,
        priority,
    }
}

pub fn provider_url(id: &str) -> String {
    format!("https://{}.example.com/playlist.m3u", id)
}

/// Minimal playlist with `count` channels named `{prefix} N`
pub fn playlist(prefix: &str, count: usize) -> String {
    let mut body = String::from("#EXTM3U\n");
    for i in 0..count {
        body.push_str(&format!(
            "#EXTINF:-1 group-title=\"General\",{} {}\nhttps://{}.example.com/live/{}.m3u8\n",
            prefix,
            i,
            prefix.to_lowercase().replace(' ', "-"),
            i
        ));
    }
    body
}
