//! Playlist download over HTTP(S)
//!
//! Server context talks to providers directly. Client context sends every
//! request through a local proxy endpoint (`{endpoint}?url=<target>`) so the
//! upstream host never sees a cross-origin request.

use crate::config::EngineConfig;
use crate::{Error, Result};
use flate2::read::GzDecoder;
use log::debug;
use std::io::{self, Read};
use std::time::{Duration, Instant};
use url::Url;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Result of a lightweight reachability probe
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    pub status: u16,
    /// Time until response headers arrived
    pub elapsed: Duration,
    /// Leading bytes of the body, if any could be read
    pub sample: Option<String>,
    pub content_length: Option<u64>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Source of raw playlist text
pub trait PlaylistFetcher: Send + Sync {
    /// Download the full playlist body as text
    fn fetch(&self, url: &str) -> Result<String>;

    /// Issue a probe reading at most `sample_bytes` of the body
    fn probe(&self, url: &str, sample_bytes: usize) -> Result<ProbeResponse>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchMode {
    Direct,
    Proxied { endpoint: String },
}

impl FetchMode {
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.proxy_endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => FetchMode::Proxied {
                endpoint: endpoint.to_string(),
            },
            _ => FetchMode::Direct,
        }
    }

    /// Url actually requested for `target`
    pub fn request_url(&self, target: &str) -> Result<String> {
        match self {
            FetchMode::Direct => Ok(target.to_string()),
            FetchMode::Proxied { endpoint } => Url::parse_with_params(endpoint, &[("url", target)])
                .map(String::from)
                .map_err(|e| Error::validation(endpoint, e.to_string())),
        }
    }
}

/// Checks that a provider url is an absolute http(s) url with a host
pub fn validate_url(raw: &str) -> Result<Url> {
    let parsed = Url::parse(raw.trim()).map_err(|e| Error::validation(raw, e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation(raw, format!("unsupported scheme {}", parsed.scheme())));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::validation(raw, "missing host"));
    }
    Ok(parsed)
}

pub struct HttpFetcher {
    agent: ureq::Agent,
    probe_agent: ureq::Agent,
    mode: FetchMode,
    user_agent: String,
    fetch_timeout: Duration,
    probe_timeout: Duration,
    max_body_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Self {
        let fetch_timeout = Duration::from_secs(config.fetch_timeout_secs);
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        Self {
            agent: create_agent(fetch_timeout, connect_timeout),
            probe_agent: create_agent(probe_timeout, connect_timeout.min(probe_timeout)),
            mode: FetchMode::from_config(config),
            user_agent: config.user_agent.clone(),
            fetch_timeout,
            probe_timeout,
            max_body_bytes: config.max_playlist_bytes,
        }
    }

    pub fn mode(&self) -> &FetchMode {
        &self.mode
    }

    fn classify_status(&self, status: u16) -> Error {
        match (&self.mode, status) {
            (FetchMode::Proxied { .. }, 403) => Error::Cors("proxy refused the request (HTTP 403)".to_string()),
            _ => Error::Network(format!("HTTP error: {}", status)),
        }
    }
}

fn create_agent(timeout: Duration, connect_timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .timeout_connect(Some(connect_timeout))
        .http_status_as_error(false)
        .max_idle_connections(16)
        .max_idle_connections_per_host(2)
        .build()
        .new_agent()
}

fn map_ureq_error(e: ureq::Error, timeout: Duration) -> Error {
    match e {
        ureq::Error::Timeout(_) => Error::Timeout(timeout),
        ureq::Error::Io(ref io) if io.kind() == io::ErrorKind::TimedOut => Error::Timeout(timeout),
        ureq::Error::StatusCode(code) => Error::Network(format!("HTTP error: {}", code)),
        other => Error::Network(other.to_string()),
    }
}

/// Decode a body, inflating gzip payloads such as `.m3u.gz` files
pub fn decode_body(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoded = String::new();
        GzDecoder::new(bytes)
            .read_to_string(&mut decoded)
            .map_err(|e| Error::parse(format!("gzip decode failed: {}", e)))?;
        return Ok(decoded);
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Best-effort decode of a truncated body sample
fn decode_sample(bytes: &[u8]) -> String {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        // A truncated stream errors at the cut, keep what inflated before it
        let _ = GzDecoder::new(bytes).read_to_end(&mut out);
        return String::from_utf8_lossy(&out).into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

impl PlaylistFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let request_url = self.mode.request_url(url)?;
        debug!("GET {}", request_url);

        let mut response = self
            .agent
            .get(&request_url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(e, self.fetch_timeout))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(self.classify_status(status));
        }

        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.max_body_bytes)
            .read_to_vec()
            .map_err(|e| map_ureq_error(e, self.fetch_timeout))?;

        decode_body(&bytes)
    }

    fn probe(&self, url: &str, sample_bytes: usize) -> Result<ProbeResponse> {
        let request_url = self.mode.request_url(url)?;
        let started = Instant::now();

        let response = self
            .probe_agent
            .get(&request_url)
            .header("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(e, self.probe_timeout))?;
        let elapsed = started.elapsed();

        let status = response.status().as_u16();
        if status == 403 && matches!(self.mode, FetchMode::Proxied { .. }) {
            return Err(self.classify_status(status));
        }

        let content_length: Option<u64> = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());

        let sample = if sample_bytes > 0 && (200..300).contains(&status) {
            let mut buffer = Vec::with_capacity(sample_bytes);
            let reader = response.into_body().into_reader();
            match reader.take(sample_bytes as u64).read_to_end(&mut buffer) {
                Ok(_) => Some(decode_sample(&buffer)),
                Err(e) => {
                    debug!("Could not sample body of {}: {}", url, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(ProbeResponse {
            status,
            elapsed,
            sample,
            content_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://iptv-org.github.io/iptv/index.m3u").is_ok());
        assert!(matches!(validate_url("ftp://example.com/list.m3u"), Err(Error::Validation { .. })));
        assert!(matches!(validate_url("not a url"), Err(Error::Validation { .. })));
        assert!(matches!(validate_url("http://"), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_direct_mode_keeps_url() {
        let mode = FetchMode::Direct;
        assert_eq!(mode.request_url("http://a.com/x.m3u").unwrap(), "http://a.com/x.m3u");
    }

    #[test]
    fn test_proxied_mode_encodes_target() {
        let mode = FetchMode::Proxied {
            endpoint: "http://localhost:3000/api/proxy".to_string(),
        };
        let url = mode.request_url("https://a.com/x.m3u?token=1&b=2").unwrap();
        assert!(url.starts_with("http://localhost:3000/api/proxy?url="));
        assert!(url.contains("https%3A%2F%2Fa.com%2Fx.m3u%3Ftoken%3D1%26b%3D2"));
    }

    #[test]
    fn test_mode_from_config() {
        let mut config = EngineConfig::default();
        assert_eq!(FetchMode::from_config(&config), FetchMode::Direct);
        config.proxy_endpoint = Some("  ".to_string());
        assert_eq!(FetchMode::from_config(&config), FetchMode::Direct);
        config.proxy_endpoint = Some("http://localhost/proxy".to_string());
        assert!(matches!(FetchMode::from_config(&config), FetchMode::Proxied { .. }));
    }

    #[test]
    fn test_decode_gzip_body() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"#EXTM3U\n#EXTINF:-1,A\nhttp://a/1.ts\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let text = decode_body(&compressed).unwrap();
        assert!(text.starts_with("#EXTM3U"));
        assert_eq!(decode_body(b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_decode_truncated_gzip_sample() {
        let body = "#EXTINF:-1,Channel\nhttp://a/1.ts\n".repeat(200);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(body.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let sample = decode_sample(&compressed[..compressed.len() / 2]);
        assert!(sample.len() <= body.len());
    }
}
