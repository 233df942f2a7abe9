//! M3U playlist parser
//!
//! Produces raw entries exactly as the playlist declares them. Title cleanup,
//! quality extraction and id assignment happen in [`crate::playlist`].

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static QUOTED_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"([A-Za-z0-9_:-]+)="([^"]*)""#).unwrap());
static UNQUOTED_ATTR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?:^|\s)([A-Za-z0-9_-]+)=([^\s",]+)"#).unwrap());

#[derive(Debug, Clone, Default)]
pub struct M3uChannel {
    pub name: String,
    pub url: String,
    pub group: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
    pub tvg_name: Option<String>,      // Alternate name for EPG matching
    pub tvg_country: Option<String>,
    /// 1-based line of the entry's directive (or bare url)
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct M3uPlaylist {
    pub channels: Vec<M3uChannel>,
    pub epg_url: Option<String>,        // From x-tvg-url in header
}

/// Entry waiting for its url line
struct Pending {
    line: usize,
    name: String,
    attrs: HashMap<String, String>,
    extgrp: Option<String>,
}

/// Parse M3U and return playlist with EPG URL
pub fn parse_m3u_playlist(content: &str) -> Result<M3uPlaylist> {
    let content = content.trim_start_matches('\u{feff}');
    if content.trim().is_empty() {
        return Err(Error::parse("empty playlist"));
    }

    let mut playlist = M3uPlaylist::default();
    let mut has_header = false;
    let mut pending: Option<Pending> = None;

    for (idx, raw_line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXTM3U") {
            has_header = true;
            // Extract x-tvg-url="..." or url-tvg="..."
            if playlist.epg_url.is_none() {
                playlist.epg_url = extract_header_attr(line, "x-tvg-url")
                    .or_else(|| extract_header_attr(line, "url-tvg"));
            }
            continue;
        }

        // Some malformed M3Us have EXTINF without # prefix
        let info = line
            .strip_prefix("#EXTINF:")
            .or_else(|| line.strip_prefix("EXTINF:"));
        if let Some(info) = info {
            if let Some(dangling) = pending.take() {
                return Err(Error::parse(format!(
                    "entry at line {} has no stream url",
                    dangling.line
                )));
            }
            let (attrs, name) = parse_extinf(info);
            pending = Some(Pending {
                line: line_no,
                name,
                attrs,
                extgrp: None,
            });
            continue;
        }

        if let Some(group) = line.strip_prefix("#EXTGRP:") {
            if let Some(ref mut entry) = pending {
                let group = group.trim();
                if !group.is_empty() {
                    entry.extgrp = Some(group.to_string());
                }
            }
            continue;
        }

        if line.starts_with('#') {
            // #EXTVLCOPT, #KODIPROP and other directives
            continue;
        }

        if !looks_like_url(line) {
            let context = match pending {
                Some(ref entry) => format!("expected stream url for entry at line {}", entry.line),
                None => "unexpected content".to_string(),
            };
            return Err(Error::parse(format!("{} at line {}: {:?}", context, line_no, truncate(line, 60))));
        }

        match pending.take() {
            Some(entry) => playlist.channels.push(build_channel(entry, line)),
            None => playlist.channels.push(M3uChannel {
                name: name_from_url(line),
                url: line.to_string(),
                line: line_no,
                ..Default::default()
            }),
        }
    }

    if let Some(dangling) = pending {
        return Err(Error::parse(format!(
            "entry at line {} has no stream url",
            dangling.line
        )));
    }

    if !has_header && playlist.channels.is_empty() {
        return Err(Error::parse("not an M3U playlist"));
    }

    Ok(playlist)
}

/// Parse M3U content and extract channels
pub fn parse_m3u(content: &str) -> Result<Vec<M3uChannel>> {
    Ok(parse_m3u_playlist(content)?.channels)
}

fn build_channel(entry: Pending, url: &str) -> M3uChannel {
    let Pending { line, name, mut attrs, extgrp } = entry;
    let mut take = |key: &str| attrs.remove(key).filter(|v| !v.trim().is_empty());

    let tvg_name = take("tvg-name");
    let name = if name.is_empty() {
        tvg_name.clone().unwrap_or_else(|| name_from_url(url))
    } else {
        name
    };

    M3uChannel {
        name,
        url: url.to_string(),
        group: take("group-title").or(extgrp),
        tvg_id: take("tvg-id").or_else(|| take("channel-id")),
        tvg_logo: take("tvg-logo"),
        tvg_name,
        tvg_country: take("tvg-country"),
        line,
    }
}

/// Split an EXTINF payload into attributes and display name
///
/// The name is whatever follows the first comma after the last quoted
/// attribute, which copes with stray quotes and with attributes placed after
/// the duration comma.
fn parse_extinf(info: &str) -> (HashMap<String, String>, String) {
    let mut attrs = HashMap::new();
    let mut attrs_end = 0;

    for caps in QUOTED_ATTR.captures_iter(info) {
        let key = caps[1].to_lowercase();
        attrs.entry(key).or_insert_with(|| caps[2].trim().to_string());
        if let Some(m) = caps.get(0) {
            attrs_end = m.end();
        }
    }

    let (header, name) = match info[attrs_end..].find(',') {
        Some(pos) => (&info[..attrs_end + pos], info[attrs_end + pos + 1..].trim()),
        None => (info, ""),
    };

    for caps in UNQUOTED_ATTR.captures_iter(header) {
        let key = caps[1].to_lowercase();
        attrs.entry(key).or_insert_with(|| caps[2].to_string());
    }

    (attrs, name.to_string())
}

/// Extract attribute from #EXTM3U header line
fn extract_header_attr(line: &str, attr_name: &str) -> Option<String> {
    let search = format!("{}=\"", attr_name);
    // ASCII folding keeps byte offsets valid for slicing `line`
    let start = line.to_ascii_lowercase().find(&search)?;
    let rest = &line[start + search.len()..];
    let end = rest.find('"')?;
    let value = rest[..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn looks_like_url(line: &str) -> bool {
    line.contains("://") || line.starts_with('/')
}

/// Last path segment of a url without its extension
pub(crate) fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next().unwrap_or(path);
    let stem = match segment.rfind('.') {
        Some(pos) if pos > 0 => &segment[..pos],
        _ => segment,
    };
    if stem.is_empty() {
        "Unknown".to_string()
    } else {
        stem.to_string()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
#[path = "m3u_parser_tests.rs"]
mod tests;
