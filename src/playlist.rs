//! Playlist text to structured channel records
//!
//! Format detection, title cleanup, quality extraction and stable id
//! assignment on top of the raw M3U/XSPF parsers.

use crate::m3u_parser::{self, M3uChannel};
use crate::models::Channel;
use crate::xspf_parser;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static QUALITY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+p)\b").unwrap());
static QUALITY_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d+p\)").unwrap());
static BRACKET_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\[[^\]]*\]").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static TVG_ID_COUNTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.([A-Za-z]{2})(?:@.*)?$").unwrap());

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// Guide url advertised by the playlist header
    pub epg_url: Option<String>,
    pub title: Option<String>,
}

/// Parse playlist text into channels
pub fn parse(text: &str) -> Result<Vec<Channel>> {
    Ok(parse_playlist(text)?.channels)
}

pub fn parse_playlist(text: &str) -> Result<ParsedPlaylist> {
    if xspf_parser::is_xspf(text) {
        let playlist = xspf_parser::parse_xspf(text)?;
        let entries = xspf_parser::to_m3u_channels(&playlist);
        return Ok(ParsedPlaylist {
            channels: to_channels(entries),
            epg_url: None,
            title: playlist.title,
        });
    }

    let playlist = m3u_parser::parse_m3u_playlist(text)?;
    Ok(ParsedPlaylist {
        channels: to_channels(playlist.channels),
        epg_url: playlist.epg_url,
        title: None,
    })
}

fn to_channels(entries: Vec<M3uChannel>) -> Vec<Channel> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let (name, quality) = clean_name(&entry.name);
            let country = entry
                .tvg_country
                .as_deref()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .or_else(|| entry.tvg_id.as_deref().and_then(country_from_tvg_id));

            Channel {
                id: channel_id(entry.tvg_id.as_deref(), &entry.url, index),
                name,
                url: entry.url,
                tvg_id: entry.tvg_id,
                tvg_logo: entry.tvg_logo,
                group: entry.group,
                quality,
                country,
            }
        })
        .collect()
}

/// Cleaned display title and the quality tag it carried
///
/// `"ABC News (720p) [Geo-blocked]"` becomes `("ABC News", Some("720p"))`.
pub fn clean_name(raw: &str) -> (String, Option<String>) {
    let quality = QUALITY_REGEX
        .captures(raw)
        .map(|caps| caps[1].to_string());

    let stripped = QUALITY_STRIP.replace_all(raw, "");
    let stripped = BRACKET_TAG.replace_all(&stripped, "");
    let cleaned = MULTI_SPACE.replace_all(stripped.trim(), " ").into_owned();

    if cleaned.is_empty() {
        (raw.trim().to_string(), quality)
    } else {
        (cleaned, quality)
    }
}

/// External id when supplied, else a hash of the url plus ordinal index
pub fn channel_id(tvg_id: Option<&str>, url: &str, index: usize) -> String {
    match tvg_id.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("ch_{}_{}", url_hash(url), index),
    }
}

/// 31-multiplier rolling string hash; stable across runs and platforms
pub fn url_hash(url: &str) -> u32 {
    let hash: i32 = url.chars().fold(0, |acc, c| {
        ((acc << 5).wrapping_sub(acc)).wrapping_add(c as i32)
    });
    hash.unsigned_abs()
}

/// Country code from an iptv-org style id such as `CNN.us` or `BBCOne.uk@HD`
pub fn country_from_tvg_id(tvg_id: &str) -> Option<String> {
    TVG_ID_COUNTRY
        .captures(tvg_id.trim())
        .map(|caps| caps[1].to_uppercase())
}
