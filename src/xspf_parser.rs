//! XSPF channel lists
//!
//! A few providers publish their catalogue as an XSPF document instead of
//! M3U. Tracks are read into [`XspfTrack`] and then mapped onto the same raw
//! entries the M3U parser yields, so everything downstream sees one shape.

use crate::m3u_parser::{name_from_url, M3uChannel};
use crate::{Error, Result};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// One `<track>` of a channel list
#[derive(Debug, Clone, Default)]
pub struct XspfTrack {
    /// Stream url, first `<location>` only
    pub location: String,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub album: Option<String>,
    pub annotation: Option<String>,
    /// Channel logo
    pub image: Option<String>,
    pub track_num: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct XspfPlaylist {
    pub title: Option<String>,
    pub creator: Option<String>,
    pub annotation: Option<String>,
    pub tracks: Vec<XspfTrack>,
}

/// Sniff the first few KiB for an XSPF root element
pub fn is_xspf(content: &str) -> bool {
    let head: String = content.trim_start().chars().take(4096).collect();
    head.contains("<playlist")
        && (head.contains("http://xspf.org/ns/0/") || content.contains("<trackList"))
}

/// Parse a channel list, rejecting unbalanced or truncated documents
pub fn parse_xspf(content: &str) -> Result<XspfPlaylist> {
    if !content.contains("<playlist") || !content.contains("<trackList") {
        return Err(Error::parse("not a valid XSPF playlist"));
    }

    let mut reader = Reader::from_str(content);
    let mut playlist = XspfPlaylist::default();
    // Local names of the currently open elements
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut track: Option<XspfTrack> = None;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "track" && parent_is(&path, "trackList") {
                    track = Some(XspfTrack::default());
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Text(ref e)) => {
                text.push_str(&decode_xml_entities(&String::from_utf8_lossy(e.as_ref())));
            }
            Ok(Event::CData(ref e)) => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(ref e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                text.push_str(&decode_xml_entities(&format!("&{};", entity)));
            }
            Ok(Event::End(_)) => {
                let Some(name) = path.pop() else {
                    return Err(Error::parse(format!("XSPF: unbalanced end tag at byte {}", position)));
                };
                let value = text.trim();
                let value = (!value.is_empty()).then(|| value.to_string());

                if name == "track" && parent_is(&path, "trackList") {
                    if let Some(done) = track.take() {
                        if !done.location.is_empty() {
                            playlist.tracks.push(done);
                        }
                    }
                } else if parent_is(&path, "track") {
                    if let Some(ref mut current) = track {
                        assign_track_field(current, &name, value);
                    }
                } else if parent_is(&path, "playlist") {
                    match name.as_str() {
                        "title" => playlist.title = value,
                        "creator" => playlist.creator = value,
                        "annotation" => playlist.annotation = value,
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => {
                if let Some(open) = path.last() {
                    return Err(Error::parse(format!("XSPF: unclosed <{}> at end of document", open)));
                }
                break;
            }
            Err(e) => {
                return Err(Error::parse(format!("XSPF: XML error at byte {}: {}", position, e)));
            }
            _ => {}
        }
    }

    Ok(playlist)
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|p| p == name)
}

fn assign_track_field(track: &mut XspfTrack, field: &str, value: Option<String>) {
    match field {
        // First location wins when a track lists alternates
        "location" => {
            if track.location.is_empty() {
                if let Some(v) = value {
                    track.location = v;
                }
            }
        }
        "title" => track.title = value,
        "creator" => track.creator = value,
        "album" => track.album = value,
        "annotation" => track.annotation = value,
        "image" => track.image = value,
        "trackNum" => track.track_num = value.and_then(|n| n.parse().ok()),
        _ => {}
    }
}

/// Named and numeric character references
fn decode_xml_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        result.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            result.push_str(tail);
            return result;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => result.push(c),
            None => result.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    result.push_str(rest);
    result
}

/// Tracks as raw playlist entries
///
/// Untitled tracks are named after their url; the group comes from
/// creator/album, falling back to the playlist title.
pub fn to_m3u_channels(playlist: &XspfPlaylist) -> Vec<M3uChannel> {
    playlist
        .tracks
        .iter()
        .enumerate()
        .map(|(idx, track)| {
            let name = track
                .title
                .clone()
                .unwrap_or_else(|| name_from_url(&track.location));

            let group = match (&track.creator, &track.album) {
                (Some(creator), Some(album)) => Some(format!("{} - {}", creator, album)),
                (Some(creator), None) => Some(creator.clone()),
                (None, Some(album)) => Some(album.clone()),
                (None, None) => playlist.title.clone(),
            };

            M3uChannel {
                name,
                url: track.location.clone(),
                group,
                tvg_id: None,
                tvg_logo: track.image.clone(),
                tvg_name: track.title.clone(),
                tvg_country: None,
                line: idx + 1,
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "xspf_parser_tests.rs"]
mod tests;
