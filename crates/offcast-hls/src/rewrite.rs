//! Playlist rewriting.
//!
//! Emits the localized playlists. The master is synthesized from the
//! selection alone; each media playlist is a line-by-line transform of the
//! original text, so every tag the parser did not understand survives
//! verbatim. URI replacements reuse [`crate::dest`], which is the same
//! derivation the planner used, keeping playlist references and task
//! destinations in lockstep.

use offcast_core::TaskType;
use url::Url;

use crate::{
    dest,
    parse::{parse_attributes, KeyTag, MasterPlaylist, MediaPlaylistDoc, MediaSpec},
    plan::LoadedSelection,
};

/// Item-root-relative path of a rewritten media playlist.
pub fn media_playlist_rel_path(task_type: TaskType, doc: &MediaPlaylistDoc) -> String {
    dest::destination_rel_path(task_type, &doc.url)
}

/// Synthesize the localized master playlist.
pub fn rewrite_master(master: &MasterPlaylist, selection: &LoadedSelection) -> String {
    let mut out = String::from("#EXTM3U\n");

    for line in &master.session_keys {
        out.push_str(line);
        out.push('\n');
    }

    let video = &selection.video;
    let mut attrs = vec![format!("BANDWIDTH={}", video.bandwidth)];
    if let Some((w, h)) = video.resolution {
        attrs.push(format!("RESOLUTION={w}x{h}"));
    }
    if let (Some(group), false) = (&video.audio_group, selection.audio.is_empty()) {
        attrs.push(format!("AUDIO=\"{group}\""));
    }
    if let (Some(group), false) = (&video.subtitles_group, selection.text.is_empty()) {
        attrs.push(format!("SUBTITLES=\"{group}\""));
    }
    if !video.codecs.is_empty() {
        attrs.push(format!("CODECS=\"{}\"", video.codecs.join(",")));
    }
    out.push_str(&format!("#EXT-X-STREAM-INF:{}\n", attrs.join(",")));
    out.push_str(&media_playlist_rel_path(TaskType::Video, &selection.video_doc));
    out.push('\n');

    for audio in &selection.audio {
        out.push_str(&media_tag_line(&audio.spec, TaskType::Audio, &audio.doc));
        out.push('\n');
    }
    for text in &selection.text {
        out.push_str(&media_tag_line(&text.spec, TaskType::Text, &text.doc));
        out.push('\n');
    }

    out
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

fn media_tag_line(spec: &MediaSpec, task_type: TaskType, doc: &MediaPlaylistDoc) -> String {
    let mut attrs = vec![
        format!("TYPE={}", spec.kind.as_attr_value()),
        format!("AUTOSELECT={}", yes_no(spec.autoselect)),
        format!("DEFAULT={}", yes_no(spec.default)),
    ];
    if let Some(language) = &spec.language {
        attrs.push(format!("LANGUAGE=\"{language}\""));
    }
    attrs.push(format!("GROUP-ID=\"{}\"", spec.group_id));
    attrs.push(format!("NAME=\"{}\"", spec.name));
    attrs.push(format!("FORCED={}", yes_no(spec.forced)));
    if let Some(bandwidth) = spec.bandwidth {
        if bandwidth > 0 {
            attrs.push(format!("BANDWIDTH={bandwidth}"));
        }
    }
    attrs.push(format!(
        "URI=\"{}\"",
        media_playlist_rel_path(task_type, doc)
    ));

    format!("#EXT-X-MEDIA:{}", attrs.join(","))
}

/// Replace the value of a quoted `URI="..."` attribute within a tag line.
fn replace_uri_attr(line: &str, new_value: &str) -> String {
    let Some(start) = line.find("URI=\"") else {
        return line.to_owned();
    };
    let value_start = start + "URI=\"".len();
    let Some(end) = line[value_start..].find('"') else {
        return line.to_owned();
    };

    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..value_start]);
    out.push_str(new_value);
    out.push_str(&line[value_start + end..]);
    out
}

fn rewrite_key_line(line: &str, rest: &str, base: &Url) -> String {
    let attrs = parse_attributes(rest);
    let tag = KeyTag {
        line: line.to_owned(),
        byte_offset: 0,
        method: attrs
            .iter()
            .find(|(k, _)| k == "METHOD")
            .map(|(_, v)| v.clone())
            .unwrap_or_default(),
        url: None,
        iv: None,
        key_format: attrs
            .iter()
            .find(|(k, _)| k == "KEYFORMAT")
            .map(|(_, v)| v.clone()),
    };

    if !tag.is_fetchable_aes() {
        return line.to_owned();
    }

    let Some(uri) = attrs.iter().find(|(k, _)| k == "URI").map(|(_, v)| v) else {
        return line.to_owned();
    };
    let Ok(key_url) = base.join(uri) else {
        return line.to_owned();
    };

    replace_uri_attr(line, &format!("../key/{}", dest::dest_file_name(&key_url)))
}

/// Line-by-line transform of a media playlist.
///
/// Segment URIs become same-directory `<md5>.<ext>` references, the
/// `#EXT-X-MAP` URI is rewritten in place, AES-128 key URIs point into the
/// sibling `key/` directory, all other lines pass through verbatim, and
/// blank lines are dropped.
pub fn rewrite_media(doc: &MediaPlaylistDoc) -> String {
    let mut out = String::with_capacity(doc.raw.len());

    for raw_line in doc.raw.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXT-X-KEY:") {
            out.push_str(&rewrite_key_line(line, rest, &doc.url));
        } else if line.starts_with("#EXT-X-MAP:") {
            match &doc.map_url {
                Some(map_url) => {
                    out.push_str(&replace_uri_attr(line, &dest::dest_file_name(map_url)));
                }
                None => out.push_str(line),
            }
        } else if !line.starts_with('#') {
            match doc.url.join(line) {
                Ok(segment_url) => out.push_str(&dest::dest_file_name(&segment_url)),
                Err(_) => out.push_str(line),
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }

    out
}
