//! Line-oriented HLS playlist parsing.
//!
//! The rewriter needs more fidelity than a typed playlist model usually
//! keeps: verbatim tag lines, the byte offset of every `#EXT-X-KEY`, and
//! the raw document for line-by-line transforms. So this parser stays close
//! to the text: tagged lines plus attribute maps, with relative URIs
//! resolved against the playlist's own URL.

use tracing::trace;
use url::Url;

use crate::error::{HlsError, HlsResult};

/// `KEYFORMAT` value identifying FairPlay session keys. Lines carrying it
/// are preserved verbatim and never fetched.
pub const FAIRPLAY_KEY_FORMAT: &str = "com.apple.streamingkeydelivery";

const TAG_HEADER: &str = "#EXTM3U";
const TAG_STREAM_INF: &str = "#EXT-X-STREAM-INF:";
const TAG_MEDIA: &str = "#EXT-X-MEDIA:";
const TAG_SESSION_KEY: &str = "#EXT-X-SESSION-KEY:";
const TAG_KEY: &str = "#EXT-X-KEY:";
const TAG_MAP: &str = "#EXT-X-MAP:";
const TAG_INF: &str = "#EXTINF:";

/// Parsed master playlist.
#[derive(Clone, Debug)]
pub struct MasterPlaylist {
    /// URL the playlist was fetched from; relative URIs resolve against it.
    pub url: Url,
    pub variants: Vec<VariantSpec>,
    pub media: Vec<MediaSpec>,
    /// FairPlay `#EXT-X-SESSION-KEY` lines, verbatim, for reinjection.
    pub session_keys: Vec<String>,
}

/// One `#EXT-X-STREAM-INF` entry.
#[derive(Clone, Debug)]
pub struct VariantSpec {
    pub uri: Url,
    pub bandwidth: u64,
    pub resolution: Option<(u32, u32)>,
    pub codecs: Vec<String>,
    pub audio_group: Option<String>,
    pub subtitles_group: Option<String>,
}

impl VariantSpec {
    pub fn width(&self) -> u32 {
        self.resolution.map_or(0, |(w, _)| w)
    }

    pub fn height(&self) -> u32 {
        self.resolution.map_or(0, |(_, h)| h)
    }
}

/// Type of an `#EXT-X-MEDIA` rendition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Subtitles,
}

impl MediaKind {
    pub fn as_attr_value(self) -> &'static str {
        match self {
            MediaKind::Audio => "AUDIO",
            MediaKind::Subtitles => "SUBTITLES",
        }
    }
}

/// One `#EXT-X-MEDIA` entry (audio or subtitles).
#[derive(Clone, Debug)]
pub struct MediaSpec {
    pub kind: MediaKind,
    pub group_id: String,
    pub language: Option<String>,
    pub name: String,
    pub default: bool,
    pub autoselect: bool,
    pub forced: bool,
    pub bandwidth: Option<u64>,
    pub uri: Option<Url>,
}

/// One media segment: URI plus `#EXTINF` duration in seconds.
#[derive(Clone, Debug)]
pub struct Segment {
    pub url: Url,
    pub duration: f64,
}

/// An `#EXT-X-KEY` line captured with its position in the document.
#[derive(Clone, Debug)]
pub struct KeyTag {
    /// The verbatim tag line (without the line terminator).
    pub line: String,
    /// Byte offset of the line start within the playlist text.
    pub byte_offset: usize,
    pub method: String,
    /// Resolved key URI, when the tag carries one.
    pub url: Option<Url>,
    pub iv: Option<String>,
    pub key_format: Option<String>,
}

impl KeyTag {
    /// AES-128 with the default (identity) key format: the only keys the
    /// planner fetches. FairPlay and other formats are left untouched.
    pub fn is_fetchable_aes(&self) -> bool {
        self.method == "AES-128"
            && self
                .key_format
                .as_deref()
                .map_or(true, |f| f == "identity")
    }
}

/// Parsed media playlist, raw text retained for rewriting.
#[derive(Clone, Debug)]
pub struct MediaPlaylistDoc {
    pub url: Url,
    pub raw: String,
    pub segments: Vec<Segment>,
    /// `#EXT-X-MAP` initialization segment, if any.
    pub map_url: Option<Url>,
    pub keys: Vec<KeyTag>,
    /// Sum of `#EXTINF` durations, in seconds.
    pub total_duration: f64,
}

/// Split an attribute list, honoring quoted values that contain commas.
///
/// `BANDWIDTH=800000,CODECS="avc1.64001f,mp4a.40.2"` yields two pairs, the
/// second with the quotes stripped.
pub fn parse_attributes(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;

    let mut push_field = |field: &mut String, attrs: &mut Vec<(String, String)>| {
        if field.is_empty() {
            return;
        }
        if let Some((key, value)) = field.split_once('=') {
            let value = value.trim_matches('"');
            attrs.push((key.trim().to_owned(), value.to_owned()));
        }
        field.clear();
    };

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                field.push(c);
            }
            ',' if !in_quotes => push_field(&mut field, &mut attrs),
            _ => field.push(c),
        }
    }
    push_field(&mut field, &mut attrs);

    attrs
}

fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn attr_bool(attrs: &[(String, String)], key: &str) -> bool {
    attr(attrs, key) == Some("YES")
}

fn resolve(base: &Url, uri: &str) -> HlsResult<Url> {
    base.join(uri)
        .map_err(|e| HlsError::InvalidUrl(format!("{uri}: {e}")))
}

fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(['x', 'X'])?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn check_header(text: &str) -> HlsResult<()> {
    let first = text
        .trim_start_matches('\u{feff}')
        .lines()
        .next()
        .unwrap_or("");
    if first.trim_end() != TAG_HEADER {
        return Err(HlsError::MalformedPlaylist(
            "missing #EXTM3U header".into(),
        ));
    }
    Ok(())
}

/// Parse a master playlist.
///
/// Errors with [`HlsError::UnknownPlaylistType`] when handed a media
/// playlist (segments but no variant streams).
pub fn parse_master_playlist(text: &str, url: &Url) -> HlsResult<MasterPlaylist> {
    check_header(text)?;

    let mut variants = Vec::new();
    let mut media = Vec::new();
    let mut session_keys = Vec::new();
    let mut pending_variant: Option<Vec<(String, String)>> = None;
    let mut saw_segment_marker = false;

    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix(TAG_STREAM_INF) {
            pending_variant = Some(parse_attributes(rest));
        } else if let Some(rest) = line.strip_prefix(TAG_MEDIA) {
            if let Some(spec) = parse_media_tag(&parse_attributes(rest), url)? {
                media.push(spec);
            }
        } else if let Some(rest) = line.strip_prefix(TAG_SESSION_KEY) {
            let attrs = parse_attributes(rest);
            if attr(&attrs, "KEYFORMAT") == Some(FAIRPLAY_KEY_FORMAT) {
                session_keys.push(line.to_owned());
            }
        } else if line.starts_with(TAG_INF) {
            saw_segment_marker = true;
        } else if !line.starts_with('#') {
            if let Some(attrs) = pending_variant.take() {
                variants.push(parse_variant(&attrs, line, url)?);
            }
        }
    }

    if variants.is_empty() && saw_segment_marker {
        return Err(HlsError::UnknownPlaylistType(
            "expected a master playlist, found media segments".into(),
        ));
    }

    trace!(
        url = %url,
        variants = variants.len(),
        media = media.len(),
        "parsed master playlist"
    );

    Ok(MasterPlaylist {
        url: url.clone(),
        variants,
        media,
        session_keys,
    })
}

fn parse_variant(attrs: &[(String, String)], uri: &str, base: &Url) -> HlsResult<VariantSpec> {
    let bandwidth = attr(attrs, "BANDWIDTH")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let codecs = attr(attrs, "CODECS")
        .map(|v| {
            v.split(',')
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(VariantSpec {
        uri: resolve(base, uri)?,
        bandwidth,
        resolution: attr(attrs, "RESOLUTION").and_then(parse_resolution),
        codecs,
        audio_group: attr(attrs, "AUDIO").map(str::to_owned),
        subtitles_group: attr(attrs, "SUBTITLES").map(str::to_owned),
    })
}

fn parse_media_tag(attrs: &[(String, String)], base: &Url) -> HlsResult<Option<MediaSpec>> {
    let kind = match attr(attrs, "TYPE") {
        Some("AUDIO") => MediaKind::Audio,
        Some("SUBTITLES") => MediaKind::Subtitles,
        // CLOSED-CAPTIONS and unknown types are not downloadable renditions.
        _ => return Ok(None),
    };

    let uri = match attr(attrs, "URI") {
        Some(u) => Some(resolve(base, u)?),
        None => None,
    };

    Ok(Some(MediaSpec {
        kind,
        group_id: attr(attrs, "GROUP-ID").unwrap_or_default().to_owned(),
        language: attr(attrs, "LANGUAGE").map(str::to_owned),
        name: attr(attrs, "NAME").unwrap_or_default().to_owned(),
        default: attr_bool(attrs, "DEFAULT"),
        autoselect: attr_bool(attrs, "AUTOSELECT"),
        forced: attr_bool(attrs, "FORCED"),
        bandwidth: attr(attrs, "BANDWIDTH").and_then(|v| v.parse().ok()),
        uri,
    }))
}

/// Parse a media playlist, retaining the raw text and the byte offset of
/// every `#EXT-X-KEY` line.
///
/// Errors with [`HlsError::UnknownPlaylistType`] when handed a master
/// playlist.
pub fn parse_media_playlist(text: &str, url: &Url) -> HlsResult<MediaPlaylistDoc> {
    check_header(text)?;

    let mut segments = Vec::new();
    let mut keys = Vec::new();
    let mut map_url = None;
    let mut pending_duration: Option<f64> = None;
    let mut total_duration = 0.0;

    let mut offset = 0usize;
    for raw_line in text.split_inclusive('\n') {
        let line_offset = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if line.is_empty() {
            continue;
        }

        if line.starts_with(TAG_STREAM_INF) {
            return Err(HlsError::UnknownPlaylistType(
                "expected a media playlist, found variant streams".into(),
            ));
        } else if let Some(rest) = line.strip_prefix(TAG_INF) {
            let duration = rest
                .split(',')
                .next()
                .and_then(|d| d.trim().parse::<f64>().ok())
                .ok_or_else(|| {
                    HlsError::MalformedPlaylist(format!("bad #EXTINF duration: {line}"))
                })?;
            pending_duration = Some(duration);
        } else if let Some(rest) = line.strip_prefix(TAG_KEY) {
            let attrs = parse_attributes(rest);
            let key_url = match attr(&attrs, "URI") {
                Some(u) => Some(resolve(url, u)?),
                None => None,
            };
            keys.push(KeyTag {
                line: line.to_owned(),
                byte_offset: line_offset,
                method: attr(&attrs, "METHOD").unwrap_or_default().to_owned(),
                url: key_url,
                iv: attr(&attrs, "IV").map(str::to_owned),
                key_format: attr(&attrs, "KEYFORMAT").map(str::to_owned),
            });
        } else if let Some(rest) = line.strip_prefix(TAG_MAP) {
            let attrs = parse_attributes(rest);
            if let Some(u) = attr(&attrs, "URI") {
                map_url = Some(resolve(url, u)?);
            }
        } else if !line.starts_with('#') {
            let duration = pending_duration.take().unwrap_or(0.0);
            total_duration += duration;
            segments.push(Segment {
                url: resolve(url, line)?,
                duration,
            });
        }
    }

    if segments.is_empty() {
        return Err(HlsError::MalformedPlaylist("no media segments".into()));
    }

    trace!(
        url = %url,
        segments = segments.len(),
        keys = keys.len(),
        "parsed media playlist"
    );

    Ok(MediaPlaylistDoc {
        url: url.clone(),
        raw: text.to_owned(),
        segments,
        map_url,
        keys,
        total_duration,
    })
}
