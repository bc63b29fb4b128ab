//! Rendition selection.
//!
//! Picks exactly one video variant plus the audio/subtitle renditions the
//! caller's options and the device's capabilities allow. Every sort in this
//! module is stable and every tie breaks by input order, so repeated runs
//! over the same master playlist select the same streams.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    error::{HlsError, HlsResult},
    lang,
    parse::{MasterPlaylist, MediaKind, MediaSpec, VariantSpec},
};

const DEFAULT_H264_BITRATE_FLOOR: u64 = 180_000;
const DEFAULT_HEVC_BITRATE_FLOOR: u64 = 120_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    H264,
    Hevc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Mp4a,
    Ac3,
    Eac3,
}

impl AudioCodec {
    /// Classify one entry of a `CODECS` list as an audio codec.
    fn from_codec_string(codec: &str) -> Option<Self> {
        if codec.starts_with("mp4a") {
            Some(AudioCodec::Mp4a)
        } else if codec.starts_with("ac-3") {
            Some(AudioCodec::Ac3)
        } else if codec.starts_with("ec-3") {
            Some(AudioCodec::Eac3)
        } else {
            None
        }
    }
}

/// Which renditions of one media type to keep.
#[derive(Clone, Debug)]
pub enum LanguagePolicy {
    /// Keep every rendition in the participating group.
    All,
    /// Keep renditions whose canonicalized language is listed. Renditions
    /// with no declared language are always kept. An empty list keeps
    /// nothing.
    List(Vec<String>),
}

impl LanguagePolicy {
    pub fn none() -> Self {
        LanguagePolicy::List(Vec::new())
    }

    fn accepts(&self, language: Option<&str>) -> bool {
        match self {
            LanguagePolicy::All => true,
            LanguagePolicy::List(wanted) => {
                if wanted.is_empty() {
                    return false;
                }
                match language {
                    None => true,
                    Some(tag) => wanted.iter().any(|want| lang::tags_match(want, tag)),
                }
            }
        }
    }
}

/// What the device can actually decode.
#[derive(Clone, Debug)]
pub struct DeviceCapabilities {
    pub hardware_hevc: bool,
    pub software_hevc: bool,
    pub ac3: bool,
    pub eac3: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            hardware_hevc: false,
            software_hevc: true,
            ac3: false,
            eac3: false,
        }
    }
}

/// Caller-supplied selection constraints.
#[derive(Clone, Debug)]
pub struct SelectionOptions {
    pub min_video_width: Option<u32>,
    pub min_video_height: Option<u32>,
    /// Per-codec bitrate floors in bits/sec; defaults apply when unset.
    pub min_video_bitrate: HashMap<VideoCodec, u64>,
    pub preferred_video_codecs: Vec<VideoCodec>,
    pub preferred_audio_codecs: Vec<AudioCodec>,
    /// Allow software HEVC decoding when the device lacks a hardware path.
    pub allow_inefficient_codecs: bool,
    pub audio_languages: LanguagePolicy,
    pub text_languages: LanguagePolicy,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            min_video_width: None,
            min_video_height: None,
            min_video_bitrate: HashMap::new(),
            preferred_video_codecs: Vec::new(),
            preferred_audio_codecs: Vec::new(),
            allow_inefficient_codecs: false,
            audio_languages: LanguagePolicy::All,
            text_languages: LanguagePolicy::All,
        }
    }
}

/// The frozen result: one video rendition plus audio/text sets.
#[derive(Clone, Debug)]
pub struct Selection {
    pub video: VariantSpec,
    pub audio: Vec<MediaSpec>,
    pub text: Vec<MediaSpec>,
}

/// Select streams from a parsed master playlist.
pub fn select_streams(
    master: &MasterPlaylist,
    options: &SelectionOptions,
    caps: &DeviceCapabilities,
) -> HlsResult<Selection> {
    let video = select_video(master, options, caps)?;

    let audio = select_media(
        master,
        MediaKind::Audio,
        video.audio_group.as_deref(),
        &options.audio_languages,
    );
    let text = select_media(
        master,
        MediaKind::Subtitles,
        video.subtitles_group.as_deref(),
        &options.text_languages,
    );

    debug!(
        video_bandwidth = video.bandwidth,
        audio = audio.len(),
        text = text.len(),
        "selected renditions"
    );

    Ok(Selection { video, audio, text })
}

fn audio_codec_playable(
    codec: AudioCodec,
    options: &SelectionOptions,
    caps: &DeviceCapabilities,
) -> bool {
    let device_ok = match codec {
        AudioCodec::Mp4a => true,
        AudioCodec::Ac3 => caps.ac3,
        AudioCodec::Eac3 => caps.eac3,
    };
    let preference_ok = options.preferred_audio_codecs.is_empty()
        || options.preferred_audio_codecs.contains(&codec);
    device_ok && preference_ok
}

fn hevc_allowed(options: &SelectionOptions, caps: &DeviceCapabilities) -> bool {
    caps.hardware_hevc || (caps.software_hevc && options.allow_inefficient_codecs)
}

fn select_video(
    master: &MasterPlaylist,
    options: &SelectionOptions,
    caps: &DeviceCapabilities,
) -> HlsResult<VariantSpec> {
    // 1. Eliminate variants whose declared audio codec the device cannot play.
    let playable: Vec<&VariantSpec> = master
        .variants
        .iter()
        .filter(|v| {
            v.codecs
                .iter()
                .filter_map(|c| AudioCodec::from_codec_string(c))
                .all(|c| audio_codec_playable(c, options, caps))
        })
        .collect();

    // 2. Bucket by video codec. Undeclared codecs count as H.264.
    let mut h264: Vec<VariantSpec> = Vec::new();
    let mut hevc: Vec<VariantSpec> = Vec::new();
    for variant in &playable {
        let has_avc = variant.codecs.iter().any(|c| c.starts_with("avc1"));
        let has_hevc = variant
            .codecs
            .iter()
            .any(|c| c.starts_with("hvc1") || c.starts_with("hev1"));

        if variant.codecs.is_empty() || has_avc {
            h264.push((*variant).clone());
        }
        if has_hevc && hevc_allowed(options, caps) {
            hevc.push((*variant).clone());
        }
    }

    // 3. Dimensional filters, height then width.
    for bucket in [&mut h264, &mut hevc] {
        refine_by_dimension(bucket, options.min_video_height, VariantSpec::height);
        refine_by_dimension(bucket, options.min_video_width, VariantSpec::width);
    }

    // 4. Per-codec bitrate floors.
    let h264_floor = options
        .min_video_bitrate
        .get(&VideoCodec::H264)
        .copied()
        .unwrap_or(DEFAULT_H264_BITRATE_FLOOR);
    let hevc_floor = options
        .min_video_bitrate
        .get(&VideoCodec::Hevc)
        .copied()
        .unwrap_or(DEFAULT_HEVC_BITRATE_FLOOR);
    refine_by_bitrate(&mut h264, h264_floor);
    refine_by_bitrate(&mut hevc, hevc_floor);

    // 5. Pick one.
    match (h264.is_empty(), hevc.is_empty()) {
        (true, true) => Err(HlsError::NoPlayableVariant(
            "no variant passed codec and capability filters".into(),
        )),
        (false, true) => Ok(h264.swap_remove(0)),
        (true, false) => Ok(hevc.swap_remove(0)),
        (false, false) => match options.preferred_video_codecs.first() {
            Some(VideoCodec::H264) => Ok(h264.swap_remove(0)),
            Some(VideoCodec::Hevc) | None => Ok(hevc.swap_remove(0)),
        },
    }
}

/// Keep variants at or above the minimum for one dimension; when that empties
/// the bucket, fall back to the single largest variant.
fn refine_by_dimension(
    bucket: &mut Vec<VariantSpec>,
    min: Option<u32>,
    dimension: fn(&VariantSpec) -> u32,
) {
    let Some(min) = min else { return };
    if bucket.is_empty() {
        return;
    }

    bucket.sort_by_key(dimension);
    let largest = bucket.last().cloned();
    let kept: Vec<VariantSpec> = bucket
        .iter()
        .filter(|v| dimension(v) >= min)
        .cloned()
        .collect();

    *bucket = if kept.is_empty() {
        largest.into_iter().collect()
    } else {
        kept
    };
}

/// Keep variants at or above the bitrate floor; on empty, keep the single
/// highest-bandwidth variant.
fn refine_by_bitrate(bucket: &mut Vec<VariantSpec>, floor: u64) {
    if bucket.is_empty() {
        return;
    }

    bucket.sort_by_key(|v| v.bandwidth);
    let highest = bucket.last().cloned();
    let kept: Vec<VariantSpec> = bucket
        .iter()
        .filter(|v| v.bandwidth >= floor)
        .cloned()
        .collect();

    *bucket = if kept.is_empty() {
        highest.into_iter().collect()
    } else {
        kept
    };
}

/// Only media sharing the chosen variant's group participate; within the
/// group the language policy decides.
fn select_media(
    master: &MasterPlaylist,
    kind: MediaKind,
    group: Option<&str>,
    policy: &LanguagePolicy,
) -> Vec<MediaSpec> {
    let Some(group) = group else {
        return Vec::new();
    };

    master
        .media
        .iter()
        .filter(|m| m.kind == kind && m.group_id == group)
        .filter(|m| policy.accepts(m.language.as_deref()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use url::Url;

    use super::*;

    fn variant(bandwidth: u64, resolution: Option<(u32, u32)>, codecs: &[&str]) -> VariantSpec {
        VariantSpec {
            uri: Url::parse(&format!("https://cdn.example.com/v{bandwidth}.m3u8")).unwrap(),
            bandwidth,
            resolution,
            codecs: codecs.iter().map(|c| c.to_string()).collect(),
            audio_group: Some("aud".into()),
            subtitles_group: Some("sub".into()),
        }
    }

    fn media(kind: MediaKind, group: &str, language: Option<&str>, name: &str) -> MediaSpec {
        MediaSpec {
            kind,
            group_id: group.into(),
            language: language.map(str::to_owned),
            name: name.into(),
            default: false,
            autoselect: true,
            forced: false,
            bandwidth: None,
            uri: Some(
                Url::parse(&format!("https://cdn.example.com/{group}/{name}.m3u8")).unwrap(),
            ),
        }
    }

    fn master(variants: Vec<VariantSpec>, media: Vec<MediaSpec>) -> MasterPlaylist {
        MasterPlaylist {
            url: Url::parse("https://cdn.example.com/master.m3u8").unwrap(),
            variants,
            media,
            session_keys: Vec::new(),
        }
    }

    fn hw_hevc() -> DeviceCapabilities {
        DeviceCapabilities {
            hardware_hevc: true,
            ..DeviceCapabilities::default()
        }
    }

    #[test]
    fn bitrate_floor_picks_lowest_variant_at_or_above() {
        // Two H.264 variants at 200k and 600k with a 100 bit/s floor:
        // both pass, lowest wins.
        let m = master(
            vec![
                variant(600_000, None, &["avc1.64001f"]),
                variant(200_000, None, &["avc1.64001f"]),
            ],
            vec![],
        );
        let mut options = SelectionOptions::default();
        options.min_video_bitrate.insert(VideoCodec::H264, 100);

        let selection = select_streams(&m, &options, &DeviceCapabilities::default()).unwrap();
        assert_eq!(selection.video.bandwidth, 200_000);
    }

    #[test]
    fn hardware_hevc_preferred_over_avc_by_default() {
        let m = master(
            vec![
                variant(800_000, Some((1280, 720)), &["avc1.64001f"]),
                variant(700_000, Some((1280, 720)), &["hvc1.1.6.L120.90"]),
            ],
            vec![],
        );

        let selection = select_streams(&m, &SelectionOptions::default(), &hw_hevc()).unwrap();
        assert!(selection.video.codecs[0].starts_with("hvc1"));
    }

    #[test]
    fn hevc_excluded_without_hardware_or_permission() {
        let m = master(
            vec![
                variant(800_000, Some((1280, 720)), &["avc1.64001f"]),
                variant(1_600_000, Some((1280, 720)), &["hvc1.1.6.L120.90"]),
            ],
            vec![],
        );
        let caps = DeviceCapabilities {
            hardware_hevc: false,
            software_hevc: true,
            ..DeviceCapabilities::default()
        };
        let options = SelectionOptions {
            allow_inefficient_codecs: false,
            ..SelectionOptions::default()
        };

        let selection = select_streams(&m, &options, &caps).unwrap();
        assert!(selection.video.codecs[0].starts_with("avc1"));
    }

    #[test]
    fn software_hevc_usable_when_permitted() {
        let m = master(
            vec![variant(700_000, None, &["hvc1.1.6.L120.90"])],
            vec![],
        );
        let caps = DeviceCapabilities {
            hardware_hevc: false,
            software_hevc: true,
            ..DeviceCapabilities::default()
        };

        let none = select_streams(&m, &SelectionOptions::default(), &caps);
        assert!(matches!(none, Err(HlsError::NoPlayableVariant(_))));

        let options = SelectionOptions {
            allow_inefficient_codecs: true,
            ..SelectionOptions::default()
        };
        let selection = select_streams(&m, &options, &caps).unwrap();
        assert_eq!(selection.video.bandwidth, 700_000);
    }

    #[test]
    fn unplayable_audio_codec_eliminates_variant() {
        let m = master(
            vec![
                variant(900_000, None, &["avc1.64001f", "ec-3"]),
                variant(800_000, None, &["avc1.64001f", "mp4a.40.2"]),
            ],
            vec![],
        );
        // E-AC-3 unsupported by default capabilities.
        let selection =
            select_streams(&m, &SelectionOptions::default(), &DeviceCapabilities::default())
                .unwrap();
        assert_eq!(selection.video.bandwidth, 800_000);
    }

    #[test]
    fn caller_codec_preference_beats_hevc_default() {
        let m = master(
            vec![
                variant(800_000, None, &["avc1.64001f"]),
                variant(700_000, None, &["hvc1.1.6.L120.90"]),
            ],
            vec![],
        );
        let options = SelectionOptions {
            preferred_video_codecs: vec![VideoCodec::H264],
            ..SelectionOptions::default()
        };

        let selection = select_streams(&m, &options, &hw_hevc()).unwrap();
        assert!(selection.video.codecs[0].starts_with("avc1"));
    }

    #[test]
    fn dimension_filter_keeps_largest_on_empty() {
        let m = master(
            vec![
                variant(300_000, Some((640, 360)), &["avc1.64001f"]),
                variant(600_000, Some((960, 540)), &["avc1.64001f"]),
            ],
            vec![],
        );
        let options = SelectionOptions {
            min_video_height: Some(1080),
            ..SelectionOptions::default()
        };

        // No variant reaches 1080p; best-effort fallback keeps the largest.
        let selection =
            select_streams(&m, &options, &DeviceCapabilities::default()).unwrap();
        assert_eq!(selection.video.resolution, Some((960, 540)));
    }

    #[test]
    fn dimension_filter_keeps_smallest_satisfying_variant() {
        let m = master(
            vec![
                variant(900_000, Some((1920, 1080)), &["avc1.64001f"]),
                variant(600_000, Some((1280, 720)), &["avc1.64001f"]),
                variant(300_000, Some((640, 360)), &["avc1.64001f"]),
            ],
            vec![],
        );
        let options = SelectionOptions {
            min_video_height: Some(720),
            ..SelectionOptions::default()
        };

        let selection =
            select_streams(&m, &options, &DeviceCapabilities::default()).unwrap();
        assert_eq!(selection.video.resolution, Some((1280, 720)));
    }

    fn language_fixture() -> MasterPlaylist {
        master(
            vec![variant(800_000, None, &["avc1.64001f", "mp4a.40.2"])],
            vec![
                media(MediaKind::Audio, "aud", Some("en-US"), "English"),
                media(MediaKind::Audio, "aud", Some("de"), "Deutsch"),
                media(MediaKind::Audio, "aud", None, "Commentary"),
                media(MediaKind::Audio, "other", Some("en-US"), "Other group"),
                media(MediaKind::Subtitles, "sub", Some("fr"), "Francais"),
            ],
        )
    }

    #[test]
    fn all_policy_keeps_group_members_only() {
        let selection = select_streams(
            &language_fixture(),
            &SelectionOptions::default(),
            &DeviceCapabilities::default(),
        )
        .unwrap();

        // "Other group" does not share the variant's AUDIO group.
        assert_eq!(selection.audio.len(), 3);
        assert!(selection.audio.iter().all(|a| a.group_id == "aud"));
        assert_eq!(selection.text.len(), 1);
    }

    #[test]
    fn language_list_matches_canonicalized_tags_and_keeps_untagged() {
        let options = SelectionOptions {
            audio_languages: LanguagePolicy::List(vec!["EN-us".into()]),
            text_languages: LanguagePolicy::none(),
            ..SelectionOptions::default()
        };
        let selection = select_streams(
            &language_fixture(),
            &options,
            &DeviceCapabilities::default(),
        )
        .unwrap();

        let names: Vec<&str> = selection.audio.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["English", "Commentary"]);
        assert!(selection.text.is_empty());
    }

    #[test]
    fn empty_list_policy_selects_nothing() {
        let options = SelectionOptions {
            audio_languages: LanguagePolicy::none(),
            text_languages: LanguagePolicy::none(),
            ..SelectionOptions::default()
        };
        let selection = select_streams(
            &language_fixture(),
            &options,
            &DeviceCapabilities::default(),
        )
        .unwrap();

        assert!(selection.audio.is_empty());
        assert!(selection.text.is_empty());
    }

    #[test]
    fn variant_without_group_selects_no_media() {
        let mut v = variant(800_000, None, &["avc1.64001f"]);
        v.audio_group = None;
        v.subtitles_group = None;
        let m = master(
            vec![v],
            vec![media(MediaKind::Audio, "aud", Some("en"), "English")],
        );

        let selection =
            select_streams(&m, &SelectionOptions::default(), &DeviceCapabilities::default())
                .unwrap();
        assert!(selection.audio.is_empty());
        assert!(selection.text.is_empty());
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some("en-US"), true)]
    #[case(Some("de"), false)]
    fn list_policy_acceptance(#[case] language: Option<&str>, #[case] expected: bool) {
        let policy = LanguagePolicy::List(vec!["en-us".into()]);
        assert_eq!(policy.accepts(language), expected);
    }

    #[test]
    fn selection_is_reproducible() {
        let m = language_fixture();
        let options = SelectionOptions::default();
        let caps = DeviceCapabilities::default();

        let a = select_streams(&m, &options, &caps).unwrap();
        let b = select_streams(&m, &options, &caps).unwrap();
        assert_eq!(a.video.uri, b.video.uri);
        let names = |s: &Selection| {
            s.audio
                .iter()
                .map(|m| m.name.clone())
                .collect::<Vec<String>>()
        };
        assert_eq!(names(&a), names(&b));
    }
}
