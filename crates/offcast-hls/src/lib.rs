#![forbid(unsafe_code)]

//! HLS localizer for offcast.
//!
//! Turns a remote master playlist into a local download plan:
//!
//! 1. [`parse`] tokenizes master and media playlists, keeping enough raw
//!    text for the rewriter to do faithful line-level transforms.
//! 2. [`select`] picks one video rendition and the audio/subtitle sets the
//!    caller's options and the device's capabilities allow.
//! 3. [`plan`] enumerates every byte to fetch (segments, init maps, AES-128
//!    keys) with deterministic on-disk destinations.
//! 4. [`rewrite`] emits the localized playlists whose URIs resolve against
//!    the same layout the planner promised.
//!
//! The destination scheme in [`dest`] is the contract between the last two
//! steps: both hash the same absolute source URL the same way.

pub mod dest;
mod error;
pub mod lang;
pub mod parse;
pub mod plan;
pub mod rewrite;
pub mod select;

pub use error::{HlsError, HlsResult};
pub use parse::{
    parse_master_playlist, parse_media_playlist, KeyTag, MasterPlaylist, MediaKind,
    MediaPlaylistDoc, MediaSpec, Segment, VariantSpec,
};
pub use plan::{ItemPlan, LoadedMedia, LoadedSelection, Planner};
pub use select::{
    select_streams, AudioCodec, DeviceCapabilities, LanguagePolicy, Selection, SelectionOptions,
    VideoCodec,
};
