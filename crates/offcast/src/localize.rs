//! Metadata loading: the parse → select → plan → rewrite sequence.
//!
//! This is a blocking sequence of HTTP GETs from the caller's perspective
//! (each bounded by the configured per-request timeout); callers run it off
//! any latency-sensitive thread by awaiting it on the runtime.

use offcast_core::TaskType;
use offcast_hls::{
    parse_master_playlist, parse_media_playlist, rewrite, select_streams, DeviceCapabilities,
    ItemPlan, LoadedMedia, LoadedSelection, MediaPlaylistDoc, MediaSpec, Planner,
    SelectionOptions,
};
use offcast_net::HttpClient;
use tracing::{debug, info};
use url::Url;

use crate::error::{OffcastError, OffcastResult};

/// Everything `load_metadata` produces for one item: the plan plus the
/// localized playlists ready to be written into the item directory.
pub(crate) struct Localized {
    pub plan: ItemPlan,
    pub master_text: String,
    /// `(item-root-relative path, content)` per rewritten media playlist.
    pub media_playlists: Vec<(String, String)>,
}

pub(crate) struct MetadataLoader<'a> {
    pub client: &'a HttpClient,
    pub options: &'a SelectionOptions,
    pub caps: &'a DeviceCapabilities,
    pub planner: Planner,
}

impl MetadataLoader<'_> {
    pub(crate) async fn load(&self, item_id: &str, master_url: &Url) -> OffcastResult<Localized> {
        let master_text = self.fetch_playlist_text(master_url).await?;
        let master = parse_master_playlist(&master_text, master_url)?;
        let selection = select_streams(&master, self.options, self.caps)?;

        let video_doc = self.fetch_media_doc(&selection.video.uri).await?;
        let audio = self.load_media_set(&selection.audio).await?;
        let text = self.load_media_set(&selection.text).await?;

        let loaded = LoadedSelection {
            video: selection.video,
            video_doc,
            audio,
            text,
        };

        let plan = self.planner.plan(item_id, &loaded);

        let localized_master = rewrite::rewrite_master(&master, &loaded);
        let mut media_playlists = vec![(
            rewrite::media_playlist_rel_path(TaskType::Video, &loaded.video_doc),
            rewrite::rewrite_media(&loaded.video_doc),
        )];
        for audio in &loaded.audio {
            media_playlists.push((
                rewrite::media_playlist_rel_path(TaskType::Audio, &audio.doc),
                rewrite::rewrite_media(&audio.doc),
            ));
        }
        for text in &loaded.text {
            media_playlists.push((
                rewrite::media_playlist_rel_path(TaskType::Text, &text.doc),
                rewrite::rewrite_media(&text.doc),
            ));
        }

        info!(
            item_id,
            tasks = plan.tasks.len(),
            estimated_size = plan.estimated_size,
            playlists = media_playlists.len(),
            "metadata loaded"
        );

        Ok(Localized {
            plan,
            master_text: localized_master,
            media_playlists,
        })
    }

    /// Renditions without their own URI (e.g. audio muxed into the video
    /// segments) have nothing separate to download and are skipped.
    async fn load_media_set(&self, specs: &[MediaSpec]) -> OffcastResult<Vec<LoadedMedia>> {
        let mut loaded = Vec::with_capacity(specs.len());
        for spec in specs {
            let Some(uri) = &spec.uri else {
                debug!(name = %spec.name, "rendition has no URI, nothing to fetch");
                continue;
            };
            loaded.push(LoadedMedia {
                spec: spec.clone(),
                doc: self.fetch_media_doc(uri).await?,
            });
        }
        Ok(loaded)
    }

    async fn fetch_media_doc(&self, url: &Url) -> OffcastResult<MediaPlaylistDoc> {
        let text = self.fetch_playlist_text(url).await?;
        Ok(parse_media_playlist(&text, url)?)
    }

    async fn fetch_playlist_text(&self, url: &Url) -> OffcastResult<String> {
        let bytes = self.client.get_bytes(url).await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| OffcastError::MalformedPlaylist(format!("{url}: not valid UTF-8")))
    }
}
