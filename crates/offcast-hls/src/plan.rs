//! Task planning.
//!
//! Walks the loaded selection and enumerates every fetch the worker must
//! perform: init maps, media segments, and AES-128 keys. Task identity is
//! the source URL within the item, so repeated URIs collapse into one task
//! and two planner runs over the same playlists produce identical lists.

use std::collections::HashSet;
use std::path::Path;

use offcast_core::{DownloadTask, TaskType};
use tracing::debug;
use url::Url;

use crate::{
    dest,
    parse::{MediaPlaylistDoc, MediaSpec, VariantSpec},
};

/// A selected media rendition together with its loaded media playlist.
#[derive(Clone, Debug)]
pub struct LoadedMedia {
    pub spec: MediaSpec,
    pub doc: MediaPlaylistDoc,
}

/// The chosen streams with every media playlist fetched and parsed.
#[derive(Clone, Debug)]
pub struct LoadedSelection {
    pub video: VariantSpec,
    pub video_doc: MediaPlaylistDoc,
    pub audio: Vec<LoadedMedia>,
    pub text: Vec<LoadedMedia>,
}

/// Planner output for one item.
#[derive(Clone, Debug)]
pub struct ItemPlan {
    /// Fetch tasks in dispatch order.
    pub tasks: Vec<DownloadTask>,
    /// Estimated total size in bytes, from declared bandwidths.
    pub estimated_size: u64,
    /// Total media duration in seconds (the video rendition's).
    pub total_duration: f64,
}

/// Enumerates fetch tasks for a loaded selection.
#[derive(Clone, Debug)]
pub struct Planner {
    /// Bits/sec assumed for audio renditions that declare no bandwidth.
    pub audio_bitrate_fallback: u64,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            audio_bitrate_fallback: 128_000,
        }
    }
}

struct TaskSink {
    item_id: String,
    tasks: Vec<DownloadTask>,
    seen: HashSet<String>,
    order: u32,
}

impl TaskSink {
    fn push(&mut self, task_type: TaskType, url: &Url) {
        if !self.seen.insert(url.as_str().to_owned()) {
            return;
        }
        self.tasks.push(DownloadTask {
            item_id: self.item_id.clone(),
            url: url.clone(),
            task_type,
            rel_dest: dest::destination_rel_path(task_type, url),
            order: self.order,
            resume: None,
        });
        self.order += 1;
    }
}

fn estimated_bytes(bandwidth: u64, duration_seconds: f64) -> u64 {
    (bandwidth as f64 * duration_seconds / 8.0) as u64
}

impl Planner {
    /// Produce the full task list and size estimate for an item.
    pub fn plan(&self, item_id: &str, selection: &LoadedSelection) -> ItemPlan {
        let mut sink = TaskSink {
            item_id: item_id.to_owned(),
            tasks: Vec::new(),
            seen: HashSet::new(),
            order: 0,
        };
        let mut estimated_size = 0u64;

        // Video: init map first (order 0), then segments in playlist order.
        plan_stream(&mut sink, TaskType::Video, &selection.video_doc);
        estimated_size += estimated_bytes(
            selection.video.bandwidth,
            selection.video_doc.total_duration,
        );

        for audio in &selection.audio {
            plan_stream(&mut sink, TaskType::Audio, &audio.doc);
            let bandwidth = match audio.spec.bandwidth {
                Some(b) if b > 0 => b,
                _ => self.audio_bitrate_fallback,
            };
            estimated_size += estimated_bytes(bandwidth, audio.doc.total_duration);
        }

        // Subtitles contribute no size estimate.
        for text in &selection.text {
            plan_stream(&mut sink, TaskType::Text, &text.doc);
        }

        // AES-128 keys from every selected stream, FairPlay excluded.
        let docs = std::iter::once(&selection.video_doc)
            .chain(selection.audio.iter().map(|a| &a.doc))
            .chain(selection.text.iter().map(|t| &t.doc));
        for doc in docs {
            for key in &doc.keys {
                if !key.is_fetchable_aes() {
                    continue;
                }
                if let Some(url) = &key.url {
                    sink.push(TaskType::Key, url);
                }
            }
        }

        debug!(
            item_id,
            tasks = sink.tasks.len(),
            estimated_size,
            "planned item"
        );

        ItemPlan {
            tasks: sink.tasks,
            estimated_size,
            total_duration: selection.video_doc.total_duration,
        }
    }

    /// Create the four type subdirectories under the item root.
    pub async fn ensure_type_dirs(item_root: &Path) -> std::io::Result<()> {
        for task_type in TaskType::ALL {
            tokio::fs::create_dir_all(item_root.join(task_type.dir_name())).await?;
        }
        Ok(())
    }
}

fn plan_stream(sink: &mut TaskSink, task_type: TaskType, doc: &MediaPlaylistDoc) {
    if let Some(map_url) = &doc.map_url {
        sink.push(task_type, map_url);
    }
    for segment in &doc.segments {
        sink.push(task_type, &segment.url);
    }
}
