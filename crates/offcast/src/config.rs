use std::path::PathBuf;

use offcast_hls::Planner;
use offcast_net::{NetOptions, RetryPolicy};
use offcast_worker::WorkerConfig;

/// Configuration for one [`crate::Offcast`] context.
#[derive(Clone, Debug)]
pub struct OffcastConfig {
    /// Root directory owning `items/` and `state/`.
    pub root_dir: PathBuf,
    pub net: NetOptions,
    pub retry: RetryPolicy,
    /// Upper bound on parallel fetches per item.
    pub max_concurrent_fetches: usize,
    /// Bits/sec assumed for audio renditions with no declared bandwidth.
    pub audio_bitrate_fallback: u64,
    /// Loopback playback port; 0 picks an ephemeral port at first use.
    pub server_port: u16,
}

impl OffcastConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            net: NetOptions::default(),
            retry: RetryPolicy::default(),
            max_concurrent_fetches: 4,
            audio_bitrate_fallback: Planner::default().audio_bitrate_fallback,
            server_port: 0,
        }
    }

    pub(crate) fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_fetches: self.max_concurrent_fetches,
            retry: self.retry.clone(),
        }
    }

    pub(crate) fn planner(&self) -> Planner {
        Planner {
            audio_bitrate_fallback: self.audio_bitrate_fallback,
        }
    }
}
