#![forbid(unsafe_code)]

//! Offline download manager for HTTP Live Streaming.
//!
//! Given a remote master playlist URL, [`Offcast`] freezes one video
//! rendition plus selected audio/subtitle renditions, downloads every
//! referenced byte into a local item directory, rewrites the playlists to
//! point at that layout, and serves the result over a loopback HTTP server
//! so any HLS player can play it back offline.
//!
//! ```no_run
//! use offcast::{DeviceCapabilities, Offcast, OffcastConfig, SelectionOptions};
//! use url::Url;
//!
//! # async fn demo() -> Result<(), offcast::OffcastError> {
//! let manager = Offcast::open(OffcastConfig::new("/var/lib/offcast")).await?;
//! let url = Url::parse("https://cdn.example.com/master.m3u8").unwrap();
//!
//! manager.add_item("lesson-1", url).await?;
//! manager
//!     .load_metadata(
//!         "lesson-1",
//!         &SelectionOptions::default(),
//!         &DeviceCapabilities::default(),
//!     )
//!     .await?;
//! manager.start("lesson-1").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod error;
mod layout;
mod localize;
mod server;

pub use config::OffcastConfig;
pub use context::Offcast;
pub use error::{OffcastError, OffcastResult};
pub use layout::Layout;
pub use server::PlaybackServer;

pub use offcast_core::{DownloadTask, ItemRecord, ItemState, TaskType};
pub use offcast_events::{Event, EventBus};
pub use offcast_hls::{DeviceCapabilities, LanguagePolicy, SelectionOptions};
