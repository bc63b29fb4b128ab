#![forbid(unsafe_code)]

//! Shared data model for the offcast workspace.
//!
//! An **item** is one unit of offline content (a single master playlist URL
//! frozen to one rendition selection). A **task** is one HTTP GET the
//! downloader must complete to make the item playable offline. Both are
//! persisted by `offcast-store` and driven by `offcast-worker`; this crate
//! only defines the types and the rules that tie them together.

mod item;
mod item_dir;
mod task;

pub use item::{ItemRecord, ItemState};
pub use item_dir::{encode_path_segment, item_dir_name};
pub use task::{DownloadTask, ResumeToken, TaskType};
