use serde::{Deserialize, Serialize};
use url::Url;

/// Logical kind of a download task. Doubles as the name of the type
/// subdirectory inside the item root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Video,
    Audio,
    Text,
    Key,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::Video,
        TaskType::Audio,
        TaskType::Text,
        TaskType::Key,
    ];

    /// Subdirectory name under the item root.
    pub fn dir_name(self) -> &'static str {
        match self {
            TaskType::Video => "video",
            TaskType::Audio => "audio",
            TaskType::Text => "text",
            TaskType::Key => "key",
        }
    }
}

/// Opaque continuation point for a partially transferred task.
///
/// `offset` is the number of bytes already present in the partial file;
/// a resumed fetch continues from there with a `Range` request. `etag`
/// guards against the origin swapping content between sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeToken {
    pub offset: u64,
    pub etag: Option<String>,
}

/// One byte-range-less HTTP GET the worker must complete.
///
/// Identity within an item is the source URL; `order` is a FIFO dispatch
/// hint assigned by the planner. `rel_dest` is relative to the item root
/// and fully determined by `(task_type, md5(url), original extension)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadTask {
    pub item_id: String,
    pub url: Url,
    pub task_type: TaskType,
    pub rel_dest: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeToken>,
}
