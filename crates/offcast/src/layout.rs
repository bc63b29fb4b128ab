use std::path::{Path, PathBuf};

use offcast_core::item_dir_name;

/// Filesystem layout under the configured root:
///
/// ```text
/// <root>/state/                      persisted items and task lists
/// <root>/items/<safe(id)>/master.m3u8
/// <root>/items/<safe(id)>/{video,audio,text,key}/<md5>.<ext>
/// ```
///
/// On platforms that offer a backup-exclusion flag, the embedder should
/// mark the root with it; downloaded media is re-fetchable by design.
#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_root(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Directory the playback server is rooted at.
    pub fn items_root(&self) -> PathBuf {
        self.root.join("items")
    }

    pub fn item_root(&self, item_id: &str) -> PathBuf {
        self.items_root().join(item_dir_name(item_id))
    }

    pub fn master_path(&self, item_id: &str) -> PathBuf {
        self.item_root(item_id).join("master.m3u8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_hang_off_the_root() {
        let layout = Layout::new("/data/offcast");
        assert_eq!(layout.state_root(), PathBuf::from("/data/offcast/state"));
        assert_eq!(layout.items_root(), PathBuf::from("/data/offcast/items"));
        assert_eq!(
            layout.master_path("entry-1"),
            PathBuf::from("/data/offcast/items/entry-1/master.m3u8")
        );
    }

    #[test]
    fn item_ids_are_made_path_safe() {
        let layout = Layout::new("/data/offcast");
        let root = layout.item_root("a/b c");
        assert_eq!(
            root,
            PathBuf::from("/data/offcast/items/a%2Fb%20c")
        );
    }
}
