use serde::{Deserialize, Serialize};
use url::Url;

/// Lifecycle state of an item.
///
/// ```text
/// New -> MetadataLoaded -> InProgress <-> Paused
///                          InProgress -> Interrupted -> (InProgress | Paused)
///                          InProgress -> Completed
///                          *          -> Removed | Failed | DbFailure
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Registered, playlists not loaded yet.
    New,
    /// Playlists parsed, tasks planned and persisted.
    MetadataLoaded,
    /// A worker is actively fetching tasks.
    InProgress,
    /// Download suspended; resume tokens persisted where available.
    Paused,
    /// Retryable failure exhausted the retry budget; resumable.
    Interrupted,
    /// All tasks finished; the item plays back offline.
    Completed,
    /// Terminal failure (HTTP 4xx, malformed content).
    Failed,
    /// The persistence layer failed; worker stopped, tasks untouched.
    DbFailure,
    /// Item deleted by the caller.
    Removed,
}

impl ItemState {
    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition(self, to: ItemState) -> bool {
        use ItemState::*;

        if self == to {
            return false;
        }

        // Any state may escalate or be removed, except once removed.
        if matches!(to, Removed | Failed | DbFailure) {
            return self != Removed;
        }

        match (self, to) {
            (New, MetadataLoaded) => true,
            (MetadataLoaded, InProgress) => true,
            (InProgress, Paused | Interrupted | Completed) => true,
            (Paused, InProgress) => true,
            (Interrupted, InProgress | Paused) => true,
            _ => false,
        }
    }

    /// States from which `start` may spawn a worker.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            ItemState::MetadataLoaded | ItemState::Paused | ItemState::Interrupted
        )
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemState::New => "new",
            ItemState::MetadataLoaded => "metadata_loaded",
            ItemState::InProgress => "in_progress",
            ItemState::Paused => "paused",
            ItemState::Interrupted => "interrupted",
            ItemState::Completed => "completed",
            ItemState::Failed => "failed",
            ItemState::DbFailure => "db_failure",
            ItemState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Persisted record of one item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Caller-provided opaque identifier, unique within the store.
    pub id: String,
    /// URL of the remote master playlist.
    pub source_url: Url,
    pub state: ItemState,
    /// Estimated total size in bytes, derived from declared bandwidths.
    pub estimated_size: u64,
    /// Bytes transferred so far. Monotonically non-decreasing until removal.
    pub downloaded_size: u64,
    /// Total media duration in seconds, once metadata is loaded.
    pub duration_seconds: f64,
}

impl ItemRecord {
    pub fn new(id: impl Into<String>, source_url: Url) -> Self {
        Self {
            id: id.into(),
            source_url,
            state: ItemState::New,
            estimated_size: 0,
            downloaded_size: 0,
            duration_seconds: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ItemState::New, ItemState::MetadataLoaded, true)]
    #[case(ItemState::MetadataLoaded, ItemState::InProgress, true)]
    #[case(ItemState::InProgress, ItemState::Paused, true)]
    #[case(ItemState::Paused, ItemState::InProgress, true)]
    #[case(ItemState::InProgress, ItemState::Interrupted, true)]
    #[case(ItemState::Interrupted, ItemState::InProgress, true)]
    #[case(ItemState::Interrupted, ItemState::Paused, true)]
    #[case(ItemState::InProgress, ItemState::Completed, true)]
    #[case(ItemState::Completed, ItemState::Removed, true)]
    #[case(ItemState::New, ItemState::InProgress, false)]
    #[case(ItemState::Completed, ItemState::InProgress, false)]
    #[case(ItemState::Paused, ItemState::Completed, false)]
    #[case(ItemState::Removed, ItemState::Failed, false)]
    #[case(ItemState::Removed, ItemState::Removed, false)]
    fn transition_table(#[case] from: ItemState, #[case] to: ItemState, #[case] legal: bool) {
        assert_eq!(from.can_transition(to), legal, "{from} -> {to}");
    }

    #[rstest]
    #[case(ItemState::MetadataLoaded, true)]
    #[case(ItemState::Paused, true)]
    #[case(ItemState::Interrupted, true)]
    #[case(ItemState::New, false)]
    #[case(ItemState::Completed, false)]
    #[case(ItemState::Failed, false)]
    fn startable_states(#[case] state: ItemState, #[case] expected: bool) {
        assert_eq!(state.is_startable(), expected);
    }

    #[test]
    fn any_state_can_escalate() {
        for from in [
            ItemState::New,
            ItemState::MetadataLoaded,
            ItemState::InProgress,
            ItemState::Paused,
            ItemState::Interrupted,
            ItemState::Completed,
            ItemState::Failed,
        ] {
            assert!(from.can_transition(ItemState::Removed));
            assert!(from.can_transition(ItemState::DbFailure) || from == ItemState::DbFailure);
        }
    }

    #[test]
    fn state_serde_round_trip() {
        let json = serde_json::to_string(&ItemState::MetadataLoaded).unwrap();
        assert_eq!(json, "\"metadata_loaded\"");
        let back: ItemState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ItemState::MetadataLoaded);
    }
}
