/// Filesystem watcher collaborator.
///
/// A watcher reports changes for the directory currently displayed. It
/// never touches the model directly: events go through a crossbeam channel
/// the model drains on its own thread.
pub mod notify_watcher;

use crate::model::{Entry, EntryUrl};
use crate::storage::StorageResult;
use crossbeam_channel::Sender;

pub use notify_watcher::NotifyWatcher;

/// Change notification for a watched directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// Detailed change set, applied as a partial update.
    Changes {
        directory: EntryUrl,
        added_or_updated: Vec<EntryUrl>,
        deleted: Vec<EntryUrl>,
    },
    /// Something changed but the watcher cannot say what; answered with a
    /// long-interval rescan.
    Changed { directory: EntryUrl },
}

impl WatchEvent {
    pub fn directory(&self) -> &EntryUrl {
        match self {
            WatchEvent::Changes { directory, .. } | WatchEvent::Changed { directory } => directory,
        }
    }
}

pub trait DirectoryWatcher {
    /// Replace the watched directory. Events for `directory` are sent on
    /// `events` until the next `watch` or `unwatch`.
    fn watch(&mut self, directory: &Entry, events: Sender<WatchEvent>) -> StorageResult<()>;

    fn unwatch(&mut self);
}

/// Watcher for backends without change notification.
#[derive(Debug, Default)]
pub struct NullWatcher;

impl DirectoryWatcher for NullWatcher {
    fn watch(&mut self, _directory: &Entry, _events: Sender<WatchEvent>) -> StorageResult<()> {
        Ok(())
    }

    fn unwatch(&mut self) {}
}
