/// Native filesystem watcher built on `notify`.
///
/// Watches one directory non-recursively. Create and modify events become
/// added-or-updated urls, removals become deleted urls, and the two halves
/// of a rename are split accordingly. Anything the watcher cannot attribute
/// to specific children (no paths, `Any`/`Other` kinds, watcher errors) is
/// reported as an undifferentiated `Changed`.
use super::{DirectoryWatcher, WatchEvent};
use crate::error::StorageError;
use crate::model::{Entry, EntryUrl};
use crate::storage::StorageResult;
use crossbeam_channel::Sender;
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Default)]
pub struct NotifyWatcher {
    // Dropping the inner watcher stops delivery.
    inner: Option<RecommendedWatcher>,
    watched: Option<EntryUrl>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn watch(&mut self, directory: &Entry, events: Sender<WatchEvent>) -> StorageResult<()> {
        self.unwatch();

        let watched = directory.url.clone();
        let callback_dir = watched.clone();
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| {
            if let Some(event) = translate_event(&callback_dir, result) {
                let _ = events.send(event);
            }
        })
        .map_err(|e| {
            StorageError::Backend(format!("failed to create watcher for {watched}: {e}"))
        })?;

        watcher
            .watch(&PathBuf::from(watched.as_str()), RecursiveMode::NonRecursive)
            .map_err(|e| StorageError::Backend(format!("failed to watch {watched}: {e}")))?;

        debug!("Watching {}", watched);
        self.inner = Some(watcher);
        self.watched = Some(watched);
        Ok(())
    }

    fn unwatch(&mut self) {
        if let Some(url) = self.watched.take() {
            debug!("Stopped watching {}", url);
        }
        self.inner = None;
    }
}

/// Map one `notify` callback onto a [`WatchEvent`]. `None` means ignore.
pub(crate) fn translate_event(
    directory: &EntryUrl,
    result: notify::Result<Event>,
) -> Option<WatchEvent> {
    let event = match result {
        Ok(event) => event,
        Err(err) => {
            warn!("Watcher error on {}: {}", directory, err);
            return Some(WatchEvent::Changed {
                directory: directory.clone(),
            });
        }
    };

    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }

    // Changes to the watched directory itself say nothing about its children.
    let urls: Vec<EntryUrl> = event
        .paths
        .iter()
        .map(|p| EntryUrl::from_path(p))
        .filter(|u| u != directory)
        .collect();

    let changed = || WatchEvent::Changed {
        directory: directory.clone(),
    };
    let changes = |added_or_updated: Vec<EntryUrl>, deleted: Vec<EntryUrl>| WatchEvent::Changes {
        directory: directory.clone(),
        added_or_updated,
        deleted,
    };

    if urls.is_empty() {
        return Some(changed());
    }

    Some(match event.kind {
        EventKind::Create(_) => changes(urls, Vec::new()),
        EventKind::Remove(_) => changes(Vec::new(), urls),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => changes(Vec::new(), urls),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => changes(urls, Vec::new()),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = EntryUrl::from_path(&event.paths[0]);
            let to = EntryUrl::from_path(&event.paths[1]);
            changes(vec![to], vec![from])
        }
        EventKind::Modify(_) => changes(urls, Vec::new()),
        _ => changed(),
    })
}
