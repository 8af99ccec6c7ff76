/// Partial update merger — applies watcher-reported changes straight into
/// the live contents instead of re-enumerating the directory.
///
/// A merge costs O(change size) against the live list, a rescan costs
/// O(directory size) against the storage backend. The merge is only
/// trusted for entries it can attribute: a changed entry is applied only if
/// its parent is the live directory, and removals match by identity.
use crate::model::{DirectoryContents, Entry, EntryUrl};

/// Changed entries plus removed identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialUpdate {
    pub changed: Vec<Entry>,
    pub removed: Vec<EntryUrl>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
    pub removed: usize,
    /// Changed entries that could not be attributed to the live listing.
    pub ignored: usize,
}

/// Merge `update` into `contents`.
///
/// For search results the parent rule does not apply (matches come from
/// the whole subtree), so changed entries only refresh results that are
/// already listed; new matches wait for the next search.
pub fn apply_partial_update(contents: &mut DirectoryContents, update: PartialUpdate) -> MergeStats {
    let mut stats = MergeStats::default();
    let directory = contents.directory().url.clone();
    let is_search = contents.is_search();

    for entry in update.changed {
        if is_search {
            let url = entry.url.clone();
            if contents.replace(&url, entry) {
                stats.replaced += 1;
            } else {
                stats.ignored += 1;
            }
            continue;
        }
        if entry.parent_url().as_ref() != Some(&directory) {
            stats.ignored += 1;
            continue;
        }
        if contents.upsert(entry) {
            stats.inserted += 1;
        } else {
            stats.replaced += 1;
        }
    }

    for url in &update.removed {
        if contents.remove(url) {
            stats.removed += 1;
        }
    }

    stats
}
