/// One scan's target and its accumulated results.
///
/// A `DirectoryContents` is owned by exactly one party at a time: the scan
/// session filling it, then the coordinator once the session hands it over
/// on success. Entries are kept in the order the backend produced them;
/// identity lookups go through the url.
use super::entry::{Entry, EntryUrl};
use crate::error::StorageError;

/// What a scan enumerates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// Plain listing of the directory's direct children.
    Directory,
    /// Recursive file-name filter performed by the scan session itself.
    LocalSearch { query: String },
    /// Query answered by an indexed search backend.
    RemoteSearch { query: String },
}

/// The directory (and optional query) a scan runs against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanTarget {
    pub directory: Entry,
    pub kind: TargetKind,
}

impl ScanTarget {
    pub fn directory(directory: Entry) -> Self {
        Self {
            directory,
            kind: TargetKind::Directory,
        }
    }

    pub fn is_search(&self) -> bool {
        !matches!(self.kind, TargetKind::Directory)
    }

    pub fn query(&self) -> Option<&str> {
        match &self.kind {
            TargetKind::Directory => None,
            TargetKind::LocalSearch { query } | TargetKind::RemoteSearch { query } => Some(query),
        }
    }
}

/// Lifecycle of one contents instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentsState {
    Idle,
    Scanning,
    Failed(StorageError),
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct DirectoryContents {
    target: ScanTarget,
    entries: Vec<Entry>,
    state: ContentsState,
}

impl DirectoryContents {
    /// Create empty contents for `target` in the `Scanning` state.
    pub fn new(target: ScanTarget) -> Self {
        Self {
            target,
            entries: Vec::new(),
            state: ContentsState::Scanning,
        }
    }

    #[inline]
    pub fn target(&self) -> &ScanTarget {
        &self.target
    }

    #[inline]
    pub fn directory(&self) -> &Entry {
        &self.target.directory
    }

    #[inline]
    pub fn is_search(&self) -> bool {
        self.target.is_search()
    }

    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[inline]
    pub fn state(&self) -> &ContentsState {
        &self.state
    }

    pub fn set_state(&mut self, state: ContentsState) {
        self.state = state;
    }

    #[inline]
    pub fn is_scanning(&self) -> bool {
        self.state == ContentsState::Scanning
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find_index(&self, url: &EntryUrl) -> Option<usize> {
        self.entries.iter().position(|e| &e.url == url)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Append a batch produced by a scan.
    pub fn push_batch(&mut self, batch: impl IntoIterator<Item = Entry>) {
        self.entries.extend(batch);
    }

    /// Replace the entry with the same identity, or append it.
    ///
    /// Returns `true` if the entry was newly inserted.
    pub fn upsert(&mut self, entry: Entry) -> bool {
        match self.find_index(&entry.url) {
            Some(idx) => {
                self.entries[idx] = entry;
                false
            }
            None => {
                self.entries.push(entry);
                true
            }
        }
    }

    /// Insert at `index` (clamped to the list length).
    pub fn insert(&mut self, index: usize, entry: Entry) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);
    }

    /// Replace the entry identified by `url` in place, keeping its position.
    pub fn replace(&mut self, url: &EntryUrl, entry: Entry) -> bool {
        match self.find_index(url) {
            Some(idx) => {
                self.entries[idx] = entry;
                true
            }
            None => false,
        }
    }

    /// Remove the entry identified by `url`. Returns `true` if one was removed.
    pub fn remove(&mut self, url: &EntryUrl) -> bool {
        match self.find_index(url) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }
}
