/// Storage collaborators — the interfaces the directory model consumes.
///
/// Every method here may block on slow or flaky storage, so the model only
/// calls them from scan-session and worker threads, never from the thread
/// that owns the live contents.
///
/// - [`StorageBackend`] — enumeration, metadata, and mutations.
/// - [`SearchBackend`] — optional server-side search for indexed storage.
/// - [`local::LocalStorage`] — the std filesystem backend.
pub mod local;

use crate::error::StorageError;
use crate::model::{Entry, EntryUrl, Metadata};

pub use local::LocalStorage;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Lazily produced listing. Each `next()` is one storage read; the scan
/// session checks for cancellation between reads.
pub type EntryStream = Box<dyn Iterator<Item = StorageResult<Entry>>>;

pub trait StorageBackend: Send + Sync {
    /// List the direct children of `directory`.
    ///
    /// `refresh` asks the backend to bypass any metadata cache it keeps.
    fn list_entries(&self, directory: &Entry, refresh: bool) -> StorageResult<EntryStream>;

    fn get_metadata(&self, entry: &Entry) -> StorageResult<Metadata>;

    /// Resolve a url reported by a watcher into a full entry.
    fn resolve(&self, url: &EntryUrl) -> StorageResult<Entry>;

    /// Create `name` under `parent`. Fails with `AlreadyExists` if taken.
    fn create_directory(&self, parent: &Entry, name: &str) -> StorageResult<Entry>;

    /// Rename `entry` within its directory, returning the renamed entry.
    fn rename(&self, entry: &Entry, new_name: &str) -> StorageResult<Entry>;

    fn is_read_only(&self, _directory: &Entry) -> bool {
        false
    }

    /// Root to fall back to when a navigation target cannot be resolved.
    /// Must not touch storage; the fallback navigation resolves it.
    fn default_root(&self) -> Option<EntryUrl> {
        None
    }
}

pub trait SearchBackend: Send + Sync {
    /// `true` only if the storage under `directory` is indexed and reachable
    /// right now. When `false` the model filters file names locally.
    fn is_available(&self, directory: &Entry) -> bool;

    fn search(&self, directory: &Entry, query: &str) -> StorageResult<EntryStream>;
}

/// Reject names that cannot denote a single child entry.
pub fn validate_entry_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(StorageError::Backend(format!("invalid entry name: {name:?}")));
    }
    Ok(())
}
