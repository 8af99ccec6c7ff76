/// Error types for the directory model and its storage collaborators.
///
/// Storage errors travel inside model events (`ScanFailed`,
/// `TargetResolutionFailed`), so they are `Clone` and carry owned messages
/// instead of wrapping `std::io::Error` directly.
use crate::model::EntryUrl;
use std::io;

/// An error reported by a storage backend while listing, resolving, or
/// mutating entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The volume backing the entry is offline or unmounted.
    #[error("storage unreachable: {0}")]
    Unreachable(String),

    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(message),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(message),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(message),
            kind => StorageError::Io { kind, message },
        }
    }
}

/// Errors returned synchronously by [`DirectoryModel`](crate::coordinator::DirectoryModel)
/// operations and configuration loading.
///
/// Scan failures are never returned from public methods; they surface as
/// `ScanFailed` events.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A mutation was requested while the listing is a search result or is
    /// being rebuilt.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot resolve {url}: {source}")]
    TargetResolution {
        url: EntryUrl,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
