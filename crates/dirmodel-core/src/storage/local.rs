/// Local filesystem backend.
///
/// Listings use `jwalk` restricted to a single level, serial and sorted by
/// name, so results are deterministic and each `next()` maps onto one
/// directory-entry read. Metadata is taken with `symlink_metadata` so links
/// are reported as themselves rather than followed.
use super::{validate_entry_name, EntryStream, StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::model::{Entry, EntryUrl, Metadata};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    default_root: Option<PathBuf>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `root` as the fallback navigation target.
    pub fn with_default_root(root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: Some(root.into()),
        }
    }

    /// Resolve a local path into an entry.
    pub fn entry_for_path(path: &Path) -> StorageResult<Entry> {
        let meta = fs::symlink_metadata(path)?;
        let url = EntryUrl::from_path(path);
        let entry = if meta.is_dir() {
            Entry::new_dir(url)
        } else {
            Entry::new_file(url)
        };
        Ok(entry.with_metadata(to_metadata(&meta)))
    }
}

fn url_to_path(url: &EntryUrl) -> PathBuf {
    PathBuf::from(url.as_str())
}

fn to_metadata(meta: &fs::Metadata) -> Metadata {
    Metadata {
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified: meta.modified().ok().map(DateTime::<Utc>::from),
    }
}

fn walk_error(err: jwalk::Error) -> StorageError {
    let message = err.to_string();
    match err.io_error() {
        Some(io_err) => StorageError::from(io::Error::new(io_err.kind(), message)),
        None => StorageError::Backend(message),
    }
}

impl StorageBackend for LocalStorage {
    fn list_entries(&self, directory: &Entry, _refresh: bool) -> StorageResult<EntryStream> {
        let path = url_to_path(&directory.url);
        let meta = fs::metadata(&path)?;
        if !meta.is_dir() {
            return Err(StorageError::NotADirectory(directory.url.to_string()));
        }

        let walker = jwalk::WalkDir::new(&path)
            .min_depth(1)
            .max_depth(1)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .parallelism(jwalk::Parallelism::Serial);

        let stream = walker.into_iter().map(|result| {
            let dir_entry = result.map_err(walk_error)?;
            let path = dir_entry.path();
            let url = EntryUrl::from_path(&path);
            let entry = if dir_entry.file_type().is_dir() {
                Entry::new_dir(url)
            } else {
                Entry::new_file(url)
            };
            // A failed stat leaves the entry listed without metadata.
            Ok(match fs::symlink_metadata(&path) {
                Ok(meta) => entry.with_metadata(to_metadata(&meta)),
                Err(err) => {
                    debug!("stat failed for {}: {err}", path.display());
                    entry
                }
            })
        });
        Ok(Box::new(stream))
    }

    fn get_metadata(&self, entry: &Entry) -> StorageResult<Metadata> {
        let meta = fs::symlink_metadata(url_to_path(&entry.url))?;
        Ok(to_metadata(&meta))
    }

    fn resolve(&self, url: &EntryUrl) -> StorageResult<Entry> {
        Self::entry_for_path(&url_to_path(url))
    }

    fn create_directory(&self, parent: &Entry, name: &str) -> StorageResult<Entry> {
        validate_entry_name(name)?;
        let path = url_to_path(&parent.url).join(name);
        // `create_dir` is exclusive: an existing entry yields AlreadyExists.
        fs::create_dir(&path)?;
        Self::entry_for_path(&path)
    }

    fn rename(&self, entry: &Entry, new_name: &str) -> StorageResult<Entry> {
        validate_entry_name(new_name)?;
        let from = url_to_path(&entry.url);
        let to = from
            .parent()
            .map(|p| p.join(new_name))
            .ok_or_else(|| StorageError::Backend(format!("cannot rename root {}", entry.url)))?;
        if fs::symlink_metadata(&to).is_ok() {
            return Err(StorageError::AlreadyExists(to.display().to_string()));
        }
        fs::rename(&from, &to)?;
        Self::entry_for_path(&to)
    }

    fn is_read_only(&self, directory: &Entry) -> bool {
        fs::metadata(url_to_path(&directory.url))
            .map(|m| m.permissions().readonly())
            .unwrap_or(true)
    }

    fn default_root(&self) -> Option<EntryUrl> {
        self.default_root.as_deref().map(EntryUrl::from_path)
    }
}
