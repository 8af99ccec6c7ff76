/// Entries as the directory model sees them.
///
/// An entry is identified by its [`EntryUrl`], never by its position in a
/// listing: selections, partial updates and removals all match on the url
/// so they survive a full collection swap.
use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Stable identity of an entry: a `/`-separated url or absolute path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EntryUrl(String);

impl EntryUrl {
    /// Create a url, dropping any trailing separator (except for the root).
    pub fn new(url: impl Into<String>) -> Self {
        let mut url = url.into();
        while url.len() > 1 && url.ends_with('/') {
            url.pop();
        }
        Self(url)
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy().replace('\\', "/"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The url of the containing directory, or `None` for a root.
    pub fn parent(&self) -> Option<EntryUrl> {
        let idx = self.0.rfind('/')?;
        if idx + 1 == self.0.len() {
            // "/" itself
            return None;
        }
        if idx == 0 {
            return Some(EntryUrl("/".to_string()));
        }
        // "scheme://host" has no parent inside the url.
        if self.0[..idx].ends_with('/') {
            return None;
        }
        Some(EntryUrl(self.0[..idx].to_string()))
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) if idx + 1 < self.0.len() => &self.0[idx + 1..],
            _ => &self.0,
        }
    }

    /// The url of a child named `name`.
    pub fn join(&self, name: &str) -> EntryUrl {
        if self.0.ends_with('/') {
            EntryUrl(format!("{}{}", self.0, name))
        } else {
            EntryUrl(format!("{}/{}", self.0, name))
        }
    }
}

impl From<String> for EntryUrl {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<EntryUrl> for String {
    fn from(url: EntryUrl) -> Self {
        url.0
    }
}

impl fmt::Display for EntryUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata attached to an entry by the storage backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Logical size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// A single file or directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub url: EntryUrl,
    /// Display name (last url segment).
    pub name: CompactString,
    pub is_dir: bool,
    /// `None` until the backend has reported metadata for the entry.
    pub metadata: Option<Metadata>,
}

impl Entry {
    /// Create a file entry.
    pub fn new_file(url: EntryUrl) -> Self {
        let name = CompactString::new(url.name());
        Self {
            url,
            name,
            is_dir: false,
            metadata: None,
        }
    }

    /// Create a directory entry.
    pub fn new_dir(url: EntryUrl) -> Self {
        let name = CompactString::new(url.name());
        Self {
            url,
            name,
            is_dir: true,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Identity comparison (the url), ignoring metadata.
    #[inline]
    pub fn is_same_entry(&self, other: &Entry) -> bool {
        self.url == other.url
    }

    #[inline]
    pub fn parent_url(&self) -> Option<EntryUrl> {
        self.url.parent()
    }
}
