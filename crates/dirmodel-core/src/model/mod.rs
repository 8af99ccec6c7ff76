/// Data model for the directory model.
///
/// Re-exports entries, per-scan contents, and the identity-based selection.
pub mod contents;
pub mod entry;
pub mod selection;

pub use contents::{ContentsState, DirectoryContents, ScanTarget, TargetKind};
pub use entry::{Entry, EntryUrl, Metadata};
pub use selection::FileListSelection;
