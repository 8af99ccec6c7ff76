/// dirmodel core — keeps a displayed directory listing consistent with
/// slow, flaky storage.
///
/// This crate contains all coordination logic with zero UI dependencies.
/// A host (GUI, TUI, CLI) owns one [`DirectoryModel`], drives it with
/// [`DirectoryModel::process_events`], and reads the list and events back.
///
/// # Modules
///
/// - [`model`] — entries, directory contents, and selection.
/// - [`scanner`] — background scan sessions with batched progress.
/// - [`queue`] — FIFO of navigation/search tasks, one in flight.
/// - [`scheduler`] — debounced rescan timer.
/// - [`merge`] — partial updates applied to the live list.
/// - [`coordinator`] — the directory model tying everything together.
/// - [`storage`] — backend traits and the local filesystem backend.
/// - [`watcher`] — change notification via `notify`.
pub mod config;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod model;
pub mod queue;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod watcher;

pub use config::ModelConfig;
pub use coordinator::events::ModelEvent;
pub use coordinator::mutation::MutationOutcome;
pub use coordinator::{DirectoryModel, EntryChangeKind};
pub use error::{ModelError, Result, StorageError};
pub use model::{DirectoryContents, Entry, EntryUrl, FileListSelection};
pub use queue::TaskOutcome;
