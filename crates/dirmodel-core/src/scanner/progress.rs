/// Messages sent from scan-session threads to the directory model.
///
/// Every message is tagged with the session id and the sequence number the
/// session was started under, so the model can drop anything that belongs
/// to a superseded navigation without asking the session.
use crate::error::StorageError;
use crate::merge::PartialUpdate;
use crate::model::{DirectoryContents, Entry};
use std::time::Duration;

pub type SessionId = u64;

#[derive(Debug)]
pub struct SessionMessage {
    pub session: SessionId,
    pub sequence: u64,
    pub event: SessionEvent,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// Entries read since the previous batch, for progressive display.
    Batch(Vec<Entry>),
    /// Enumeration finished. Ownership of the filled contents moves to the
    /// model.
    Completed {
        contents: DirectoryContents,
        duration: Duration,
    },
    /// The backend failed while enumerating.
    Failed(StorageError),
    /// The scan target itself could not be resolved (missing, unmounted,
    /// not a directory).
    ResolveFailed(StorageError),
    /// The session observed its cancel flag and stopped reading.
    Cancelled,
    /// Watcher-reported urls resolved into a partial update.
    Resolved(PartialUpdate),
}

impl SessionEvent {
    /// `true` for every message after which the session thread exits.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionEvent::Batch(_))
    }
}
