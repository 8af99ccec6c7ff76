/// Events published by the directory model.
///
/// Delivery is synchronous and in registration order: `emit` sends to every
/// subscriber before returning, so a consumer draining its receiver sees
/// events in exactly the order the model produced them.
use crate::error::StorageError;
use crate::model::{Entry, EntryUrl};
use crossbeam_channel::{unbounded, Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    /// The live contents now belong to `current`.
    DirectoryChanged {
        previous: Option<Entry>,
        current: Entry,
    },
    /// A navigation or search scan started; the live list was cleared.
    ScanStarted { directory: EntryUrl, search: bool },
    /// A batch of entries was appended to the live list.
    ScanUpdated { added: usize, total: usize },
    ScanCompleted { entries: usize },
    /// Enumeration failed. `will_retry` is `false` once the retry budget is
    /// spent and the failure is persistent.
    ScanFailed {
        error: StorageError,
        will_retry: bool,
    },
    /// The running scan became stale and was abandoned.
    ScanCancelled,
    /// The live list was refreshed in place (rescan or partial update).
    RescanCompleted { entries: usize },
    SelectionChanged,
    /// The navigation target could not be resolved; a fallback navigation
    /// may follow.
    TargetResolutionFailed { url: EntryUrl, error: StorageError },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<ModelEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<ModelEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver to every live subscriber; dropped receivers are pruned.
    pub fn emit(&mut self, event: ModelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
