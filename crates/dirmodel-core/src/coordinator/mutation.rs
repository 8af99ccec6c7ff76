/// Create/rename requests issued against the live directory.
///
/// The storage call runs on a worker thread; the result comes back through
/// the model's mutation channel tagged with the sequence number at request
/// time, and the caller's callback is parked in an id-keyed registry until
/// then.
use crate::error::StorageError;
use crate::model::{Entry, EntryUrl};
use crate::storage::{StorageBackend, StorageResult};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

pub type RequestId = u64;

/// Reported to the caller of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The entry as it now appears in the live list.
    Done(Entry),
    Failed(StorageError),
    /// The directory changed before the result arrived; nothing was applied.
    Aborted,
}

pub type MutationCallback = Box<dyn FnOnce(MutationOutcome)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    CreateDirectory { name: String },
    Rename { from: EntryUrl },
}

#[derive(Debug)]
pub struct MutationResult {
    pub request: RequestId,
    pub sequence: u64,
    pub op: MutationOp,
    pub result: StorageResult<Entry>,
}

/// Pending callbacks keyed by request id.
#[derive(Default)]
pub struct MutationRegistry {
    next_id: RequestId,
    pending: HashMap<RequestId, MutationCallback>,
}

impl MutationRegistry {
    pub fn register(&mut self, on_done: MutationCallback) -> RequestId {
        self.next_id += 1;
        self.pending.insert(self.next_id, on_done);
        self.next_id
    }

    pub fn take(&mut self, request: RequestId) -> Option<MutationCallback> {
        self.pending.remove(&request)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Run `call` against the backend on a worker thread and post the result.
pub fn spawn_mutation<F>(
    backend: Arc<dyn StorageBackend>,
    request: RequestId,
    sequence: u64,
    op: MutationOp,
    tx: Sender<MutationResult>,
    call: F,
) -> std::io::Result<()>
where
    F: FnOnce(&dyn StorageBackend) -> StorageResult<Entry> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("dirmodel-mutation-{request}"))
        .spawn(move || {
            let result = call(backend.as_ref());
            let _ = tx.send(MutationResult {
                request,
                sequence,
                op,
                result,
            });
        })
        .map(|_| ())
}
