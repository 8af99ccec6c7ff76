/// Directory change queue — strict FIFO, one task in flight.
///
/// Navigation and search requests can arrive faster than scans finish.
/// Each request becomes a [`ScanTask`]; the queue hands out the next task
/// only after the previous one has been completed, and completing a task
/// always advances the queue regardless of outcome.
use crate::model::Entry;
use std::collections::VecDeque;
use std::fmt;

/// How a task ended, as reported to its completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The scan completed and its contents are live.
    Completed,
    /// Enumeration or target resolution failed.
    Failed,
    /// A newer request made the task stale while it was scanning.
    Cancelled,
    /// The task was already stale (or had nothing to do) when it started.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    ChangeDirectory(Entry),
    Search { directory: Entry, query: String },
}

pub type TaskCallback = Box<dyn FnOnce(TaskOutcome)>;

/// A queued unit of work, consumed exactly once by the queue.
pub struct ScanTask {
    pub sequence: u64,
    pub kind: TaskKind,
    on_done: Option<TaskCallback>,
}

impl ScanTask {
    pub fn new(sequence: u64, kind: TaskKind) -> Self {
        Self {
            sequence,
            kind,
            on_done: None,
        }
    }

    pub fn with_callback(mut self, on_done: impl FnOnce(TaskOutcome) + 'static) -> Self {
        self.on_done = Some(Box::new(on_done));
        self
    }
}

impl fmt::Debug for ScanTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanTask")
            .field("sequence", &self.sequence)
            .field("kind", &self.kind)
            .field("has_callback", &self.on_done.is_some())
            .finish()
    }
}

/// The task currently executing; owns its completion callback.
struct InFlight {
    sequence: u64,
    on_done: Option<TaskCallback>,
}

#[derive(Default)]
pub struct DirectoryChangeQueue {
    pending: VecDeque<ScanTask>,
    in_flight: Option<InFlight>,
}

impl DirectoryChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Never runs it; call [`start_next`](Self::start_next).
    pub fn enqueue(&mut self, task: ScanTask) {
        self.pending.push_back(task);
    }

    /// Hand out the next task if none is in flight.
    pub fn start_next(&mut self) -> Option<(u64, TaskKind)> {
        if self.in_flight.is_some() {
            return None;
        }
        let task = self.pending.pop_front()?;
        self.in_flight = Some(InFlight {
            sequence: task.sequence,
            on_done: task.on_done,
        });
        Some((task.sequence, task.kind))
    }

    /// Finish the in-flight task: run its callback and free the slot.
    ///
    /// Returns `false` if nothing was in flight.
    pub fn complete(&mut self, outcome: TaskOutcome) -> bool {
        // Free the slot before the callback so a panicking callback cannot
        // wedge the queue.
        let Some(task) = self.in_flight.take() else {
            return false;
        };
        if let Some(on_done) = task.on_done {
            on_done(outcome);
        }
        true
    }

    /// Tasks waiting behind the in-flight one.
    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_none()
    }
}
