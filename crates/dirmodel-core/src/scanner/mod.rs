/// Scan sessions — one background attempt to enumerate a scan target.
///
/// A session runs on its own thread and owns the [`DirectoryContents`] it
/// fills. It streams `Batch` messages as entries arrive so large directories
/// render progressively, then ends with exactly one terminal message
/// (`Completed`, `Failed`, `ResolveFailed`, `Cancelled`, or `Resolved`).
///
/// Cancellation is cooperative: the cancel flag is checked before every
/// storage read. A read that is already in flight when the flag is set is
/// allowed to finish and is recorded in the session's own contents, but the
/// session issues no further reads and the model discards whatever arrives.
pub mod progress;

use crate::error::StorageError;
use crate::merge::PartialUpdate;
use crate::model::{ContentsState, DirectoryContents, Entry, EntryUrl, ScanTarget, TargetKind};
use crate::storage::{EntryStream, SearchBackend, StorageBackend};
use crossbeam_channel::Sender;
use progress::{SessionEvent, SessionId, SessionMessage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, warn};

/// What a session does.
#[derive(Debug, Clone)]
pub enum SessionKind {
    /// Enumerate a directory or run a search.
    Scan { target: ScanTarget, refresh: bool },
    /// Resolve watcher-reported urls into entries for a partial update.
    /// Urls that no longer resolve are reported as removed.
    ResolveChanges {
        changed: Vec<EntryUrl>,
        deleted: Vec<EntryUrl>,
    },
}

/// Everything a session thread needs besides its kind.
#[derive(Clone)]
pub struct SessionContext {
    pub backend: Arc<dyn StorageBackend>,
    pub search: Option<Arc<dyn SearchBackend>>,
    pub batch_size: usize,
    pub tx: Sender<SessionMessage>,
}

/// Handle to a running or finished session.
pub struct ScanSession {
    id: SessionId,
    sequence: u64,
    cancel_flag: Arc<AtomicBool>,
    /// Detached on drop; the thread exits after its terminal message.
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanSession {
    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Sequence number the session was started under.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Request the session to stop before its next storage read.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

/// Start a session on a background thread.
///
/// If the thread cannot be spawned the failure is reported on `ctx.tx` as a
/// terminal `Failed` message, exactly as a storage error would be.
pub fn start_session(
    id: SessionId,
    sequence: u64,
    kind: SessionKind,
    ctx: SessionContext,
) -> ScanSession {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel_flag.clone();
    let tx = ctx.tx.clone();

    let spawned = thread::Builder::new()
        .name(format!("dirmodel-scan-{id}"))
        .spawn(move || {
            let runner = SessionRunner {
                id,
                sequence,
                ctx,
                cancel: cancel_clone,
            };
            runner.run(kind);
        });

    let thread = match spawned {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!("Failed to spawn scan session {id}: {err}");
            let _ = tx.send(SessionMessage {
                session: id,
                sequence,
                event: SessionEvent::Failed(StorageError::from(err)),
            });
            None
        }
    };

    ScanSession {
        id,
        sequence,
        cancel_flag,
        _thread: thread,
    }
}

/// Outcome of draining one stream into a collector.
enum Drain {
    Finished,
    Cancelled,
    Failed(StorageError),
}

struct SessionRunner {
    id: SessionId,
    sequence: u64,
    ctx: SessionContext,
    cancel: Arc<AtomicBool>,
}

impl SessionRunner {
    fn send(&self, event: SessionEvent) -> bool {
        self.ctx
            .tx
            .send(SessionMessage {
                session: self.id,
                sequence: self.sequence,
                event,
            })
            .is_ok()
    }

    #[inline]
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run(self, kind: SessionKind) {
        match kind {
            SessionKind::Scan { target, refresh } => self.run_scan(target, refresh),
            SessionKind::ResolveChanges { changed, deleted } => {
                self.run_resolve(changed, deleted)
            }
        }
    }

    fn run_scan(&self, target: ScanTarget, refresh: bool) {
        let start = Instant::now();

        if self.cancelled() {
            self.send(SessionEvent::Cancelled);
            return;
        }

        // The target must still exist and be a directory before we list it.
        match self.ctx.backend.resolve(&target.directory.url) {
            Ok(resolved) if resolved.is_dir => {}
            Ok(_) => {
                self.send(SessionEvent::ResolveFailed(StorageError::NotADirectory(
                    target.directory.url.to_string(),
                )));
                return;
            }
            Err(err) => {
                self.send(SessionEvent::ResolveFailed(err));
                return;
            }
        }

        let mut collector = Collector::new(self, DirectoryContents::new(target.clone()));
        let outcome = match &target.kind {
            TargetKind::Directory => self.drain_listing(&mut collector, &target.directory, refresh),
            TargetKind::RemoteSearch { query } => match &self.ctx.search {
                Some(search) => match search.search(&target.directory, query) {
                    Ok(stream) => self.drain(&mut collector, stream, None),
                    Err(err) => Drain::Failed(err),
                },
                None => self.walk_search(&mut collector, &target.directory, query, refresh),
            },
            TargetKind::LocalSearch { query } => {
                self.walk_search(&mut collector, &target.directory, query, refresh)
            }
        };

        match outcome {
            Drain::Finished if !self.cancelled() => {
                collector.flush();
                let mut contents = collector.into_contents();
                contents.set_state(ContentsState::Idle);
                debug!(
                    "Session {} finished {} with {} entries in {:?}",
                    self.id,
                    target.directory.url,
                    contents.len(),
                    start.elapsed()
                );
                self.send(SessionEvent::Completed {
                    contents,
                    duration: start.elapsed(),
                });
            }
            Drain::Finished | Drain::Cancelled => {
                debug!("Session {} cancelled", self.id);
                self.send(SessionEvent::Cancelled);
            }
            Drain::Failed(err) => {
                warn!(
                    "Session {} failed listing {}: {}",
                    self.id, target.directory.url, err
                );
                self.send(SessionEvent::Failed(err));
            }
        }
    }

    fn drain_listing(
        &self,
        collector: &mut Collector<'_>,
        directory: &Entry,
        refresh: bool,
    ) -> Drain {
        match self.ctx.backend.list_entries(directory, refresh) {
            Ok(stream) => self.drain(collector, stream, None),
            Err(err) => Drain::Failed(err),
        }
    }

    /// Pull entries until the stream ends, the flag is set, or a read fails.
    ///
    /// With a `filter`, only entries whose lowercase name contains it are
    /// collected and directories are queued onto `subdirs`.
    fn drain(
        &self,
        collector: &mut Collector<'_>,
        mut stream: EntryStream,
        mut filter: Option<(&str, &mut VecDeque<Entry>)>,
    ) -> Drain {
        loop {
            if self.cancelled() {
                return Drain::Cancelled;
            }
            let entry = match stream.next() {
                None => return Drain::Finished,
                Some(Ok(entry)) => entry,
                Some(Err(err)) => return Drain::Failed(err),
            };
            match filter.as_mut() {
                None => collector.push(entry),
                Some((needle, subdirs)) => {
                    if entry.is_dir {
                        subdirs.push_back(entry.clone());
                    }
                    if entry.name.to_lowercase().contains(*needle) {
                        collector.push(entry);
                    }
                }
            }
        }
    }

    /// Breadth-first walk below `root`, keeping entries whose name matches
    /// `query` case-insensitively. Unreadable subdirectories are skipped;
    /// only a failure on `root` fails the search.
    fn walk_search(
        &self,
        collector: &mut Collector<'_>,
        root: &Entry,
        query: &str,
        refresh: bool,
    ) -> Drain {
        let needle = query.trim().to_lowercase();
        let mut pending: VecDeque<Entry> = VecDeque::new();
        let mut is_root = true;
        pending.push_back(root.clone());

        while let Some(dir) = pending.pop_front() {
            if self.cancelled() {
                return Drain::Cancelled;
            }
            let stream = match self.ctx.backend.list_entries(&dir, refresh) {
                Ok(stream) => stream,
                Err(err) if is_root => return Drain::Failed(err),
                Err(err) => {
                    debug!("Search skipping {}: {}", dir.url, err);
                    continue;
                }
            };
            match self.drain(collector, stream, Some((needle.as_str(), &mut pending))) {
                Drain::Finished => {}
                Drain::Failed(err) if !is_root => {
                    debug!("Search skipping rest of {}: {}", dir.url, err);
                }
                other => return other,
            }
            is_root = false;
        }
        Drain::Finished
    }

    fn run_resolve(&self, changed: Vec<EntryUrl>, mut deleted: Vec<EntryUrl>) {
        let mut resolved = Vec::with_capacity(changed.len());
        for url in changed {
            if self.cancelled() {
                self.send(SessionEvent::Cancelled);
                return;
            }
            match self.ctx.backend.resolve(&url) {
                Ok(entry) => resolved.push(entry),
                // A url that no longer resolves was removed after it was reported.
                Err(err) => {
                    debug!("Changed url {} did not resolve: {}", url, err);
                    deleted.push(url);
                }
            }
        }
        self.send(SessionEvent::Resolved(PartialUpdate {
            changed: resolved,
            removed: deleted,
        }));
    }
}

/// Accumulates entries into the session's contents and emits them in
/// batches of `batch_size`.
struct Collector<'a> {
    runner: &'a SessionRunner,
    contents: DirectoryContents,
    batch: Vec<Entry>,
}

impl<'a> Collector<'a> {
    fn new(runner: &'a SessionRunner, contents: DirectoryContents) -> Self {
        Self {
            runner,
            contents,
            batch: Vec::with_capacity(runner.ctx.batch_size),
        }
    }

    fn push(&mut self, entry: Entry) {
        self.batch.push(entry);
        if self.batch.len() >= self.runner.ctx.batch_size {
            self.flush();
        }
    }

    /// Record the pending batch and forward it unless the session was
    /// cancelled in the meantime.
    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        self.contents.push_batch(batch.iter().cloned());
        if !self.runner.cancelled() {
            self.runner.send(SessionEvent::Batch(batch));
        }
    }

    fn into_contents(self) -> DirectoryContents {
        self.contents
    }
}
