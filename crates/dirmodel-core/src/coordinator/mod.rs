/// Directory model — the single owner of the displayed directory.
///
/// All state lives on the thread that owns the `DirectoryModel`. Storage I/O
/// happens on scan-session and mutation worker threads, which report back
/// through crossbeam channels; the owner drains them by calling
/// [`process_events`](DirectoryModel::process_events) whenever it is
/// convenient (once per frame, or in a loop until
/// [`next_deadline`](DirectoryModel::next_deadline)).
///
/// Every navigation or search bumps a sequence number. Sessions, timers and
/// mutation results are tagged with the sequence current when they started
/// and are discarded once it moves on, so a slow answer for an old
/// directory can never land in the list for a new one.
///
/// At most one session reads from storage at a time. When a newer request
/// makes the running session stale it is cancelled, `ScanCancelled` is
/// published and its slot is released at once: a cancelled session issues no
/// further reads, and whatever it sends afterwards (a read that was already
/// in flight, its terminal message) is dropped. A backend that never answers
/// therefore holds up nothing but the session it hung.
pub mod events;
pub mod mutation;

use crate::config::ModelConfig;
use crate::error::{ModelError, Result, StorageError};
use crate::merge::{apply_partial_update, PartialUpdate};
use crate::model::{
    ContentsState, DirectoryContents, Entry, EntryUrl, FileListSelection, ScanTarget, TargetKind,
};
use crate::queue::{DirectoryChangeQueue, ScanTask, TaskKind, TaskOutcome};
use crate::scanner::progress::{SessionEvent, SessionId, SessionMessage};
use crate::scanner::{start_session, ScanSession, SessionContext, SessionKind};
use crate::scheduler::RescanScheduler;
use crate::storage::{validate_entry_name, SearchBackend, StorageBackend};
use crate::watcher::{DirectoryWatcher, WatchEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};
use events::{EventBus, ModelEvent};
use mutation::{spawn_mutation, MutationOp, MutationOutcome, MutationRegistry, MutationResult};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum channel messages handled per `process_events` call.
///
/// Keeps a backlog (thousands of batches from a huge directory, a burst of
/// watcher events) from stalling the owning thread; the rest is picked up
/// on the next call.
const MAX_MESSAGES_PER_PUMP: usize = 1_000;

/// Kind of change reported through
/// [`on_entries_changed`](DirectoryModel::on_entries_changed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryChangeKind {
    Created,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPurpose {
    /// Fills a freshly cleared list; owns the in-flight queue task.
    Navigate,
    /// Re-enumerates the live target and swaps the result in.
    Rescan { refresh: bool },
    /// Resolves watcher urls for a partial update.
    Partial,
}

impl ScanPurpose {
    fn is_full_scan(self) -> bool {
        !matches!(self, ScanPurpose::Partial)
    }
}

struct RunningSession {
    session: ScanSession,
    purpose: ScanPurpose,
}

enum DeferredUpdate {
    /// Entries already resolved by the caller.
    Entries(PartialUpdate),
    /// Watcher urls that still need resolving.
    Urls {
        changed: Vec<EntryUrl>,
        deleted: Vec<EntryUrl>,
    },
}

struct ActiveSearch {
    on_rescan: Box<dyn FnMut()>,
    on_clear: Box<dyn FnOnce()>,
}

pub struct DirectoryModel {
    config: ModelConfig,
    backend: Arc<dyn StorageBackend>,
    search: Option<Arc<dyn SearchBackend>>,
    watcher: Box<dyn DirectoryWatcher>,

    sequence: u64,
    next_session_id: SessionId,
    live: Option<DirectoryContents>,
    /// Directory of the most recent navigation request, which may still be
    /// queued. Searches run against it.
    target_directory: Option<Entry>,
    selection: FileListSelection,

    queue: DirectoryChangeQueue,
    scheduler: RescanScheduler,
    running: Option<RunningSession>,
    /// Rescan requested while a session was running; `Some(refresh)`.
    pending_rescan: Option<bool>,
    scan_failures: u32,
    scan_error: Option<StorageError>,
    deferred: VecDeque<DeferredUpdate>,
    active_search: Option<ActiveSearch>,
    mutations: MutationRegistry,
    events: EventBus,

    session_tx: Sender<SessionMessage>,
    session_rx: Receiver<SessionMessage>,
    mutation_tx: Sender<MutationResult>,
    mutation_rx: Receiver<MutationResult>,
    watch_tx: Sender<WatchEvent>,
    watch_rx: Receiver<WatchEvent>,
}

impl DirectoryModel {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        watcher: Box<dyn DirectoryWatcher>,
        config: ModelConfig,
    ) -> Self {
        let (session_tx, session_rx) = unbounded();
        let (mutation_tx, mutation_rx) = unbounded();
        let (watch_tx, watch_rx) = unbounded();
        Self {
            config,
            backend,
            search: None,
            watcher,
            sequence: 0,
            next_session_id: 0,
            live: None,
            target_directory: None,
            selection: FileListSelection::new(),
            queue: DirectoryChangeQueue::new(),
            scheduler: RescanScheduler::new(),
            running: None,
            pending_rescan: None,
            scan_failures: 0,
            scan_error: None,
            deferred: VecDeque::new(),
            active_search: None,
            mutations: MutationRegistry::default(),
            events: EventBus::default(),
            session_tx,
            session_rx,
            mutation_tx,
            mutation_rx,
            watch_tx,
            watch_rx,
        }
    }

    /// Answer searches on indexed storage with `search` instead of a local
    /// file-name walk.
    pub fn with_search_backend(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    /// Receive every event published from now on, in publication order.
    pub fn subscribe(&mut self) -> Receiver<ModelEvent> {
        self.events.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn contents(&self) -> Option<&DirectoryContents> {
        self.live.as_ref()
    }

    /// Entries currently displayed.
    pub fn file_list(&self) -> &[Entry] {
        self.live.as_ref().map(|c| c.entries()).unwrap_or(&[])
    }

    pub fn current_directory(&self) -> Option<&Entry> {
        self.live.as_ref().map(|c| c.directory())
    }

    /// `true` while the live list is being filled by a navigation or search.
    /// Background rescans do not count: the old list stays authoritative
    /// until the new one is swapped in.
    pub fn is_scanning(&self) -> bool {
        self.live.as_ref().is_some_and(|c| c.is_scanning())
    }

    pub fn is_searching(&self) -> bool {
        self.live.as_ref().is_some_and(|c| c.is_search())
    }

    /// Search results and directories the backend reports as read-only
    /// cannot be mutated.
    pub fn is_read_only(&self) -> bool {
        match &self.live {
            None => true,
            Some(contents) if contents.is_search() => true,
            Some(contents) => self.backend.is_read_only(contents.directory()),
        }
    }

    /// Persistent failure of the live directory, once retries are spent.
    pub fn scan_error(&self) -> Option<&StorageError> {
        self.scan_error.as_ref()
    }

    pub fn selection(&self) -> &FileListSelection {
        &self.selection
    }

    /// When the pending rescan timer fires, if one is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    /// Nothing running, queued, deferred, scheduled or awaiting a result.
    pub fn is_idle(&self) -> bool {
        self.running.is_none()
            && self.queue.is_empty()
            && self.deferred.is_empty()
            && !self.scheduler.is_pending()
            && self.mutations.is_empty()
    }

    // ── Navigation ───────────────────────────────────────────────

    pub fn change_directory(&mut self, directory: Entry) {
        self.change_directory_with(directory, |_| {});
    }

    /// Navigate to `directory`. `on_done` runs once the request has been
    /// served, with `Skipped` if a newer request overtook it first.
    pub fn change_directory_with(
        &mut self,
        directory: Entry,
        on_done: impl FnOnce(TaskOutcome) + 'static,
    ) {
        let sequence = self.advance_sequence();
        info!(
            "Changing directory to {} (sequence {})",
            directory.url, sequence
        );
        self.clear_search();
        self.target_directory = Some(directory.clone());
        self.queue.enqueue(
            ScanTask::new(sequence, TaskKind::ChangeDirectory(directory)).with_callback(on_done),
        );
        self.pump_queue();
    }

    /// Replace the listing with matches for `query` under the current
    /// directory. An empty query returns to the plain listing.
    ///
    /// `on_rescan` runs each time the results are (re)built. `on_clear` runs
    /// exactly once, when the search is replaced by another search or a
    /// navigation.
    pub fn search(
        &mut self,
        query: &str,
        on_rescan: impl FnMut() + 'static,
        on_clear: impl FnOnce() + 'static,
    ) {
        let was_searching = self.active_search.is_some() || self.is_searching();
        self.clear_search();

        let Some(directory) = self.target_directory.clone() else {
            debug!("Search ignored: no directory open");
            return;
        };
        let query = query.trim().to_string();
        if query.is_empty() && !was_searching {
            return;
        }

        let sequence = self.advance_sequence();
        if query.is_empty() {
            info!("Clearing search in {}", directory.url);
        } else {
            info!("Searching {} for {:?}", directory.url, query);
            self.active_search = Some(ActiveSearch {
                on_rescan: Box::new(on_rescan),
                on_clear: Box::new(on_clear),
            });
        }
        self.queue
            .enqueue(ScanTask::new(sequence, TaskKind::Search { directory, query }));
        self.pump_queue();
    }

    // ── Rescans ──────────────────────────────────────────────────

    /// Refresh the live contents after the short interval, keeping the
    /// current list on screen until the new one is ready.
    pub fn rescan(&mut self, refresh: bool) {
        self.schedule_rescan(self.config.short_rescan_interval(), refresh);
    }

    /// Same as [`rescan`](Self::rescan) on the long interval, used for
    /// coalescing bursts of change notifications.
    pub fn rescan_later(&mut self, refresh: bool) {
        self.schedule_rescan(self.config.long_rescan_interval(), refresh);
    }

    fn schedule_rescan(&mut self, delay: Duration, refresh: bool) {
        if self.live.is_none() {
            return;
        }
        if self
            .scheduler
            .schedule(Instant::now(), delay, refresh, self.sequence)
        {
            debug!("Rescan scheduled in {:?}", delay);
        }
    }

    fn run_rescan(&mut self, refresh: bool) {
        if self.running.is_some() || !self.queue.is_empty() {
            let refresh = self.pending_rescan.unwrap_or(false) || refresh;
            debug!("Session running; rescan deferred until it finishes");
            self.pending_rescan = Some(refresh);
            return;
        }
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let target = live.target().clone();
        debug!("Rescanning {}", target.directory.url);
        self.spawn_session(
            SessionKind::Scan { target, refresh },
            ScanPurpose::Rescan { refresh },
        );
    }

    // ── Partial updates ──────────────────────────────────────────

    /// Apply entries created or deleted by the host without re-enumerating.
    pub fn on_entries_changed(&mut self, kind: EntryChangeKind, entries: Vec<Entry>) {
        if entries.is_empty() {
            return;
        }
        let update = match kind {
            EntryChangeKind::Created => PartialUpdate {
                changed: entries,
                removed: Vec::new(),
            },
            EntryChangeKind::Deleted => PartialUpdate {
                changed: Vec::new(),
                removed: entries.into_iter().map(|e| e.url).collect(),
            },
        };
        self.request_partial_update(DeferredUpdate::Entries(update));
    }

    /// React to a watcher notification for the live directory. Watchers
    /// registered through the model are drained automatically; this is the
    /// entry point for hosts running their own.
    pub fn handle_watch_event(&mut self, event: WatchEvent) {
        let relevant = self
            .current_directory()
            .is_some_and(|dir| &dir.url == event.directory());
        if !relevant {
            debug!("Ignoring watcher event for {}", event.directory());
            return;
        }
        match event {
            WatchEvent::Changes {
                added_or_updated,
                deleted,
                ..
            } => {
                if added_or_updated.is_empty() && deleted.is_empty() {
                    return;
                }
                self.request_partial_update(DeferredUpdate::Urls {
                    changed: added_or_updated,
                    deleted,
                });
            }
            WatchEvent::Changed { .. } => self.rescan_later(true),
        }
    }

    fn request_partial_update(&mut self, update: DeferredUpdate) {
        if self.running.is_some() || !self.queue.is_empty() || !self.deferred.is_empty() {
            debug!("Deferring partial update ({} queued)", self.deferred.len() + 1);
            self.deferred.push_back(update);
            return;
        }
        self.start_partial(update);
    }

    fn start_partial(&mut self, update: DeferredUpdate) {
        match update {
            DeferredUpdate::Entries(update) => self.apply_update(update),
            DeferredUpdate::Urls { changed, deleted } => self.spawn_session(
                SessionKind::ResolveChanges { changed, deleted },
                ScanPurpose::Partial,
            ),
        }
    }

    fn drain_deferred(&mut self) {
        while self.running.is_none() {
            let Some(update) = self.deferred.pop_front() else {
                break;
            };
            self.start_partial(update);
        }
    }

    fn apply_update(&mut self, update: PartialUpdate) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let stats = apply_partial_update(live, update);
        debug!(
            "Partial update on {}: +{} ~{} -{} ({} ignored)",
            live.directory().url,
            stats.inserted,
            stats.replaced,
            stats.removed,
            stats.ignored
        );
        let entries = live.len();
        if self.selection.reconcile(live) {
            self.events.emit(ModelEvent::SelectionChanged);
        }
        self.events.emit(ModelEvent::RescanCompleted { entries });
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Create `name` in the current directory. On success the new entry is
    /// inserted at the top of the list and selected; if an entry with that
    /// name already appeared (e.g. through a watcher) it is selected instead.
    ///
    /// Rejected with `InvalidOperation` while a scan or search is showing.
    pub fn create_directory(
        &mut self,
        name: &str,
        on_done: impl FnOnce(MutationOutcome) + 'static,
    ) -> Result<()> {
        let parent = self.mutable_contents("create a directory")?.directory().clone();
        validate_entry_name(name)?;

        let request = self.mutations.register(Box::new(on_done));
        let owned = name.to_string();
        let op = MutationOp::CreateDirectory {
            name: owned.clone(),
        };
        let spawned = spawn_mutation(
            self.backend.clone(),
            request,
            self.sequence,
            op,
            self.mutation_tx.clone(),
            move |backend| backend.create_directory(&parent, &owned),
        );
        self.check_spawned(request, spawned)
    }

    /// Rename `entry`, which must be listed in the current directory.
    pub fn rename_entry(
        &mut self,
        entry: &Entry,
        new_name: &str,
        on_done: impl FnOnce(MutationOutcome) + 'static,
    ) -> Result<()> {
        let contents = self.mutable_contents("rename")?;
        if contents.find_index(&entry.url).is_none() {
            return Err(ModelError::InvalidOperation(format!(
                "{} is not in the current directory",
                entry.url
            )));
        }
        validate_entry_name(new_name)?;

        let request = self.mutations.register(Box::new(on_done));
        let target = entry.clone();
        let owned = new_name.to_string();
        let op = MutationOp::Rename {
            from: entry.url.clone(),
        };
        let spawned = spawn_mutation(
            self.backend.clone(),
            request,
            self.sequence,
            op,
            self.mutation_tx.clone(),
            move |backend| backend.rename(&target, &owned),
        );
        self.check_spawned(request, spawned)
    }

    fn mutable_contents(&self, action: &str) -> Result<&DirectoryContents> {
        let Some(live) = self.live.as_ref() else {
            return Err(ModelError::InvalidOperation(format!(
                "cannot {action}: no directory is open"
            )));
        };
        if live.is_search() {
            return Err(ModelError::InvalidOperation(format!(
                "cannot {action} in search results"
            )));
        }
        if live.is_scanning() || self.is_rescanning() || !self.queue.is_empty() {
            return Err(ModelError::InvalidOperation(format!(
                "cannot {action} while {} is being scanned",
                live.directory().url
            )));
        }
        Ok(live)
    }

    /// A background rescan is reading a snapshot that will replace the list.
    fn is_rescanning(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| matches!(running.purpose, ScanPurpose::Rescan { .. }))
    }

    fn check_spawned(&mut self, request: u64, spawned: std::io::Result<()>) -> Result<()> {
        match spawned {
            Ok(()) => Ok(()),
            Err(err) => {
                self.mutations.take(request);
                Err(ModelError::Storage(StorageError::from(err)))
            }
        }
    }

    fn on_mutation_result(&mut self, result: MutationResult) {
        let Some(on_done) = self.mutations.take(result.request) else {
            return;
        };
        if result.sequence != self.sequence {
            debug!(
                "Mutation {} finished after the directory changed",
                result.request
            );
            on_done(MutationOutcome::Aborted);
            return;
        }
        let entry = match result.result {
            Ok(entry) => entry,
            Err(error) => {
                warn!("Mutation {} failed: {}", result.request, error);
                on_done(MutationOutcome::Failed(error));
                return;
            }
        };
        if self.is_rescanning() {
            // The running rescan may have read the directory before this
            // change; make sure another one follows it.
            debug!("Mutation {} landed during a rescan", result.request);
            self.pending_rescan = Some(self.pending_rescan.unwrap_or(false));
        }
        let Some(live) = self.live.as_mut() else {
            on_done(MutationOutcome::Aborted);
            return;
        };

        match result.op {
            MutationOp::CreateDirectory { name } => {
                let existing = live.find_by_name(&name).cloned();
                let shown = match existing {
                    Some(existing) => existing,
                    None => {
                        live.insert(0, entry.clone());
                        entry
                    }
                };
                info!("Created directory {}", shown.url);
                self.set_selection(vec![shown.url.clone()]);
                on_done(MutationOutcome::Done(shown));
            }
            MutationOp::Rename { from } => {
                if !live.replace(&from, entry.clone()) {
                    live.upsert(entry.clone());
                }
                info!("Renamed {} to {}", from, entry.url);
                if self.selection.contains(&from) {
                    self.selection.rename(&from, &entry.url);
                    self.events.emit(ModelEvent::SelectionChanged);
                }
                on_done(MutationOutcome::Done(entry));
            }
        }
    }

    // ── Selection ────────────────────────────────────────────────

    /// Select the given entries; urls not in the live list are ignored.
    pub fn select_entries(&mut self, urls: impl IntoIterator<Item = EntryUrl>) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let urls: Vec<EntryUrl> = urls
            .into_iter()
            .filter(|url| live.find_index(url).is_some())
            .collect();
        self.set_selection(urls);
    }

    fn set_selection(&mut self, urls: Vec<EntryUrl>) {
        let before = self.selection.clone();
        self.selection.select(urls);
        if self.selection != before {
            self.events.emit(ModelEvent::SelectionChanged);
        }
    }

    // ── Event pump ───────────────────────────────────────────────

    pub fn process_events(&mut self) -> usize {
        self.process_events_at(Instant::now())
    }

    /// Drain session, mutation and watcher messages, then fire the rescan
    /// timer if it is due at `now`. Returns the number of items handled.
    pub fn process_events_at(&mut self, now: Instant) -> usize {
        let mut handled = 0usize;

        while handled < MAX_MESSAGES_PER_PUMP {
            let Ok(message) = self.session_rx.try_recv() else {
                break;
            };
            handled += 1;
            self.on_session_message(message);
        }
        while handled < MAX_MESSAGES_PER_PUMP {
            let Ok(result) = self.mutation_rx.try_recv() else {
                break;
            };
            handled += 1;
            self.on_mutation_result(result);
        }
        while handled < MAX_MESSAGES_PER_PUMP {
            let Ok(event) = self.watch_rx.try_recv() else {
                break;
            };
            handled += 1;
            self.handle_watch_event(event);
        }

        if let Some(due) = self.scheduler.take_due(now, self.sequence) {
            handled += 1;
            self.run_rescan(due.refresh);
        }
        handled
    }

    fn on_session_message(&mut self, message: SessionMessage) {
        let Some(running) = self.running.as_ref() else {
            debug!("Dropping message from finished session {}", message.session);
            return;
        };
        if running.session.id() != message.session {
            debug!("Dropping message from finished session {}", message.session);
            return;
        }
        // Stale sessions leave `running` when cancelled, so the session that
        // is still here belongs to the current sequence.
        debug_assert_eq!(message.sequence, self.sequence);
        let purpose = running.purpose;
        let terminal = message.event.is_terminal();

        if terminal {
            self.running = None;
        }
        match message.event {
            SessionEvent::Batch(entries) => self.on_batch(purpose, entries),
            SessionEvent::Completed { contents, duration } => {
                self.on_scan_completed(purpose, contents, duration)
            }
            SessionEvent::Failed(error) => self.on_scan_failed(purpose, error),
            SessionEvent::ResolveFailed(error) => self.on_resolve_failed(purpose, error),
            SessionEvent::Cancelled => self.finish_task(purpose, TaskOutcome::Cancelled),
            SessionEvent::Resolved(update) => self.apply_update(update),
        }
        if terminal {
            self.after_session();
        }
    }

    fn on_batch(&mut self, purpose: ScanPurpose, entries: Vec<Entry>) {
        // Rescans build a private copy and swap it in at the end.
        if purpose != ScanPurpose::Navigate {
            return;
        }
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let added = entries.len();
        live.push_batch(entries);
        let total = live.len();
        self.events.emit(ModelEvent::ScanUpdated { added, total });
    }

    fn on_scan_completed(
        &mut self,
        purpose: ScanPurpose,
        contents: DirectoryContents,
        duration: Duration,
    ) {
        self.scan_failures = 0;
        self.scan_error = None;
        let entries = contents.len();
        match purpose {
            ScanPurpose::Navigate => {
                info!(
                    "Scanned {} ({} entries) in {:.2?}",
                    contents.directory().url,
                    entries,
                    duration
                );
                self.replace_contents(contents);
                self.events.emit(ModelEvent::ScanCompleted { entries });
                self.notify_search_rescan();
                self.finish_task(purpose, TaskOutcome::Completed);
            }
            ScanPurpose::Rescan { .. } => {
                debug!(
                    "Rescanned {} ({} entries) in {:.2?}",
                    contents.directory().url,
                    entries,
                    duration
                );
                self.replace_contents(contents);
                self.events.emit(ModelEvent::RescanCompleted { entries });
                self.notify_search_rescan();
            }
            ScanPurpose::Partial => {}
        }
    }

    fn on_scan_failed(&mut self, purpose: ScanPurpose, error: StorageError) {
        if !purpose.is_full_scan() {
            warn!("Resolving changed entries failed: {}", error);
            return;
        }
        self.scan_failures += 1;
        let will_retry = self.scan_failures <= self.config.max_scan_retries;

        if let Some(live) = self.live.as_mut() {
            warn!(
                "Scan of {} failed (attempt {}): {}",
                live.directory().url,
                self.scan_failures,
                error
            );
            live.set_state(ContentsState::Failed(error.clone()));
        }
        if !will_retry {
            self.scan_error = Some(error.clone());
        }
        self.events.emit(ModelEvent::ScanFailed { error, will_retry });
        self.finish_task(purpose, TaskOutcome::Failed);

        // A pending follow-up runs from `after_session` and is the retry.
        if will_retry && self.pending_rescan.is_none() {
            let refresh = matches!(purpose, ScanPurpose::Rescan { refresh: true });
            self.rescan_later(refresh);
        }
    }

    fn on_resolve_failed(&mut self, purpose: ScanPurpose, error: StorageError) {
        let Some(live) = self.live.as_mut() else {
            self.finish_task(purpose, TaskOutcome::Failed);
            return;
        };
        let url = live.directory().url.clone();
        let reported = ModelError::TargetResolution {
            url: url.clone(),
            source: error.clone(),
        };
        warn!("{}", reported);
        live.set_state(ContentsState::Failed(error.clone()));
        self.scan_error = Some(error.clone());
        self.events.emit(ModelEvent::TargetResolutionFailed {
            url: url.clone(),
            error,
        });
        self.finish_task(purpose, TaskOutcome::Failed);
        self.navigate_to_fallback(&url);
    }

    fn navigate_to_fallback(&mut self, failed: &EntryUrl) {
        let fallback = self
            .config
            .fallback_root
            .clone()
            .or_else(|| self.backend.default_root());
        match fallback {
            Some(root) if &root != failed => {
                info!("Falling back to {}", root);
                self.change_directory(Entry::new_dir(root));
            }
            _ => debug!("No fallback available for {}", failed),
        }
    }

    /// Free the queue slot if the finished session was serving it.
    fn finish_task(&mut self, purpose: ScanPurpose, outcome: TaskOutcome) {
        if purpose == ScanPurpose::Navigate {
            self.queue.complete(outcome);
        }
    }

    /// Runs after every terminal message: follow-up rescan, next queued
    /// task, then deferred partial updates.
    fn after_session(&mut self) {
        if let Some(refresh) = self.pending_rescan.take() {
            self.rescan(refresh);
        }
        self.pump_queue();
        self.drain_deferred();
    }

    // ── Internals ────────────────────────────────────────────────

    /// Bump the sequence number and cancel the session it made stale.
    fn advance_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.cancel_stale_session();
        self.sequence
    }

    /// The cancelled session's thread is detached; its late messages no longer
    /// match `running` and are dropped on arrival.
    fn cancel_stale_session(&mut self) {
        let sequence = self.sequence;
        let stale = self
            .running
            .as_ref()
            .is_some_and(|running| running.session.sequence() != sequence);
        if !stale {
            return;
        }
        let Some(running) = self.running.take() else {
            return;
        };
        running.session.cancel();
        let purpose = running.purpose;
        debug!(
            "Cancelling session {} (sequence {} superseded by {})",
            running.session.id(),
            running.session.sequence(),
            sequence
        );

        if purpose == ScanPurpose::Navigate {
            if let Some(live) = self.live.as_mut() {
                live.set_state(ContentsState::Cancelled);
            }
        }
        self.pending_rescan = None;
        if purpose.is_full_scan() {
            self.events.emit(ModelEvent::ScanCancelled);
        }
        self.finish_task(purpose, TaskOutcome::Cancelled);
    }

    /// Start queued tasks until one of them leaves a session running.
    fn pump_queue(&mut self) {
        while self.running.is_none() {
            let Some((sequence, kind)) = self.queue.start_next() else {
                return;
            };
            self.run_task(sequence, kind);
        }
    }

    fn run_task(&mut self, sequence: u64, kind: TaskKind) {
        if sequence != self.sequence {
            debug!(
                "Skipping stale task (sequence {} < {})",
                sequence, self.sequence
            );
            self.queue.complete(TaskOutcome::Skipped);
            return;
        }

        match kind {
            TaskKind::ChangeDirectory(directory) => {
                if let Err(err) = self.watcher.watch(&directory, self.watch_tx.clone()) {
                    warn!("Cannot watch {}: {}", directory.url, err);
                }
                let previous = self.live.as_ref().map(|c| c.directory().clone());
                if previous.as_ref().map(|p| &p.url) != Some(&directory.url) {
                    self.scan_failures = 0;
                }
                self.clear_and_scan(ScanTarget::directory(directory.clone()));
                self.events.emit(ModelEvent::DirectoryChanged {
                    previous,
                    current: directory,
                });
            }
            TaskKind::Search { directory, query } if query.is_empty() => {
                if self.is_searching() {
                    self.clear_and_scan(ScanTarget::directory(directory));
                } else {
                    self.queue.complete(TaskOutcome::Skipped);
                }
            }
            TaskKind::Search { directory, query } => {
                let kind = match &self.search {
                    Some(search) if search.is_available(&directory) => {
                        TargetKind::RemoteSearch { query }
                    }
                    _ => TargetKind::LocalSearch { query },
                };
                self.clear_and_scan(ScanTarget { directory, kind });
            }
        }
    }

    /// Clear the list and start filling it from `target`.
    fn clear_and_scan(&mut self, target: ScanTarget) {
        self.scheduler.clear();
        self.pending_rescan = None;
        self.scan_error = None;
        self.deferred.clear();

        self.replace_contents(DirectoryContents::new(target.clone()));
        self.events.emit(ModelEvent::ScanStarted {
            directory: target.directory.url.clone(),
            search: target.is_search(),
        });
        self.spawn_session(
            SessionKind::Scan {
                target,
                refresh: false,
            },
            ScanPurpose::Navigate,
        );
    }

    /// Swap in new live contents and drop selected entries that are gone.
    fn replace_contents(&mut self, contents: DirectoryContents) {
        self.live = Some(contents);
        let changed = match &self.live {
            Some(live) => self.selection.reconcile(live),
            None => false,
        };
        if changed {
            self.events.emit(ModelEvent::SelectionChanged);
        }
    }

    fn spawn_session(&mut self, kind: SessionKind, purpose: ScanPurpose) {
        self.next_session_id += 1;
        let ctx = SessionContext {
            backend: self.backend.clone(),
            search: self.search.clone(),
            batch_size: self.config.batch_size,
            tx: self.session_tx.clone(),
        };
        let session = start_session(self.next_session_id, self.sequence, kind, ctx);
        debug!(
            "Started session {} ({:?}, sequence {})",
            session.id(),
            purpose,
            self.sequence
        );
        self.running = Some(RunningSession { session, purpose });
    }

    fn clear_search(&mut self) {
        if let Some(search) = self.active_search.take() {
            debug!("Search cleared");
            (search.on_clear)();
        }
    }

    fn notify_search_rescan(&mut self) {
        if !self.is_searching() {
            return;
        }
        if let Some(search) = self.active_search.as_mut() {
            (search.on_rescan)();
        }
    }
}

impl Drop for DirectoryModel {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.session.cancel();
        }
        self.watcher.unwatch();
    }
}
