#![allow(dead_code)]
/// Shared fixtures for the coordinator integration tests.
///
/// `FakeBackend` serves an in-memory tree and records every listing call.
/// A url can be *gated*: reads of it block until the test releases the
/// gate, which is how the tests hold a scan session mid-read while issuing
/// newer requests. A gated listing has already taken its snapshot.
use crossbeam_channel::Receiver;
use dirmodel_core::model::{Entry, EntryUrl, Metadata};
use dirmodel_core::storage::{EntryStream, StorageBackend, StorageResult};
use dirmodel_core::watcher::NullWatcher;
use dirmodel_core::{DirectoryModel, ModelConfig, ModelEvent, StorageError};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Generous upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct State {
    entries: HashMap<EntryUrl, Entry>,
    children: HashMap<EntryUrl, Vec<Entry>>,
    gated: HashSet<EntryUrl>,
    failing: HashMap<EntryUrl, StorageError>,
    list_calls: Vec<EntryUrl>,
    active_reads: usize,
    max_active_reads: usize,
    default_root: Option<EntryUrl>,
}

impl State {
    fn insert(&mut self, entry: Entry) {
        if entry.is_dir {
            self.children.entry(entry.url.clone()).or_default();
        }
        if let Some(parent) = entry.parent_url() {
            let siblings = self.children.entry(parent).or_default();
            siblings.retain(|e| e.url != entry.url);
            siblings.push(entry.clone());
        }
        self.entries.insert(entry.url.clone(), entry);
    }

    fn remove(&mut self, url: &EntryUrl) {
        self.entries.remove(url);
        self.children.remove(url);
        if let Some(parent) = url.parent() {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|e| &e.url != url);
            }
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
    released: Condvar,
}

pub fn url(s: &str) -> EntryUrl {
    EntryUrl::new(s)
}

pub fn dir(s: &str) -> Entry {
    Entry::new_dir(url(s))
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_dir(&self, u: &str) -> Entry {
        let entry = dir(u).with_metadata(Metadata::default());
        self.state.lock().insert(entry.clone());
        entry
    }

    pub fn add_file(&self, u: &str) -> Entry {
        let entry = Entry::new_file(url(u)).with_metadata(Metadata {
            size: 1,
            modified: None,
        });
        self.state.lock().insert(entry.clone());
        entry
    }

    pub fn remove(&self, u: &str) {
        self.state.lock().remove(&url(u));
    }

    pub fn gate(&self, u: &str) {
        self.state.lock().gated.insert(url(u));
    }

    pub fn release(&self, u: &str) {
        self.state.lock().gated.remove(&url(u));
        self.released.notify_all();
    }

    pub fn fail_listing(&self, u: &str, error: StorageError) {
        self.state.lock().failing.insert(url(u), error);
    }

    pub fn set_default_root(&self, u: &str) {
        self.state.lock().default_root = Some(url(u));
    }

    pub fn list_calls(&self) -> Vec<EntryUrl> {
        self.state.lock().list_calls.clone()
    }

    pub fn list_count(&self, u: &str) -> usize {
        let target = url(u);
        self.state
            .lock()
            .list_calls
            .iter()
            .filter(|c| **c == target)
            .count()
    }

    pub fn max_active_reads(&self) -> usize {
        self.state.lock().max_active_reads
    }

    /// Block until `n` listing calls have been made.
    pub fn wait_for_list_calls(&self, n: usize) {
        let deadline = Instant::now() + TIMEOUT;
        while self.state.lock().list_calls.len() < n {
            assert!(Instant::now() < deadline, "backend never saw {n} listings");
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn wait_gate(&self, state: &mut MutexGuard<'_, State>, key: &EntryUrl) {
        while state.gated.contains(key) {
            self.released.wait(state);
        }
    }
}

impl StorageBackend for FakeBackend {
    fn list_entries(&self, directory: &Entry, _refresh: bool) -> StorageResult<EntryStream> {
        let mut state = self.state.lock();
        state.list_calls.push(directory.url.clone());
        state.active_reads += 1;
        state.max_active_reads = state.max_active_reads.max(state.active_reads);

        // The read sees the tree as it is when issued, even if a gate then
        // holds it back from returning.
        let snapshot = match state.failing.get(&directory.url) {
            Some(err) => Err(err.clone()),
            None => state
                .children
                .get(&directory.url)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(directory.url.to_string())),
        };
        self.wait_gate(&mut state, &directory.url);
        state.active_reads -= 1;

        let children = snapshot?;
        Ok(Box::new(children.into_iter().map(Ok)))
    }

    fn get_metadata(&self, entry: &Entry) -> StorageResult<Metadata> {
        self.state
            .lock()
            .entries
            .get(&entry.url)
            .and_then(|e| e.metadata.clone())
            .ok_or_else(|| StorageError::NotFound(entry.url.to_string()))
    }

    fn resolve(&self, u: &EntryUrl) -> StorageResult<Entry> {
        self.state
            .lock()
            .entries
            .get(u)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(u.to_string()))
    }

    fn create_directory(&self, parent: &Entry, name: &str) -> StorageResult<Entry> {
        let target = parent.url.join(name);
        let mut state = self.state.lock();
        self.wait_gate(&mut state, &target);
        if state.entries.contains_key(&target) {
            return Err(StorageError::AlreadyExists(target.to_string()));
        }
        let entry = Entry::new_dir(target).with_metadata(Metadata::default());
        state.insert(entry.clone());
        Ok(entry)
    }

    fn rename(&self, entry: &Entry, new_name: &str) -> StorageResult<Entry> {
        let parent = entry
            .parent_url()
            .ok_or_else(|| StorageError::Backend("cannot rename a root".into()))?;
        let target = parent.join(new_name);
        let mut state = self.state.lock();
        if state.entries.contains_key(&target) {
            return Err(StorageError::AlreadyExists(target.to_string()));
        }
        let mut renamed = state
            .entries
            .get(&entry.url)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(entry.url.to_string()))?;
        state.remove(&entry.url);
        renamed.name = new_name.into();
        renamed.url = target;
        state.insert(renamed.clone());
        Ok(renamed)
    }

    fn default_root(&self) -> Option<EntryUrl> {
        self.state.lock().default_root.clone()
    }
}

/// Intervals short enough that retry and follow-up timers fire while a
/// test pumps in real time.
pub fn fast_config() -> ModelConfig {
    ModelConfig {
        short_rescan_interval_ms: 10,
        long_rescan_interval_ms: 20,
        ..ModelConfig::default()
    }
}

pub fn model_with(backend: &Arc<FakeBackend>, config: ModelConfig) -> DirectoryModel {
    DirectoryModel::new(backend.clone(), Box::new(NullWatcher), config)
}

/// Pump the model until `done` holds, panicking after [`TIMEOUT`].
pub fn pump_until(
    model: &mut DirectoryModel,
    what: &str,
    mut done: impl FnMut(&DirectoryModel) -> bool,
) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        model.process_events();
        if done(model) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn pump_until_idle(model: &mut DirectoryModel) {
    pump_until(model, "model to go idle", |m| m.is_idle());
}

/// Keep pumping for `window` so anything wrongly scheduled gets a chance
/// to run.
pub fn pump_for(model: &mut DirectoryModel, window: Duration) {
    let end = Instant::now() + window;
    while Instant::now() < end {
        model.process_events();
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn drain(events: &Receiver<ModelEvent>) -> Vec<ModelEvent> {
    events.try_iter().collect()
}

pub fn names(model: &DirectoryModel) -> Vec<String> {
    model.file_list().iter().map(|e| e.name.to_string()).collect()
}
