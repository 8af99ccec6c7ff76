/// Directory model scenarios against an in-memory backend.
///
/// Each test drives a real `DirectoryModel` (real session threads, real
/// channels) and controls timing through the fake backend's gates, so the
/// interleavings being checked are deterministic.
mod support;

use dirmodel_core::watcher::WatchEvent;
use dirmodel_core::{
    Entry, EntryChangeKind, ModelConfig, ModelError, ModelEvent, MutationOutcome, StorageError,
    TaskOutcome,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};
use support::*;

fn populated() -> std::sync::Arc<FakeBackend> {
    let backend = FakeBackend::new();
    backend.add_dir("/d");
    backend.add_file("/d/a.txt");
    backend.add_file("/d/b.txt");
    backend
}

// ── Navigation ───────────────────────────────────────────────────────────────

#[test]
fn navigation_fills_the_list_and_publishes_events() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    let events = model.subscribe();

    model.change_directory(dir("/d"));
    assert!(model.is_scanning());
    pump_until_idle(&mut model);

    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    assert!(!model.is_scanning());
    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/d")));

    let events = drain(&events);
    assert_eq!(
        events.first(),
        Some(&ModelEvent::ScanStarted {
            directory: url("/d"),
            search: false
        })
    );
    assert!(events.contains(&ModelEvent::DirectoryChanged {
        previous: None,
        current: dir("/d"),
    }));
    assert_eq!(events.last(), Some(&ModelEvent::ScanCompleted { entries: 2 }));
}

#[test]
fn stale_scan_is_cancelled_and_never_reaches_the_list() {
    let backend = populated();
    backend.add_dir("/slow");
    backend.add_file("/slow/old.txt");
    backend.gate("/slow");

    let mut model = model_with(&backend, ModelConfig::default());
    let events = model.subscribe();
    let outcomes = Rc::new(RefCell::new(Vec::new()));

    let log = outcomes.clone();
    model.change_directory_with(dir("/slow"), move |o| log.borrow_mut().push(("slow", o)));
    backend.wait_for_list_calls(1);

    let log = outcomes.clone();
    model.change_directory_with(dir("/d"), move |o| log.borrow_mut().push(("d", o)));
    assert!(drain(&events).contains(&ModelEvent::ScanCancelled));
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    drain(&events);

    // The abandoned read returns late; nothing of it is shown.
    backend.release("/slow");
    pump_for(&mut model, Duration::from_millis(100));

    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/d")));
    assert!(drain(&events).is_empty());
    assert_eq!(
        *outcomes.borrow(),
        vec![("slow", TaskOutcome::Cancelled), ("d", TaskOutcome::Completed)]
    );
}

#[test]
fn hung_read_does_not_block_the_next_navigation() {
    let backend = populated();
    backend.add_dir("/hung");
    backend.gate("/hung");

    let mut model = model_with(&backend, ModelConfig::default());
    let events = model.subscribe();

    model.change_directory(dir("/hung"));
    backend.wait_for_list_calls(1);
    assert!(model.is_scanning());

    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    assert_eq!(backend.list_calls(), vec![url("/hung"), url("/d")]);
    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/d")));
    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    assert!(!model.is_scanning());
    assert!(drain(&events).contains(&ModelEvent::DirectoryChanged {
        previous: Some(dir("/hung")),
        current: dir("/d"),
    }));

    backend.release("/hung");
}

#[test]
fn rapid_navigation_settles_on_the_latest_directory() {
    let backend = populated();
    backend.add_dir("/a");
    backend.add_dir("/b");
    backend.add_file("/b/stale.txt");
    backend.gate("/a");
    backend.gate("/b");

    let mut model = model_with(&backend, ModelConfig::default());
    let outcomes = Rc::new(RefCell::new(Vec::new()));

    model.change_directory(dir("/a"));
    backend.wait_for_list_calls(1);
    let log = outcomes.clone();
    model.change_directory_with(dir("/b"), move |o| log.borrow_mut().push(("b", o)));
    let log = outcomes.clone();
    model.change_directory_with(dir("/d"), move |o| log.borrow_mut().push(("d", o)));
    pump_until_idle(&mut model);

    backend.release("/a");
    backend.release("/b");
    pump_for(&mut model, Duration::from_millis(100));

    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/d")));
    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    assert_eq!(backend.list_count("/d"), 1);
    assert_eq!(
        *outcomes.borrow(),
        vec![("b", TaskOutcome::Cancelled), ("d", TaskOutcome::Completed)]
    );
}

// ── Rescans ──────────────────────────────────────────────────────────────────

#[test]
fn rescan_bursts_are_debounced_into_one_enumeration() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);
    let events = model.subscribe();

    for _ in 0..20 {
        model.rescan_later(false);
    }
    for _ in 0..5 {
        model.rescan(false);
    }
    let deadline = model.next_deadline().expect("no rescan scheduled");
    assert!(deadline <= Instant::now() + Duration::from_millis(100));

    model.process_events_at(Instant::now() + Duration::from_secs(2));
    pump_until_idle(&mut model);

    assert_eq!(backend.list_count("/d"), 2);
    let rescans = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, ModelEvent::RescanCompleted { .. }))
        .count();
    assert_eq!(rescans, 1);
}

#[test]
fn rescan_during_a_running_scan_runs_once_it_finishes() {
    let backend = populated();
    backend.gate("/d");
    let mut model = model_with(&backend, fast_config());

    model.change_directory(dir("/d"));
    backend.wait_for_list_calls(1);
    model.rescan(true);
    model.process_events_at(Instant::now() + Duration::from_secs(1));
    assert_eq!(backend.list_count("/d"), 1, "rescan overlapped the scan");

    backend.release("/d");
    pump_until(&mut model, "follow-up rescan", |_| backend.list_count("/d") == 2);
    pump_until_idle(&mut model);
    assert_eq!(backend.max_active_reads(), 1);
}

#[test]
fn rescan_keeps_selection_by_identity() {
    let backend = populated();
    backend.add_file("/d/c.txt");
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);
    let events = model.subscribe();

    model.select_entries([url("/d/b.txt"), url("/d/nope")]);
    assert_eq!(model.selection().selected(), &[url("/d/b.txt")]);

    backend.remove("/d/a.txt");
    model.rescan(false);
    model.process_events_at(Instant::now() + Duration::from_secs(1));
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["b.txt", "c.txt"]);
    assert_eq!(model.selection().selected(), &[url("/d/b.txt")]);

    backend.remove("/d/b.txt");
    drain(&events);
    model.rescan(false);
    model.process_events_at(Instant::now() + Duration::from_secs(1));
    pump_until_idle(&mut model);
    assert!(model.selection().is_empty());
    assert!(drain(&events).contains(&ModelEvent::SelectionChanged));
}

#[test]
fn failed_scan_is_retried_once_then_sticks() {
    let backend = populated();
    backend.fail_listing("/d", StorageError::Unreachable("offline".into()));
    let mut model = model_with(&backend, fast_config());
    let events = model.subscribe();

    model.change_directory(dir("/d"));
    pump_until(&mut model, "persistent error", |m| m.scan_error().is_some());
    pump_for(&mut model, Duration::from_millis(100));

    assert_eq!(backend.list_count("/d"), 2);
    assert!(model.is_idle());
    assert_eq!(
        model.scan_error(),
        Some(&StorageError::Unreachable("offline".into()))
    );
    let retries: Vec<bool> = drain(&events)
        .into_iter()
        .filter_map(|e| match e {
            ModelEvent::ScanFailed { will_retry, .. } => Some(will_retry),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![true, false]);
}

#[test]
fn failure_with_a_follow_up_pending_is_not_yet_persistent() {
    let backend = populated();
    backend.fail_listing("/d", StorageError::Unreachable("offline".into()));
    backend.gate("/d");
    let mut model = model_with(&backend, fast_config());
    let events = model.subscribe();

    model.change_directory(dir("/d"));
    backend.wait_for_list_calls(1);
    model.rescan(false);
    model.process_events_at(Instant::now() + Duration::from_secs(1));

    backend.release("/d");
    let mut failures = Vec::new();
    pump_until(&mut model, "first failure", |_| {
        failures.extend(drain(&events).into_iter().filter_map(|e| match e {
            ModelEvent::ScanFailed { will_retry, .. } => Some(will_retry),
            _ => None,
        }));
        !failures.is_empty()
    });
    assert_eq!(failures, vec![true]);
    assert!(model.scan_error().is_none());

    // The pending follow-up is the retry; no second one is scheduled.
    pump_until(&mut model, "persistent error", |m| m.scan_error().is_some());
    pump_for(&mut model, Duration::from_millis(100));
    assert_eq!(backend.list_count("/d"), 2);
    assert!(model.is_idle());
    failures.extend(drain(&events).into_iter().filter_map(|e| match e {
        ModelEvent::ScanFailed { will_retry, .. } => Some(will_retry),
        _ => None,
    }));
    assert_eq!(failures, vec![true, false]);
}

// ── Partial updates ──────────────────────────────────────────────────────────

#[test]
fn watcher_changes_are_merged_without_a_rescan() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);
    let events = model.subscribe();

    backend.add_file("/d/c.txt");
    model.handle_watch_event(WatchEvent::Changes {
        directory: url("/d"),
        added_or_updated: vec![url("/d/c.txt")],
        deleted: vec![],
    });
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["a.txt", "b.txt", "c.txt"]);

    backend.remove("/d/a.txt");
    model.handle_watch_event(WatchEvent::Changes {
        directory: url("/d"),
        added_or_updated: vec![],
        deleted: vec![url("/d/a.txt")],
    });
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["b.txt", "c.txt"]);

    // Reported as added but already gone again: treated as a removal.
    model.handle_watch_event(WatchEvent::Changes {
        directory: url("/d"),
        added_or_updated: vec![url("/d/ghost")],
        deleted: vec![],
    });
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["b.txt", "c.txt"]);

    assert_eq!(backend.list_count("/d"), 1, "partial update re-enumerated");
    let rescans = drain(&events)
        .into_iter()
        .filter(|e| matches!(e, ModelEvent::RescanCompleted { .. }))
        .count();
    assert_eq!(rescans, 3);
}

#[test]
fn partial_update_waits_for_the_running_scan() {
    let backend = populated();
    backend.gate("/d");
    let mut model = model_with(&backend, ModelConfig::default());

    model.change_directory(dir("/d"));
    backend.wait_for_list_calls(1);
    // Not on the backend, so only the deferred update can add it.
    let created = Entry::new_file(url("/d/z.txt"));
    model.on_entries_changed(EntryChangeKind::Created, vec![created]);
    assert!(model.file_list().is_empty());

    backend.release("/d");
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["a.txt", "b.txt", "z.txt"]);
}

#[test]
fn host_reported_changes_respect_the_live_directory() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    model.on_entries_changed(
        EntryChangeKind::Created,
        vec![dir("/d/new"), dir("/elsewhere/x")],
    );
    model.on_entries_changed(
        EntryChangeKind::Deleted,
        vec![Entry::new_file(url("/d/a.txt"))],
    );
    assert_eq!(names(&model), vec!["b.txt", "new"]);
}

#[test]
fn unattributed_watcher_change_schedules_a_long_rescan() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    model.handle_watch_event(WatchEvent::Changed {
        directory: url("/other"),
    });
    assert!(model.next_deadline().is_none());

    let before = Instant::now();
    model.handle_watch_event(WatchEvent::Changed {
        directory: url("/d"),
    });
    let deadline = model.next_deadline().expect("rescan not scheduled");
    assert!(deadline >= before + Duration::from_millis(500));
}

// ── Search ───────────────────────────────────────────────────────────────────

#[test]
fn search_then_clear_restores_the_listing() {
    let backend = populated();
    backend.add_file("/d/Foo.txt");
    backend.add_dir("/d/sub");
    backend.add_file("/d/sub/foobar.txt");
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    let rescans = Rc::new(Cell::new(0));
    let clears = Rc::new(Cell::new(0));
    let (r, c) = (rescans.clone(), clears.clone());
    model.search("foo", move || r.set(r.get() + 1), move || c.set(c.get() + 1));
    pump_until_idle(&mut model);

    assert!(model.is_searching());
    assert!(model.is_read_only());
    let mut found = names(&model);
    found.sort();
    assert_eq!(found, vec!["Foo.txt", "foobar.txt"]);
    assert_eq!(rescans.get(), 1);
    assert_eq!(clears.get(), 0);

    model.search("  ", || {}, || {});
    assert_eq!(clears.get(), 1);
    pump_until_idle(&mut model);
    assert!(!model.is_searching());
    assert_eq!(names(&model), vec!["a.txt", "b.txt", "Foo.txt", "sub"]);

    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);
    assert_eq!(clears.get(), 1, "on_clear ran twice");
}

#[test]
fn navigation_clears_an_active_search() {
    let backend = populated();
    backend.add_dir("/e");
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    let clears = Rc::new(Cell::new(0));
    let c = clears.clone();
    model.search("a", || {}, move || c.set(c.get() + 1));
    model.change_directory(dir("/e"));
    assert_eq!(clears.get(), 1);
    pump_until_idle(&mut model);
    assert!(!model.is_searching());
    assert_eq!(clears.get(), 1);
}

#[test]
fn empty_search_without_an_active_search_is_a_no_op() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);
    let sequence = model.sequence();

    model.search("", || {}, || {});
    assert_eq!(model.sequence(), sequence);
    assert!(model.is_idle());
}

// ── Target resolution ────────────────────────────────────────────────────────

#[test]
fn unresolvable_target_falls_back_to_the_default_root() {
    let backend = populated();
    backend.add_dir("/home");
    backend.add_file("/home/x");
    backend.set_default_root("/home");
    let mut model = model_with(&backend, ModelConfig::default());
    let events = model.subscribe();

    model.change_directory(dir("/missing"));
    pump_until_idle(&mut model);

    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/home")));
    assert_eq!(names(&model), vec!["x"]);
    assert!(model.scan_error().is_none());
    let events = drain(&events);
    assert!(events.iter().any(|e| matches!(
        e,
        ModelEvent::TargetResolutionFailed { url: failed, error: StorageError::NotFound(_) }
            if *failed == url("/missing")
    )));
    assert!(events.contains(&ModelEvent::DirectoryChanged {
        previous: Some(dir("/missing")),
        current: dir("/home"),
    }));
}

#[test]
fn configured_fallback_wins_over_the_backend_root() {
    let backend = populated();
    backend.add_dir("/home");
    backend.set_default_root("/home");
    let config = ModelConfig {
        fallback_root: Some(url("/d")),
        ..ModelConfig::default()
    };
    let mut model = model_with(&backend, config);

    model.change_directory(dir("/missing"));
    pump_until_idle(&mut model);
    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/d")));
}

#[test]
fn failing_fallback_does_not_loop() {
    let backend = populated();
    backend.set_default_root("/missing");
    let mut model = model_with(&backend, ModelConfig::default());

    model.change_directory(dir("/missing"));
    pump_until_idle(&mut model);
    pump_for(&mut model, Duration::from_millis(50));

    assert!(matches!(model.scan_error(), Some(StorageError::NotFound(_))));
    assert!(backend.list_calls().is_empty());
    assert_eq!(model.sequence(), 1);
}

// ── Mutations ────────────────────────────────────────────────────────────────

#[test]
fn mutations_are_rejected_mid_scan_and_in_search_results() {
    let backend = populated();
    backend.gate("/d");
    let mut model = model_with(&backend, ModelConfig::default());

    assert!(matches!(
        model.create_directory("x", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));

    model.change_directory(dir("/d"));
    backend.wait_for_list_calls(1);
    assert!(matches!(
        model.create_directory("x", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));
    backend.release("/d");
    pump_until_idle(&mut model);

    model.search("a", || {}, || {});
    pump_until_idle(&mut model);
    assert!(matches!(
        model.create_directory("x", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));
    assert!(matches!(
        model.rename_entry(&Entry::new_file(url("/d/a.txt")), "z", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));
}

#[test]
fn create_directory_inserts_at_top_and_selects() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    model
        .create_directory("photos", move |o| *slot.borrow_mut() = Some(o))
        .unwrap();
    pump_until(&mut model, "create result", |_| outcome.borrow().is_some());

    let created = match outcome.borrow_mut().take() {
        Some(MutationOutcome::Done(entry)) => entry,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(created.url, url("/d/photos"));
    assert_eq!(names(&model), vec!["photos", "a.txt", "b.txt"]);
    assert_eq!(model.selection().selected(), &[url("/d/photos")]);

    // Second attempt collides on the backend.
    let slot = outcome.clone();
    model
        .create_directory("photos", move |o| *slot.borrow_mut() = Some(o))
        .unwrap();
    pump_until(&mut model, "create result", |_| outcome.borrow().is_some());
    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(MutationOutcome::Failed(StorageError::AlreadyExists(_)))
    ));
    assert_eq!(model.file_list().len(), 3);

    assert!(matches!(
        model.create_directory("a/b", |_| {}),
        Err(ModelError::Storage(_))
    ));
}

#[test]
fn rename_updates_list_and_selection() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    let a = model.file_list()[0].clone();
    model.select_entries([a.url.clone()]);
    let done = Rc::new(Cell::new(false));
    let flag = done.clone();
    model
        .rename_entry(&a, "renamed.txt", move |o| {
            flag.set(matches!(o, MutationOutcome::Done(_)))
        })
        .unwrap();
    pump_until_idle(&mut model);

    assert!(done.get());
    assert_eq!(names(&model), vec!["renamed.txt", "b.txt"]);
    assert_eq!(model.selection().selected(), &[url("/d/renamed.txt")]);
}

#[test]
fn mutations_are_rejected_while_a_rescan_reads() {
    let backend = populated();
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    backend.gate("/d");
    model.rescan(false);
    model.process_events_at(Instant::now() + Duration::from_secs(1));
    backend.wait_for_list_calls(2);
    assert!(!model.is_scanning(), "a rescan keeps the old list on screen");

    assert!(matches!(
        model.create_directory("photos", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));
    let a = model.file_list()[0].clone();
    assert!(matches!(
        model.rename_entry(&a, "z.txt", |_| {}),
        Err(ModelError::InvalidOperation(_))
    ));

    backend.release("/d");
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["a.txt", "b.txt"]);
    assert!(model.create_directory("photos", |_| {}).is_ok());
    pump_until_idle(&mut model);
    assert_eq!(names(&model), vec!["photos", "a.txt", "b.txt"]);
}

#[test]
fn mutation_landing_during_a_rescan_survives_the_swap() {
    let backend = populated();
    let mut model = model_with(&backend, fast_config());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    backend.gate("/d/photos");
    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    model
        .create_directory("photos", move |o| *slot.borrow_mut() = Some(o))
        .unwrap();

    // The rescan reads /d before the directory exists.
    backend.gate("/d");
    model.rescan(false);
    model.process_events_at(Instant::now() + Duration::from_secs(1));
    backend.wait_for_list_calls(2);

    backend.release("/d/photos");
    pump_until(&mut model, "create result", |_| outcome.borrow().is_some());
    assert!(matches!(
        outcome.borrow().as_ref(),
        Some(MutationOutcome::Done(_))
    ));

    backend.release("/d");
    pump_until_idle(&mut model);
    assert_eq!(backend.list_count("/d"), 3, "no follow-up rescan");
    assert_eq!(names(&model), vec!["a.txt", "b.txt", "photos"]);
}

#[test]
fn mutation_finishing_after_navigation_is_aborted() {
    let backend = populated();
    backend.add_dir("/e");
    let mut model = model_with(&backend, ModelConfig::default());
    model.change_directory(dir("/d"));
    pump_until_idle(&mut model);

    backend.gate("/d/late");
    let outcome = Rc::new(RefCell::new(None));
    let slot = outcome.clone();
    model
        .create_directory("late", move |o| *slot.borrow_mut() = Some(o))
        .unwrap();
    model.change_directory(dir("/e"));
    pump_until(&mut model, "navigation", |m| !m.is_scanning());

    backend.release("/d/late");
    pump_until_idle(&mut model);

    assert_eq!(*outcome.borrow(), Some(MutationOutcome::Aborted));
    assert_eq!(model.current_directory().map(|d| d.url.clone()), Some(url("/e")));
    assert!(model.file_list().is_empty());
}
