//! dirmodel — open a directory through the directory model and print it.
//!
//! Thin binary entry point. All logic lives in the `dirmodel-core` crate.

use anyhow::{bail, Context};
use clap::Parser;
use crossbeam_channel::Receiver;
use dirmodel_core::storage::LocalStorage;
use dirmodel_core::watcher::{DirectoryWatcher, NotifyWatcher, NullWatcher};
use dirmodel_core::{DirectoryModel, Entry, ModelConfig, ModelEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Upper bound on how long the pump loop sleeps between polls.
const TICK: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(
    name = "dirmodel",
    version,
    about = "List a directory and optionally follow changes to it"
)]
struct CliArgs {
    /// Directory to open.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// JSON file with model settings.
    #[arg(short, long, value_name = "FILE", env = "DIRMODEL_CONFIG")]
    config: Option<PathBuf>,

    /// Show entries below the directory whose name contains QUERY.
    #[arg(short, long, value_name = "QUERY")]
    search: Option<String>,

    /// Print the listing as JSON.
    #[arg(long)]
    json: bool,

    /// Keep running and report changes until interrupted.
    #[arg(short, long)]
    watch: bool,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so the listing on stdout stays machine readable.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => ModelConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ModelConfig::default(),
    };
    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot open {}", args.path.display()))?;
    let root = LocalStorage::entry_for_path(&path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let watcher: Box<dyn DirectoryWatcher> = if args.watch {
        Box::new(NotifyWatcher::new())
    } else {
        Box::new(NullWatcher)
    };
    let mut model = DirectoryModel::new(Arc::new(LocalStorage::new()), watcher, config);
    let events = model.subscribe();

    info!("dirmodel opening {}", root.url);
    model.change_directory(root);
    if let Some(query) = &args.search {
        model.search(query, || {}, || {});
    }

    loop {
        model.process_events();
        let changed = report(&events);

        if !args.watch && model.is_idle() {
            break;
        }
        if args.watch && changed && !model.is_scanning() {
            print_listing(&model, args.json)?;
        }

        let wait = model
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(TICK)
            .min(TICK);
        thread::sleep(wait);
    }

    if let Some(error) = model.scan_error() {
        bail!("listing failed: {error}");
    }
    print_listing(&model, args.json)
}

/// Log drained events. Returns `true` if a listing was completed or
/// refreshed.
fn report(events: &Receiver<ModelEvent>) -> bool {
    let mut changed = false;
    for event in events.try_iter() {
        match event {
            ModelEvent::ScanCompleted { entries } => {
                info!("{entries} entries");
                changed = true;
            }
            ModelEvent::RescanCompleted { entries } => {
                info!("refreshed ({entries} entries)");
                changed = true;
            }
            ModelEvent::ScanFailed { error, will_retry } => {
                info!("scan failed: {error}{}", if will_retry { ", retrying" } else { "" })
            }
            ModelEvent::TargetResolutionFailed { url, error } => {
                info!("cannot open {url}: {error}")
            }
            other => tracing::debug!("{other:?}"),
        }
    }
    changed
}

fn print_listing(model: &DirectoryModel, json: bool) -> anyhow::Result<()> {
    let entries = model.file_list();
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    for entry in entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &Entry) -> String {
    let size = match (&entry.metadata, entry.is_dir) {
        (_, true) => "<dir>".to_string(),
        (Some(meta), false) => meta.size.to_string(),
        (None, false) => "?".to_string(),
    };
    let modified = entry
        .metadata
        .as_ref()
        .and_then(|m| m.modified)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{size:>12}  {modified:16}  {}", entry.name)
}
