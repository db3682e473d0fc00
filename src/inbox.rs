// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Inbox directories watched for new audio files

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::autoproc::Retagger;
use crate::Result;

/// Extensions picked up from the inbox
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "mp4", "aac", "ogg", "opus", "aiff", "aif", "ape", "mpc",
];

const SETTLE_INTERVAL: Duration = Duration::from_millis(500);

/// What the inbox watcher reports
#[derive(Debug, Clone, PartialEq)]
pub enum InboxEvent {
    /// A file was created in, or moved into, a watched directory
    Arrived(PathBuf),
    Error(String),
}

/// Paths a notify event brings into the inbox
fn arrivals(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

/// Watches inbox directories and forwards arrivals to the async side
pub struct InboxWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<InboxEvent>,
}

impl InboxWatcher {
    /// Watch every directory in `dirs`, creating missing ones
    pub fn new(dirs: &[PathBuf]) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let events = match res {
                    Ok(event) => arrivals(event).into_iter().map(InboxEvent::Arrived).collect(),
                    Err(e) => vec![InboxEvent::Error(e.to_string())],
                };
                for event in events {
                    // The receiver is gone once the inbox stops
                    let _ = tx.send(event);
                }
            },
            Config::default(),
        )?;

        for dir in dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                info!("Created inbox directory: {:?}", dir);
            }
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            info!("Watching: {:?}", dir);
        }

        Ok(Self {
            _watcher: watcher,
            events: rx,
        })
    }

    /// Next arrival or error; `None` once the watcher has shut down
    pub async fn next_event(&mut self) -> Option<InboxEvent> {
        self.events.recv().await
    }
}

/// Check if a file should be picked up from the inbox
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Hidden files include our own in-progress tag writes
    if filename.starts_with('.') {
        return false;
    }

    let partial = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if partial.iter().any(|ext| filename.ends_with(ext)) {
        return false;
    }

    is_audio(path)
}

pub fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .map_or(false, |e| AUDIO_EXTENSIONS.contains(&e.as_str()))
}

/// Poll the size until two reads agree.
///
/// Returns false if the file vanished; a file still growing at `max_wait`
/// is handed over anyway.
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + max_wait;
    let mut previous = None;

    loop {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => return false,
        };
        if previous == Some(size) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("{:?} still growing after {:?}, processing anyway", path, max_wait);
            return true;
        }
        debug!("Waiting for {:?} to settle at {} bytes", path, size);
        previous = Some(size);
        tokio::time::sleep(SETTLE_INTERVAL).await;
    }
}

/// Receiver that flips to `true` on Ctrl+C or SIGTERM
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

/// Run every audio file already sitting in `dirs`; returns how many succeeded
pub fn process_existing(retagger: &Retagger, dirs: &[PathBuf], out_dir: &Path) -> usize {
    let mut processed = 0;
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read inbox {:?}: {}", dir, e);
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !should_process(&path) {
                continue;
            }
            match retagger.process_local(&path, out_dir) {
                Ok(_) => processed += 1,
                Err(e) => error!("Failed to process {:?}: {}", path, e),
            }
        }
    }
    processed
}

fn spawn_retag(retagger: &Retagger, path: PathBuf, out_dir: &Path) {
    let retagger = retagger.clone();
    let out_dir = out_dir.to_path_buf();

    tokio::spawn(async move {
        if !wait_for_stable(&path, Duration::from_secs(10)).await {
            debug!("File disappeared before it settled: {:?}", path);
            return;
        }

        let source = path.clone();
        let result =
            tokio::task::spawn_blocking(move || retagger.process_local(&source, &out_dir)).await;
        match result {
            Ok(Ok(outcome)) => info!("Inbox: {:?} -> {:?}", path, outcome.output),
            Ok(Err(e)) => error!("Failed to process {:?}: {}", path, e),
            Err(e) => error!("Processing task for {:?} panicked: {}", path, e),
        }
    });
}

/// Watch `dirs` and re-tag new audio into `out_dir` until `shutdown` fires
pub async fn run_inbox(
    retagger: Retagger,
    dirs: Vec<PathBuf>,
    out_dir: PathBuf,
    existing: bool,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    std::fs::create_dir_all(&out_dir)?;
    let mut watcher = InboxWatcher::new(&dirs)?;

    if existing {
        info!("Processing existing files...");
        let count = process_existing(&retagger, &dirs, &out_dir);
        info!("Processed {} existing files", count);
    }

    info!("Inbox active. Press Ctrl+C to stop.");

    while !*shutdown.borrow() {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    warn!("Shutdown signal dropped, stopping inbox");
                    break;
                }
            }
            event = watcher.next_event() => match event {
                Some(InboxEvent::Arrived(path)) => {
                    if should_process(&path) && !path.starts_with(&out_dir) {
                        spawn_retag(&retagger, path, &out_dir);
                    }
                }
                Some(InboxEvent::Error(e)) => warn!("Watch error: {}", e),
                None => {
                    warn!("Watcher stopped, leaving inbox");
                    break;
                }
            },
        }
    }

    info!("Inbox stopped.");
    Ok(())
}
