// Filesystem watch and reconcile.
//
// One `RecommendedWatcher` per watched folder feeds a shared channel; a
// single flush thread accumulates events per folder under one shared
// debounce timer and applies each folder's batch through
// `Library::flush_folder_changes`. The timer re-arms on every event from
// any folder; a hard cap keeps a steady stream of events (a large copy in
// progress) from postponing the flush forever.

use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{Result, ShoeboxError};
use crate::library::{FolderDelta, Library};
use crate::metadata::detect_media_kind;
use crate::model::normalize_path_str;
use crate::settings::LibraryConfig;

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    /// Quiet window after the most recent event before pending batches flush.
    pub debounce: Duration,
    /// Ceiling on how long continuous activity may postpone a flush.
    pub max_delay: Duration,
}

impl From<&LibraryConfig> for WatchConfig {
    fn from(config: &LibraryConfig) -> Self {
        let debounce = Duration::from_millis(config.debounce_window_ms);
        Self {
            debounce,
            max_delay: debounce * config.debounce_max_delay_factor,
        }
    }
}

/// Callbacks for interested frontends. All methods run on the flush thread.
pub trait WatchObserver: Send + Sync {
    fn folder_changed(&self, delta: &FolderDelta);
    fn watcher_failed(&self, folder: &Path, error: &str);
}

/// Observer that only logs.
pub struct NoopObserver;

impl WatchObserver for NoopObserver {
    fn folder_changed(&self, delta: &FolderDelta) {
        log::info!(
            "watched folder changed: +{} -{}",
            delta.added.len(),
            delta.removed.len()
        );
    }

    fn watcher_failed(&self, folder: &Path, error: &str) {
        log::error!("watcher for {} failed: {}", folder.display(), error);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Unlink,
}

#[derive(Debug)]
enum WatchMessage {
    Event {
        folder: PathBuf,
        kind: ChangeKind,
        path: PathBuf,
    },
    Error {
        folder: PathBuf,
        message: String,
    },
    Shutdown,
}

/// Per-folder accumulation between flushes.
#[derive(Default)]
struct PendingBatch {
    adds: Vec<PathBuf>,
    unlinks: Vec<PathBuf>,
}

impl PendingBatch {
    fn push(&mut self, kind: ChangeKind, path: PathBuf) {
        match kind {
            ChangeKind::Add => self.adds.push(path),
            ChangeKind::Unlink => self.unlinks.push(path),
        }
    }
}

pub struct WatchService {
    library: Library,
    watchers: Arc<Mutex<HashMap<PathBuf, RecommendedWatcher>>>,
    tx: Sender<WatchMessage>,
    flush_thread: Option<JoinHandle<()>>,
}

impl WatchService {
    pub fn new(library: Library, config: WatchConfig, observer: Arc<dyn WatchObserver>) -> Self {
        let (tx, rx) = mpsc::channel();
        let watchers: Arc<Mutex<HashMap<PathBuf, RecommendedWatcher>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let flush_thread = {
            let library = library.clone();
            let watchers = Arc::clone(&watchers);
            thread::spawn(move || flush_loop(rx, library, config, observer, watchers))
        };

        Self {
            library,
            watchers,
            tx,
            flush_thread: Some(flush_thread),
        }
    }

    /// Reconcile the set of watched folders: start watchers for newcomers
    /// (with an eager sync of current contents) and drop watchers whose
    /// folders are no longer listed.
    pub fn update_watchers(&self, folders: &[PathBuf]) -> Result<()> {
        let wanted: Vec<PathBuf> = folders.iter().map(|f| canonical_key(f)).collect();

        {
            let mut watchers = self.watchers.lock().unwrap();
            watchers.retain(|folder, _| {
                let keep = wanted.contains(folder);
                if !keep {
                    log::info!("stopped watching {}", folder.display());
                }
                keep
            });
        }

        for folder in &wanted {
            if self.watchers.lock().unwrap().contains_key(folder) {
                continue;
            }
            if !folder.is_dir() {
                log::warn!("cannot watch {}: not a directory", folder.display());
                continue;
            }

            // Catch up on whatever changed while the folder was unwatched.
            let delta = self.library.sync_folder_content(folder)?;
            if !delta.is_empty() {
                log::info!(
                    "initial sync of {}: +{} -{}",
                    folder.display(),
                    delta.added.len(),
                    delta.removed.len()
                );
            }

            let watcher = spawn_watcher(folder.clone(), self.tx.clone())?;
            self.watchers.lock().unwrap().insert(folder.clone(), watcher);
            log::info!("watching {}", folder.display());
        }
        Ok(())
    }

    pub fn watched_folders(&self) -> Vec<PathBuf> {
        self.watchers.lock().unwrap().keys().cloned().collect()
    }

    #[cfg(test)]
    fn sender(&self) -> Sender<WatchMessage> {
        self.tx.clone()
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.watchers.lock().unwrap().clear();
        let _ = self.tx.send(WatchMessage::Shutdown);
        if let Some(handle) = self.flush_thread.take() {
            let _ = handle.join();
        }
    }
}

fn canonical_key(folder: &Path) -> PathBuf {
    PathBuf::from(normalize_path_str(folder))
}

/// Start a notify watcher on one folder, forwarding classified events.
fn spawn_watcher(folder: PathBuf, tx: Sender<WatchMessage>) -> Result<RecommendedWatcher> {
    let event_folder = folder.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let Some(kind) = classify_event(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    // Unlinked files have no extension info on some
                    // platforms; only adds are filtered by media kind.
                    if kind == ChangeKind::Add && detect_media_kind(&path).is_none() {
                        continue;
                    }
                    let _ = tx.send(WatchMessage::Event {
                        folder: event_folder.clone(),
                        kind,
                        path,
                    });
                }
            }
            Err(e) => {
                let _ = tx.send(WatchMessage::Error {
                    folder: event_folder.clone(),
                    message: e.to_string(),
                });
            }
        }
    })
    .map_err(|e| ShoeboxError::Watcher(e.to_string()))?;

    watcher
        .watch(&folder, RecursiveMode::NonRecursive)
        .map_err(|e| ShoeboxError::Watcher(e.to_string()))?;
    Ok(watcher)
}

/// Map a notify event kind onto add/unlink, dropping everything else.
fn classify_event(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any) => {
            Some(ChangeKind::Add)
        }
        EventKind::Remove(RemoveKind::File) | EventKind::Remove(RemoveKind::Any) => {
            Some(ChangeKind::Unlink)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Add),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Unlink),
        _ => None,
    }
}

fn flush_loop(
    rx: Receiver<WatchMessage>,
    library: Library,
    config: WatchConfig,
    observer: Arc<dyn WatchObserver>,
    watchers: Arc<Mutex<HashMap<PathBuf, RecommendedWatcher>>>,
) {
    let mut pending: HashMap<PathBuf, PendingBatch> = HashMap::new();
    // One process-wide timer for all folders: any event re-arms it, and
    // when it fires every folder with pending changes flushes in one pass.
    let mut first_event = Instant::now();
    let mut last_event = Instant::now();

    loop {
        // Block indefinitely while idle; poll on the debounce interval
        // while batches are accumulating.
        let message = if pending.is_empty() {
            match rx.recv() {
                Ok(m) => Some(m),
                Err(_) => return,
            }
        } else {
            match rx.recv_timeout(config.debounce) {
                Ok(m) => Some(m),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    flush_all(&mut pending, &library, &*observer);
                    return;
                }
            }
        };

        match message {
            Some(WatchMessage::Event { folder, kind, path }) => {
                if pending.is_empty() {
                    first_event = Instant::now();
                }
                last_event = Instant::now();
                pending.entry(folder).or_default().push(kind, path);
            }
            Some(WatchMessage::Error { folder, message }) => {
                log::error!("watch error on {}: {}", folder.display(), message);
                observer.watcher_failed(&folder, &message);
                watchers.lock().unwrap().remove(&folder);
                pending.remove(&folder);
            }
            Some(WatchMessage::Shutdown) => {
                flush_all(&mut pending, &library, &*observer);
                return;
            }
            None => {}
        }

        // Flush once the whole library has gone quiet, or once continuous
        // activity has postponed the flush past the hard cap.
        if pending.is_empty() {
            continue;
        }
        let now = Instant::now();
        if now.duration_since(last_event) >= config.debounce
            || now.duration_since(first_event) >= config.max_delay
        {
            flush_all(&mut pending, &library, &*observer);
        }
    }
}

/// Flush every pending batch. A batch whose write fails goes back into
/// `pending` untouched, so the next timer fire retries it; events arriving
/// mid-flush land in the channel and append to the retried batch later.
fn flush_all(
    pending: &mut HashMap<PathBuf, PendingBatch>,
    library: &Library,
    observer: &dyn WatchObserver,
) {
    for (folder, batch) in mem::take(pending) {
        if let Some(unflushed) = flush_one(&folder, batch, library, observer) {
            pending.insert(folder, unflushed);
        }
    }
}

/// Returns the batch back when the write failed and it must be retried.
fn flush_one(
    folder: &Path,
    batch: PendingBatch,
    library: &Library,
    observer: &dyn WatchObserver,
) -> Option<PendingBatch> {
    log::debug!(
        "flushing {}: {} adds, {} unlinks",
        folder.display(),
        batch.adds.len(),
        batch.unlinks.len()
    );
    match library.flush_folder_changes(folder, &batch.adds, &batch.unlinks) {
        Ok(Some(delta)) => {
            observer.folder_changed(&delta);
            None
        }
        Ok(None) => None,
        Err(e) => {
            log::error!(
                "failed to reconcile {}, keeping batch for retry: {}",
                folder.display(),
                e
            );
            Some(batch)
        }
    }
}
