//! Directory monitoring
//!
//! A [`DirectoryMonitor`] watches one directory and feeds created and deleted
//! survey files to a [`MonitorSink`]. New paths are buffered until they can be
//! opened for reading, which covers files still being copied in; deletions
//! skip the buffer. Starting a monitor first walks the directory so existing
//! files surface the same way live ones do.

use crate::classify::is_candidate;
use crate::error::{IntelError, Result};
use crate::types::normalize_path;
use indexmap::IndexMap;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const EVENT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// File exists and can be opened for reading
    Created(PathBuf),
    Deleted(PathBuf),
}

impl MonitorEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(p) | Self::Deleted(p) => p,
        }
    }
}

/// Receives monitor events, from the watcher and ticker threads
pub trait MonitorSink: Send + Sync {
    fn on_event(&self, event: MonitorEvent);
}

impl<F> MonitorSink for F
where
    F: Fn(MonitorEvent) + Send + Sync,
{
    fn on_event(&self, event: MonitorEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Watching,
    Stopped,
}

/// How a pending path first came to the monitor's attention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    /// Found by the walk on start
    Existing,
    Created,
    Renamed,
    Modified,
}

impl PendingKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Created => "created",
            Self::Renamed => "renamed",
            Self::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingFile {
    first_seen: Instant,
    kind: PendingKind,
}

#[derive(Debug, Default)]
struct Tracking {
    /// Paths waiting to become readable, in arrival order
    pending: IndexMap<PathBuf, PendingFile>,
    /// Paths already emitted as created
    seen: HashSet<PathBuf>,
}

struct Shared {
    root: PathBuf,
    recursive: bool,
    sink: Arc<dyn MonitorSink>,
    stopped: AtomicBool,
    tracking: Mutex<Tracking>,
}

impl Shared {
    fn emit(&self, event: MonitorEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.sink.on_event(event);
    }

    /// Returns true when the path was newly buffered
    ///
    /// A path already pending keeps its first sighting.
    fn buffer(&self, path: PathBuf, kind: PendingKind) -> bool {
        if !path.is_file() || !is_candidate(&path) {
            return false;
        }
        let Ok(mut tracking) = self.tracking.lock() else {
            return false;
        };
        if tracking.seen.contains(&path) || tracking.pending.contains_key(&path) {
            return false;
        }
        debug!(path = %path.display(), kind = kind.as_str(), "Buffered new file");
        tracking.pending.insert(
            path,
            PendingFile {
                first_seen: Instant::now(),
                kind,
            },
        );
        true
    }

    /// Walk `dir` and buffer every candidate file in it
    fn buffer_tree(&self, dir: &Path, kind: PendingKind) -> Result<usize> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut buffered = 0;
        for entry in WalkDir::new(dir).max_depth(max_depth).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() > 0 => {
                    warn!(error = %e, "Skipping unreadable entry during walk");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if entry.file_type().is_file() && self.buffer(normalize_path(entry.path()), kind) {
                buffered += 1;
            }
        }
        Ok(buffered)
    }

    /// Drop `path` and, for a directory, everything under it
    fn forget(&self, path: PathBuf) {
        let deleted = match self.tracking.lock() {
            Ok(mut tracking) => {
                tracking.pending.retain(|pending, _| !pending.starts_with(&path));
                let mut gone: Vec<PathBuf> = tracking
                    .seen
                    .iter()
                    .filter(|seen| seen.starts_with(&path))
                    .cloned()
                    .collect();
                for seen in &gone {
                    tracking.seen.remove(seen);
                }
                gone.sort();
                gone
            }
            Err(_) => return,
        };
        for path in deleted {
            self.emit(MonitorEvent::Deleted(path));
        }
    }

    fn handle(&self, event: Event) {
        let mut paths = event.paths.into_iter().map(|p| normalize_path(&p));
        match event.kind {
            EventKind::Create(_) => {
                for path in paths {
                    if path.is_dir() && self.recursive {
                        if let Err(e) = self.buffer_tree(&path, PendingKind::Created) {
                            warn!(path = %path.display(), error = %e, "Failed to walk new directory");
                        }
                    } else {
                        self.buffer(path, PendingKind::Created);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
                paths.for_each(|path| self.forget(path));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                paths.for_each(|path| {
                    self.buffer(path, PendingKind::Renamed);
                });
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(from) = paths.next() {
                    self.forget(from);
                }
                paths.for_each(|path| {
                    self.buffer(path, PendingKind::Renamed);
                });
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in paths {
                    if path.exists() {
                        self.buffer(path, PendingKind::Renamed);
                    } else {
                        self.forget(path);
                    }
                }
            }
            // Writes to a buffered file keep it buffered; writes to a new path
            // can arrive without a create on some platforms
            EventKind::Modify(_) => paths.for_each(|path| {
                self.buffer(path, PendingKind::Modified);
            }),
            _ => {}
        }
    }

    /// Emit every buffered path that can now be opened
    fn tick(&self) {
        let ready: Vec<(PathBuf, PendingFile)> = match self.tracking.lock() {
            Ok(mut tracking) => {
                let mut ready = vec![];
                tracking.pending.retain(|path, pending| {
                    if !path.exists() {
                        return false;
                    }
                    if File::open(path).is_ok() {
                        ready.push((path.clone(), *pending));
                        return false;
                    }
                    true
                });
                for (path, _) in &ready {
                    tracking.seen.insert(path.clone());
                }
                ready
            }
            Err(_) => return,
        };
        for (path, pending) in ready {
            debug!(
                path = %path.display(),
                kind = pending.kind.as_str(),
                waited_ms = pending.first_seen.elapsed().as_millis() as u64,
                "File readable"
            );
            self.emit(MonitorEvent::Created(path));
        }
    }
}

/// Watches one directory and reports readable new files and deletions
pub struct DirectoryMonitor {
    shared: Arc<Shared>,
    interval: Duration,
    state: MonitorState,
    watcher: Option<RecommendedWatcher>,
    stop_tx: Option<mpsc::Sender<()>>,
    threads: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for DirectoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMonitor")
            .field("root", &self.shared.root)
            .field("recursive", &self.shared.recursive)
            .field("interval", &self.interval)
            .field("state", &self.state)
            .finish()
    }
}

impl DirectoryMonitor {
    pub fn new(
        root: &Path,
        recursive: bool,
        interval: Duration,
        sink: Arc<dyn MonitorSink>,
    ) -> Self {
        // Watch events carry canonical paths
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| normalize_path(root));
        Self {
            shared: Arc::new(Shared {
                root,
                recursive,
                sink,
                stopped: AtomicBool::new(false),
                tracking: Mutex::new(Tracking::default()),
            }),
            interval,
            state: MonitorState::Idle,
            watcher: None,
            stop_tx: None,
            threads: vec![],
        }
    }

    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Number of paths waiting to become readable
    pub fn pending_len(&self) -> usize {
        self.shared
            .tracking
            .lock()
            .map(|t| t.pending.len())
            .unwrap_or(0)
    }

    /// Walk the directory, then start live watching
    pub fn start(&mut self) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Err(IntelError::InvalidState(format!(
                "monitor for {} is {:?}, not idle",
                self.shared.root.display(),
                self.state
            )));
        }
        let root = self.shared.root.clone();
        if !root.is_dir() {
            return Err(IntelError::DirectoryNotFound(root.display().to_string()));
        }

        let found = self.shared.buffer_tree(&root, PendingKind::Existing)?;

        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(event_tx, notify::Config::default())?;
        let mode = if self.shared.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;

        let shared = Arc::clone(&self.shared);
        let watch_thread = std::thread::Builder::new()
            .name("hydro-monitor-events".to_string())
            .spawn(move || loop {
                if shared.stopped.load(Ordering::SeqCst) {
                    break;
                }
                match event_rx.recv_timeout(EVENT_POLL) {
                    Ok(Ok(event)) => shared.handle(event),
                    Ok(Err(e)) => warn!(error = %e, "Directory watcher error"),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let interval = self.interval;
        let tick_thread = std::thread::Builder::new()
            .name("hydro-monitor-ticker".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.tick(),
                    _ => break,
                }
            })?;

        self.watcher = Some(watcher);
        self.stop_tx = Some(stop_tx);
        self.threads = vec![watch_thread, tick_thread];
        self.state = MonitorState::Watching;
        info!(
            path = %root.display(),
            recursive = self.shared.recursive,
            existing_files = found,
            "Started directory monitor"
        );
        Ok(())
    }

    /// Stop watching; no event is delivered after this returns
    pub fn stop(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.shared.stopped.store(true, Ordering::SeqCst);
        // Dropping the watcher disconnects the event channel
        self.watcher = None;
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!(path = %self.shared.root.display(), "Monitor thread panicked");
            }
        }
        if self.state == MonitorState::Watching {
            info!(path = %self.shared.root.display(), "Stopped directory monitor");
        }
        self.state = MonitorState::Stopped;
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::RemoveKind;
    use tempfile::TempDir;

    fn collecting_sink() -> (Arc<dyn MonitorSink>, Arc<Mutex<Vec<MonitorEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let sink: Arc<dyn MonitorSink> = Arc::new(move |event: MonitorEvent| {
            seen.lock().unwrap().push(event);
        });
        (sink, events)
    }

    fn shared(root: &Path, sink: Arc<dyn MonitorSink>) -> Shared {
        Shared {
            root: normalize_path(root),
            recursive: true,
            sink,
            stopped: AtomicBool::new(false),
            tracking: Mutex::new(Tracking::default()),
        }
    }

    fn expected(temp: &TempDir, name: &str) -> PathBuf {
        temp.path().canonicalize().unwrap().join(name)
    }

    fn wait_for(events: &Mutex<Vec<MonitorEvent>>, wanted: &MonitorEvent) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if events.lock().unwrap().contains(wanted) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_start_requires_directory() {
        let temp = TempDir::new().unwrap();
        let (sink, _) = collecting_sink();
        let mut monitor =
            DirectoryMonitor::new(&temp.path().join("missing"), true, Duration::from_millis(50), sink);
        assert!(matches!(monitor.start(), Err(IntelError::DirectoryNotFound(_))));
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn test_existing_files_surface_on_start() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("0009_20170523_181119.all");
        std::fs::write(&file, b"data").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"skip").unwrap();

        let (sink, events) = collecting_sink();
        let mut monitor = DirectoryMonitor::new(temp.path(), true, Duration::from_millis(50), sink);
        monitor.start().unwrap();
        assert_eq!(monitor.state(), MonitorState::Watching);

        let path = expected(&temp, "0009_20170523_181119.all");
        assert!(wait_for(&events, &MonitorEvent::Created(path)));
        monitor.stop();
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_recursive_walk_skips_subdirectories() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("a.all"), b"data").unwrap();
        std::fs::write(temp.path().join("b.all"), b"data").unwrap();

        let (sink, _) = collecting_sink();
        let mut monitor = DirectoryMonitor::new(temp.path(), false, Duration::from_secs(60), sink);
        monitor.start().unwrap();
        assert_eq!(monitor.pending_len(), 1);
        monitor.stop();
    }

    #[test]
    fn test_live_create_and_delete() {
        let temp = TempDir::new().unwrap();
        let (sink, events) = collecting_sink();
        let mut monitor = DirectoryMonitor::new(temp.path(), true, Duration::from_millis(50), sink);
        monitor.start().unwrap();

        let file = temp.path().join("line.kmall");
        std::fs::write(&file, b"data").unwrap();
        let path = expected(&temp, "line.kmall");
        assert!(wait_for(&events, &MonitorEvent::Created(path.clone())));

        std::fs::remove_file(&file).unwrap();
        assert!(wait_for(&events, &MonitorEvent::Deleted(path)));
        monitor.stop();
    }

    #[test]
    fn test_stop_is_idempotent_and_silences_events() {
        let temp = TempDir::new().unwrap();
        let (sink, events) = collecting_sink();
        let mut monitor = DirectoryMonitor::new(temp.path(), true, Duration::from_millis(50), sink);
        monitor.start().unwrap();
        monitor.stop();
        monitor.stop();
        assert_eq!(monitor.state(), MonitorState::Stopped);

        std::fs::write(temp.path().join("late.all"), b"data").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(events.lock().unwrap().is_empty());
        assert!(monitor.start().is_err());
    }

    #[test]
    fn test_pending_keeps_first_sighting() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("0009.all"), b"data").unwrap();
        let (sink, events) = collecting_sink();
        let shared = shared(temp.path(), sink);
        let path = normalize_path(&temp.path().join("0009.all"));

        assert!(shared.buffer(path.clone(), PendingKind::Created));
        let first = shared.tracking.lock().unwrap().pending[&path];
        assert!(!shared.buffer(path.clone(), PendingKind::Modified));
        let again = shared.tracking.lock().unwrap().pending[&path];
        assert_eq!(again.kind, PendingKind::Created);
        assert_eq!(again.first_seen, first.first_seen);

        shared.tick();
        assert!(shared.tracking.lock().unwrap().pending.is_empty());
        assert_eq!(*events.lock().unwrap(), vec![MonitorEvent::Created(path.clone())]);

        // Already surfaced, so not buffered again
        assert!(!shared.buffer(path, PendingKind::Modified));
    }

    #[test]
    fn test_removed_directory_reports_files_inside() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("sub");
        std::fs::create_dir_all(sub.join("deeper")).unwrap();
        std::fs::write(sub.join("a.all"), b"data").unwrap();
        std::fs::write(sub.join("deeper").join("b.all"), b"data").unwrap();
        std::fs::write(temp.path().join("c.all"), b"data").unwrap();

        let (sink, events) = collecting_sink();
        let shared = shared(temp.path(), sink);
        assert_eq!(shared.buffer_tree(temp.path(), PendingKind::Existing).unwrap(), 3);
        shared.tick();
        assert_eq!(events.lock().unwrap().len(), 3);
        events.lock().unwrap().clear();

        std::fs::remove_dir_all(&sub).unwrap();
        shared.handle(
            Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(normalize_path(&sub)),
        );

        let mut deleted = vec![
            normalize_path(&sub.join("a.all")),
            normalize_path(&sub.join("deeper").join("b.all")),
        ];
        deleted.sort();
        let expected: Vec<MonitorEvent> = deleted.into_iter().map(MonitorEvent::Deleted).collect();
        assert_eq!(*events.lock().unwrap(), expected);

        let tracking = shared.tracking.lock().unwrap();
        assert_eq!(tracking.seen.len(), 1);
        assert!(tracking.seen.contains(&normalize_path(&temp.path().join("c.all"))));
    }
}
