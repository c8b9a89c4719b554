//! The intelligence engine
//!
//! [`IntelEngine`] owns the registries, the action queue and the regeneration
//! controller behind one mutex. Files arrive through [`IntelEngine::add_file`]
//! or from directory monitors; every change triggers a regeneration pass.
//! Actions are executed one at a time with the work item running outside the
//! lock, so monitors keep feeding files while a conversion runs.

use crate::action::{Action, ActionCategory, ActionObserver, ActionQueue};
use crate::classify::{self, Classified};
use crate::config::IntelConfig;
use crate::error::{IntelError, Result};
use crate::monitor::{DirectoryMonitor, MonitorEvent, MonitorSink};
use crate::project::{ContainerHandle, ProjectState, VesselConfig, WorkOutput};
use crate::regenerate::{RegenerationContext, RegenerationController, WorkFunctions};
use crate::registry::Registries;
use crate::types::{normalize_path, path_key, FileCategory};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

/// What happened to a file handed to [`IntelEngine::add_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddFileOutcome {
    Added { category: FileCategory, unique_id: u64 },
    /// Same path, or same name and size, is already registered
    Duplicate { category: FileCategory },
    Unsupported { reason: String },
}

impl AddFileOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }
}

/// A successfully executed action
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAction {
    pub id: u64,
    pub category: ActionCategory,
    pub description: String,
    pub output: WorkOutput,
}

struct EngineState {
    config: IntelConfig,
    registries: Registries,
    queue: ActionQueue,
    controller: RegenerationController,
}

struct EngineInner {
    state: Mutex<EngineState>,
    executing: AtomicBool,
    project: Arc<dyn ProjectState>,
    vessel: Arc<dyn VesselConfig>,
    functions: WorkFunctions,
}

impl EngineInner {
    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| IntelError::InvalidState("engine state lock poisoned".to_string()))
    }

    fn regenerate_locked(&self, state: &mut EngineState) {
        let EngineState {
            config,
            registries,
            queue,
            controller,
        } = state;
        let ctx = RegenerationContext {
            config,
            project: self.project.as_ref(),
            vessel: self.vessel.as_ref(),
            functions: &self.functions,
        };
        controller.regenerate(registries, queue, &ctx);
    }

    fn regenerate(&self) -> Result<()> {
        let mut state = self.lock()?;
        self.regenerate_locked(&mut state);
        Ok(())
    }

    fn register(&self, state: &mut EngineState, classified: Classified) -> Result<AddFileOutcome> {
        if let Classified::Unknown(reason) = classified {
            debug!(reason = %reason, "Ignoring unsupported file");
            return Ok(AddFileOutcome::Unsupported { reason });
        }
        let (category, outcome) = state.registries.add(classified)?;
        match outcome.unique_id {
            Some(unique_id) if outcome.added => {
                state.controller.mark_dirty();
                Ok(AddFileOutcome::Added {
                    category,
                    unique_id,
                })
            }
            _ => Ok(AddFileOutcome::Duplicate { category }),
        }
    }

    fn add_file(&self, path: &Path) -> Result<AddFileOutcome> {
        let path = normalize_path(path);
        // Header reads happen before taking the lock
        let classified = classify::classify(&path)?;
        let mut state = self.lock()?;
        let outcome = self.register(&mut state, classified)?;
        if let AddFileOutcome::Added {
            category,
            unique_id,
        } = &outcome
        {
            info!(path = %path.display(), category = %category, unique_id, "Added file");
            self.regenerate_locked(&mut state);
        }
        Ok(outcome)
    }

    fn remove_file(&self, path: &Path) -> Result<Option<(FileCategory, u64)>> {
        let key = path_key(&normalize_path(path));
        let mut state = self.lock()?;
        let removed = state.registries.remove(&key);
        if let Some((category, unique_id)) = removed {
            info!(path = %key, category = %category, unique_id, "Removed file");
            self.regenerate_locked(&mut state);
        }
        Ok(removed)
    }
}

/// Feeds monitor events into the engine without keeping it alive
struct EngineSink {
    inner: Weak<EngineInner>,
}

impl MonitorSink for EngineSink {
    fn on_event(&self, event: MonitorEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match event {
            MonitorEvent::Created(path) => {
                if let Err(e) = inner.add_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to add monitored file");
                }
            }
            MonitorEvent::Deleted(path) => {
                if let Err(e) = inner.remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove monitored file");
                }
            }
        }
    }
}

/// Survey file intelligence engine
///
/// Cloning is cheap and every clone drives the same engine. Monitors are
/// stopped when the last clone is dropped.
#[derive(Clone)]
pub struct IntelEngine {
    inner: Arc<EngineInner>,
    monitors: Arc<Mutex<Vec<DirectoryMonitor>>>,
}

impl std::fmt::Debug for IntelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntelEngine")
            .field("functions", &self.inner.functions)
            .field("executing", &self.inner.executing.load(Ordering::SeqCst))
            .finish()
    }
}

/// Clears the single-flight flag however execution ends
struct ExecutionGuard<'a>(&'a AtomicBool);

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IntelEngine {
    pub fn new(
        config: IntelConfig,
        project: Arc<dyn ProjectState>,
        vessel: Arc<dyn VesselConfig>,
        functions: WorkFunctions,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState {
                    config,
                    registries: Registries::new(),
                    queue: ActionQueue::new(),
                    controller: RegenerationController::new(),
                }),
                executing: AtomicBool::new(false),
                project,
                vessel,
                functions,
            }),
            monitors: Arc::new(Mutex::new(Vec::new())),
        })
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Classify and register one file, then regenerate actions
    ///
    /// Unreadable files are an error for the caller to log; they never reach
    /// a registry.
    pub fn add_file(&self, path: &Path) -> Result<AddFileOutcome> {
        self.inner.add_file(path)
    }

    /// Register many files with a single regeneration pass at the end
    ///
    /// Files that fail to classify are logged and skipped.
    pub fn add_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<AddFileOutcome>> {
        let mut classified = Vec::with_capacity(paths.len());
        for path in paths {
            let path = normalize_path(path.as_ref());
            match classify::classify(&path) {
                Ok(c) => classified.push(c),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unclassifiable file"),
            }
        }

        let mut state = self.inner.lock()?;
        let mut outcomes = Vec::with_capacity(classified.len());
        for c in classified {
            outcomes.push(self.inner.register(&mut state, c)?);
        }
        let added = outcomes.iter().filter(|o| o.is_added()).count();
        if added > 0 {
            info!(added, offered = paths.len(), "Added files");
            self.inner.regenerate_locked(&mut state);
        }
        Ok(outcomes)
    }

    /// Forget a file; returns its category and id when it was registered
    pub fn remove_file(&self, path: &Path) -> Result<Option<(FileCategory, u64)>> {
        self.inner.remove_file(path)
    }

    /// Read-only view of the registries
    pub fn with_registries<R>(&self, f: impl FnOnce(&Registries) -> R) -> Result<R> {
        let state = self.inner.lock()?;
        Ok(f(&state.registries))
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    pub fn regenerate(&self) -> Result<()> {
        self.inner.regenerate()
    }

    pub fn config(&self) -> Result<IntelConfig> {
        Ok(self.inner.lock()?.config.clone())
    }

    /// Replace the settings and regenerate
    ///
    /// Running monitors keep the interval they were started with.
    pub fn set_config(&self, config: IntelConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.inner.lock()?;
        if state.config == config {
            return Ok(());
        }
        info!(
            mode = config.auto_processing_mode.as_str(),
            coord_system = %config.coord_system,
            vert_ref = %config.vert_ref,
            "Settings changed"
        );
        state.config = config;
        self.inner.regenerate_locked(&mut state);
        Ok(())
    }

    pub fn on_container_added(&self, container: &ContainerHandle) -> Result<()> {
        info!(container = %container.path, "Container added");
        self.inner.regenerate()
    }

    pub fn on_container_removed(&self, container: &ContainerHandle) -> Result<()> {
        info!(container = %container.path, "Container removed");
        self.inner.regenerate()
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Observers are called under the engine lock and must not call back in
    pub fn subscribe(&self, observer: Arc<dyn ActionObserver>) -> Result<()> {
        self.inner.lock()?.queue.subscribe(observer);
        Ok(())
    }

    pub fn actions(&self) -> Result<Vec<Action>> {
        Ok(self.inner.lock()?.queue.actions().to_vec())
    }

    pub fn unmatched(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.inner.lock()?.queue.unmatched().clone())
    }

    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::SeqCst)
    }

    /// Run the highest priority pending action
    ///
    /// Only one action runs at a time; a call made while another is running
    /// fails with [`IntelError::ExecutionInProgress`]. A failed action goes
    /// back to pending and is not retried automatically.
    pub fn execute_next(&self) -> Result<CompletedAction> {
        if self
            .inner
            .executing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IntelError::ExecutionInProgress);
        }
        let _guard = ExecutionGuard(&self.inner.executing);

        let action = {
            let mut state = self.inner.lock()?;
            let id = state
                .queue
                .next_pending()
                .map(|a| a.id)
                .ok_or(IntelError::NoPendingAction)?;
            state.queue.mark_running(id)?
        };
        info!(
            id = action.id,
            category = %action.category,
            function = action.work_item.function.name(),
            "Executing: {}",
            action.description
        );

        let outcome = action.work_item.run();

        let mut state = self.inner.lock()?;
        // The queue may have been cleared by close_project while the work ran
        let still_queued = state.queue.get(action.id).is_some();
        match outcome {
            Ok(output) => {
                self.inner.project.apply_output(&output);
                if still_queued {
                    state.queue.set_result(action.id, output.clone())?;
                    state.queue.remove(action.id);
                    info!(id = action.id, category = %action.category, "Action complete");
                    self.inner.regenerate_locked(&mut state);
                } else {
                    warn!(
                        id = action.id,
                        category = %action.category,
                        "Action completed after the queue was reset; output applied"
                    );
                }
                Ok(CompletedAction {
                    id: action.id,
                    category: action.category,
                    description: action.description,
                    output,
                })
            }
            Err(message) => {
                warn!(id = action.id, category = %action.category, error = %message, "Action failed");
                if still_queued {
                    state.queue.mark_pending(action.id)?;
                    // Pick up changes held back while the action was running
                    self.inner.regenerate_locked(&mut state);
                }
                Err(IntelError::Execution {
                    description: action.description,
                    message,
                })
            }
        }
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// Start watching a directory, using the configured interval and recursion
    pub fn start_monitor(&self, dir: &Path) -> Result<()> {
        let root = normalize_path(dir);
        let config = self.config()?;
        let mut monitors = self
            .monitors
            .lock()
            .map_err(|_| IntelError::InvalidState("monitor lock poisoned".to_string()))?;
        let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
        if monitors
            .iter()
            .any(|m| m.root() == root || m.root() == canonical)
        {
            return Err(IntelError::InvalidState(format!(
                "{} is already monitored",
                root.display()
            )));
        }
        let sink = Arc::new(EngineSink {
            inner: Arc::downgrade(&self.inner),
        });
        let mut monitor =
            DirectoryMonitor::new(&root, config.recursive_monitoring, config.monitor_interval(), sink);
        monitor.start()?;
        monitors.push(monitor);
        Ok(())
    }

    /// Stop watching a directory; false when it was not monitored
    pub fn stop_monitor(&self, dir: &Path) -> Result<bool> {
        let root = normalize_path(dir);
        let canonical = root.canonicalize().unwrap_or_else(|_| root.clone());
        let monitor = {
            let mut monitors = self
                .monitors
                .lock()
                .map_err(|_| IntelError::InvalidState("monitor lock poisoned".to_string()))?;
            let Some(idx) = monitors
                .iter()
                .position(|m| m.root() == root || m.root() == canonical)
            else {
                return Ok(false);
            };
            monitors.remove(idx)
        };
        // Join outside the monitor list lock
        let mut monitor = monitor;
        monitor.stop();
        Ok(true)
    }

    pub fn monitored_directories(&self) -> Vec<PathBuf> {
        self.monitors
            .lock()
            .map(|m| m.iter().map(|m| m.root().to_path_buf()).collect())
            .unwrap_or_default()
    }

    fn stop_all_monitors(&self) {
        let stopped: Vec<DirectoryMonitor> = match self.monitors.lock() {
            Ok(mut monitors) => monitors.drain(..).collect(),
            Err(_) => return,
        };
        for mut monitor in stopped {
            monitor.stop();
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop monitoring and forget every file, action and unmatched entry
    pub fn close_project(&self) -> Result<()> {
        self.stop_all_monitors();
        let mut state = self.inner.lock()?;
        state.registries.clear();
        state.queue.clear();
        state.controller.reset();
        info!("Project closed, engine cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::tests::NamedFunction;
    use crate::classify::fixtures;
    use crate::project::{InMemoryProject, NoVesselConfig, SurfaceHandle};
    use serde_json::{Map, Value};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct FailingFunction;

    impl crate::action::WorkFunction for FailingFunction {
        fn name(&self) -> &str {
            "failing"
        }

        fn call(&self, _args: &[Value], _kwargs: &Map<String, Value>) -> std::result::Result<WorkOutput, String> {
            Err("disk full".to_string())
        }
    }

    fn functions() -> WorkFunctions {
        WorkFunctions {
            convert_multibeam: Arc::new(NamedFunction("convert_multibeam")),
            import_navigation: Arc::new(NamedFunction("import_navigation")),
            import_sound_velocity: Arc::new(NamedFunction("import_sound_velocity")),
            process_multibeam: Arc::new(NamedFunction("process_multibeam")),
            update_surface: Arc::new(NamedFunction("update_surface")),
        }
    }

    fn engine_with(functions: WorkFunctions) -> (IntelEngine, TempDir) {
        let temp = TempDir::new().unwrap();
        let project = Arc::new(InMemoryProject::new(Some(temp.path().join("project"))));
        let engine = IntelEngine::new(
            IntelConfig::default(),
            project,
            Arc::new(NoVesselConfig),
            functions,
        )
        .unwrap();
        (engine, temp)
    }

    fn write_line(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fixtures::write_all_file(&path, 2040, 40111, 0, 20170523, 65_479_000, 65_539_500);
        path
    }

    #[test]
    fn test_add_file_creates_action() {
        let (engine, temp) = engine_with(functions());
        let line = write_line(temp.path(), "0009_20170523_181119.all");

        let outcome = engine.add_file(&line).unwrap();
        assert!(matches!(
            outcome,
            AddFileOutcome::Added { category: FileCategory::Multibeam, .. }
        ));
        let actions = engine.actions().unwrap();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].output_destination.ends_with("em2040_40111_05_23_2017"));

        assert!(matches!(
            engine.add_file(&line).unwrap(),
            AddFileOutcome::Duplicate { .. }
        ));
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        let (engine, temp) = engine_with(functions());
        let notes = temp.path().join("notes.doc");
        std::fs::write(&notes, b"hello").unwrap();
        assert!(matches!(
            engine.add_file(&notes).unwrap(),
            AddFileOutcome::Unsupported { .. }
        ));
        assert!(engine.add_file(&temp.path().join("gone.all")).is_err());
        assert!(engine.actions().unwrap().is_empty());
    }

    #[test]
    fn test_add_files_regenerates_once() {
        let (engine, temp) = engine_with(functions());
        let a = write_line(temp.path(), "0009_20170523_181119.all");
        let b = write_line(temp.path(), "0010_20170523_181119.all");

        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        engine
            .subscribe(Arc::new(move |_: &[Action], _: &BTreeMap<String, String>| {
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let outcomes = engine.add_files(&[a, b]).unwrap();
        assert_eq!(outcomes.iter().filter(|o| o.is_added()).count(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(engine.actions().unwrap()[0].input_files.len(), 2);
    }

    #[test]
    fn test_remove_file_drops_action() {
        let (engine, temp) = engine_with(functions());
        let line = write_line(temp.path(), "0009_20170523_181119.all");
        engine.add_file(&line).unwrap();
        assert!(engine.remove_file(&line).unwrap().is_some());
        assert!(engine.actions().unwrap().is_empty());
        assert!(engine.remove_file(&line).unwrap().is_none());
        assert!(engine
            .with_registries(|r| r.multibeam.line_groups().is_empty())
            .unwrap());
    }

    #[test]
    fn test_execute_with_empty_queue() {
        let (engine, _temp) = engine_with(functions());
        assert!(matches!(engine.execute_next(), Err(IntelError::NoPendingAction)));
        assert!(!engine.is_executing());
    }

    #[test]
    fn test_failed_action_returns_to_pending() {
        let mut f = functions();
        f.convert_multibeam = Arc::new(FailingFunction);
        let (engine, temp) = engine_with(f);
        engine
            .add_file(&write_line(temp.path(), "0009_20170523_181119.all"))
            .unwrap();

        let err = engine.execute_next().unwrap_err();
        assert!(matches!(err, IntelError::Execution { .. }));
        let actions = engine.actions().unwrap();
        assert_eq!(actions.len(), 1);
        assert!(!actions[0].is_running());
        assert!(!engine.is_executing());
    }

    #[test]
    fn test_successful_action_is_removed() {
        let (engine, temp) = engine_with(functions());
        engine
            .add_file(&write_line(temp.path(), "0009_20170523_181119.all"))
            .unwrap();
        let done = engine.execute_next().unwrap();
        assert_eq!(done.category, ActionCategory::Multibeam);
        assert_eq!(
            done.output,
            WorkOutput::Surface(SurfaceHandle::new("convert_multibeam"))
        );
        assert!(engine
            .actions()
            .unwrap()
            .iter()
            .all(|a| a.category != ActionCategory::Multibeam || a.id != done.id));
    }

    #[test]
    fn test_close_project_clears_everything() {
        let (engine, temp) = engine_with(functions());
        engine
            .add_file(&write_line(temp.path(), "0009_20170523_181119.all"))
            .unwrap();
        engine.start_monitor(temp.path()).unwrap();
        assert_eq!(engine.monitored_directories().len(), 1);

        engine.close_project().unwrap();
        assert!(engine.actions().unwrap().is_empty());
        assert!(engine.with_registries(|r| r.is_empty()).unwrap());
        assert!(engine.monitored_directories().is_empty());
    }

    #[test]
    fn test_monitor_twice_rejected() {
        let (engine, temp) = engine_with(functions());
        engine.start_monitor(temp.path()).unwrap();
        assert!(engine.start_monitor(temp.path()).is_err());
        assert!(engine.stop_monitor(temp.path()).unwrap());
        assert!(!engine.stop_monitor(temp.path()).unwrap());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (engine, _temp) = engine_with(functions());
        let config = IntelConfig {
            name_match_cutoff: 2.0,
            ..IntelConfig::default()
        };
        assert!(engine.set_config(config).is_err());
    }
}
