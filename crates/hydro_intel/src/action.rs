//! Actions and the priority-ordered action queue
//!
//! An [`Action`] pairs a human readable description with an opaque
//! [`WorkItem`]. The queue keeps at most one action per
//! (category, destination), sorted by ascending priority with insertion order
//! kept among equal priorities, plus the map of files that could not be
//! matched to anything. Every real mutation notifies the observers; calls
//! that change nothing do not.

use crate::error::{IntelError, Result};
use crate::project::WorkOutput;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Multibeam,
    Navigation,
    Svp,
    Processing,
    Gridding,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 5] = [
        Self::Multibeam,
        Self::Navigation,
        Self::Svp,
        Self::Processing,
        Self::Gridding,
    ];

    /// Fixed priority; lower runs first
    pub fn priority(&self) -> i32 {
        match self {
            Self::Multibeam => 1,
            Self::Navigation => 2,
            Self::Svp => 3,
            Self::Processing => 5,
            Self::Gridding => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multibeam => "multibeam",
            Self::Navigation => "navigation",
            Self::Svp => "svp",
            Self::Processing => "processing",
            Self::Gridding => "gridding",
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
}

// ============================================================================
// Work items
// ============================================================================

/// Host-supplied entry point an action runs
///
/// The engine never looks inside; it passes the arguments through and
/// records the output.
pub trait WorkFunction: Send + Sync {
    fn name(&self) -> &str;

    fn call(&self, args: &[Value], kwargs: &Map<String, Value>) -> std::result::Result<WorkOutput, String>;
}

/// Function reference plus its positional and keyword arguments
#[derive(Clone)]
pub struct WorkItem {
    pub function: Arc<dyn WorkFunction>,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl WorkItem {
    pub fn new(function: Arc<dyn WorkFunction>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            function,
            args,
            kwargs,
        }
    }

    pub fn run(&self) -> std::result::Result<WorkOutput, String> {
        self.function.call(&self.args, &self.kwargs)
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("function", &self.function.name())
            .field("args", &self.args)
            .field("kwargs", &self.kwargs)
            .finish()
    }
}

impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.function.name() == other.function.name()
            && self.args == other.args
            && self.kwargs == other.kwargs
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Everything about an action except its queue bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpec {
    pub category: ActionCategory,
    pub description: String,
    pub tooltip: String,
    pub input_files: Vec<String>,
    pub output_destination: String,
    pub work_item: WorkItem,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: u64,
    pub priority: i32,
    pub category: ActionCategory,
    pub description: String,
    pub tooltip: String,
    pub input_files: Vec<String>,
    pub output_destination: String,
    pub work_item: WorkItem,
    pub status: ActionStatus,
    pub result: Option<WorkOutput>,
}

impl Action {
    fn from_spec(id: u64, spec: ActionSpec) -> Self {
        Self {
            id,
            priority: spec.category.priority(),
            category: spec.category,
            description: spec.description,
            tooltip: spec.tooltip,
            input_files: spec.input_files,
            output_destination: spec.output_destination,
            work_item: spec.work_item,
            status: ActionStatus::Pending,
            result: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ActionStatus::Running
    }

    /// Whether the action already carries exactly this content
    pub fn matches_spec(&self, spec: &ActionSpec) -> bool {
        self.category == spec.category
            && self.output_destination == spec.output_destination
            && self.description == spec.description
            && self.tooltip == spec.tooltip
            && self.input_files == spec.input_files
            && self.work_item == spec.work_item
    }
}

/// Receives the full queue after every change
pub trait ActionObserver: Send + Sync {
    fn on_actions_changed(&self, actions: &[Action], unmatched: &BTreeMap<String, String>);
}

impl<F> ActionObserver for F
where
    F: Fn(&[Action], &BTreeMap<String, String>) + Send + Sync,
{
    fn on_actions_changed(&self, actions: &[Action], unmatched: &BTreeMap<String, String>) {
        self(actions, unmatched)
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Default)]
pub struct ActionQueue {
    actions: Vec<Action>,
    unmatched: BTreeMap<String, String>,
    observers: Vec<Arc<dyn ActionObserver>>,
    next_id: u64,
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionQueue")
            .field("actions", &self.actions)
            .field("unmatched", &self.unmatched)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn ActionObserver>) {
        self.observers.push(observer);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn unmatched(&self) -> &BTreeMap<String, String> {
        &self.unmatched
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn by_category(&self, category: ActionCategory) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.category == category)
            .collect()
    }

    pub fn find(&self, category: ActionCategory, destination: &str) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.category == category && a.output_destination == destination)
    }

    /// Re-sort and tell every observer
    fn changed(&mut self) {
        self.actions.sort_by_key(|a| a.priority);
        for observer in &self.observers {
            observer.on_actions_changed(&self.actions, &self.unmatched);
        }
    }

    /// Queue a new action; a second action for the same (category, destination) is refused
    pub fn add(&mut self, spec: ActionSpec) -> Result<u64> {
        if let Some(existing) = self.find(spec.category, &spec.output_destination) {
            return Err(IntelError::InvalidState(format!(
                "a {} action for {} is already queued (id {})",
                spec.category, spec.output_destination, existing.id
            )));
        }
        self.next_id += 1;
        let id = self.next_id;
        debug!(id, category = %spec.category, destination = %spec.output_destination, "Queued action");
        self.actions.push(Action::from_spec(id, spec));
        self.changed();
        Ok(id)
    }

    pub fn remove(&mut self, id: u64) -> Option<Action> {
        let idx = self.actions.iter().position(|a| a.id == id)?;
        let action = self.actions.remove(idx);
        self.changed();
        Some(action)
    }

    /// Replace an action's content, keeping its id and position
    ///
    /// Returns `Ok(false)` when the action already matches. Running actions
    /// cannot be updated.
    pub fn update_in_place(&mut self, id: u64, spec: ActionSpec) -> Result<bool> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| IntelError::InvalidState(format!("no queued action with id {}", id)))?;
        if action.is_running() {
            return Err(IntelError::InvalidState(format!(
                "action {} is running and cannot be updated",
                id
            )));
        }
        if action.category != spec.category || action.output_destination != spec.output_destination {
            return Err(IntelError::InvalidState(format!(
                "action {} is a {} action for {}, not {} for {}",
                id, action.category, action.output_destination, spec.category, spec.output_destination
            )));
        }
        if action.matches_spec(&spec) {
            return Ok(false);
        }
        action.description = spec.description;
        action.tooltip = spec.tooltip;
        action.input_files = spec.input_files;
        action.work_item = spec.work_item;
        self.changed();
        Ok(true)
    }

    /// Drop queued actions of `category` whose destination is not in `valid`
    ///
    /// Running actions are never dropped. Returns the remaining actions of
    /// the category and their destinations.
    pub fn remove_destinations_not_in(
        &mut self,
        category: ActionCategory,
        valid: &BTreeSet<String>,
    ) -> (Vec<Action>, BTreeSet<String>) {
        let before = self.actions.len();
        self.actions.retain(|a| {
            a.category != category || a.is_running() || valid.contains(&a.output_destination)
        });
        if self.actions.len() != before {
            self.changed();
        }
        let remaining: Vec<Action> = self
            .actions
            .iter()
            .filter(|a| a.category == category)
            .cloned()
            .collect();
        let destinations = remaining
            .iter()
            .map(|a| a.output_destination.clone())
            .collect();
        (remaining, destinations)
    }

    /// First pending action in priority order
    pub fn next_pending(&self) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| a.status == ActionStatus::Pending)
    }

    /// Remove and return the first pending action in priority order
    pub fn pop_highest_priority(&mut self) -> Option<Action> {
        let id = self.next_pending()?.id;
        self.remove(id)
    }

    fn set_status(&mut self, id: u64, status: ActionStatus) -> Result<Action> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| IntelError::InvalidState(format!("no queued action with id {}", id)))?;
        if action.status != status {
            action.status = status;
            let snapshot = action.clone();
            self.changed();
            return Ok(snapshot);
        }
        Ok(action.clone())
    }

    pub fn mark_running(&mut self, id: u64) -> Result<Action> {
        self.set_status(id, ActionStatus::Running)
    }

    pub fn mark_pending(&mut self, id: u64) -> Result<Action> {
        self.set_status(id, ActionStatus::Pending)
    }

    pub fn set_result(&mut self, id: u64, output: WorkOutput) -> Result<()> {
        let action = self
            .actions
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| IntelError::InvalidState(format!("no queued action with id {}", id)))?;
        if action.result.as_ref() != Some(&output) {
            action.result = Some(output);
            self.changed();
        }
        Ok(())
    }

    /// Returns true when the reason was new or different
    pub fn set_unmatched(&mut self, path: &str, reason: &str) -> bool {
        if self.unmatched.get(path).map(String::as_str) == Some(reason) {
            return false;
        }
        self.unmatched.insert(path.to_string(), reason.to_string());
        self.changed();
        true
    }

    /// Returns true when the path had an entry
    pub fn clear_unmatched(&mut self, path: &str) -> bool {
        if self.unmatched.remove(path).is_none() {
            return false;
        }
        self.changed();
        true
    }

    /// Drop every action and unmatched entry
    pub fn clear(&mut self) {
        if self.actions.is_empty() && self.unmatched.is_empty() {
            return;
        }
        self.actions.clear();
        self.unmatched.clear();
        self.changed();
    }
}
