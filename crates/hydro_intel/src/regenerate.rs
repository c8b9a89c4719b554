//! Action regeneration
//!
//! Every trigger (file added or removed, settings changed, container added or
//! removed, action finished) recomputes the desired actions of each category
//! and reconciles the queue against them:
//!
//! 1. queued actions whose destination is no longer wanted are removed,
//! 2. existing actions are updated in place when their content differs,
//! 3. new destinations get a new action at the category's priority.
//!
//! Running actions are never touched. A pass that finds nothing to change
//! makes no queue mutation and so sends no notification.

use crate::action::{Action, ActionCategory, ActionQueue, ActionSpec, WorkFunction, WorkItem};
use crate::config::{AutoProcessingMode, IntelConfig};
use crate::error::Result;
use crate::matching::MatchingEngine;
use crate::project::{ContainerHandle, ProcessingStage, ProjectState, VesselConfig, VesselDeltas};
use crate::registry::Registries;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// The host entry points actions run
#[derive(Clone)]
pub struct WorkFunctions {
    pub convert_multibeam: Arc<dyn WorkFunction>,
    pub import_navigation: Arc<dyn WorkFunction>,
    pub import_sound_velocity: Arc<dyn WorkFunction>,
    pub process_multibeam: Arc<dyn WorkFunction>,
    pub update_surface: Arc<dyn WorkFunction>,
}

impl std::fmt::Debug for WorkFunctions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkFunctions")
            .field("convert_multibeam", &self.convert_multibeam.name())
            .field("import_navigation", &self.import_navigation.name())
            .field("import_sound_velocity", &self.import_sound_velocity.name())
            .field("process_multibeam", &self.process_multibeam.name())
            .field("update_surface", &self.update_surface.name())
            .finish()
    }
}

/// Read-only inputs to one regeneration pass
pub struct RegenerationContext<'a> {
    pub config: &'a IntelConfig,
    pub project: &'a dyn ProjectState,
    pub vessel: &'a dyn VesselConfig,
    pub functions: &'a WorkFunctions,
}

/// What a category wants in the queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredActions {
    pub actions: IndexMap<String, ActionSpec>,
    pub unmatched: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct RegenerationController {
    snapshots: HashMap<ActionCategory, IndexMap<String, ActionSpec>>,
    owned_unmatched: HashMap<ActionCategory, BTreeMap<String, String>>,
    dirty: bool,
    in_progress: bool,
}

impl RegenerationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that something changed; the next `regenerate` call runs a pass
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Forget all snapshots (project closed, queue cleared)
    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.owned_unmatched.clear();
        self.dirty = false;
    }

    /// Run passes until no trigger is pending
    ///
    /// A trigger raised while a pass is running is folded into another pass
    /// after the current one instead of interleaving with it.
    pub fn regenerate(
        &mut self,
        registries: &mut Registries,
        queue: &mut ActionQueue,
        ctx: &RegenerationContext<'_>,
    ) {
        self.dirty = true;
        if self.in_progress {
            return;
        }
        self.in_progress = true;
        while self.dirty {
            self.dirty = false;
            self.pass(registries, queue, ctx);
        }
        self.in_progress = false;
    }

    fn pass(
        &mut self,
        registries: &mut Registries,
        queue: &mut ActionQueue,
        ctx: &RegenerationContext<'_>,
    ) {
        let matcher = MatchingEngine::from_config(ctx.config);
        for category in ActionCategory::ALL {
            let desired = match category {
                ActionCategory::Multibeam => desired_multibeam(&matcher, registries, ctx),
                ActionCategory::Navigation => desired_navigation(&matcher, registries, ctx),
                ActionCategory::Svp => desired_svp(&matcher, registries, ctx),
                ActionCategory::Processing => desired_processing(ctx),
                ActionCategory::Gridding => desired_gridding(ctx),
            };
            if let Err(e) = self.apply(category, desired, queue) {
                warn!(category = %category, error = %e, "Regeneration failed for category, skipping it");
            }
        }
        registries.verify_or_repair();
    }

    /// Reconcile the queue with one category's desired actions
    ///
    /// Destinations whose spec matches the previous snapshot are left alone
    /// as long as the queue still holds them. The new snapshot only records
    /// what was actually applied, so an update held back by a running action
    /// is retried on the next pass.
    pub fn apply(
        &mut self,
        category: ActionCategory,
        desired: DesiredActions,
        queue: &mut ActionQueue,
    ) -> Result<()> {
        let previous = self.snapshots.remove(&category).unwrap_or_default();
        let dropped = previous
            .keys()
            .filter(|d| !desired.actions.contains_key(*d))
            .count();

        let valid: BTreeSet<String> = desired.actions.keys().cloned().collect();
        let (remaining, _) = queue.remove_destinations_not_in(category, &valid);
        let existing: HashMap<&str, &Action> = remaining
            .iter()
            .map(|a| (a.output_destination.as_str(), a))
            .collect();

        let mut snapshot = IndexMap::with_capacity(desired.actions.len());
        let mut added = 0usize;
        let mut updated = 0usize;
        for (destination, spec) in desired.actions {
            let unchanged = previous.get(&destination) == Some(&spec);
            match existing.get(destination.as_str()) {
                Some(action) if action.is_running() => continue,
                Some(_) if unchanged => {}
                Some(action) => {
                    if queue.update_in_place(action.id, spec.clone())? {
                        updated += 1;
                    }
                }
                None => {
                    queue.add(spec.clone())?;
                    added += 1;
                }
            }
            snapshot.insert(destination, spec);
        }

        let previous_unmatched = self.owned_unmatched.remove(&category).unwrap_or_default();
        for path in previous_unmatched.keys() {
            if !desired.unmatched.contains_key(path) {
                queue.clear_unmatched(path);
            }
        }
        for (path, reason) in &desired.unmatched {
            queue.set_unmatched(path, reason);
        }

        if added > 0 || updated > 0 || dropped > 0 {
            debug!(
                category = %category,
                desired = snapshot.len(),
                added,
                updated,
                dropped,
                "Regenerated actions"
            );
        }
        self.snapshots.insert(category, snapshot);
        self.owned_unmatched.insert(category, desired.unmatched);
        Ok(())
    }

    /// Destinations the last pass applied for a category
    pub fn snapshot(&self, category: ActionCategory) -> Option<&IndexMap<String, ActionSpec>> {
        self.snapshots.get(&category)
    }
}

fn file_names(paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            Path::new(p)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.clone())
        })
        .collect()
}

// ============================================================================
// Multibeam conversion
// ============================================================================

fn desired_multibeam(
    matcher: &MatchingEngine,
    registries: &mut Registries,
    ctx: &RegenerationContext<'_>,
) -> DesiredActions {
    let matches = matcher.match_multibeam(&registries.multibeam, ctx.project);
    registries.multibeam.set_line_groups(matches.groups.clone());

    let mut desired = DesiredActions {
        unmatched: matches.unmatched,
        ..DesiredActions::default()
    };
    for (destination, lines) in matches.groups {
        let mut kwargs = Map::new();
        kwargs.insert("parallel_write".to_string(), Value::Bool(ctx.config.parallel_write));
        let spec = ActionSpec {
            category: ActionCategory::Multibeam,
            description: format!("Convert {} multibeam lines to {}", lines.len(), destination),
            tooltip: lines.join("\n"),
            input_files: lines.clone(),
            output_destination: destination.clone(),
            work_item: WorkItem::new(
                Arc::clone(&ctx.functions.convert_multibeam),
                vec![json!(lines), json!(destination)],
                kwargs,
            ),
        };
        desired.actions.insert(destination, spec);
    }
    desired
}

// ============================================================================
// Navigation import
// ============================================================================

fn desired_navigation(
    matcher: &MatchingEngine,
    registries: &mut Registries,
    ctx: &RegenerationContext<'_>,
) -> DesiredActions {
    let errors = matcher.match_error_files(registries);
    registries.nav_error.clear_matches();
    for (error, sbet) in &errors.matches {
        registries.nav_error.set_match(error, sbet);
    }
    let logs = matcher.match_log_files(registries);
    registries.nav_log.clear_matches();
    for (log, sbet) in &logs.matches {
        registries.nav_log.set_match(log, sbet);
    }

    let navigation = matcher.match_navigation(registries, ctx.project);
    registries
        .navigation
        .set_container_matches(navigation.sbet_to_container.clone());

    let mut desired = DesiredActions::default();
    desired.unmatched.extend(errors.unmatched);
    desired.unmatched.extend(logs.unmatched);
    desired.unmatched.extend(navigation.unmatched);

    for (container, imports) in navigation.groups {
        let sbets: Vec<String> = imports.iter().map(|i| i.sbet.clone()).collect();
        let error_files: Vec<String> = imports.iter().map(|i| i.error_file.clone()).collect();
        let log_files: Vec<String> = imports.iter().map(|i| i.log_file.clone()).collect();

        let description = match sbets.as_slice() {
            [single] => format!("Import {} to {}", single, container),
            _ => format!("Import {} SBET files to {}", sbets.len(), container),
        };
        let input_files = imports
            .iter()
            .flat_map(|i| [i.sbet.clone(), i.error_file.clone(), i.log_file.clone()])
            .collect();
        let spec = ActionSpec {
            category: ActionCategory::Navigation,
            description,
            tooltip: sbets.join("\n"),
            input_files,
            output_destination: container.clone(),
            work_item: WorkItem::new(
                Arc::clone(&ctx.functions.import_navigation),
                vec![json!(container), json!(sbets), json!(error_files), json!(log_files)],
                Map::new(),
            ),
        };
        desired.actions.insert(container, spec);
    }
    desired
}

// ============================================================================
// Sound velocity import
// ============================================================================

fn desired_svp(
    matcher: &MatchingEngine,
    registries: &Registries,
    ctx: &RegenerationContext<'_>,
) -> DesiredActions {
    let matches = matcher.match_svp(&registries.svp, ctx.project);
    let mut desired = DesiredActions {
        unmatched: matches.unmatched,
        ..DesiredActions::default()
    };
    for (container, files) in matches.groups {
        let spec = ActionSpec {
            category: ActionCategory::Svp,
            description: format!(
                "Import {} sound velocity files to {}",
                files.len(),
                container
            ),
            tooltip: file_names(&files).join("\n"),
            input_files: files.clone(),
            output_destination: container.clone(),
            work_item: WorkItem::new(
                Arc::clone(&ctx.functions.import_sound_velocity),
                vec![json!(container), json!(files)],
                Map::new(),
            ),
        };
        desired.actions.insert(container, spec);
    }
    desired
}

// ============================================================================
// Processing
// ============================================================================

/// First processing step a container needs, or `None` when it is up to date
pub fn processing_start(
    container: &ContainerHandle,
    deltas: &VesselDeltas,
    config: &IntelConfig,
) -> Option<ProcessingStage> {
    if container.converted_lines.is_empty() {
        return None;
    }
    let mut required = vec![];
    if let Some(next) = container.last_stage.next() {
        required.push(next);
    }
    if !container.unprocessed_lines.is_empty() || deltas.angles_changed {
        required.push(ProcessingStage::Orientation);
    }
    if deltas.offsets_changed || (deltas.waterline_changed && config.keep_waterline_changes) {
        required.push(ProcessingStage::SoundVelocity);
    }
    if container
        .coordinate_system
        .as_deref()
        .is_some_and(|cs| cs != config.coord_system)
    {
        required.push(ProcessingStage::Georeference);
    }
    if deltas.tpu_changed {
        required.push(ProcessingStage::Tpu);
    }
    required.into_iter().min()
}

pub fn processing_description(start: ProcessingStage, container_name: &str) -> String {
    match start {
        ProcessingStage::Converted | ProcessingStage::Orientation => {
            format!("Run all processing on {}", container_name)
        }
        ProcessingStage::BeamVectors => {
            format!("Process {} starting with beam vectors", container_name)
        }
        ProcessingStage::SoundVelocity => {
            format!("Process {} starting with sound velocity", container_name)
        }
        ProcessingStage::Georeference => {
            format!("Process {} starting with georeferencing", container_name)
        }
        ProcessingStage::Tpu => format!("Process {} only computing TPU", container_name),
    }
}

fn desired_processing(ctx: &RegenerationContext<'_>) -> DesiredActions {
    let mut desired = DesiredActions::default();
    if ctx.config.auto_processing_mode == AutoProcessingMode::ConvertOnly {
        return desired;
    }

    for container in ctx.project.containers() {
        let deltas = ctx.vessel.deltas(
            container.primary_serial,
            container.start_time,
            container.end_time,
            &container,
        );
        let Some(start) = processing_start(&container, &deltas, ctx.config) else {
            continue;
        };

        let mut kwargs = Map::new();
        let run = |stage: ProcessingStage| Value::Bool(stage >= start);
        kwargs.insert("run_orientation".into(), run(ProcessingStage::Orientation));
        kwargs.insert("run_beam_vec".into(), run(ProcessingStage::BeamVectors));
        kwargs.insert("run_svcorr".into(), run(ProcessingStage::SoundVelocity));
        kwargs.insert("run_georef".into(), run(ProcessingStage::Georeference));
        kwargs.insert("run_tpu".into(), run(ProcessingStage::Tpu));
        kwargs.insert("coord_system".into(), json!(ctx.config.coord_system));
        kwargs.insert("vert_ref".into(), json!(ctx.config.vert_ref));
        if ctx.config.auto_processing_mode == AutoProcessingMode::Concatenate
            && !container.unprocessed_lines.is_empty()
        {
            kwargs.insert(
                "only_these_lines".into(),
                json!(container.unprocessed_lines.iter().collect::<Vec<_>>()),
            );
        }

        let spec = ActionSpec {
            category: ActionCategory::Processing,
            description: processing_description(start, &container.name),
            tooltip: format!(
                "{}\nCoordinate system: {}\nVertical reference: {}",
                container.path, ctx.config.coord_system, ctx.config.vert_ref
            ),
            input_files: vec![],
            output_destination: container.path.clone(),
            work_item: WorkItem::new(
                Arc::clone(&ctx.functions.process_multibeam),
                vec![json!(container.path)],
                kwargs,
            ),
        };
        desired.actions.insert(container.path.clone(), spec);
    }
    desired
}

// ============================================================================
// Gridding
// ============================================================================

fn desired_gridding(ctx: &RegenerationContext<'_>) -> DesiredActions {
    let mut desired = DesiredActions::default();
    if ctx.config.auto_processing_mode == AutoProcessingMode::ConvertOnly {
        return desired;
    }
    let Some(surface) = ctx.project.designated_surface() else {
        return desired;
    };

    let mut lines_by_container: IndexMap<String, Vec<String>> = IndexMap::new();
    for container in ctx.project.containers() {
        let deltas = ctx.vessel.deltas(
            container.primary_serial,
            container.start_time,
            container.end_time,
            &container,
        );
        if processing_start(&container, &deltas, ctx.config).is_some() {
            continue;
        }
        let gridded = surface.gridded_lines.get(&container.name);
        let stale: Vec<String> = container
            .processed_lines
            .iter()
            .filter(|(line, processed_at)| {
                gridded
                    .and_then(|g| g.get(*line))
                    .map_or(true, |gridded_at| gridded_at < *processed_at)
            })
            .map(|(line, _)| line.clone())
            .collect();
        if !stale.is_empty() {
            lines_by_container.insert(container.path.clone(), stale);
        }
    }
    if lines_by_container.is_empty() {
        return desired;
    }

    let containers: Vec<String> = lines_by_container.keys().cloned().collect();
    let surface_name = Path::new(&surface.path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| surface.path.clone());
    let mut kwargs = Map::new();
    kwargs.insert("lines_by_container".into(), json!(lines_by_container));

    let spec = ActionSpec {
        category: ActionCategory::Gridding,
        description: format!(
            "Update {} with {} processed containers",
            surface_name,
            containers.len()
        ),
        tooltip: containers.join("\n"),
        input_files: containers.clone(),
        output_destination: surface.path.clone(),
        work_item: WorkItem::new(
            Arc::clone(&ctx.functions.update_surface),
            vec![json!(surface.path), json!(containers)],
            kwargs,
        ),
    };
    desired.actions.insert(surface.path.clone(), spec);
    desired
}
