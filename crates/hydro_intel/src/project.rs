//! Project side interfaces
//!
//! The engine never owns converted data. It reads the project's containers
//! through [`ProjectState`] and vessel configuration changes through
//! [`VesselConfig`]; both are supplied by the embedding application.

use chrono::{DateTime, Datelike, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Processing steps in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Raw data converted, nothing processed yet
    Converted,
    Orientation,
    BeamVectors,
    SoundVelocity,
    Georeference,
    Tpu,
}

impl ProcessingStage {
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Converted => Some(Self::Orientation),
            Self::Orientation => Some(Self::BeamVectors),
            Self::BeamVectors => Some(Self::SoundVelocity),
            Self::SoundVelocity => Some(Self::Georeference),
            Self::Georeference => Some(Self::Tpu),
            Self::Tpu => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Orientation => "orientation",
            Self::BeamVectors => "beam_vectors",
            Self::SoundVelocity => "sound_velocity",
            Self::Georeference => "georeference",
            Self::Tpu => "tpu",
        }
    }
}

/// Snapshot of one converted output container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub path: String,
    pub name: String,
    pub primary_serial: u32,
    pub secondary_serial: u32,
    pub model: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Multibeam file names already converted into the container
    pub converted_lines: BTreeSet<String>,
    /// SBET file names already imported
    pub imported_sbets: BTreeSet<String>,
    /// Sound velocity cast times already applied, epoch seconds
    pub cast_times: BTreeSet<i64>,
    /// Last processing step completed for the whole container
    pub last_stage: ProcessingStage,
    /// Converted lines no processing has run on yet
    pub unprocessed_lines: BTreeSet<String>,
    pub coordinate_system: Option<String>,
    /// line → epoch seconds of its last processing run
    pub processed_lines: BTreeMap<String, i64>,
}

impl ContainerHandle {
    pub fn new(
        path: impl Into<String>,
        primary_serial: u32,
        secondary_serial: u32,
        model: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let path = path.into();
        let name = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        Self {
            path,
            name,
            primary_serial,
            secondary_serial,
            model: model.into(),
            start_time,
            end_time,
            converted_lines: BTreeSet::new(),
            imported_sbets: BTreeSet::new(),
            cast_times: BTreeSet::new(),
            last_stage: ProcessingStage::Converted,
            unprocessed_lines: BTreeSet::new(),
            coordinate_system: None,
            processed_lines: BTreeMap::new(),
        }
    }

    /// Whether `time` falls on the same UTC calendar day as the container start
    pub fn same_day_as(&self, time: DateTime<Utc>) -> bool {
        self.start_time.date_naive() == time.date_naive()
    }

    /// GPS day of week of the container start (Sunday = 0)
    pub fn gps_weekday(&self) -> u32 {
        self.start_time.weekday().num_days_from_sunday()
    }
}

/// Designated gridding destination
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub path: String,
    /// container name → (line → processing time the line had when gridded)
    pub gridded_lines: BTreeMap<String, BTreeMap<String, i64>>,
}

impl SurfaceHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            gridded_lines: BTreeMap::new(),
        }
    }
}

/// What a completed work item produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkOutput {
    Container(ContainerHandle),
    Surface(SurfaceHandle),
}

/// Read access to the project the engine feeds
pub trait ProjectState: Send + Sync {
    /// Folder new containers are created in
    fn project_folder(&self) -> Option<PathBuf>;

    /// All containers, in project order
    fn containers(&self) -> Vec<ContainerHandle>;

    /// Container recorded by these serials on the same UTC day, if any
    fn container_by_serial(
        &self,
        primary: u32,
        secondary: u32,
        same_day_as: DateTime<Utc>,
    ) -> Option<ContainerHandle> {
        self.containers().into_iter().find(|c| {
            c.primary_serial == primary
                && c.secondary_serial == secondary
                && c.same_day_as(same_day_as)
        })
    }

    /// Lines converted into the container
    fn container_line_set(&self, container: &ContainerHandle) -> BTreeSet<String> {
        container.converted_lines.clone()
    }

    fn designated_surface(&self) -> Option<SurfaceHandle> {
        None
    }

    /// Record the output of a completed action
    fn apply_output(&self, _output: &WorkOutput) {}
}

/// Per-container vessel configuration changes not yet applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VesselDeltas {
    pub angles_changed: bool,
    pub offsets_changed: bool,
    pub tpu_changed: bool,
    pub waterline_changed: bool,
}

impl VesselDeltas {
    pub fn any(&self) -> bool {
        self.angles_changed || self.offsets_changed || self.tpu_changed || self.waterline_changed
    }
}

pub trait VesselConfig: Send + Sync {
    fn deltas(
        &self,
        serial: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        container: &ContainerHandle,
    ) -> VesselDeltas;
}

/// Vessel configuration that never reports a change
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVesselConfig;

impl VesselConfig for NoVesselConfig {
    fn deltas(
        &self,
        _serial: u32,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        _container: &ContainerHandle,
    ) -> VesselDeltas {
        VesselDeltas::default()
    }
}

// ============================================================================
// In-memory project
// ============================================================================

#[derive(Debug, Default)]
struct ProjectInner {
    folder: Option<PathBuf>,
    containers: IndexMap<String, ContainerHandle>,
    surface: Option<SurfaceHandle>,
}

/// Project kept entirely in memory; the engine default when the host has none
#[derive(Debug, Default)]
pub struct InMemoryProject {
    inner: RwLock<ProjectInner>,
}

impl InMemoryProject {
    pub fn new(folder: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(ProjectInner {
                folder,
                ..ProjectInner::default()
            }),
        }
    }

    /// Insert or replace a container, keyed by path
    pub fn upsert_container(&self, container: ContainerHandle) {
        if let Ok(mut inner) = self.inner.write() {
            inner.containers.insert(container.path.clone(), container);
        }
    }

    pub fn remove_container(&self, path: &str) -> Option<ContainerHandle> {
        self.inner.write().ok()?.containers.shift_remove(path)
    }

    pub fn container(&self, path: &str) -> Option<ContainerHandle> {
        self.inner.read().ok()?.containers.get(path).cloned()
    }

    pub fn set_surface(&self, surface: Option<SurfaceHandle>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.surface = surface;
        }
    }

    pub fn set_project_folder(&self, folder: Option<PathBuf>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.folder = folder;
        }
    }
}

impl ProjectState for InMemoryProject {
    fn project_folder(&self) -> Option<PathBuf> {
        self.inner.read().ok()?.folder.clone()
    }

    fn containers(&self) -> Vec<ContainerHandle> {
        self.inner
            .read()
            .map(|inner| inner.containers.values().cloned().collect())
            .unwrap_or_default()
    }

    fn designated_surface(&self) -> Option<SurfaceHandle> {
        self.inner.read().ok()?.surface.clone()
    }

    fn apply_output(&self, output: &WorkOutput) {
        match output {
            WorkOutput::Container(container) => self.upsert_container(container.clone()),
            WorkOutput::Surface(surface) => self.set_surface(Some(surface.clone())),
        }
    }
}
