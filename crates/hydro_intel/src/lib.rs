//! Hydro Intel - Survey File Intelligence & Action Orchestration
//!
//! Takes raw survey files as they arrive (one at a time, in bulk, or from a
//! watched directory), works out what each one is, pairs related files with
//! each other and with the project's containers, and keeps a prioritized
//! queue of the actions that would bring the project up to date.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Monitor /  │     │ Classifier │     │ Registries │     │ Regeneration │     │ ActionQueue │
//! │  add_file   │────▶│ (headers)  │────▶│ (per kind) │────▶│ (matching →  │────▶│ (priority)  │
//! │             │     │            │     │            │     │   desired)   │     │             │
//! └─────────────┘     └────────────┘     └────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **TrackedFile**: a classified file with its header metadata
//! - **Container**: converted output the project owns; the engine only reads it
//! - **Action**: one unit of work (convert, import, process, grid) for one destination
//! - **Unmatched**: files the engine cannot place yet, with the reason why

pub mod action;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod matching;
pub mod monitor;
pub mod project;
pub mod regenerate;
pub mod registry;
pub mod types;

// Re-exports for convenience
pub use action::{
    Action, ActionCategory, ActionObserver, ActionQueue, ActionSpec, ActionStatus, WorkFunction,
    WorkItem,
};
pub use classify::{classify, Classified};
pub use config::{AutoProcessingMode, IntelConfig};
pub use engine::{AddFileOutcome, CompletedAction, IntelEngine};
pub use error::{IntelError, Result};
pub use matching::{MatchingEngine, VoteTally};
pub use monitor::{DirectoryMonitor, MonitorEvent, MonitorSink, MonitorState};
pub use project::{
    ContainerHandle, InMemoryProject, NoVesselConfig, ProcessingStage, ProjectState,
    SurfaceHandle, VesselConfig, VesselDeltas, WorkOutput,
};
pub use regenerate::{RegenerationController, WorkFunctions};
pub use registry::{AddOutcome, Registries};
pub use types::{
    FileAttributes, FileCategory, MultibeamFormat, MultibeamMeta, NavErrorMeta, NavLogMeta,
    NavigationMeta, SvpMeta, TrackedFile,
};
