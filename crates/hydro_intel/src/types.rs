//! Core types for the intelligence engine
//!
//! A [`TrackedFile`] is one registered survey file: its normalized path, the
//! file system attributes gathered when it was added, and the category
//! specific metadata pulled from its header.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

// ============================================================================
// Categories
// ============================================================================

/// The kind of survey file a registry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    /// Raw multibeam sonar data (.all / .kmall)
    Multibeam,
    /// Post processed navigation (SBET)
    Navigation,
    /// Post processed navigation uncertainty (SMRMSG)
    NavError,
    /// Navigation export log
    NavLog,
    /// Sound velocity profile
    Svp,
}

impl FileCategory {
    pub const ALL: [FileCategory; 5] = [
        Self::Multibeam,
        Self::Navigation,
        Self::NavError,
        Self::NavLog,
        Self::Svp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multibeam => "multibeam",
            Self::Navigation => "navigation",
            Self::NavError => "naverror",
            Self::NavLog => "navlog",
            Self::Svp => "svp",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tracked files
// ============================================================================

/// File system attributes captured when a file is classified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub size_bytes: u64,
    /// Size in kilobytes rounded to three decimals
    pub size_kb: f64,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub time_added: DateTime<Utc>,
}

impl FileAttributes {
    pub fn from_size(size_bytes: u64) -> Self {
        Self {
            size_bytes,
            size_kb: size_kb(size_bytes),
            created: None,
            last_modified: None,
            time_added: Utc::now(),
        }
    }
}

pub fn size_kb(size_bytes: u64) -> f64 {
    (size_bytes as f64 / 1024.0 * 1000.0).round() / 1000.0
}

/// A registered survey file with its category specific metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedFile<M> {
    /// Normalized absolute path, the registry key
    pub path: String,
    pub file_name: String,
    /// Assigned by the registry on a successful add; 0 until then
    pub unique_id: u64,
    /// Format tag, e.g. "kongsberg_all" or "caris_svp"
    pub file_type: String,
    pub attributes: FileAttributes,
    pub meta: M,
}

impl<M> TrackedFile<M> {
    pub fn new(path: &Path, file_type: &str, attributes: FileAttributes, meta: M) -> Self {
        let normalized = normalize_path(path);
        Self {
            path: path_key(&normalized),
            file_name: file_name_of(&normalized),
            unique_id: 0,
            file_type: file_type.to_string(),
            attributes,
            meta,
        }
    }

    pub fn directory(&self) -> String {
        parent_dir_of(&self.path)
    }
}

// ============================================================================
// Category metadata
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultibeamFormat {
    KongsbergAll,
    KongsbergKmall,
}

impl MultibeamFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KongsbergAll => "kongsberg_all",
            Self::KongsbergKmall => "kongsberg_kmall",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultibeamMeta {
    pub format: MultibeamFormat,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub primary_serial: u32,
    /// Starboard head serial for dual head systems, 0 otherwise
    pub secondary_serial: u32,
    /// Sonar model, e.g. "em2040"
    pub model: String,
}

/// SBET time range in GPS weekly seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavigationMeta {
    pub weekly_seconds_start: f64,
    pub weekly_seconds_end: f64,
}

/// SMRMSG time range in GPS weekly seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavErrorMeta {
    pub weekly_seconds_start: f64,
    pub weekly_seconds_end: f64,
}

/// Fields pulled from the fixed-format block of a navigation export log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavLogMeta {
    pub mission_date: NaiveDate,
    pub datum: Option<String>,
    pub ellipsoid: Option<String>,
    /// Input to the export process (file name only)
    pub input_sbet_file: Option<String>,
    /// Output of the export process (file name only)
    pub exported_sbet_file: String,
    pub sample_rate_hertz: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvpMeta {
    /// (depth, sound speed) layers for each cast
    pub profiles: Vec<Vec<(f64, f64)>>,
    pub cast_times: Vec<DateTime<Utc>>,
    /// "YYYY-DDD" per cast
    pub julian_days: Vec<String>,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    pub number_of_layers: Vec<usize>,
}

impl SvpMeta {
    pub fn number_of_profiles(&self) -> usize {
        self.profiles.len()
    }

    /// Cast times as UTC epoch seconds
    pub fn cast_epochs(&self) -> Vec<i64> {
        self.cast_times.iter().map(|t| t.timestamp()).collect()
    }
}

// ============================================================================
// Path helpers
// ============================================================================

/// Make a path absolute and fold `.`/`..` components without touching the
/// file system (network shares and not-yet-existing outputs must still work).
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// String key for a normalized path
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Parent directory of a path key
pub fn parent_dir_of(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}
