//! File classification
//!
//! Decides which category a path belongs to and pulls the lightweight
//! metadata the matching heuristics need, without loading the whole file.
//!
//! Dispatch is by lower-cased extension. Navigation and nav-error files share
//! extensions (`.out`, `.sbet` and `.smrmsg` get mixed up in the field), so
//! those are told apart by sniffing the record layout instead.

pub mod exportlog;
pub mod multibeam;
pub mod sbet;
pub mod svp;

use crate::error::{IntelError, Result};
use crate::types::{
    FileAttributes, FileCategory, MultibeamMeta, NavErrorMeta, NavLogMeta,
    NavigationMeta, SvpMeta, TrackedFile,
};
use chrono::{DateTime, Utc};
use std::path::{Component, Path};
use tracing::debug;

pub const MULTIBEAM_EXTENSIONS: &[&str] = &["all", "kmall"];
pub const NAVIGATION_EXTENSIONS: &[&str] = &["out", "sbet", "smrmsg"];
pub const EXPORT_LOG_EXTENSIONS: &[&str] = &["txt", "log"];
pub const SVP_EXTENSIONS: &[&str] = &["svp"];

/// Name prefixes of files the engine writes itself
const EXCLUDED_PREFIXES: &[&str] = &["logfile_", "kluster_"];
/// Project level configuration files
const EXCLUDED_NAMES: &[&str] = &["hydro_project.json", "vessel_file.kfc"];
/// Derived-product directories whose contents are never survey input
const EXCLUDED_DIR_NAMES: &[&str] = &["logs"];
const EXCLUDED_DIR_SUFFIX: &str = ".zarr";

/// Result of classifying one path
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Multibeam(TrackedFile<MultibeamMeta>),
    Navigation(TrackedFile<NavigationMeta>),
    NavError(TrackedFile<NavErrorMeta>),
    NavLog(TrackedFile<NavLogMeta>),
    Svp(TrackedFile<SvpMeta>),
    /// Not a supported survey file; the reason is for logging only
    Unknown(String),
}

impl Classified {
    pub fn category(&self) -> Option<FileCategory> {
        match self {
            Self::Multibeam(_) => Some(FileCategory::Multibeam),
            Self::Navigation(_) => Some(FileCategory::Navigation),
            Self::NavError(_) => Some(FileCategory::NavError),
            Self::NavLog(_) => Some(FileCategory::NavLog),
            Self::Svp(_) => Some(FileCategory::Svp),
            Self::Unknown(_) => None,
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Whether the extension is one the classifier knows how to inspect
pub fn has_supported_extension(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| {
        MULTIBEAM_EXTENSIONS.contains(&ext.as_str())
            || NAVIGATION_EXTENSIONS.contains(&ext.as_str())
            || EXPORT_LOG_EXTENSIONS.contains(&ext.as_str())
            || SVP_EXTENSIONS.contains(&ext.as_str())
    })
}

/// Whether the path is on the fixed exclusion list
pub fn is_excluded(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if EXCLUDED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
        || EXCLUDED_NAMES.contains(&name.as_str())
    {
        return true;
    }

    let Some(parent) = path.parent() else {
        return false;
    };
    parent.components().any(|component| match component {
        Component::Normal(dir) => {
            let dir = dir.to_string_lossy().to_ascii_lowercase();
            EXCLUDED_DIR_NAMES.contains(&dir.as_str()) || dir.ends_with(EXCLUDED_DIR_SUFFIX)
        }
        _ => false,
    })
}

/// Whether the monitor should bother buffering this path
pub fn is_candidate(path: &Path) -> bool {
    has_supported_extension(path) && !is_excluded(path)
}

/// File system attributes for a path
pub fn gather_attributes(path: &Path) -> Result<FileAttributes> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(IntelError::classification(
            path.display().to_string(),
            "not a regular file",
        ));
    }
    let mut attributes = FileAttributes::from_size(metadata.len());
    attributes.created = metadata.created().ok().map(DateTime::<Utc>::from);
    attributes.last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    Ok(attributes)
}

/// Classify a path and extract its metadata
///
/// Unsupported or excluded paths are `Ok(Classified::Unknown)`; a supported
/// file that cannot be read or parsed is an `IntelError::Classification`.
pub fn classify(path: &Path) -> Result<Classified> {
    if is_excluded(path) {
        return Ok(Classified::Unknown(format!(
            "{} is on the exclusion list",
            path.display()
        )));
    }
    let Some(ext) = extension_of(path) else {
        return Ok(Classified::Unknown(format!(
            "{} has no file extension",
            path.display()
        )));
    };
    if !has_supported_extension(path) {
        return Ok(Classified::Unknown(format!(
            "{} is not of a supported type",
            path.display()
        )));
    }

    let attributes = gather_attributes(path)?;
    let wrap = |e: IntelError| match e {
        IntelError::Io(io) => IntelError::classification(path.display().to_string(), io.to_string()),
        other => other,
    };

    let classified = match ext.as_str() {
        "all" | "kmall" => {
            let meta = if ext == "all" {
                multibeam::read_all(path)
            } else {
                multibeam::read_kmall(path)
            }
            .map_err(wrap)?;
            let file_type = meta.format.as_str();
            Classified::Multibeam(TrackedFile::new(path, file_type, attributes, meta))
        }
        "out" | "sbet" | "smrmsg" => {
            if sbet::looks_like_sbet(path) {
                let (start, end) =
                    sbet::read_time_range(path, sbet::SBET_RECORD_LEN).map_err(wrap)?;
                Classified::Navigation(TrackedFile::new(
                    path,
                    "pospac_sbet",
                    attributes,
                    NavigationMeta {
                        weekly_seconds_start: start,
                        weekly_seconds_end: end,
                    },
                ))
            } else if sbet::looks_like_error_file(path) {
                let (start, end) =
                    sbet::read_time_range(path, sbet::SMRMSG_RECORD_LEN).map_err(wrap)?;
                Classified::NavError(TrackedFile::new(
                    path,
                    "pospac_smrmsg",
                    attributes,
                    NavErrorMeta {
                        weekly_seconds_start: start,
                        weekly_seconds_end: end,
                    },
                ))
            } else {
                Classified::Unknown(format!(
                    "{} is neither an SBET nor an SMRMSG file",
                    path.display()
                ))
            }
        }
        "txt" | "log" => match exportlog::read_export_log(path).map_err(wrap)? {
            Some(meta) => Classified::NavLog(TrackedFile::new(
                path,
                "sbet_export_log",
                attributes,
                meta,
            )),
            None => Classified::Unknown(format!(
                "{} is not a navigation export log",
                path.display()
            )),
        },
        "svp" => {
            let meta = svp::read_caris_svp(path).map_err(wrap)?;
            Classified::Svp(TrackedFile::new(path, "caris_svp", attributes, meta))
        }
        _ => Classified::Unknown(format!("{} is not of a supported type", path.display())),
    };

    if let Some(category) = classified.category() {
        debug!(path = %path.display(), category = %category, "Classified file");
    }
    Ok(classified)
}
