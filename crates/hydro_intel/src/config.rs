//! Configuration for the intelligence engine

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How far the engine goes on its own once new files show up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoProcessingMode {
    /// Convert, import, process and grid.
    #[default]
    Normal,
    /// Only build conversion actions; processing and gridding are suppressed.
    ConvertOnly,
    /// Like `Normal`, but processing runs only on the newly converted lines.
    Concatenate,
}

impl AutoProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ConvertOnly => "convert_only",
            Self::Concatenate => "concatenate",
        }
    }
}

/// Main configuration for the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Interval between readability checks of buffered monitor paths
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Whether new directory monitors descend into subdirectories
    #[serde(default = "default_true")]
    pub recursive_monitoring: bool,

    /// Minimum similarity ratio for file name matching (0.0 - 1.0)
    #[serde(default = "default_name_match_cutoff")]
    pub name_match_cutoff: f64,

    /// Allowed start/end difference when matching error files to SBETs by time
    #[serde(default = "default_time_match_tolerance")]
    pub time_match_tolerance_secs: f64,

    #[serde(default)]
    pub auto_processing_mode: AutoProcessingMode,

    /// Honor waterline edits made directly in converted data
    #[serde(default = "default_true")]
    pub keep_waterline_changes: bool,

    /// Horizontal coordinate system passed to processing
    #[serde(default = "default_coord_system")]
    pub coord_system: String,

    /// Vertical reference passed to processing
    #[serde(default = "default_vert_ref")]
    pub vert_ref: String,

    /// Passed through to conversion work items
    #[serde(default = "default_true")]
    pub parallel_write: bool,
}

fn default_monitor_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_name_match_cutoff() -> f64 {
    0.6
}

fn default_time_match_tolerance() -> f64 {
    2.0
}

fn default_coord_system() -> String {
    "NAD83".to_string()
}

fn default_vert_ref() -> String {
    "waterline".to_string()
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            recursive_monitoring: true,
            name_match_cutoff: default_name_match_cutoff(),
            time_match_tolerance_secs: default_time_match_tolerance(),
            auto_processing_mode: AutoProcessingMode::default(),
            keep_waterline_changes: true,
            coord_system: default_coord_system(),
            vert_ref: default_vert_ref(),
            parallel_write: true,
        }
    }
}

impl IntelConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: IntelConfig =
            toml::from_str(&content).map_err(|e| crate::IntelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::IntelError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.name_match_cutoff) {
            return Err(crate::IntelError::Config(format!(
                "name_match_cutoff must be between 0 and 1, got {}",
                self.name_match_cutoff
            )));
        }
        if self.time_match_tolerance_secs < 0.0 {
            return Err(crate::IntelError::Config(format!(
                "time_match_tolerance_secs must not be negative, got {}",
                self.time_match_tolerance_secs
            )));
        }
        if self.monitor_interval_ms == 0 {
            return Err(crate::IntelError::Config(
                "monitor_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}
