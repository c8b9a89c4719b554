//! Logging setup for applications that embed the survey intelligence engine.
//!
//! The engine itself only emits `tracing` events. Hosts (a GUI, a batch runner,
//! a monitoring daemon) call [`init_logging`] once at startup to get a size-rotated
//! log file under `$HYDRO_HOME/logs` plus console output on stderr.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "hydro_intel=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a host application.
pub struct LogConfig<'a> {
    /// Base name of the log file (`<app_name>.log`).
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of only warnings.
    pub verbose: bool,
    /// Suppress console output entirely (file logging only).
    pub quiet: bool,
}

/// Initialize tracing with a rotating log file in the default logs directory.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    init_logging_in(&log_dir, config)
}

/// Initialize tracing with the rotating log file placed in `log_dir`.
pub fn init_logging_in(log_dir: &Path, config: LogConfig<'_>) -> Result<()> {
    let log = RotatingLog::open(log_dir, config.app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = match (config.quiet, config.verbose) {
        (true, _) => EnvFilter::new("off"),
        (false, true) => file_filter.clone(),
        (false, false) => EnvFilter::new("warn"),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(log))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

/// Home directory for engine state: `$HYDRO_HOME`, else `~/.hydro_intel`.
pub fn hydro_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var("HYDRO_HOME") {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".hydro_intel"))
        .context("Could not determine home directory")
}

/// Logs directory: `<hydro_home>/logs`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(hydro_home()?.join("logs"))
}

/// Ensure the logs directory exists and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir()?;
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

// ============================================================================
// Rotating log file
// ============================================================================

struct OpenLog {
    file: File,
    size: u64,
}

/// Size-capped log file: `<name>.log` is live, `<name>.1.log` the newest
/// rotated file, up to `<name>.<max_files - 1>.log`.
///
/// `&RotatingLog` implements `Write`, so an `Arc<RotatingLog>` can be handed
/// straight to a `tracing_subscriber` fmt layer.
struct RotatingLog {
    dir: PathBuf,
    name: String,
    max_files: usize,
    max_size: u64,
    current: Mutex<Option<OpenLog>>,
}

impl RotatingLog {
    fn open(dir: &Path, name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let log = Self {
            dir: dir.to_path_buf(),
            name: file_stem_for(name),
            max_files: max_files.max(1),
            max_size,
            current: Mutex::new(None),
        };
        let mut opened = log.open_live()?;
        if opened.size > log.max_size {
            drop(opened);
            log.shift_files()?;
            opened = log.open_live()?;
        }
        *log.lock()? = Some(opened);
        Ok(log)
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, Option<OpenLog>>> {
        self.current
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))
    }

    fn live_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.name))
    }

    fn numbered_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}.log", self.name, index))
    }

    fn open_live(&self) -> io::Result<OpenLog> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.live_path())?;
        let size = file.metadata()?.len();
        Ok(OpenLog { file, size })
    }

    /// Move every file one slot older, dropping whatever falls off the end
    fn shift_files(&self) -> io::Result<()> {
        if self.max_files == 1 {
            File::create(self.live_path())?;
            return Ok(());
        }
        let last = self.numbered_path(self.max_files - 1);
        if last.exists() {
            fs::remove_file(&last)?;
        }
        for index in (1..self.max_files - 1).rev() {
            let from = self.numbered_path(index);
            if from.exists() {
                fs::rename(&from, self.numbered_path(index + 1))?;
            }
        }
        let live = self.live_path();
        if live.exists() {
            fs::rename(&live, self.numbered_path(1))?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn live_size(&self) -> u64 {
        self.lock()
            .ok()
            .and_then(|g| g.as_ref().map(|o| o.size))
            .unwrap_or(0)
    }
}

impl Write for &RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut current = self.lock()?;
        let full = current
            .as_ref()
            .is_some_and(|open| open.size > 0 && open.size + buf.len() as u64 > self.max_size);
        if full || current.is_none() {
            if let Some(mut open) = current.take() {
                let _ = open.file.flush();
            }
            if full {
                self.shift_files()?;
            }
            *current = Some(self.open_live()?);
        }
        let open = current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let written = open.file.write(buf)?;
        open.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock()?.as_mut() {
            Some(open) => open.file.flush(),
            None => Ok(()),
        }
    }
}

/// Application name reduced to characters safe in a file name
fn file_stem_for(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect();
    if stem.is_empty() {
        "hydro".to_string()
    } else {
        stem
    }
}
