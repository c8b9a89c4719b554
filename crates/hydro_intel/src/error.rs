//! Error types for the intelligence engine

use std::io;
use thiserror::Error;

/// Engine error type
///
/// There is no ambiguous-match variant: competing match candidates are always
/// resolved by majority vote with a first-seen tie-break.
#[derive(Error, Debug)]
pub enum IntelError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The file could not be read or its header did not parse.
    #[error("Unable to classify {path}: {message}")]
    Classification { path: String, message: String },

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    /// Same normalized path, or same file name and size, is already registered.
    #[error("Duplicate file: {0}")]
    DuplicateFile(String),

    /// Parallel registry maps went out of sync.
    #[error("Registry '{category}' is inconsistent: {message}")]
    RegistryConsistency { category: String, message: String },

    /// The work item of an action returned an error.
    #[error("Action '{description}' failed: {message}")]
    Execution { description: String, message: String },

    #[error("Another action is already executing")]
    ExecutionInProgress,

    #[error("No pending action to execute")]
    NoPendingAction,

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl IntelError {
    pub(crate) fn classification(path: impl Into<String>, message: impl Into<String>) -> Self {
        IntelError::Classification {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IntelError>;
