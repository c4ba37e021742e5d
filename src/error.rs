// src/error.rs

use crate::config::OptionKind;
use crate::package::state::{StateStatus, Transition};
use std::fmt;
use thiserror::Error;

/// Collaborator step that produced a delegated failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Check,
    Unpack,
    Configure,
    Remove,
    Upgrade,
    Download,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Prepare => "prepare",
            Step::Check => "pre-install check",
            Step::Unpack => "unpack",
            Step::Configure => "configure",
            Step::Remove => "remove",
            Step::Upgrade => "upgrade",
            Step::Download => "download",
        };
        f.write_str(s)
    }
}

/// Core error types for Sprig
#[derive(Error, Debug)]
pub enum Error {
    /// Status database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Status database initialization error
    #[error("Failed to initialize status database: {0}")]
    InitError(String),

    /// Status database not found
    #[error("Status database not found at path: {0}")]
    DatabaseNotFound(String),

    /// No package (or destination, or source) with that name
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// Package is known but not installed
    #[error("Package {0} is not installed")]
    NotInstalled(String),

    /// Invariant or dependency conflicts
    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Option '{name}' expects a {expected} value")]
    OptionType { name: String, expected: OptionKind },

    #[error("Cannot apply {transition} to {package} in state {from}")]
    InvalidTransition {
        package: String,
        from: StateStatus,
        transition: Transition,
    },

    /// A delegated collaborator returned a nonzero status
    #[error("{step} failed for {package} (status {code})")]
    StepFailed {
        step: Step,
        package: String,
        code: i32,
    },

    #[error("{failed} of {total} package upgrades failed")]
    UpgradeFailed { failed: usize, total: usize },

    /// The lists directory cannot be used; fatal to a whole list update
    #[error("Lists directory {0} is unusable: {1}")]
    ListsDirError(String, String),
}

impl Error {
    /// Numeric status for callers that only look at return codes
    pub fn code(&self) -> i32 {
        match self {
            Error::StepFailed { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Result type alias using Sprig's Error type
pub type Result<T> = std::result::Result<T, Error>;
