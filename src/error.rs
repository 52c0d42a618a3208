//! Error types for dc-import
//!
//! This module defines the error hierarchy for the import pipeline:
//! - Bridge errors (opening a container, finalizing a node)
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Failures that belong to a single unit of work (one container, one node)
//! never abort a batch. They are carried as outcome values and surfaced to
//! the host as events.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for dc-import
#[derive(Error, Debug)]
pub enum ImportError {
    /// Bridge-related errors
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors (tree snapshots)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors reported by an [`ImportBridge`](crate::bridge::ImportBridge)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The container could not be opened or listed
    #[error("Cannot open container '{source_id}': {reason}")]
    ContainerUnreadable { source_id: String, reason: String },

    /// Finalizing a node's geometry failed
    #[error("Failed to finalize '{name}': {reason}")]
    FinalizeFailed { name: String, reason: String },

    /// Anything else the bridge wants to report
    #[error("{0}")]
    Other(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// No containers given
    #[error("No containers to import")]
    NoSources,

    /// Duplicate container directory on the command line
    #[error("Container '{path}' given more than once")]
    DuplicateSource { path: PathBuf },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker thread errors
#[derive(Error, Debug, Clone)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Workers exited without reporting completion
    #[error("{missing} of {total} workers exited without reporting completion")]
    MissingCompletion { missing: usize, total: usize },
}

/// Result type alias for ImportError
pub type Result<T> = std::result::Result<T, ImportError>;

/// Result type alias for BridgeError
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Outcome of wrapping a single sub-unit
#[derive(Debug)]
pub enum WrapOutcome<R> {
    /// The sub-unit produced a record
    Wrapped(R),

    /// The sub-unit holds nothing renderable
    Skipped,
}

impl<R> WrapOutcome<R> {
    pub(crate) fn from_option(record: Option<R>) -> Self {
        record.map_or(WrapOutcome::Skipped, WrapOutcome::Wrapped)
    }
}

/// Outcome of finalizing a single node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New geometry was swapped into the node
    Applied,

    /// The node is being finalized by another caller; nothing was done
    Busy,

    /// The node has no staged geometry to finalize
    Empty,

    /// Finalize failed; the node keeps its previous geometry
    Failed(BridgeError),
}

impl ApplyOutcome {
    /// Returns true if new geometry was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Extract a printable message from a thread panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
