use std::io;
use std::path::PathBuf;

use node_core::SessionId;
use thiserror::Error;

use crate::process::ProcessError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{step} failed: {reason}")]
    SequenceAborted { step: String, reason: String },

    /// Not a failure: the client asked for the run to stop.
    #[error("Run cancelled")]
    Cancelled,

    #[error("Session already active: {0}")]
    SessionExists(SessionId),

    #[error("Session {0} already owns a running process")]
    SessionBusy(SessionId),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

impl OrchestratorError {
    /// Create a sequence aborted error for a failed step.
    pub fn aborted(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SequenceAborted {
            step: step.into(),
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Failures of the dedication procedure.
///
/// Every variant maps to a stable [`reason`](DedicationError::reason) tag
/// that clients switch on.
#[derive(Debug, Error)]
pub enum DedicationError {
    #[error("Invalid dedication request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported operating system")]
    UnsupportedPlatform,

    #[error("Failed to inspect {path}: {source}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to allocate space: {0}")]
    Allocation(#[source] io::Error),

    #[error("Failed to create symlink directory: {0}")]
    Directory(#[source] io::Error),

    #[error("Target file inaccessible: {0}")]
    TargetInaccessible(#[source] io::Error),

    #[error("Failed to remove existing symlink: {0}")]
    LinkRemoval(#[source] io::Error),

    #[error("Permission denied while creating symlink")]
    LinkPermissionDenied,

    #[error("Operation not permitted while creating symlink")]
    LinkNotPermitted,

    #[error("Failed to create symlink: {0}")]
    LinkCreation(#[source] io::Error),

    /// The compensating action failed too; the host needs manual attention.
    #[error("{original}; failed to revert file size: {rollback}")]
    RollbackFailed {
        original: Box<DedicationError>,
        rollback: io::Error,
    },
}

impl DedicationError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid-request",
            Self::UnsupportedPlatform => "unsupported-platform",
            Self::Inspect { .. } => "inspect-failed",
            Self::Allocation(_) => "allocation-failed",
            Self::Directory(_) => "directory-failed",
            Self::TargetInaccessible(_) => "target-inaccessible",
            Self::LinkRemoval(_) => "link-removal-failed",
            Self::LinkPermissionDenied => "link-permission-denied",
            Self::LinkNotPermitted => "link-not-permitted",
            Self::LinkCreation(_) => "link-creation-failed",
            Self::RollbackFailed { .. } => "rollback-failed",
        }
    }

    /// Classify a symlink creation failure.
    pub fn from_link_creation(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) if code == libc::EACCES => Self::LinkPermissionDenied,
            Some(code) if code == libc::EPERM => Self::LinkNotPermitted,
            _ => Self::LinkCreation(err),
        }
    }

    /// Whether the forward progress was undone before returning.
    pub fn is_rolled_back(&self) -> bool {
        !matches!(self, Self::RollbackFailed { .. })
    }
}

/// Failures of the network throughput measurement.
#[derive(Debug, Error)]
pub enum NetworkTestError {
    #[error("Speed test failed: {0}")]
    Process(#[from] ProcessError),

    /// The tool reported a problem on stderr even though it exited cleanly.
    #[error("Speed test reported an error: {0}")]
    Reported(String),

    #[error("Speed test produced unreadable output: {0}")]
    InvalidOutput(#[source] serde_json::Error),
}

/// Failures of the node keypair store.
#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("Keypair file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Keypair file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Keypair file {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
}
