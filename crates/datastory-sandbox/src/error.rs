use std::time::Duration;

use thiserror::Error;

/// Faults of the sandbox itself. Faults of the generated code are not errors;
/// they come back as [`crate::ExecutionOutcome::Failed`].
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not start interpreter '{interpreter}': {reason}")]
    Spawn { interpreter: String, reason: String },

    #[error("Code execution exceeded {0:?}")]
    Timeout(Duration),

    #[error("Sandbox environment unusable: {0}")]
    Environment(String),

    #[error("Harness protocol error: {0}")]
    Protocol(String),

    #[error("Invalid figure: {0}")]
    Figure(String),

    #[error(transparent)]
    Dataset(#[from] datastory_common::DatastoryError),
}
