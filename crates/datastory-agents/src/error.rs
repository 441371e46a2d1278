//! Orchestration error types.

use thiserror::Error;

use crate::graph::Stage;

/// Problems with the shape of a stage graph, caught when it is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Stage '{0}' declared twice")]
    DuplicateNode(Stage),

    #[error("Stage '{stage}' depends on undeclared stage '{dependency}'")]
    UnknownDependency { stage: Stage, dependency: Stage },

    #[error("No agent registered for stage '{0}'")]
    MissingAgent(Stage),
}

/// Pipeline-level faults surfaced during a run.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Result slot for '{0}' is already set")]
    SlotAlreadySet(Stage),

    #[error("Pipeline stalled: {} can never become eligible", fmt_stages(.0))]
    Unreachable(Vec<Stage>),
}

fn fmt_stages(stages: &[Stage]) -> String {
    stages.iter().map(Stage::as_str).collect::<Vec<_>>().join(", ")
}

/// Mailbox runtime errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("Agent '{0}' needs at least one worker")]
    NoWorkers(String),

    #[error("Mailbox for '{0}' is closed")]
    Closed(String),
}
