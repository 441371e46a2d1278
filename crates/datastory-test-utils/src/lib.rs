//! Shared testing utilities for the Datastory workspace.
//!
//! - [`ScriptedBackend`]: an LLM backend answering from rules, with optional delays.
//! - [`StubExecutor`]: a code executor returning a fixed outcome.
//! - [`fixtures`]: deterministic datasets.

pub mod executor;
pub mod fixtures;
pub mod llm;

pub use executor::StubExecutor;
pub use llm::{Reply, ScriptedBackend};
