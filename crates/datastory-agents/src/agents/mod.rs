//! Stage agents.
//!
//! Each agent reads an immutable snapshot of the pipeline state and returns
//! either its stage output or an error marker. Agents never escalate: every
//! internal fault becomes a [`StageFailure`].
//!
//! [`StageFailure`]: crate::state::StageFailure

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::{PipelineState, StageUpdate};

pub mod analyst;
pub mod eda;
pub mod research;
pub mod story;

pub use analyst::AnalystAgent;
pub use eda::EdaAgent;
pub use research::ResearchAgent;
pub use story::StoryAgent;

#[async_trait]
pub trait StageAgent: Send + Sync {
    async fn process(&self, state: Arc<PipelineState>) -> StageUpdate;
}
