//! datastory-agents: the agent pipeline behind a Datastory run.
//!
//! A query plus a dataset sample flows through four stage agents arranged as a
//! dependency graph: research and exploratory profiling run concurrently,
//! analysis waits for both, and the story waits for the analysis. Each merged
//! result is streamed as soon as it lands.
//!
//! - [`graph`]: the stage graph and its builder.
//! - [`state`]: set-once result slots and the run history.
//! - [`scheduler`]: dependency-driven concurrent execution.
//! - [`stream`]: event stream with a guaranteed terminal sentinel.
//! - [`mailbox`]: a named-channel worker pool for ad hoc agent work.

pub mod agents;
pub mod error;
pub mod graph;
pub mod mailbox;
pub mod outputs;
pub mod profile;
pub mod scheduler;
pub mod state;
pub mod stream;

pub use agents::{AnalystAgent, EdaAgent, ResearchAgent, StageAgent, StoryAgent};
pub use error::{GraphError, MailboxError, OrchestrationError};
pub use graph::{Stage, StageGraph};
pub use mailbox::{MailboxRuntime, WorkItem, WorkResult, Worker};
pub use outputs::{AnalysisResult, EdaProfile, ResearchFindings, StageOutput, StoryOutcome, StoryResult};
pub use scheduler::{CompletedRun, RunReport, Scheduler};
pub use state::{PipelineState, StageEvent, StageFailure, StageUpdate};
pub use stream::{run_pipeline, run_pipeline_until, StreamEvent, DONE_EVENT};
