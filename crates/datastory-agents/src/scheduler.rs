//! Stage graph executor.
//!
//! Eligible stages are spawned onto a [`JoinSet`] with an immutable snapshot of
//! the state; results are merged back one at a time, in completion order, by
//! the single task driving [`Scheduler::run`]. Each merge is forwarded to the
//! event channel before the next one is taken.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use datastory_llm::LlmBackend;
use datastory_sandbox::{CodeExecutor, FigureStore};
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::agents::{AnalystAgent, EdaAgent, ResearchAgent, StageAgent, StoryAgent};
use crate::error::{GraphError, OrchestrationError};
use crate::graph::{Stage, StageGraph};
use crate::state::{PipelineState, StageEvent, StageFailure, StageUpdate};

/// What happened to each stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Stages that produced an output or an error marker, in completion order.
    pub ran: Vec<Stage>,
    /// Subset of `ran` that ended with an error marker.
    pub failed: Vec<Stage>,
    /// Stages never started because of an upstream error marker.
    pub skipped: Vec<Stage>,
    /// The event receiver went away before the run finished.
    pub disconnected: bool,
}

#[derive(Debug)]
pub struct CompletedRun {
    pub state: PipelineState,
    pub report: RunReport,
}

pub struct Scheduler {
    graph: StageGraph,
    agents: HashMap<Stage, Arc<dyn StageAgent>>,
}

impl Scheduler {
    /// Every stage of `graph` needs exactly one agent.
    pub fn new(graph: StageGraph, agents: Vec<(Stage, Arc<dyn StageAgent>)>) -> Result<Self, GraphError> {
        let mut registered: HashMap<Stage, Arc<dyn StageAgent>> = HashMap::new();
        for (stage, agent) in agents {
            if registered.insert(stage, agent).is_some() {
                return Err(GraphError::DuplicateNode(stage));
            }
        }
        if let Some(missing) = graph.stages().find(|s| !registered.contains_key(s)) {
            return Err(GraphError::MissingAgent(missing));
        }
        Ok(Self { graph, agents: registered })
    }

    /// The standard research/eda → analysis → story pipeline.
    pub fn standard(llm: Arc<dyn LlmBackend>, executor: Arc<dyn CodeExecutor>, figures: FigureStore) -> Self {
        let agents: HashMap<Stage, Arc<dyn StageAgent>> = HashMap::from([
            (Stage::Research, Arc::new(ResearchAgent::new(llm.clone())) as Arc<dyn StageAgent>),
            (Stage::Eda, Arc::new(EdaAgent::new()) as Arc<dyn StageAgent>),
            (Stage::Analysis, Arc::new(AnalystAgent::new(llm.clone(), executor, figures)) as Arc<dyn StageAgent>),
            (Stage::Story, Arc::new(StoryAgent::new(llm)) as Arc<dyn StageAgent>),
        ]);
        Self { graph: StageGraph::standard(), agents }
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Drive one run to completion, sending each merged update to `events`.
    ///
    /// If `events` is closed, no further stage is started, stages already in
    /// flight are detached and left to finish, and the run returns with
    /// `disconnected` set.
    #[instrument(skip_all, fields(run_id = %state.run_id()))]
    pub async fn run(
        &self,
        mut state: PipelineState,
        events: mpsc::Sender<StageEvent>,
    ) -> Result<CompletedRun, OrchestrationError> {
        let started = Instant::now();
        let mut pending: Vec<Stage> = self.graph.stages().collect();
        let mut tasks: JoinSet<(Stage, StageUpdate)> = JoinSet::new();
        let mut report = RunReport::default();

        info!(query = %state.query(), dataset = %state.dataset().filename, stages = pending.len(), "Pipeline run started");

        loop {
            // Nothing new starts once an error marker is set.
            if state.error().is_none() {
                let (ready, waiting): (Vec<Stage>, Vec<Stage>) = pending
                    .into_iter()
                    .partition(|s| self.graph.dependencies(*s).iter().all(|d| state.is_populated(*d)));
                pending = waiting;

                for stage in ready {
                    let Some(agent) = self.agents.get(&stage).cloned() else {
                        continue;
                    };
                    debug!(stage = %stage, "Dispatching stage");
                    tasks.spawn(run_stage(stage, agent, Arc::new(state.clone())));
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (stage, update) = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Stage task was cancelled");
                    continue;
                }
            };

            if let Err(failure) = &update {
                warn!(stage = %stage, error = %failure.message, "Stage failed");
                report.failed.push(stage);
            }
            report.ran.push(stage);

            let event = state.apply(stage, update)?;
            if events.send(event).await.is_err() {
                warn!(in_flight = tasks.len(), "Event receiver closed, detaching in-flight stages");
                tasks.detach_all();
                report.skipped = pending;
                report.disconnected = true;
                return Ok(CompletedRun { state, report });
            }
        }

        let (skipped, unreachable) = self.classify_leftovers(&state, pending);
        report.skipped = skipped;
        if !unreachable.is_empty() {
            error!(stages = ?unreachable, "Pipeline stalled with unreachable stages");
            return Err(OrchestrationError::Unreachable(unreachable));
        }

        info!(
            ran = report.ran.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run finished"
        );
        Ok(CompletedRun { state, report })
    }

    /// Split stages that never started into skipped (blocked by an error marker,
    /// directly or transitively) and unreachable (an orchestration defect).
    fn classify_leftovers(&self, state: &PipelineState, mut leftover: Vec<Stage>) -> (Vec<Stage>, Vec<Stage>) {
        let mut blocked: Vec<Stage> = self.graph.stages().filter(|s| state.is_failed(*s)).collect();
        let mut skipped = Vec::new();

        loop {
            let (now_blocked, rest): (Vec<Stage>, Vec<Stage>) = leftover
                .into_iter()
                .partition(|s| self.graph.dependencies(*s).iter().any(|d| blocked.contains(d)));
            leftover = rest;
            if now_blocked.is_empty() {
                break;
            }
            blocked.extend(&now_blocked);
            skipped.extend(now_blocked);
        }

        // Everything else was halted by the error marker, unless there is none.
        if state.error().is_some() {
            skipped.append(&mut leftover);
        }
        (skipped, leftover)
    }
}

async fn run_stage(stage: Stage, agent: Arc<dyn StageAgent>, snapshot: Arc<PipelineState>) -> (Stage, StageUpdate) {
    let started = Instant::now();
    let update = match AssertUnwindSafe(agent.process(snapshot)).catch_unwind().await {
        Ok(update) => update,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(stage = %stage, %reason, "Stage agent panicked");
            Err(StageFailure::new(stage, format!("agent panicked: {reason}")))
        }
    };
    debug!(
        stage = %stage,
        ok = update.is_ok(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Stage finished"
    );
    (stage, update)
}
