//! Per-run pipeline state: set-once result slots plus an append-only history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use datastory_common::DatasetDescriptor;
use serde::{Deserialize, Serialize};

use crate::error::OrchestrationError;
use crate::graph::Stage;
use crate::outputs::{AnalysisResult, EdaProfile, ResearchFindings, StageOutput, StoryOutcome};

/// One completed stage, as recorded in history and pushed to the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Error marker produced by a stage instead of an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub message: String,
}

impl StageFailure {
    /// `"<Stage> failed: <reason>"`.
    pub fn new(stage: Stage, reason: impl std::fmt::Display) -> Self {
        Self { message: format!("{} failed: {reason}", stage.label()) }
    }

    /// A failure whose message is used verbatim.
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// What a stage agent hands back to the scheduler.
pub type StageUpdate = Result<StageOutput, StageFailure>;

#[derive(Debug, Clone)]
pub struct PipelineState {
    run_id: String,
    query: String,
    dataset: DatasetDescriptor,
    slots: BTreeMap<Stage, StageUpdate>,
    error: Option<String>,
    history: Vec<StageEvent>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>, dataset: DatasetDescriptor) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().simple().to_string(),
            query: query.into(),
            dataset,
            slots: BTreeMap::new(),
            error: None,
            history: Vec::new(),
        }
    }

    /// Short id used to tag artifacts of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn dataset(&self) -> &DatasetDescriptor {
        &self.dataset
    }

    pub fn slot(&self, stage: Stage) -> Option<&StageUpdate> {
        self.slots.get(&stage)
    }

    /// Whether the stage finished with an output (not an error marker).
    pub fn is_populated(&self, stage: Stage) -> bool {
        matches!(self.slots.get(&stage), Some(Ok(_)))
    }

    pub fn is_failed(&self, stage: Stage) -> bool {
        matches!(self.slots.get(&stage), Some(Err(_)))
    }

    /// First error marker set during the run.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn history(&self) -> &[StageEvent] {
        &self.history
    }

    /// Fill a slot and record the matching history entry in one step.
    pub fn apply(&mut self, stage: Stage, update: StageUpdate) -> Result<StageEvent, OrchestrationError> {
        if self.slots.contains_key(&stage) {
            return Err(OrchestrationError::SlotAlreadySet(stage));
        }

        let payload = match &update {
            Ok(output) => output.to_payload(),
            Err(failure) => serde_json::json!({ "error": failure.message }),
        };
        if let Err(failure) = &update {
            self.error.get_or_insert_with(|| failure.message.clone());
        }

        let event = StageEvent { stage, timestamp: Utc::now(), payload };
        self.slots.insert(stage, update);
        self.history.push(event.clone());
        Ok(event)
    }

    fn output(&self, stage: Stage) -> Option<&StageOutput> {
        match self.slots.get(&stage) {
            Some(Ok(output)) => Some(output),
            _ => None,
        }
    }

    pub fn research(&self) -> Option<&ResearchFindings> {
        match self.output(Stage::Research) {
            Some(StageOutput::Research(r)) => Some(r),
            _ => None,
        }
    }

    pub fn eda(&self) -> Option<&EdaProfile> {
        match self.output(Stage::Eda) {
            Some(StageOutput::Eda(p)) => Some(p),
            _ => None,
        }
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        match self.output(Stage::Analysis) {
            Some(StageOutput::Analysis(a)) => Some(a),
            _ => None,
        }
    }

    pub fn story(&self) -> Option<&StoryOutcome> {
        match self.output(Stage::Story) {
            Some(StageOutput::Story(s)) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastory_test_utils::fixtures::sales_descriptor;

    #[test]
    fn test_slot_is_set_once() {
        let mut state = PipelineState::new("q", sales_descriptor());
        state
            .apply(Stage::Research, Ok(StageOutput::Research(ResearchFindings::from_text("first"))))
            .unwrap();
        let second = state.apply(Stage::Research, Ok(StageOutput::Research(ResearchFindings::from_text("second"))));
        assert!(matches!(second, Err(OrchestrationError::SlotAlreadySet(Stage::Research))));
        assert_eq!(state.research().unwrap().summary, "first");
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_failure_sets_error_marker_and_history() {
        let mut state = PipelineState::new("q", sales_descriptor());
        let event = state
            .apply(Stage::Research, Err(StageFailure::new(Stage::Research, "HTTP 500")))
            .unwrap();
        assert_eq!(event.payload, serde_json::json!({"error": "Research failed: HTTP 500"}));
        assert_eq!(state.error(), Some("Research failed: HTTP 500"));
        assert!(state.is_failed(Stage::Research));
        assert!(!state.is_populated(Stage::Research));

        state.apply(Stage::Eda, Err(StageFailure::message("second"))).unwrap();
        assert_eq!(state.error(), Some("Research failed: HTTP 500"));
    }

    #[test]
    fn test_run_ids_differ() {
        let a = PipelineState::new("q", sales_descriptor());
        let b = PipelineState::new("q", sales_descriptor());
        assert_ne!(a.run_id(), b.run_id());
    }
}
