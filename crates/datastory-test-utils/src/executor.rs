//! Code executor stub.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use datastory_common::DatasetSample;
use datastory_sandbox::{CodeExecutor, ExecutionOutcome, FailureKind, RenderedFigure, SandboxError};

#[derive(Debug, Clone)]
enum Script {
    Outcome(ExecutionOutcome),
    Timeout,
}

/// Returns the same outcome for every call and records the code it was given.
#[derive(Debug)]
pub struct StubExecutor {
    script: Script,
    calls: Mutex<Vec<String>>,
}

impl StubExecutor {
    fn with(script: Script) -> Self {
        Self { script, calls: Mutex::new(Vec::new()) }
    }

    pub fn succeeding(results: serde_json::Value) -> Self {
        Self::with(Script::Outcome(ExecutionOutcome::Success { results, figures: Vec::new() }))
    }

    /// Success that also left one rendered figure per label.
    pub fn succeeding_with_figures(results: serde_json::Value, labels: &[&str]) -> Self {
        let figures = labels
            .iter()
            .map(|label| RenderedFigure {
                label: label.to_string(),
                png: vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
            })
            .collect();
        Self::with(Script::Outcome(ExecutionOutcome::Success { results, figures }))
    }

    pub fn failing(kind: FailureKind, message: &str) -> Self {
        Self::with(Script::Outcome(ExecutionOutcome::Failed { kind, message: message.to_string() }))
    }

    /// Every call fails as if the interpreter ran past its wall-clock limit.
    pub fn timing_out() -> Self {
        Self::with(Script::Timeout)
    }

    pub fn executed_code(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeExecutor for StubExecutor {
    async fn execute(&self, code: &str, _sample: &DatasetSample) -> Result<ExecutionOutcome, SandboxError> {
        self.calls.lock().unwrap().push(code.to_string());
        match &self.script {
            Script::Outcome(outcome) => Ok(outcome.clone()),
            Script::Timeout => Err(SandboxError::Timeout(Duration::from_secs(60))),
        }
    }
}
