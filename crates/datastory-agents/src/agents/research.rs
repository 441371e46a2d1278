use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datastory_llm::{LlmBackend, LlmError, LlmRequest, Message, ResponseFormat};
use tracing::{error, info, warn};

use super::StageAgent;
use crate::graph::Stage;
use crate::outputs::{ResearchFindings, StageOutput};
use crate::state::{PipelineState, StageFailure, StageUpdate};

const SYSTEM_PROMPT: &str =
    "You are a research assistant supporting a data analysis. Give thorough background research and cite your sources.";

pub const RESEARCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Background research on the query, via one schema-constrained completion call.
pub struct ResearchAgent {
    llm: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl ResearchAgent {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm, timeout: RESEARCH_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn prompt(state: &PipelineState) -> String {
        let dataset = state.dataset();
        format!(
            "Do background research for context that complements the analysis of the question \"{query}\" \
             on the dataset '{filename}' with columns {columns:?}.\n\
             Answer with a JSON object containing:\n\
             - summary: a comprehensive summary of the findings\n\
             - sources: a list of sources or citations\n\
             - relevance: why the findings matter for the question",
            query = state.query(),
            filename = dataset.filename,
            columns = dataset.columns,
        )
    }
}

/// Structured findings, or the raw text as the summary when it does not fit the schema.
pub fn parse_findings(content: &str) -> ResearchFindings {
    match serde_json::from_str::<ResearchFindings>(content.trim()) {
        Ok(findings) => findings,
        Err(e) => {
            warn!(error = %e, "Research response did not match schema, keeping raw text");
            ResearchFindings::from_text(content)
        }
    }
}

#[async_trait]
impl StageAgent for ResearchAgent {
    async fn process(&self, state: Arc<PipelineState>) -> StageUpdate {
        let request = LlmRequest::new(vec![Message::system(SYSTEM_PROMPT), Message::user(Self::prompt(&state))])
            .with_response_format(ResponseFormat::for_type::<ResearchFindings>());

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .unwrap_or(Err(LlmError::Timeout(self.timeout)))
            .map_err(|e| {
                error!(error = %e, "Research completion failed");
                StageFailure::new(Stage::Research, e)
            })?;

        let findings = parse_findings(&response.content);
        info!(sources = findings.sources.len(), "Research complete");
        Ok(StageOutput::Research(findings))
    }
}
