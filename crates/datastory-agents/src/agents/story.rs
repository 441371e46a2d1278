use std::sync::Arc;

use async_trait::async_trait;
use datastory_llm::{LlmBackend, LlmRequest, Message, ResponseFormat};
use tracing::{error, info, warn};

use super::StageAgent;
use crate::graph::Stage;
use crate::outputs::{AnalysisResult, StageOutput, StoryOutcome, StoryResult};
use crate::state::{PipelineState, StageFailure, StageUpdate};

const SYSTEM_PROMPT: &str = "You are an expert data analyst writing insightful data stories for a reader \
     who relies on you for analysis. Focus on business value.";

pub const PARSE_FAILURE: &str = "Failed to parse story JSON";

/// Synthesizes research, profile and analysis into a structured narrative.
pub struct StoryAgent {
    llm: Arc<dyn LlmBackend>,
}

impl StoryAgent {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    fn prompt(state: &PipelineState) -> String {
        let research = state
            .research()
            .map(|r| r.summary.clone())
            .unwrap_or_else(|| "No research available".to_string());

        let (profile, correlations) = match state.eda() {
            Some(eda) => {
                let top: Vec<String> = eda
                    .top_correlations(3)
                    .iter()
                    .map(|c| format!("{} and {} ({:.2})", c.columns[0], c.columns[1], c.correlation))
                    .collect();
                let correlations = if top.is_empty() {
                    String::new()
                } else {
                    format!("Notable correlations: {}", top.join("; "))
                };
                (eda.summary.clone(), correlations)
            }
            None => ("No EDA summary available".to_string(), String::new()),
        };

        let analysis = match state.analysis() {
            Some(AnalysisResult::Success { insights, .. }) => insights.to_string(),
            Some(AnalysisResult::Failed { error, .. }) => format!("The analysis code failed: {error}"),
            None => "No analysis available".to_string(),
        };

        format!(
            "Create a data story that answers the question: \"{query}\"\n\n\
             Inputs:\n\n\
             1. Background research:\n{research}\n\n\
             2. Data profile:\n{profile}\n{correlations}\n\n\
             3. Data analysis:\n{analysis}\n\n\
             The story should open with a clear executive summary, present the key findings, \
             connect the research context to the data, stay easy to follow and suggest next steps.\n\
             Answer with a JSON object matching the requested schema exactly.",
            query = state.query(),
        )
    }
}

/// Parsed story, or a best-effort payload carrying the raw text.
pub fn parse_story(content: &str) -> StoryOutcome {
    match serde_json::from_str::<StoryResult>(content.trim()) {
        Ok(story) => StoryOutcome::Story(story),
        Err(e) => {
            warn!(error = %e, "Story response did not match schema");
            StoryOutcome::Unparsed { error: PARSE_FAILURE.to_string(), raw_content: content.to_string() }
        }
    }
}

#[async_trait]
impl StageAgent for StoryAgent {
    async fn process(&self, state: Arc<PipelineState>) -> StageUpdate {
        let request = LlmRequest::new(vec![Message::system(SYSTEM_PROMPT), Message::user(Self::prompt(&state))])
            .with_response_format(ResponseFormat::for_type::<StoryResult>());

        let response = self.llm.complete(request).await.map_err(|e| {
            error!(error = %e, "Story completion failed");
            StageFailure::new(Stage::Story, e)
        })?;

        let story = parse_story(&response.content);
        if let StoryOutcome::Story(s) = &story {
            info!(title = %s.title, sections = s.sections.len(), "Story ready");
        }
        Ok(StageOutput::Story(story))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastory_test_utils::fixtures::sales_descriptor;
    use datastory_test_utils::{Reply, ScriptedBackend};
    use serde_json::json;

    fn story_json() -> serde_json::Value {
        json!({
            "title": "What drove growth",
            "summary": "North led.",
            "sections": [{"heading": "Regions", "content": "North grew fastest."}],
            "insights": ["North +45/month"],
            "next_steps": ["Check pricing"]
        })
    }

    #[test]
    fn test_parse_valid_story() {
        assert!(matches!(parse_story(&story_json().to_string()), StoryOutcome::Story(ref s) if s.title == "What drove growth"));
    }

    #[test]
    fn test_malformed_story_keeps_raw_content() {
        match parse_story("Here is your story: growth!") {
            StoryOutcome::Unparsed { error, raw_content } => {
                assert_eq!(error, PARSE_FAILURE);
                assert_eq!(raw_content, "Here is your story: growth!");
            }
            other => panic!("expected unparsed story, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let outcome = parse_story(r#"{"title": "t", "summary": "s"}"#);
        assert!(matches!(outcome, StoryOutcome::Unparsed { .. }));
    }

    #[tokio::test]
    async fn test_prompt_without_upstream_outputs_uses_placeholders() {
        let llm = Arc::new(ScriptedBackend::new().on("data story", Reply::Json(story_json())));
        let state = Arc::new(PipelineState::new("what drove growth", sales_descriptor()));
        let out = StoryAgent::new(llm.clone()).process(state).await.unwrap();
        assert!(matches!(out, StageOutput::Story(StoryOutcome::Story(_))));

        let prompt = &llm.calls()[0].messages[1].content;
        assert!(prompt.contains("No research available"));
        assert!(prompt.contains("No analysis available"));
        assert!(llm.calls()[0].response_format.as_ref().unwrap().json_schema.schema["properties"]
            .get("next_steps")
            .is_some());
    }

    #[tokio::test]
    async fn test_call_failure_is_error_marker() {
        let llm = Arc::new(ScriptedBackend::new().on("data story", Reply::Timeout));
        let state = Arc::new(PipelineState::new("q", sales_descriptor()));
        let failure = StoryAgent::new(llm).process(state).await.unwrap_err();
        assert!(failure.message.starts_with("Story generation failed: "));
    }
}
