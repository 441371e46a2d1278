//! Rule-driven mock LLM backend.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use datastory_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse};

/// What a matching rule answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Json(serde_json::Value),
    ApiError { status: u16, message: String },
    Timeout,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    delay: Duration,
    reply: Reply,
}

/// Answers each request with the first rule whose needle occurs in any message.
/// Unmatched requests fail with a 404 API error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    rules: Vec<Rule>,
    calls: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, reply: Reply) -> Self {
        self.on_delayed(needle, Duration::ZERO, reply)
    }

    pub fn on_delayed(mut self, needle: &str, delay: Duration, reply: Reply) -> Self {
        self.rules.push(Rule { needle: needle.to_string(), delay, reply });
        self
    }

    /// Requests received so far, in arrival order.
    pub fn calls(&self) -> Vec<LlmRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|r| r.messages.iter().any(|m| m.content.contains(needle)))
            .count()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        self.calls.lock().unwrap().push(req.clone());

        let rule = self
            .rules
            .iter()
            .find(|rule| req.messages.iter().any(|m| m.content.contains(&rule.needle)))
            .cloned();
        let Some(rule) = rule else {
            return Err(LlmError::ApiError { status: 404, message: "no scripted reply".to_string() });
        };

        if !rule.delay.is_zero() {
            tokio::time::sleep(rule.delay).await;
        }

        let content = match rule.reply {
            Reply::Text(text) => text,
            Reply::Json(value) => value.to_string(),
            Reply::ApiError { status, message } => return Err(LlmError::ApiError { status, message }),
            Reply::Timeout => return Err(LlmError::Timeout(Duration::from_secs(60))),
        };
        Ok(LlmResponse {
            content,
            model: "scripted".to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}
