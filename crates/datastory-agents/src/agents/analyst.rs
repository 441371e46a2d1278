use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use datastory_llm::{LlmBackend, LlmRequest, Message};
use datastory_sandbox::figures::is_inline_figure;
use datastory_sandbox::{CodeExecutor, ExecutionOutcome, FailureKind, FigureStore, RenderedFigure};
use tracing::{debug, error, info, warn};

use super::StageAgent;
use crate::graph::Stage;
use crate::outputs::{AnalysisResult, StageOutput};
use crate::state::{PipelineState, StageFailure, StageUpdate};

const SYSTEM_PROMPT: &str = "You are an expert data analyst who understands the data and writes clean, \
     efficient Python code. Reply with code only, no explanations.";

const PROMPT_RULES: &str = "The code must:\n\
- analyse the pandas DataFrame named `df` with pandas and numpy (pd, np are available)\n\
- treat dates and times carefully\n\
- draw at least one chart with matplotlib (plt) or seaborn (sns)\n\
- encode the chart as a base64 PNG string\n\
- store its findings in a dictionary named `results`, with the chart under the key \"plot\"\n\
Escape literal braces inside f-strings by doubling them.\n\n\
Example:\n\
```python\n\
buffer = io.BytesIO()\n\
plt.figure(figsize=(10, 6))\n\
# ... plotting ...\n\
plt.savefig(buffer, format='png')\n\
buffer.seek(0)\n\
plot_data = base64.b64encode(buffer.getvalue()).decode('utf-8')\n\
results = {\"key_insight\": \"...\", \"metrics\": {\"metric\": 1.0}, \"plot\": plot_data}\n\
```";

/// Generates analysis code for the query, runs it in the sandbox and keeps its figures.
pub struct AnalystAgent {
    llm: Arc<dyn LlmBackend>,
    executor: Arc<dyn CodeExecutor>,
    figures: FigureStore,
}

impl AnalystAgent {
    pub fn new(llm: Arc<dyn LlmBackend>, executor: Arc<dyn CodeExecutor>, figures: FigureStore) -> Self {
        Self { llm, executor, figures }
    }

    fn prompt(state: &PipelineState) -> String {
        let eda = state.eda();
        let sample = &state.dataset().sample;

        let column_lines: Vec<String> = sample
            .columns()
            .iter()
            .map(|c| {
                let dtype = eda
                    .and_then(|p| p.dtypes.get(&c.name))
                    .map(String::as_str)
                    .unwrap_or(c.dtype.as_str());
                if c.dtype.is_numeric() {
                    let stats = eda.and_then(|p| p.numeric_stats.get(&c.name));
                    let fmt = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| v.to_string());
                    format!(
                        "- {}: {dtype} (min: {}, max: {}, mean: {})",
                        c.name,
                        fmt(stats.map(|s| s.min)),
                        fmt(stats.map(|s| s.max)),
                        fmt(stats.map(|s| s.mean)),
                    )
                } else {
                    let unique = eda
                        .and_then(|p| p.columns.get(&c.name))
                        .map_or_else(|| c.unique(), |p| p.unique_values);
                    format!("- {}: {dtype} (unique values: {unique})", c.name)
                }
            })
            .collect();

        let correlations: Vec<String> = eda
            .map(|p| p.top_correlations(3))
            .unwrap_or(&[])
            .iter()
            .map(|c| format!("- {} and {} have correlation of {:.2}", c.columns[0], c.columns[1], c.correlation))
            .collect();
        let correlation_block = if correlations.is_empty() {
            String::new()
        } else {
            format!("Notable correlations:\n{}\n\n", correlations.join("\n"))
        };

        format!(
            "Write Python code to analyse this DataFrame and answer: {query}\n\n\
             DataFrame summary: {summary}\n\n\
             DataFrame columns:\n{columns}\n\n\
             {correlation_block}{PROMPT_RULES}",
            query = state.query(),
            summary = eda.map_or("No summary available", |p| p.summary.as_str()),
            columns = column_lines.join("\n"),
        )
    }

    /// Store inline and rendered figures; returns label to figure name and the
    /// insights with inline images replaced by their figure name.
    async fn persist_figures(
        &self,
        run_id: &str,
        mut results: serde_json::Value,
        rendered: Vec<RenderedFigure>,
    ) -> (BTreeMap<String, String>, serde_json::Value) {
        let mut saved = BTreeMap::new();

        if let Some(map) = results.as_object_mut() {
            for (key, value) in map.iter_mut() {
                if !is_inline_figure(key, value) {
                    continue;
                }
                let Some(encoded) = value.as_str() else { continue };
                match self.figures.save_inline(run_id, key, encoded).await {
                    Ok(path) => {
                        let name = file_name(&path);
                        *value = serde_json::Value::String(name.clone());
                        saved.insert(key.clone(), name);
                    }
                    Err(e) => warn!(key = %key, error = %e, "Could not save inline figure"),
                }
            }
        }

        for figure in rendered {
            match self.figures.save_png(run_id, &figure.label, &figure.png).await {
                Ok(path) => {
                    saved.insert(figure.label, file_name(&path));
                }
                Err(e) => warn!(label = %figure.label, error = %e, "Could not save rendered figure"),
            }
        }

        (saved, results)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fences(text: &str) -> String {
    let mut code = text.trim();
    if let Some(rest) = code.strip_prefix("```python") {
        code = rest.trim();
    }
    if let Some(rest) = code.strip_prefix("```") {
        code = rest.trim();
    }
    if let Some(rest) = code.strip_suffix("```") {
        code = rest.trim();
    }
    code.to_string()
}

/// Rewrite bare `%s`, `%d` and `%f` placeholders to `{}` when the code uses `%`
/// but never `%%`.
pub fn fix_percent_formatting(code: &str) -> String {
    if !code.contains('%') || code.contains("%%") {
        return code.to_string();
    }
    warn!("Generated code uses %-formatting, rewriting placeholders");
    code.replace("%s", "{}").replace("%d", "{}").replace("%f", "{}")
}

/// User-facing message for a fault in the generated code.
pub fn describe_code_failure(kind: FailureKind, message: &str) -> String {
    match kind {
        FailureKind::Syntax if message.starts_with("Syntax error") => message.to_string(),
        FailureKind::Syntax => format!("Syntax error: {message}"),
        FailureKind::Runtime if message.to_lowercase().contains("format") => format!(
            "String formatting error: {message}. This is likely due to an issue with f-strings or string formatting."
        ),
        FailureKind::Runtime => message.to_string(),
    }
}

#[async_trait]
impl StageAgent for AnalystAgent {
    async fn process(&self, state: Arc<PipelineState>) -> StageUpdate {
        let sample = Arc::clone(&state.dataset().sample);
        if sample.is_empty() {
            return Err(StageFailure::message("No dataframe sample provided for analysis"));
        }

        let request = LlmRequest::new(vec![Message::system(SYSTEM_PROMPT), Message::user(Self::prompt(&state))]);
        let response = self.llm.complete(request).await.map_err(|e| {
            error!(error = %e, "Analysis code generation failed");
            StageFailure::new(Stage::Analysis, e)
        })?;

        let code = fix_percent_formatting(&strip_code_fences(&response.content));
        debug!(code_len = code.len(), "Generated analysis code");

        let outcome = self.executor.execute(&code, &sample).await.map_err(|e| {
            error!(error = %e, "Sandbox could not run analysis code");
            StageFailure::new(Stage::Analysis, e)
        })?;

        let result = match outcome {
            ExecutionOutcome::Success { results, figures } => {
                let (saved_figures, insights) = self.persist_figures(state.run_id(), results, figures).await;
                info!(figures = saved_figures.len(), "Analysis code succeeded");
                AnalysisResult::Success { insights, code, saved_figures }
            }
            ExecutionOutcome::Failed { kind, message } => {
                warn!(?kind, %message, "Analysis code failed");
                AnalysisResult::Failed { error: describe_code_failure(kind, &message), code }
            }
        };
        Ok(StageOutput::Analysis(result))
    }
}
