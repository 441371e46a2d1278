//! Typed stage outputs and their wire shapes.

use std::collections::BTreeMap;

use datastory_common::Describe;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::graph::Stage;

// ── Research ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResearchFindings {
    /// Comprehensive summary of research findings
    pub summary: String,
    /// List of sources or citations
    #[serde(default)]
    pub sources: Vec<String>,
    /// Explanation of relevance to the query
    #[serde(default)]
    pub relevance: String,
}

impl ResearchFindings {
    /// Wrap unstructured model text as a summary.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { summary: text.into(), sources: Vec::new(), relevance: String::new() }
    }
}

// ── EDA ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: usize,
    pub memory_usage: usize,
    pub missing_cells: usize,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypes {
    pub numeric: usize,
    pub categorical: usize,
    pub datetime: usize,
    pub boolean: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    #[serde(rename = "type")]
    pub dtype: String,
    pub unique_values: usize,
    pub missing: usize,
    pub missing_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub columns: [String; 2],
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdaProfile {
    pub dataset_info: DatasetInfo,
    pub column_types: ColumnTypes,
    pub columns: BTreeMap<String, ColumnProfile>,
    pub numeric_stats: BTreeMap<String, Describe>,
    pub column_list: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    /// Pairs with |r| > 0.5, strongest first. Absent with fewer than two numeric columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlations: Option<Vec<Correlation>>,
    pub summary: String,
}

impl EdaProfile {
    /// Up to `n` correlations, strongest first.
    pub fn top_correlations(&self, n: usize) -> &[Correlation] {
        match &self.correlations {
            Some(c) => &c[..c.len().min(n)],
            None => &[],
        }
    }
}

// ── Analysis ──────────────────────────────────────────────────────────────────

/// Outcome of generating and running analysis code. A failed variant is still a
/// successful stage result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisResult {
    Success {
        insights: serde_json::Value,
        code: String,
        /// Figure label to stored figure name.
        saved_figures: BTreeMap<String, String>,
    },
    Failed {
        error: String,
        code: String,
    },
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }

    pub fn code(&self) -> &str {
        match self {
            AnalysisResult::Success { code, .. } | AnalysisResult::Failed { code, .. } => code,
        }
    }
}

// ── Story ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub heading: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoryResult {
    /// A descriptive title for the data story
    pub title: String,
    /// Executive summary (2-3 sentences)
    pub summary: String,
    /// Array of content sections
    pub sections: Vec<Section>,
    /// Key bullet points of the most important findings
    pub insights: Vec<String>,
    /// Recommendations for further investigation
    pub next_steps: Vec<String>,
}

impl StoryResult {
    /// Render the story as Markdown for direct display.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n{}\n", self.title.trim(), self.summary.trim());
        for section in &self.sections {
            md.push_str(&format!("\n## {}\n\n{}\n", section.heading.trim(), section.content.trim()));
        }
        if !self.insights.is_empty() {
            md.push_str("\n## Key Insights\n\n");
            for insight in &self.insights {
                md.push_str(&format!("- {}\n", insight.trim()));
            }
        }
        if !self.next_steps.is_empty() {
            md.push_str("\n## Next Steps\n\n");
            for (i, step) in self.next_steps.iter().enumerate() {
                md.push_str(&format!("{}. {}\n", i + 1, step.trim()));
            }
        }
        md
    }
}

/// A parsed story, or the raw model text when it did not match the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoryOutcome {
    Story(StoryResult),
    Unparsed { error: String, raw_content: String },
}

// ── Stage output ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Research(ResearchFindings),
    Eda(EdaProfile),
    Analysis(AnalysisResult),
    Story(StoryOutcome),
}

impl StageOutput {
    /// Stage this kind of output belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            StageOutput::Research(_) => Stage::Research,
            StageOutput::Eda(_) => Stage::Eda,
            StageOutput::Analysis(_) => Stage::Analysis,
            StageOutput::Story(_) => Stage::Story,
        }
    }

    pub fn to_payload(&self) -> serde_json::Value {
        let encoded = match self {
            StageOutput::Research(v) => serde_json::to_value(v),
            StageOutput::Eda(v) => serde_json::to_value(v),
            StageOutput::Analysis(v) => serde_json::to_value(v),
            StageOutput::Story(v) => serde_json::to_value(v),
        };
        encoded.unwrap_or_else(|e| serde_json::json!({ "error": format!("Unserializable output: {e}") }))
    }
}
