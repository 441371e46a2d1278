//! Stage identifiers and the dependency graph the scheduler walks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Research,
    Eda,
    Analysis,
    Story,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Research, Stage::Eda, Stage::Analysis, Stage::Story];

    /// Key used for the stage in stream events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Eda => "eda",
            Stage::Analysis => "analysis",
            Stage::Story => "story",
        }
    }

    /// Human-readable name used in error markers.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Research => "Research",
            Stage::Eda => "EDA",
            Stage::Analysis => "Analysis",
            Stage::Story => "Story generation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated set of stages with their dependencies, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGraph {
    nodes: Vec<(Stage, Vec<Stage>)>,
}

#[derive(Debug, Default)]
pub struct StageGraphBuilder {
    nodes: Vec<(Stage, Vec<Stage>)>,
}

impl StageGraphBuilder {
    pub fn node(mut self, stage: Stage, depends_on: &[Stage]) -> Self {
        self.nodes.push((stage, depends_on.to_vec()));
        self
    }

    /// Rejects duplicate nodes and dependencies on stages that were never declared.
    /// Cycles are accepted here; they show up as unreachable stages when run.
    pub fn build(self) -> Result<StageGraph, GraphError> {
        for (i, (stage, _)) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|(s, _)| s == stage) {
                return Err(GraphError::DuplicateNode(*stage));
            }
        }
        for (stage, deps) in &self.nodes {
            if let Some(missing) = deps.iter().find(|d| !self.nodes.iter().any(|(s, _)| s == *d)) {
                return Err(GraphError::UnknownDependency { stage: *stage, dependency: *missing });
            }
        }
        Ok(StageGraph { nodes: self.nodes })
    }
}

impl StageGraph {
    pub fn builder() -> StageGraphBuilder {
        StageGraphBuilder::default()
    }

    /// research and eda first, analysis after both, story last.
    pub fn standard() -> Self {
        Self {
            nodes: vec![
                (Stage::Research, vec![]),
                (Stage::Eda, vec![]),
                (Stage::Analysis, vec![Stage::Research, Stage::Eda]),
                (Stage::Story, vec![Stage::Analysis]),
            ],
        }
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.nodes.iter().map(|(s, _)| *s)
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.nodes.iter().any(|(s, _)| *s == stage)
    }

    pub fn dependencies(&self, stage: Stage) -> &[Stage] {
        self.nodes
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, deps)| deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
