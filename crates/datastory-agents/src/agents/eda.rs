use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use super::StageAgent;
use crate::graph::Stage;
use crate::outputs::StageOutput;
use crate::profile::profile;
use crate::state::{PipelineState, StageFailure, StageUpdate};

/// Local profiling of the dataset sample; no external calls.
#[derive(Debug, Default, Clone)]
pub struct EdaAgent;

impl EdaAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageAgent for EdaAgent {
    async fn process(&self, state: Arc<PipelineState>) -> StageUpdate {
        let sample = Arc::clone(&state.dataset().sample);
        if sample.is_empty() || sample.n_rows() == 0 {
            return Err(StageFailure::message("No dataframe sample provided for EDA"));
        }

        match tokio::task::spawn_blocking(move || profile(&sample)).await {
            Ok(profile) => {
                debug!(
                    rows = profile.dataset_info.rows,
                    correlations = profile.correlations.as_ref().map_or(0, Vec::len),
                    "EDA profile ready"
                );
                Ok(StageOutput::Eda(profile))
            }
            Err(e) => {
                error!(error = %e, "EDA profiling task failed");
                Err(StageFailure::new(Stage::Eda, e))
            }
        }
    }
}
