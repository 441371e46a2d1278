//! Streaming analysis endpoint.

use std::convert::Infallible;

use axum::extract::{Multipart, State};
use axum::response::sse::{Event, Sse};
use datastory_agents::{run_pipeline, PipelineState};
use datastory_common::{DatasetDescriptor, DatasetSample};
use futures_util::stream::Stream;
use tracing::info;

use super::FormFields;
use crate::error::ApiError;
use crate::sse::sse_response;
use crate::state::SharedState;

/// POST /api/analyze - run the pipeline on a registered dataset or an uploaded file.
///
/// Multipart fields: `query`, plus either `dataset_id` or `file`.
pub async fn analyze(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut form = FormFields::read(&mut multipart).await?;
    let query = form
        .text("query")
        .ok_or_else(|| ApiError::BadRequest("Missing 'query' field".to_string()))?;

    let dataset = match (form.text("dataset_id"), form.take_file("file")) {
        (Some(id), _) => state.catalog.descriptor(&id).await?,
        (None, Some((filename, bytes))) => {
            let sample = DatasetSample::from_csv(&bytes, state.catalog.sample_rows())
                .map_err(|e| ApiError::BadRequest(format!("Error loading dataset: {e}")))?;
            DatasetDescriptor::new(format!("uploads/{filename}"), filename, sample)
        }
        (None, None) => {
            return Err(ApiError::BadRequest("Provide either 'dataset_id' or 'file'".to_string()));
        }
    };

    let run = PipelineState::new(query, dataset);
    info!(run_id = %run.run_id(), dataset = %run.dataset().filename, "Starting analysis stream");
    Ok(sse_response(run_pipeline(state.scheduler.clone(), run)))
}
