//! Dataset registration and lookup.

use std::collections::BTreeMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use datastory_common::Describe;
use datastory_storage::DatasetRecord;
use serde::{Deserialize, Serialize};

use super::FormFields;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Profile fields of a dataset record.
#[derive(Debug, Serialize)]
pub struct DatasetMeta {
    pub rows: usize,
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub summary: BTreeMap<String, Describe>,
}

impl From<DatasetRecord> for DatasetMeta {
    fn from(r: DatasetRecord) -> Self {
        Self { rows: r.rows, columns: r.columns, dtypes: r.dtypes, summary: r.summary }
    }
}

/// POST /api/datasets - upload a CSV file (`file`, optional `description`).
pub async fn create_dataset(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = FormFields::read(&mut multipart).await?;
    let description = form.text("description");
    let (filename, bytes) = form
        .take_file("file")
        .ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    let record = state.catalog.register(&filename, bytes, description).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/datasets?skip&limit - newest first.
pub async fn list_datasets(
    State(state): State<SharedState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<DatasetRecord>>, ApiError> {
    Ok(Json(state.catalog.list(page.skip, page.limit).await?))
}

/// GET /api/datasets/{id}/meta
pub async fn dataset_meta(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DatasetMeta>, ApiError> {
    Ok(Json(state.catalog.get_meta(&id).await?.into()))
}

/// DELETE /api/datasets/{id}
pub async fn delete_dataset(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
