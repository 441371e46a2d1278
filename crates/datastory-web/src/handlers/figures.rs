use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;

use crate::error::ApiError;
use crate::state::SharedState;

/// GET /api/figures/{name} - a stored PNG figure.
pub async fn get_figure(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let png = state
        .figures
        .read(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Figure {name} not found")))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
