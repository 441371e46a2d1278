//! datastory-web: HTTP boundary for Datastory.
//!
//! - `POST /api/analyze` streams a pipeline run as server-sent events
//! - `GET /api/figures/{name}` serves stored figures
//! - `/api/datasets` registers, lists, describes and deletes uploaded datasets

pub mod error;
pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::{AppState, SharedState};
