//! datastory-common: Shared types, errors, and policies used across all Datastory crates.

pub mod error;
pub mod dataset;
pub mod sandbox;
pub mod stats;

// Re-export commonly used types
pub use dataset::{Cell, Column, DType, DatasetDescriptor, DatasetSample, SAMPLE_ROW_CAP};
pub use error::{DatastoryError, Result};
pub use sandbox::SandboxPolicy;
pub use stats::Describe;
