//! Datastory storage layer.
//!
//! Uploaded CSV files live in an [`ObjectStore`] under `datasets/<id>/<filename>`;
//! their profile lives in a [`MetadataStore`]. The [`DatasetCatalog`] ties the
//! two together and hands pipeline runs a ready [`DatasetDescriptor`].
//!
//! [`DatasetDescriptor`]: datastory_common::DatasetDescriptor

pub mod catalog;
pub mod error;
pub mod metadata;
pub mod object_store;

pub use catalog::{dataset_key, DatasetCatalog};
pub use error::{Result, StorageError};
pub use metadata::{DatasetRecord, InMemoryMetadataStore, MetadataStore};
pub use object_store::{InMemoryObjectStore, LocalObjectStore, ObjectStore};
