//! Dataset catalog: upload, profile, register, resolve and remove datasets.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use datastory_common::stats::describe;
use datastory_common::{DatasetDescriptor, DatasetSample, SAMPLE_ROW_CAP};
use tracing::{info, instrument, warn};

use crate::error::{Result, StorageError};
use crate::metadata::{DatasetRecord, MetadataStore};
use crate::object_store::ObjectStore;

/// Object key of an uploaded file: `datasets/<id>/<filename>`.
pub fn dataset_key(id: &str, filename: &str) -> String {
    format!("datasets/{id}/{filename}")
}

fn dataset_prefix(id: &str) -> String {
    format!("datasets/{id}")
}

/// Keep only the final path component of a client-supplied file name.
fn clean_filename(filename: &str) -> String {
    let base = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "dataset.csv".to_string()
    } else {
        base.to_string()
    }
}

#[derive(Clone)]
pub struct DatasetCatalog {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    sample_rows: usize,
}

impl DatasetCatalog {
    pub fn new(objects: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { objects, metadata, sample_rows: SAMPLE_ROW_CAP }
    }

    /// Cap for the row sample handed to pipeline runs (never above [`SAMPLE_ROW_CAP`]).
    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows.clamp(1, SAMPLE_ROW_CAP);
        self
    }

    pub fn sample_rows(&self) -> usize {
        self.sample_rows
    }

    /// Store an uploaded CSV file, profile it and insert its record.
    #[instrument(skip(self, bytes, description), fields(bytes = bytes.len()))]
    pub async fn register(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        description: Option<String>,
    ) -> Result<DatasetRecord> {
        let filename = clean_filename(filename);
        let sample = DatasetSample::from_csv(&bytes, self.sample_rows)?;
        let rows = DatasetSample::count_rows(&bytes)?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let storage_key = self.objects.put(&dataset_key(&id, &filename), bytes).await?;

        let dtypes: BTreeMap<String, String> = sample
            .columns()
            .iter()
            .map(|c| (c.name.clone(), c.dtype.as_str().to_string()))
            .collect();
        let summary: BTreeMap<String, _> = sample
            .columns()
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .filter_map(|c| describe(&c.numeric_values()).map(|d| (c.name.clone(), d)))
            .collect();

        let now = Utc::now();
        let record = DatasetRecord {
            id,
            filename,
            storage_key,
            rows,
            columns: sample.column_names(),
            dtypes,
            summary,
            description,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.metadata.insert(record.clone()).await {
            // Keep object and metadata stores in step.
            if let Err(cleanup) = self.objects.delete(&dataset_prefix(&record.id)).await {
                warn!(id = %record.id, error = %cleanup, "Failed to remove orphaned dataset file");
            }
            return Err(e);
        }

        info!(id = %record.id, rows = record.rows, columns = record.columns.len(), "Registered dataset");
        Ok(record)
    }

    pub async fn get_meta(&self, id: &str) -> Result<DatasetRecord> {
        self.metadata
            .get_meta(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    pub async fn list(&self, skip: usize, limit: usize) -> Result<Vec<DatasetRecord>> {
        self.metadata.list(skip, limit).await
    }

    /// Load a registered dataset as a pipeline input.
    pub async fn descriptor(&self, id: &str) -> Result<DatasetDescriptor> {
        let record = self.get_meta(id).await?;
        let bytes = self
            .objects
            .get(&record.storage_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{id} (file {} missing)", record.storage_key)))?;
        let sample = DatasetSample::from_csv(&bytes, self.sample_rows)?;
        Ok(DatasetDescriptor::new(record.storage_key, record.filename, sample))
    }

    /// Delete a dataset's files and record.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<()> {
        let record = self.get_meta(id).await?;
        self.objects.delete(&dataset_prefix(&record.id)).await?;
        self.metadata.delete(&record.id).await?;
        info!(id, "Removed dataset");
        Ok(())
    }
}
