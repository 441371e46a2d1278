//! Dataset metadata records and their store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datastory_common::Describe;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Result, StorageError};

/// Profile of one uploaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub filename: String,
    pub storage_key: String,
    /// Rows in the full file, not just the sample.
    pub rows: usize,
    pub columns: Vec<String>,
    /// Inferred from the row-capped sample.
    pub dtypes: BTreeMap<String, String>,
    /// Describe statistics of each numeric column, computed over the
    /// row-capped sample, so `count` can be smaller than `rows`.
    pub summary: BTreeMap<String, Describe>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_meta(&self, id: &str) -> Result<Option<DatasetRecord>>;

    /// Insert a new record; an existing id is a [`StorageError::Duplicate`].
    async fn insert(&self, record: DatasetRecord) -> Result<()>;

    /// Records ordered newest first.
    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<DatasetRecord>>;

    /// Remove a record; returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<String, DatasetRecord>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_meta(&self, id: &str) -> Result<Option<DatasetRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, record: DatasetRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StorageError::Duplicate(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<DatasetRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<&DatasetRecord> = records.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(all.into_iter().skip(skip).take(limit).cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}
