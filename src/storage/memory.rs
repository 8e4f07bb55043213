//! In-memory measurement store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Dry runs with `"backend": "none"`
//!
//! All data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, MeasurementStore};
use super::error::StorageResult;
use super::schema::{MeasurementRecord, StoredRecord};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with rows, in the given insertion order
    pub fn with_rows(rows: Vec<StoredRecord>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn append(&self, record: MeasurementRecord) -> StorageResult<()> {
        debug!(
            "storing measurement for target {} in memory",
            record.target_id
        );
        self.rows.write().await.push(record.into());
        Ok(())
    }

    async fn all(&self) -> StorageResult<Vec<StoredRecord>> {
        Ok(self.rows.read().await.clone())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("rows".to_string(), self.len().await.to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        Ok(format!("In-Memory: {} rows", self.len().await))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
