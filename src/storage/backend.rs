//! Measurement store trait definition

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{MeasurementRecord, StoredRecord};

/// Health status of the measurement store
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Append-only persistence for measurement records
///
/// Implementations must be `Send + Sync`: the store handle is shared
/// between the scheduler task and on-demand render jobs.
///
/// ## Ordering
///
/// `all()` returns rows in insertion order. Callers that need time order
/// sort in memory; no filtering is pushed down.
///
/// ## Error Handling
///
/// Backend-specific errors are converted to `StorageError` variants.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Append one record. Committed before returning.
    async fn append(&self, record: MeasurementRecord) -> StorageResult<()>;

    /// Every stored row, oldest insertion first
    ///
    /// Timestamps are returned in their stored text form so a single
    /// unparseable row can be skipped by the reader instead of failing
    /// the whole query.
    async fn all(&self) -> StorageResult<Vec<StoredRecord>>;

    /// Check store health
    ///
    /// Performs a lightweight operation to verify the store is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Human-readable statistics (e.g. "SQLite: 1200 rows, 0.45 MB on disk")
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the store and release resources
    async fn close(&self) -> StorageResult<()>;
}
