//! Storage backends for measurement persistence
//!
//! The store is append-only: the collector is its only writer and the
//! series transform its only reader. Rows are never updated or deleted.
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database in WAL mode, so readers see a
//!   consistent snapshot of committed rows without blocking the writer
//! - **In-Memory**: No persistence, for testing and dry runs
//!
//! ## Usage
//!
//! ```no_run
//! use speedwatch::storage::{MeasurementStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./speedtests.db").await?;
//!     let rows = store.all().await?;
//!     println!("{} measurements", rows.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use backend::{HealthStatus, MeasurementStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{MeasurementRecord, StoredRecord};

use crate::config::StorageConfig;

/// Open the store described by the configuration
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn MeasurementStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory storage, measurements will not be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::InvalidConfig(
            "sqlite storage requires the `storage-sqlite` feature".to_string(),
        )),
    }
}
