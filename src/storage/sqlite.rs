//! SQLite measurement store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers see committed rows while the collector writes
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Every append is its own committed statement, so a shutdown between
//! cycles never leaves anything to flush.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, MeasurementStore};
use super::error::{StorageError, StorageResult};
use super::schema::{MeasurementRecord, StoredRecord, format_timestamp};

/// SQLite measurement store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use speedwatch::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./speedtests.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> StorageResult<StoredRecord> {
        let target_id: i64 = row.try_get("target_id")?;
        let target_id = u32::try_from(target_id).map_err(|_| {
            StorageError::SerializationError(format!("target id {target_id} out of range"))
        })?;

        Ok(StoredRecord {
            timestamp: row.try_get("timestamp")?,
            target_id,
            raw_payload: row.try_get("raw_payload")?,
            latency_ms: row.try_get("latency_ms")?,
            jitter_ms: row.try_get("jitter_ms")?,
            download_bps: row.try_get("download_bps")?,
            upload_bps: row.try_get("upload_bps")?,
            packet_loss_pct: row.try_get("packet_loss_pct")?,
        })
    }
}

#[async_trait]
impl MeasurementStore for SqliteStore {
    #[instrument(skip(self, record), fields(target = record.target_id))]
    async fn append(&self, record: MeasurementRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO measurements (
                timestamp, target_id, raw_payload,
                latency_ms, jitter_ms, download_bps, upload_bps, packet_loss_pct
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(&record.timestamp))
        .bind(i64::from(record.target_id))
        .bind(record.raw_payload)
        .bind(record.latency_ms)
        .bind(record.jitter_ms)
        .bind(record.download_bps)
        .bind(record.upload_bps)
        .bind(record.packet_loss_pct)
        .execute(&self.pool)
        .await?;

        debug!("measurement stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn all(&self) -> StorageResult<Vec<StoredRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, target_id, raw_payload,
                   latency_ms, jitter_ms, download_bps, upload_bps, packet_loss_pct
            FROM measurements
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // an undecodable row is skipped, never fatal for the rest of the history
        let records: Vec<StoredRecord> = rows
            .iter()
            .filter_map(|row| {
                Self::row_to_record(row)
                    .inspect_err(|e| warn!("skipping undecodable measurement row: {e}"))
                    .ok()
            })
            .collect();

        debug!("query returned {} of {} measurements", records.len(), rows.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_stats(&self) -> StorageResult<String> {
        // timestamps sort lexically in TIMESTAMP_FORMAT
        let (total_rows, oldest, newest): (i64, Option<String>, Option<String>) =
            sqlx::query_as("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM measurements")
                .fetch_one(&self.pool)
                .await?;

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        let file_size_mb = file_size as f64 / 1_000_000.0;

        let time_range = match (oldest, newest) {
            (Some(old), Some(new)) => format!("{} to {}", old, new),
            _ => "no data".to_string(),
        };

        Ok(format!(
            "SQLite: {} rows, {:.2} MB on disk, time range: {}",
            total_rows, file_size_mb, time_range
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
