//! Backfill from saved probe documents
//!
//! Loads every `*.json` file in a directory, as written by
//! `speedtest -f json > file.json`, and appends one record per document.
//! The target is taken from the document's `server.id`, the time from its
//! UTC `timestamp`, converted to local wall-clock time.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use crate::TargetId;
use crate::probe::RawPayload;
use crate::storage::{MeasurementRecord, MeasurementStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub ingested: usize,
    pub skipped: usize,
}

/// Target id recorded in a probe document
pub fn server_id(payload: &RawPayload) -> Option<TargetId> {
    payload
        .document()
        .pointer("/server/id")
        .and_then(|id| id.as_u64())
        .and_then(|id| TargetId::try_from(id).ok())
}

/// Local time of the probe document's UTC `timestamp`
pub fn local_timestamp(payload: &RawPayload) -> Option<NaiveDateTime> {
    let text = payload.document().get("timestamp")?.as_str()?;
    let utc = DateTime::parse_from_rfc3339(text).ok()?;
    Some(utc.with_timezone(&Local).naive_local())
}

/// `*.json` files directly inside `dir`, in name order
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read directory {}", dir.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[instrument(skip(store))]
pub async fn ingest_dir(store: &dyn MeasurementStore, dir: &Path) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for path in json_files(dir).await? {
        let Some(record) = read_document(&path).await else {
            summary.skipped += 1;
            continue;
        };

        store
            .append(record)
            .await
            .with_context(|| format!("failed to store measurement from {}", path.display()))?;
        summary.ingested += 1;
    }

    info!(
        "ingested {} documents from {} ({} skipped)",
        summary.ingested,
        dir.display(),
        summary.skipped
    );
    Ok(summary)
}

async fn read_document(path: &Path) -> Option<MeasurementRecord> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            warn!("skipping {}: {e}", path.display());
            return None;
        }
    };

    let payload = match RawPayload::parse(text) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("skipping {}: not a probe document: {e}", path.display());
            return None;
        }
    };

    let Some(target_id) = server_id(&payload) else {
        debug!("skipping {}: no server id", path.display());
        return None;
    };

    let Some(timestamp) = local_timestamp(&payload) else {
        warn!("skipping {}: missing or invalid timestamp", path.display());
        return None;
    };

    Some(MeasurementRecord::from_payload(target_id, timestamp, &payload))
}
