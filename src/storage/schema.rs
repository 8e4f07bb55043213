//! Measurement record definitions
//!
//! One row is written per successful probe attempt. The extracted metric
//! columns are all optional: a probe document missing a field yields a
//! `NULL` column, never an error. The verbatim probe output is kept next to
//! the columns so fields can be re-extracted later.
//!
//! Timestamps are local wall-clock time with second precision, stored as
//! text in [`TIMESTAMP_FORMAT`].

use chrono::{NaiveDateTime, ParseResult, SubsecRound};
use serde::{Deserialize, Serialize};

use crate::TargetId;
use crate::probe::RawPayload;

/// Text format of stored timestamps
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
}

/// A single measurement of one target at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// When the attempt was started (local time, whole seconds)
    pub timestamp: NaiveDateTime,

    pub target_id: TargetId,

    /// Verbatim probe output
    pub raw_payload: Option<String>,

    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,

    /// Download bandwidth as reported by the probe (bytes per second)
    pub download_bps: Option<i64>,

    /// Upload bandwidth as reported by the probe (bytes per second)
    pub upload_bps: Option<i64>,

    pub packet_loss_pct: Option<f64>,
}

impl MeasurementRecord {
    /// Build a record from a probe document, extracting the known fields
    pub fn from_payload(
        target_id: TargetId,
        timestamp: NaiveDateTime,
        payload: &RawPayload,
    ) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            target_id,
            raw_payload: Some(payload.text().to_string()),
            latency_ms: payload.latency_ms(),
            jitter_ms: payload.jitter_ms(),
            download_bps: payload.download_bps(),
            upload_bps: payload.upload_bps(),
            packet_loss_pct: payload.packet_loss_pct(),
        }
    }
}

/// A row as read back from a store, timestamp still in text form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub timestamp: String,
    pub target_id: TargetId,
    pub raw_payload: Option<String>,
    pub latency_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub download_bps: Option<i64>,
    pub upload_bps: Option<i64>,
    pub packet_loss_pct: Option<f64>,
}

impl StoredRecord {
    /// Parse the stored timestamp back into a full record
    pub fn parse(self) -> ParseResult<MeasurementRecord> {
        let timestamp = parse_timestamp(&self.timestamp)?;

        Ok(MeasurementRecord {
            timestamp,
            target_id: self.target_id,
            raw_payload: self.raw_payload,
            latency_ms: self.latency_ms,
            jitter_ms: self.jitter_ms,
            download_bps: self.download_bps,
            upload_bps: self.upload_bps,
            packet_loss_pct: self.packet_loss_pct,
        })
    }
}

impl From<MeasurementRecord> for StoredRecord {
    fn from(record: MeasurementRecord) -> Self {
        Self {
            timestamp: format_timestamp(&record.timestamp),
            target_id: record.target_id,
            raw_payload: record.raw_payload,
            latency_ms: record.latency_ms,
            jitter_ms: record.jitter_ms,
            download_bps: record.download_bps,
            upload_bps: record.upload_bps,
            packet_loss_pct: record.packet_loss_pct,
        }
    }
}
