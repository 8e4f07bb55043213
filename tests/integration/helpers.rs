//! Helper functions for integration tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use speedwatch::probe::{ProbeAdapter, ProbeError, RawPayload};
use speedwatch::scheduler::Clock;
use speedwatch::storage::MeasurementRecord;
use speedwatch::{Target, TargetId};
use tokio::time::Instant;

pub const BOSTON: TargetId = 1774;
pub const BURLINGTON: TargetId = 17193;

pub fn test_targets() -> Vec<Target> {
    vec![
        Target::new(BOSTON, Some("Boston Comcast")),
        Target::new(BURLINGTON, Some("Burlington Telecom")),
    ]
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 4, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn speedtest_json(
    target_id: TargetId,
    download: i64,
    upload: i64,
    latency: f64,
) -> serde_json::Value {
    serde_json::json!({
        "type": "result",
        "timestamp": "2024-04-02T12:00:00Z",
        "ping": {"jitter": 0.8, "latency": latency},
        "download": {"bandwidth": download, "bytes": 120000000},
        "upload": {"bandwidth": upload, "bytes": 20000000},
        "packetLoss": 0,
        "server": {"id": target_id, "name": "Test"}
    })
}

pub fn record(
    timestamp: NaiveDateTime,
    target_id: TargetId,
    download: Option<i64>,
    latency: Option<f64>,
) -> MeasurementRecord {
    MeasurementRecord {
        timestamp,
        target_id,
        raw_payload: None,
        latency_ms: latency,
        jitter_ms: None,
        download_bps: download,
        upload_bps: download.map(|bps| bps / 10),
        packet_loss_pct: latency.map(|_| 0.0),
    }
}

/// Probe answering from a per-target table; targets without an entry fail
/// with a timeout. Every invocation is counted.
#[derive(Default)]
pub struct ScriptedProbe {
    responses: HashMap<TargetId, String>,
    calls: Mutex<Vec<TargetId>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, target_id: TargetId, body: impl ToString) -> Self {
        self.responses.insert(target_id, body.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TargetId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeAdapter for ScriptedProbe {
    async fn invoke(
        &self,
        target_id: TargetId,
        timeout: Duration,
    ) -> Result<RawPayload, ProbeError> {
        self.calls.lock().unwrap().push(target_id);

        match self.responses.get(&target_id) {
            Some(body) => RawPayload::parse(body.clone()).map_err(ProbeError::Malformed),
            None => Err(ProbeError::Timeout(timeout)),
        }
    }
}

/// Wall clock following tokio's (pausable) time
pub struct TokioClock {
    base: NaiveDateTime,
    start: Instant,
}

impl TokioClock {
    pub fn starting_at(base: NaiveDateTime) -> Self {
        Self {
            base,
            start: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> NaiveDateTime {
        self.base + TimeDelta::from_std(self.start.elapsed()).unwrap()
    }
}
