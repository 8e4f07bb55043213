//! Collector - measures every configured target once
//!
//! ## Message Flow
//!
//! ```text
//! collect_all(ts) → probe each target (in order, own timeout)
//!                 → extract fields → append one record per success
//! ```
//!
//! Bandwidth tests share one uplink, so by default targets are probed one
//! after another. [`Collector::with_concurrency`] allows overlap.
//!
//! A failed probe attempt is logged and dropped; no null-filled row is
//! written for it. Store errors are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, SubsecRound};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument};

use crate::Target;
use crate::probe::{ProbeAdapter, RawPayload};
use crate::storage::{MeasurementRecord, MeasurementStore};

pub struct Collector {
    targets: Vec<Target>,
    probe: Arc<dyn ProbeAdapter>,
    store: Arc<dyn MeasurementStore>,
    timeout: Duration,
    concurrency: usize,
}

impl Collector {
    pub fn new(
        targets: Vec<Target>,
        probe: Arc<dyn ProbeAdapter>,
        store: Arc<dyn MeasurementStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            targets,
            probe,
            store,
            timeout,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` probes in flight at once (at least one)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Measure all targets and store the results, tagged with `timestamp`
    ///
    /// Returns the number of records written. Records are appended in
    /// configured target order, whatever the probe concurrency.
    #[instrument(skip(self), fields(targets = self.targets.len()))]
    pub async fn collect_all(&self, timestamp: NaiveDateTime) -> Result<usize> {
        let timestamp = timestamp.trunc_subsecs(0);

        let attempts: Vec<Option<RawPayload>> = stream::iter(&self.targets)
            .map(|target| self.measure(target))
            .buffered(self.concurrency)
            .boxed()
            .collect()
            .await;

        let mut written = 0;
        for (target, attempt) in self.targets.iter().zip(attempts) {
            let Some(payload) = attempt else {
                continue;
            };

            let record = MeasurementRecord::from_payload(target.id, timestamp, &payload);
            self.store.append(record).await.with_context(|| {
                format!("failed to store measurement for {}", target.display_name())
            })?;
            written += 1;
        }

        info!(
            "stored {written} of {} measurements taken at {timestamp}",
            self.targets.len()
        );
        Ok(written)
    }

    async fn measure(&self, target: &Target) -> Option<RawPayload> {
        let name = target.display_name();
        debug!("testing {name}...");

        match self.probe.invoke(target.id, self.timeout).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!("there was a problem when testing {name}: {e}");
                None
            }
        }
    }
}
