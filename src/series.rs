//! Series transform - turns the stored history into plottable series
//!
//! ## Pipeline
//!
//! ```text
//! all() → parse timestamps (skip malformed) → stable sort → group by target
//!       → cut index (truncate) → x mapping (absolute | time of day)
//!       → per metric (x, y) points, nulls dropped
//! ```
//!
//! Two independent options shape the output:
//!
//! - **truncate**: keep only the trailing [`RECENT_WINDOW`] of each target,
//!   measured back from that target's newest record (inclusive cutoff)
//! - **overlay**: fold every timestamp onto a single day, so `x` is an hour
//!   of day in `[0, 24)` counted from the midnight of the first retained
//!   record

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use tracing::{debug, warn};

use crate::storage::{MeasurementRecord, MeasurementStore, StorageResult, StoredRecord};
use crate::{Target, TargetId, target_label};

/// How far back a truncated series reaches
pub const RECENT_WINDOW: TimeDelta = TimeDelta::days(3);

/// Padding added on both sides of an absolute time axis
pub const AXIS_PADDING: TimeDelta = TimeDelta::hours(1);

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const HOUR_MS: f64 = 60.0 * 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    Download,
    Upload,
    Latency,
    PacketLoss,
}

impl Metric {
    pub fn value(&self, record: &MeasurementRecord) -> Option<f64> {
        match self {
            Metric::Download => record.download_bps.map(|bps| bps as f64),
            Metric::Upload => record.upload_bps.map(|bps| bps as f64),
            Metric::Latency => record.latency_ms,
            Metric::PacketLoss => record.packet_loss_pct,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Metric::Download => "download",
            Metric::Upload => "upload",
            Metric::Latency => "latency",
            Metric::PacketLoss => "packet_loss",
        }
    }

    /// Axis label, in displayed units (see [`Metric::scale`])
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Download => "Download Throughput (Mbps)",
            Metric::Upload => "Upload Throughput (Mbps)",
            Metric::Latency => "Ping (ms)",
            Metric::PacketLoss => "Packet loss (percentage)",
        }
    }

    /// Stored units per displayed unit
    ///
    /// Bandwidth is stored in bytes per second and shown in megabits per
    /// second.
    pub fn scale(&self) -> f64 {
        match self {
            Metric::Download | Metric::Upload => 125_000.0,
            Metric::Latency | Metric::PacketLoss => 1.0,
        }
    }
}

/// Metrics plotted together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFamily {
    Throughput,
    Ping,
}

impl MetricFamily {
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            MetricFamily::Throughput => &[Metric::Download, Metric::Upload],
            MetricFamily::Ping => &[Metric::Latency, Metric::PacketLoss],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub overlay: bool,
    pub truncate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub x: f64,
    pub y: f64,
}

/// Horizontal axis of a rendered series set
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    /// Wall-clock range, padded by [`AXIS_PADDING`]
    Absolute {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    /// Hour of day, fixed to `[0, 24]`
    TimeOfDay,

    /// Nothing to plot
    Empty,
}

impl Axis {
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            Axis::Absolute { start, end } => Some((absolute_x(*start), absolute_x(*end))),
            Axis::TimeOfDay => Some((0.0, 24.0)),
            Axis::Empty => None,
        }
    }

    /// Tick positions; only the time-of-day axis has fixed ticks
    pub fn ticks(&self) -> Vec<f64> {
        match self {
            Axis::TimeOfDay => (0..=24).map(f64::from).collect(),
            Axis::Absolute { .. } | Axis::Empty => Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Axis::TimeOfDay => "Time of Day (Hour)",
            Axis::Absolute { .. } | Axis::Empty => "Date",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetSeries {
    pub target_id: TargetId,
    pub label: String,

    /// Only metrics with at least one value are present
    pub metrics: BTreeMap<Metric, Vec<SeriesPoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSet {
    pub family: MetricFamily,
    pub options: TransformOptions,

    /// Ordered by target id; targets without any series are left out
    pub targets: Vec<TargetSeries>,

    pub axis: Axis,
}

impl SeriesSet {
    pub fn target(&self, target_id: TargetId) -> Option<&TargetSeries> {
        self.targets.iter().find(|series| series.target_id == target_id)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// First index whose timestamp is within [`RECENT_WINDOW`] of the last one
///
/// `timestamps` must be sorted ascending.
pub fn cut_index(timestamps: &[NaiveDateTime]) -> usize {
    let Some(last) = timestamps.last() else {
        return 0;
    };
    let cutoff = *last - RECENT_WINDOW;
    timestamps.partition_point(|t| *t < cutoff)
}

/// Midnight of the day `timestamp` falls on
pub fn anchor_day(timestamp: NaiveDateTime) -> NaiveDateTime {
    timestamp.date().and_time(NaiveTime::MIN)
}

/// Hours since `anchor`, folded onto `[0, 24)`
pub fn time_of_day_hours(timestamp: NaiveDateTime, anchor: NaiveDateTime) -> f64 {
    let offset_ms = (timestamp - anchor).num_milliseconds().rem_euclid(DAY_MS);
    offset_ms as f64 / HOUR_MS
}

/// Seconds since the epoch of the naive wall-clock time
pub fn absolute_x(timestamp: NaiveDateTime) -> f64 {
    timestamp.and_utc().timestamp() as f64
}

/// Parsed measurement history, grouped by target and sorted by time
#[derive(Debug, Clone, Default)]
pub struct History {
    by_target: BTreeMap<TargetId, Vec<MeasurementRecord>>,
}

impl History {
    pub fn from_rows(rows: Vec<StoredRecord>) -> Self {
        let mut records: Vec<MeasurementRecord> = rows.into_iter().filter_map(parse_row).collect();

        // stable, equal timestamps keep insertion order
        records.sort_by_key(|record| record.timestamp);

        let mut by_target: BTreeMap<TargetId, Vec<MeasurementRecord>> = BTreeMap::new();
        for record in records {
            by_target.entry(record.target_id).or_default().push(record);
        }

        Self { by_target }
    }

    pub async fn load(store: &dyn MeasurementStore) -> StorageResult<Self> {
        let rows = store.all().await?;
        debug!("loaded {} stored measurements", rows.len());
        Ok(Self::from_rows(rows))
    }

    pub fn target_ids(&self) -> impl Iterator<Item = TargetId> + '_ {
        self.by_target.keys().copied()
    }

    pub fn records(&self, target_id: TargetId) -> &[MeasurementRecord] {
        self.by_target
            .get(&target_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }

    /// Build the series of one metric family
    ///
    /// `targets` only provides display labels; every target present in the
    /// history is considered, configured or not.
    pub fn series(
        &self,
        targets: &[Target],
        family: MetricFamily,
        options: TransformOptions,
    ) -> SeriesSet {
        let mut series = Vec::new();
        let mut retained_range: Option<(NaiveDateTime, NaiveDateTime)> = None;

        for (&target_id, records) in &self.by_target {
            let timestamps: Vec<NaiveDateTime> =
                records.iter().map(|record| record.timestamp).collect();

            let cut = if options.truncate {
                cut_index(&timestamps)
            } else {
                0
            };
            let retained = &records[cut..];
            let (Some(first), Some(last)) = (retained.first(), retained.last()) else {
                continue;
            };

            retained_range = Some(match retained_range {
                Some((start, end)) => (start.min(first.timestamp), end.max(last.timestamp)),
                None => (first.timestamp, last.timestamp),
            });

            let anchor = anchor_day(first.timestamp);
            let x_of = |timestamp: NaiveDateTime| {
                if options.overlay {
                    time_of_day_hours(timestamp, anchor)
                } else {
                    absolute_x(timestamp)
                }
            };

            let mut metrics = BTreeMap::new();
            for &metric in family.metrics() {
                let points: Vec<SeriesPoint> = retained
                    .iter()
                    .filter_map(|record| {
                        metric.value(record).map(|y| SeriesPoint {
                            x: x_of(record.timestamp),
                            y,
                        })
                    })
                    .collect();

                if !points.is_empty() {
                    metrics.insert(metric, points);
                }
            }

            if metrics.is_empty() {
                continue;
            }

            series.push(TargetSeries {
                target_id,
                label: target_label(targets, target_id),
                metrics,
            });
        }

        let axis = match (options.overlay, retained_range) {
            (true, _) => Axis::TimeOfDay,
            (false, Some((start, end))) => Axis::Absolute {
                start: start - AXIS_PADDING,
                end: end + AXIS_PADDING,
            },
            (false, None) => Axis::Empty,
        };

        SeriesSet {
            family,
            options,
            targets: series,
            axis,
        }
    }
}

fn parse_row(row: StoredRecord) -> Option<MeasurementRecord> {
    let target_id = row.target_id;
    let text = row.timestamp.clone();

    match row.parse() {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("skipping measurement of target {target_id} with malformed timestamp {text:?}: {e}");
            None
        }
    }
}
