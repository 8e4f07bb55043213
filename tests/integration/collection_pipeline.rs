//! End-to-end tests for collect → store → transform → render
//!
//! These tests verify that:
//! - One record is stored per successful probe attempt
//! - Stored records come back as series for every plot flavour
//! - The standard report writes all plot documents

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use speedwatch::collector::Collector;
use speedwatch::render::{JsonRenderer, ReportJob, STANDARD_PLOTS};
use speedwatch::series::{History, Metric, MetricFamily, TransformOptions};
use speedwatch::storage::{MeasurementStore, MemoryStore};

use crate::helpers::*;

#[tokio::test]
async fn test_collect_then_transform() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .respond(BOSTON, speedtest_json(BOSTON, 12_500_000, 1_250_000, 11.0))
            .respond(BURLINGTON, speedtest_json(BURLINGTON, 25_000_000, 2_500_000, 4.0)),
    );
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::new(
        test_targets(),
        probe.clone(),
        store.clone(),
        Duration::from_secs(60),
    );

    for hour in [9, 10, 11] {
        assert_eq!(collector.collect_all(at(2, hour, 0)).await.unwrap(), 2);
    }
    assert_eq!(probe.calls().len(), 6);

    let history = History::load(store.as_ref()).await.unwrap();
    assert_eq!(history.len(), 6);

    let set = history.series(
        &test_targets(),
        MetricFamily::Throughput,
        TransformOptions {
            overlay: true,
            truncate: true,
        },
    );

    let boston = set.target(BOSTON).unwrap();
    assert_eq!(boston.label, "Boston Comcast");
    let hours: Vec<f64> = boston.metrics[&Metric::Download]
        .iter()
        .map(|point| point.x)
        .collect();
    assert_eq!(hours, vec![9.0, 10.0, 11.0]);
    assert_eq!(boston.metrics[&Metric::Upload][0].y, 1_250_000.0);

    let ping = history.series(&test_targets(), MetricFamily::Ping, TransformOptions::default());
    assert_eq!(ping.target(BURLINGTON).unwrap().metrics[&Metric::Latency][2].y, 4.0);
}

#[tokio::test]
async fn test_report_writes_every_standard_plot() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    for day in 1..=5 {
        store
            .append(record(at(day, 8, 20), BOSTON, Some(10_000_000), Some(12.0)))
            .await
            .unwrap();
    }

    let job = ReportJob::new(
        store,
        test_targets(),
        Arc::new(JsonRenderer::new(temp_dir.path())),
    );
    let written = job.render_all().await.unwrap();
    assert_eq!(written.len(), STANDARD_PLOTS.len());

    for plot in &STANDARD_PLOTS {
        let path = temp_dir.path().join(format!("{}.json", plot.name));
        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(document["name"], plot.name);
    }

    let recent: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp_dir.path().join("bandwidth-recent.json")).unwrap(),
    )
    .unwrap();
    // day 2 sits exactly three days before day 5 and is kept
    let points = recent["panels"][0]["series"][0]["points"].as_array().unwrap();
    assert_eq!(points.len(), 4);
    // 10 MB/s is 80 Mbps
    assert_eq!(points[0][1], 80.0);
}

#[tokio::test]
async fn test_report_on_empty_store() {
    let temp_dir = tempfile::tempdir().unwrap();
    let job = ReportJob::new(
        Arc::new(MemoryStore::new()),
        test_targets(),
        Arc::new(JsonRenderer::new(temp_dir.path())),
    );

    let written = job.render_all().await.unwrap();
    assert_eq!(written.len(), STANDARD_PLOTS.len());

    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(temp_dir.path().join("bandwidth.json")).unwrap())
            .unwrap();
    assert!(document["x_range"].is_null());
    assert!(document["panels"][0]["series"].as_array().unwrap().is_empty());
}
