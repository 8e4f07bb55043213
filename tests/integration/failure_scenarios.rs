//! Failure tests for the measurement pipeline
//!
//! These tests verify that the system handles failures gracefully:
//! - Probe timeouts, crashes and garbage output
//! - An unavailable store
//! - Malformed rows in the history

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use speedwatch::collector::Collector;
use speedwatch::probe::CommandProbe;
use speedwatch::scheduler::{FlagSentinel, ScheduleSettings, Scheduler, SchedulerHandle};
use speedwatch::series::{History, Metric, MetricFamily, TransformOptions};
use speedwatch::storage::{
    HealthStatus, MeasurementRecord, MeasurementStore, MemoryStore, StorageError, StorageResult,
    StoredRecord,
};

use crate::helpers::*;

struct BrokenStore;

#[async_trait]
impl MeasurementStore for BrokenStore {
    async fn append(&self, _record: MeasurementRecord) -> StorageResult<()> {
        Err(StorageError::Unavailable("database is locked".to_string()))
    }

    async fn all(&self) -> StorageResult<Vec<StoredRecord>> {
        Err(StorageError::Unavailable("database is locked".to_string()))
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: false,
            message: "locked".to_string(),
            metadata: Default::default(),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        Ok("broken".to_string())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_unreachable_targets_write_nothing() {
    let probe = Arc::new(ScriptedProbe::new());
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::new(
        test_targets(),
        probe.clone(),
        store.clone(),
        Duration::from_secs(1),
    );

    assert_eq!(collector.collect_all(at(1, 0, 0)).await.unwrap(), 0);
    assert_eq!(probe.calls().len(), 2);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_one_failing_target_does_not_affect_others() {
    let probe = Arc::new(
        ScriptedProbe::new()
            .respond(BOSTON, "[error] Cannot open socket")
            .respond(BURLINGTON, speedtest_json(BURLINGTON, 1, 1, 1.0)),
    );
    let store = Arc::new(MemoryStore::new());
    let collector = Collector::new(test_targets(), probe, store.clone(), Duration::from_secs(1));

    assert_eq!(collector.collect_all(at(1, 0, 0)).await.unwrap(), 1);
    assert_eq!(store.all().await.unwrap()[0].target_id, BURLINGTON);
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_probe_failures_are_dropped() {
    let store = Arc::new(MemoryStore::new());

    for probe in [
        CommandProbe::new("sleep", vec!["5".into()]),
        CommandProbe::new("false", vec![]),
        CommandProbe::new("echo", vec!["Retrying...".into()]),
        CommandProbe::new("speedwatch-no-such-probe", vec![]),
    ] {
        let collector = Collector::new(
            test_targets(),
            Arc::new(probe),
            store.clone(),
            Duration::from_millis(200),
        );
        assert_eq!(collector.collect_all(at(1, 0, 0)).await.unwrap(), 0);
    }

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_store_failure_is_reported() {
    let probe = ScriptedProbe::new().respond(BOSTON, speedtest_json(BOSTON, 1, 1, 1.0));
    let collector = Collector::new(
        test_targets(),
        Arc::new(probe),
        Arc::new(BrokenStore),
        Duration::from_secs(1),
    );

    let err = collector.collect_all(at(1, 0, 0)).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Boston Comcast"), "{message}");
    assert!(message.contains("database is locked"), "{message}");
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_survives_failing_cycles() {
    let probe = ScriptedProbe::new().respond(BOSTON, speedtest_json(BOSTON, 1, 1, 1.0));
    let collector = Collector::new(
        test_targets(),
        Arc::new(probe),
        Arc::new(BrokenStore),
        Duration::from_secs(1),
    );
    let scheduler = Scheduler::new(
        ScheduleSettings::new(Duration::from_secs(600), Duration::from_secs(3600)).unwrap(),
        Arc::new(collector),
        Arc::new(FlagSentinel::new(false)),
    )
    .with_clock(Arc::new(TokioClock::starting_at(at(1, 12, 1))))
    .with_rng(StdRng::seed_from_u64(3));

    let (handle, task) = SchedulerHandle::spawn(scheduler);
    tokio::time::sleep(Duration::from_secs(3600)).await;

    let stats = handle.stats().await.unwrap();
    assert!(stats.cycles_run >= 6, "{stats:?}");
    assert_eq!(stats.failed_cycles, stats.cycles_run);
    assert!(handle.run_now().await.is_err());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_malformed_history_rows_are_skipped() {
    let mut garbled: StoredRecord = record(at(1, 9, 0), BOSTON, Some(5), None).into();
    garbled.timestamp = "2024-04-01 09:00".to_string();

    let store = MemoryStore::with_rows(vec![
        garbled,
        record(at(1, 10, 0), BOSTON, Some(6), None).into(),
    ]);

    let history = History::load(&store).await.unwrap();
    let set = history.series(
        &test_targets(),
        MetricFamily::Throughput,
        TransformOptions::default(),
    );

    let points = &set.target(BOSTON).unwrap().metrics[&Metric::Download];
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].y, 6.0);
}
