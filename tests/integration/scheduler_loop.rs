//! Scheduler tests on a paused tokio clock
//!
//! These tests verify that:
//! - Collections land in distinct period slots
//! - A stale pause sentinel is removed and measuring resumes
//! - Post-cycle hooks run after each successful cycle

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use speedwatch::collector::Collector;
use speedwatch::scheduler::{
    CycleHook, FlagSentinel, PauseSignal, ScheduleSettings, Scheduler, SchedulerHandle,
};
use speedwatch::storage::MemoryStore;

use crate::helpers::*;

const PERIOD: Duration = Duration::from_secs(20 * 60);

#[derive(Default)]
struct CountingHook(AtomicUsize);

#[async_trait]
impl CycleHook for CountingHook {
    async fn after_cycle(&self) -> anyhow::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn spawn(
    hysteresis: Duration,
    pause: Arc<dyn PauseSignal>,
    store: Arc<MemoryStore>,
    hook: Arc<CountingHook>,
) -> (SchedulerHandle, tokio::task::JoinHandle<()>) {
    let probe = ScriptedProbe::new()
        .respond(BOSTON, speedtest_json(BOSTON, 1_000_000, 100_000, 9.0))
        .respond(BURLINGTON, speedtest_json(BURLINGTON, 2_000_000, 200_000, 3.0));
    let collector = Collector::new(
        test_targets(),
        Arc::new(probe),
        store,
        Duration::from_secs(60),
    );

    let scheduler = Scheduler::new(
        ScheduleSettings::new(PERIOD, hysteresis).unwrap(),
        Arc::new(collector),
        pause,
    )
    .with_clock(Arc::new(TokioClock::starting_at(at(3, 6, 55))))
    .with_rng(StdRng::seed_from_u64(1))
    .with_hook(hook);

    SchedulerHandle::spawn(scheduler)
}

#[tokio::test(start_paused = true)]
async fn test_day_of_measurements() {
    let store = Arc::new(MemoryStore::new());
    let hook = Arc::new(CountingHook::default());
    let (handle, task) = spawn(
        Duration::from_secs(3 * 3600),
        Arc::new(FlagSentinel::new(false)),
        store.clone(),
        hook.clone(),
    );

    tokio::time::sleep(Duration::from_secs(6 * 3600)).await;

    let stats = handle.stats().await.unwrap();
    // start-up cycle plus one per slot, the last one may still be pending
    assert!((18..=19).contains(&stats.cycles_run), "{stats:?}");
    assert_eq!(hook.0.load(Ordering::SeqCst) as u64, stats.cycles_run);
    assert_eq!(store.len().await as u64, stats.cycles_run * 2);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_resumes_after_stale_pause() {
    let store = Arc::new(MemoryStore::new());
    let hook = Arc::new(CountingHook::default());
    let flag = Arc::new(FlagSentinel::new(true));
    let (handle, task) = spawn(
        Duration::from_secs(3600),
        flag.clone(),
        store.clone(),
        hook,
    );

    tokio::time::sleep(Duration::from_secs(4 * 3600)).await;

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.forced_resumes, 1);
    assert!(!flag.is_raised());
    // measuring again after the forced resume
    assert!(stats.cycles_run > 1, "{stats:?}");

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pause_raised_mid_run() {
    let store = Arc::new(MemoryStore::new());
    let hook = Arc::new(CountingHook::default());
    let flag = Arc::new(FlagSentinel::new(false));
    let (handle, task) = spawn(
        Duration::from_secs(3 * 3600),
        flag.clone(),
        store.clone(),
        hook,
    );

    tokio::time::sleep(Duration::from_secs(3600)).await;
    flag.raise();
    let before = handle.stats().await.unwrap().cycles_run;

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    let stats = handle.stats().await.unwrap();

    assert_eq!(stats.cycles_run, before);
    assert!(stats.paused_cycles >= 5, "{stats:?}");
    assert!(flag.is_raised());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}
