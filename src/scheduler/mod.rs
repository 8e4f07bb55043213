//! Scheduler - drives measurement cycles on wall-clock boundaries
//!
//! ## Message Flow
//!
//! ```text
//! start → cycle ─┬→ wait for next boundary → wait jitter → check pause ─┐
//!                │       ↑                                             │
//!                │       └── Commands (RunNow, GetStats, Shutdown)     │
//!                └──────────────────────────────────────────────────────┘
//! ```
//!
//! The scheduler is a single task; cycles never overlap. A failing cycle is
//! logged and the loop carries on with the next boundary. Commands are
//! served while the scheduler is suspended, so shutdown never waits for a
//! boundary to arrive.

pub mod pause;
pub mod timing;

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::collector::Collector;

pub use pause::{FileSentinel, FlagSentinel, PauseDecision, PauseSignal, PauseTracker};
pub use timing::{Clock, LocalClock, ScheduleSettings, duration_until, jitter, next_boundary};

/// Work run after every successful collection cycle
#[async_trait]
pub trait CycleHook: Send + Sync {
    async fn after_cycle(&self) -> Result<()>;
}

/// Commands that can be sent to a running [`Scheduler`]
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a collection cycle right away, outside the boundary grid
    RunNow {
        respond_to: oneshot::Sender<Result<usize>>,
    },

    GetStats {
        respond_to: oneshot::Sender<SchedulerStats>,
    },

    /// Stop at the next suspension point
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Collection cycles started, including failed ones
    pub cycles_run: u64,
    pub failed_cycles: u64,

    /// Cycles skipped because the pause signal was up
    pub paused_cycles: u64,

    /// Stale pause signals cleared by the scheduler
    pub forced_resumes: u64,
}

pub struct Scheduler {
    settings: ScheduleSettings,
    collector: Arc<Collector>,
    pause: Arc<dyn PauseSignal>,
    tracker: PauseTracker,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    hooks: Vec<Arc<dyn CycleHook>>,

    /// Boundary waited for by the previous iteration
    last_boundary: Option<NaiveDateTime>,

    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(
        settings: ScheduleSettings,
        collector: Arc<Collector>,
        pause: Arc<dyn PauseSignal>,
    ) -> Self {
        Self {
            settings,
            collector,
            pause,
            tracker: PauseTracker::new(settings.pause_hysteresis),
            clock: Arc::new(LocalClock),
            rng: StdRng::from_os_rng(),
            hooks: Vec::new(),
            last_boundary: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn CycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run until a Shutdown command arrives or the command channel closes
    #[instrument(skip_all, fields(period_secs = self.settings.period.as_secs()))]
    pub async fn run(mut self, mut commands: mpsc::Receiver<SchedulerCommand>) {
        info!(
            "measuring {} targets every {} minutes",
            self.collector.targets().len(),
            self.settings.period.as_secs() / 60
        );

        if let Err(e) = self.run_cycle().await {
            error!("initial measurement cycle failed: {e:#}");
        }

        loop {
            let now = self.clock.now();
            let boundary = self.next_slot(now);
            trace!("next boundary at {boundary}");

            if self
                .suspend(duration_until(now, boundary), &mut commands)
                .await
                .is_break()
            {
                break;
            }

            let offset = jitter(self.settings.period, &mut self.rng);
            debug!("waiting {}s past the boundary", offset.as_secs());

            if self.suspend(offset, &mut commands).await.is_break() {
                break;
            }

            self.tick().await;
        }

        info!("scheduler stopped");
    }

    /// Boundary for this iteration; one already consumed is skipped
    fn next_slot(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let mut boundary = next_boundary(now, self.settings.period);

        if let Some(last) = self.last_boundary
            && boundary <= last
        {
            boundary = next_boundary(last + TimeDelta::nanoseconds(1), self.settings.period);
        }

        self.last_boundary = Some(boundary);
        boundary
    }

    /// Sleep for `duration` while serving commands
    async fn suspend(
        &mut self,
        duration: Duration,
        commands: &mut mpsc::Receiver<SchedulerCommand>,
    ) -> ControlFlow<()> {
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return ControlFlow::Continue(()),

                command = commands.recv() => match command {
                    Some(SchedulerCommand::RunNow { respond_to }) => {
                        debug!("received RunNow command");
                        let result = self.run_cycle().await;
                        let _ = respond_to.send(result);
                    }

                    Some(SchedulerCommand::GetStats { respond_to }) => {
                        let _ = respond_to.send(self.stats);
                    }

                    Some(SchedulerCommand::Shutdown) => {
                        debug!("received shutdown command");
                        return ControlFlow::Break(());
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        return ControlFlow::Break(());
                    }
                },
            }
        }
    }

    /// One scheduled iteration: consult the pause signal, then measure or hold
    async fn tick(&mut self) {
        let now = self.clock.now();

        let paused = match self.pause.is_paused().await {
            Ok(paused) => paused,
            Err(e) => {
                warn!("could not read pause signal, assuming not paused: {e}");
                false
            }
        };

        match self.tracker.observe(paused, now) {
            PauseDecision::Run => {
                if let Err(e) = self.run_cycle().await {
                    error!("measurement cycle failed: {e:#}");
                }
            }

            PauseDecision::Hold { remaining } => {
                self.stats.paused_cycles += 1;
                if let Some(since) = self.tracker.paused_since() {
                    info!(
                        "measurements paused since {since}, resuming in at most {} minutes",
                        remaining.as_secs().div_ceil(60)
                    );
                }
            }

            PauseDecision::ForceResume => {
                self.stats.forced_resumes += 1;
                warn!(
                    "pause signal held for more than {} minutes, clearing it",
                    self.settings.pause_hysteresis.as_secs() / 60
                );
                if let Err(e) = self.pause.clear().await {
                    error!("failed to clear pause signal: {e}");
                }
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<usize> {
        self.stats.cycles_run += 1;
        let timestamp = self.clock.now();

        match self.collector.collect_all(timestamp).await {
            Ok(written) => {
                for hook in &self.hooks {
                    if let Err(e) = hook.after_cycle().await {
                        error!("post-cycle task failed: {e:#}");
                    }
                }
                Ok(written)
            }
            Err(e) => {
                self.stats.failed_cycles += 1;
                Err(e)
            }
        }
    }
}

/// Handle for controlling a spawned [`Scheduler`]
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler as a tokio task
    pub fn spawn(scheduler: Scheduler) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(32);
        let task = tokio::spawn(scheduler.run(receiver));
        (Self { sender }, task)
    }

    /// Run a collection cycle immediately and return the number of records written
    pub async fn run_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn stats(&self) -> Result<SchedulerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    /// Wait until the scheduler task ends or `interrupt` resolves
    ///
    /// On interrupt the scheduler is shut down and joined. A task that
    /// panicked or was cancelled is reported as an error.
    pub async fn supervise<F>(self, mut task: JoinHandle<()>, interrupt: F) -> Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        tokio::select! {
            result = &mut task => {
                result.context("scheduler task failed")?;
                warn!("scheduler stopped without being asked to");
            }

            signal = interrupt => {
                signal.context("failed to listen for interrupt")?;
                info!("interrupted, stopping after the current cycle");
                self.shutdown().await?;
                task.await.context("scheduler task failed")?;
            }
        }

        Ok(())
    }
}
