//! Pause signal and hysteresis tracking
//!
//! An operator pauses measurements by raising an out-of-band signal (by
//! default the presence of a sentinel file). A signal that stays up longer
//! than the hysteresis window is treated as stale: the scheduler clears it
//! and resumes, so a leftover sentinel cannot silence monitoring forever.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

/// Polled boolean pause condition
#[async_trait]
pub trait PauseSignal: Send + Sync {
    async fn is_paused(&self) -> io::Result<bool>;

    /// Lower the signal. Clearing an already clear signal is not an error.
    async fn clear(&self) -> io::Result<()>;
}

/// Pause signal raised by the existence of a file
#[derive(Debug, Clone)]
pub struct FileSentinel {
    path: PathBuf,
}

impl FileSentinel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PauseSignal for FileSentinel {
    async fn is_paused(&self) -> io::Result<bool> {
        tokio::fs::try_exists(&self.path).await
    }

    async fn clear(&self) -> io::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("removed pause sentinel {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-process pause flag
#[derive(Debug, Default)]
pub struct FlagSentinel {
    raised: AtomicBool,
}

impl FlagSentinel {
    pub fn new(raised: bool) -> Self {
        Self {
            raised: AtomicBool::new(raised),
        }
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PauseSignal for FlagSentinel {
    async fn is_paused(&self) -> io::Result<bool> {
        Ok(self.is_raised())
    }

    async fn clear(&self) -> io::Result<()> {
        self.raised.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// What the scheduler does with the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseDecision {
    /// No pause requested, measure
    Run,

    /// Paused; the signal is cleared once `remaining` has elapsed
    Hold { remaining: Duration },

    /// The pause outlived the hysteresis window: clear the signal, skip
    /// this cycle and measure again from the next one
    ForceResume,
}

#[derive(Debug, Clone)]
pub struct PauseTracker {
    hysteresis: TimeDelta,
    paused_since: Option<NaiveDateTime>,
}

impl PauseTracker {
    pub fn new(hysteresis: Duration) -> Self {
        Self {
            hysteresis: TimeDelta::from_std(hysteresis).unwrap_or(TimeDelta::MAX),
            paused_since: None,
        }
    }

    pub fn paused_since(&self) -> Option<NaiveDateTime> {
        self.paused_since
    }

    /// Feed one observation of the pause signal taken at `now`
    pub fn observe(&mut self, paused: bool, now: NaiveDateTime) -> PauseDecision {
        if !paused {
            self.paused_since = None;
            return PauseDecision::Run;
        }

        let since = *self.paused_since.get_or_insert(now);
        let held = now - since;

        if held > self.hysteresis {
            self.paused_since = None;
            return PauseDecision::ForceResume;
        }

        PauseDecision::Hold {
            remaining: (self.hysteresis - held).to_std().unwrap_or(Duration::ZERO),
        }
    }
}
