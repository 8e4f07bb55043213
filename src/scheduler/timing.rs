//! Wall-clock alignment and jitter
//!
//! Boundaries are anchored to local midnight, not to process start, so
//! "the 14:00 measurement" means the same slot on every day and across
//! restarts.

use std::time::Duration;

use anyhow::bail;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use rand::Rng;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of the current local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Validated scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub period: Duration,
    pub pause_hysteresis: Duration,
}

impl ScheduleSettings {
    pub fn new(period: Duration, pause_hysteresis: Duration) -> anyhow::Result<Self> {
        if period.is_zero() {
            bail!("measurement period must be greater than zero");
        }
        if period >= DAY {
            bail!("measurement period must be shorter than a day");
        }
        if pause_hysteresis < period {
            bail!("pause hysteresis must not be shorter than the measurement period");
        }

        Ok(Self {
            period,
            pause_hysteresis,
        })
    }
}

fn midnight(at: NaiveDateTime) -> NaiveDateTime {
    at.date().and_time(NaiveTime::MIN)
}

/// Smallest instant `>= now` that is a whole multiple of `period` after
/// local midnight.
///
/// When `period` does not divide a day evenly, the last slot of the day is
/// cut short by the following midnight, which is itself a boundary.
pub fn next_boundary(now: NaiveDateTime, period: Duration) -> NaiveDateTime {
    let start_of_day = midnight(now);
    let period_ns = period.as_nanos().max(1) as i64;
    let elapsed_ns = (now - start_of_day).num_nanoseconds().unwrap_or(0);

    let slots = (elapsed_ns + period_ns - 1) / period_ns;
    let boundary = start_of_day + TimeDelta::nanoseconds(slots * period_ns);

    boundary.min(start_of_day + TimeDelta::days(1))
}

/// Uniformly random offset in `[0, period)` with one second granularity
pub fn jitter(period: Duration, rng: &mut impl Rng) -> Duration {
    let upper = period.as_secs().max(1);
    Duration::from_secs(rng.random_range(0..upper))
        .min(period.saturating_sub(Duration::from_nanos(1)))
}

/// Time left until `at`, never negative
pub fn duration_until(now: NaiveDateTime, at: NaiveDateTime) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
