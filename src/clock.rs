//! Experiment time base.
//!
//! All timestamps in the artifacts are seconds relative to the first
//! successful time read of the run. Reading the time source may fail (a wall
//! clock that steps backwards, for instance); callers treat that as fatal.

use crate::config::TimeBase;
use crate::error::{AppResult, DaqError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Something that can tell the current time as an offset from a fixed origin.
pub trait TimeSource: Send {
    /// Current time since the source's own origin.
    fn now(&self) -> AppResult<Duration>;
}

/// Monotonic source backed by [`Instant`]. Never fails.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> AppResult<Duration> {
        Ok(self.origin.elapsed())
    }
}

/// Wall-clock source (seconds since the Unix epoch).
#[derive(Debug, Clone, Copy, Default)]
pub struct WallTime;

impl TimeSource for WallTime {
    fn now(&self) -> AppResult<Duration> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| DaqError::Clock(e.to_string()))
    }
}

/// Clock whose first successful reading defines t = 0.
pub struct ExperimentClock {
    source: Box<dyn TimeSource>,
    epoch: Option<Duration>,
}

impl Default for ExperimentClock {
    fn default() -> Self {
        Self::new(MonotonicTime::default())
    }
}

impl ExperimentClock {
    /// Wrap a time source. The epoch is fixed lazily on the first read.
    pub fn new(source: impl TimeSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            epoch: None,
        }
    }

    /// Clock over the configured time base.
    pub fn for_time_base(time_base: TimeBase) -> Self {
        match time_base {
            TimeBase::Monotonic => Self::default(),
            TimeBase::Wall => Self::new(WallTime),
        }
    }

    /// Seconds since the first successful read.
    pub fn elapsed_secs(&mut self) -> AppResult<f64> {
        let now = self.source.now()?;
        let epoch = *self.epoch.get_or_insert(now);
        Ok(now.saturating_sub(epoch).as_secs_f64())
    }
}
