//! Per-window slideshow engine - advances slides on a timer

mod engine;

pub use engine::{SlideEngine, MAX_DELAY_SECS};

use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Status updates broadcast by a [`SlideEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// The engine has slides and is waiting to be started
    CanStart,
    /// A start request was refused (already started, or nothing to show)
    CannotStart,
    /// The tick loop is running (started or unpaused)
    Started,
    /// Slides are no longer advancing (paused or stopped)
    Stopped,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::CanStart => "CAN_START",
            EngineStatus::CannotStart => "CANNOT_START",
            EngineStatus::Started => "STARTED",
            EngineStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tick loop timing for an engine
#[derive(Debug, Clone, Copy)]
pub struct EngineTiming {
    /// Sleep between iterations while running
    pub tick: Duration,
    /// Sleep between re-checks while paused
    pub paused_tick: Duration,
    /// Delay a fresh engine starts with (seconds)
    pub default_delay_secs: f64,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            paused_tick: Duration::from_millis(500),
            default_delay_secs: 1.0,
        }
    }
}

impl EngineTiming {
    /// Replace zero intervals and a NaN delay with their defaults
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            tick: non_zero("slideshow tick", self.tick, defaults.tick),
            paused_tick: non_zero("slideshow paused tick", self.paused_tick, defaults.paused_tick),
            default_delay_secs: if self.default_delay_secs.is_nan() {
                warn!("Slide delay is NaN, using {}s", defaults.default_delay_secs);
                defaults.default_delay_secs
            } else {
                self.default_delay_secs
            },
        }
    }
}

/// `value`, or `fallback` with a warning when `value` is zero
pub(crate) fn non_zero(what: &str, value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        warn!("{} interval must not be zero, using {:?}", what, fallback);
        fallback
    } else {
        value
    }
}
