//! Spotlight scheduling - hands one window at a time the right to play
//!
//! Every open window registers an [`Instance`] with the
//! [`SpotlightScheduler`]. The scheduler's own loop elects one instance,
//! starts or resumes its engine, pauses the others, and moves on to the next
//! instance in registration order once the spotlight duration runs out.

mod instance;
mod scheduler;

pub use instance::{Instance, InstanceId, WindowHandle};
pub use scheduler::SpotlightScheduler;

use std::time::Duration;
use tracing::warn;

use crate::slideshow::non_zero;

/// Events broadcast by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotlightEvent {
    /// A window registered
    Registered(InstanceId),
    /// A window deregistered
    Deregistered(InstanceId),
    /// An instance's `active` flag was set
    Activated(InstanceId),
    /// An instance's `active` flag was cleared
    Deactivated(InstanceId),
}

/// Scheduler loop timing
#[derive(Debug, Clone, Copy)]
pub struct SpotlightTiming {
    /// How long one instance keeps the spotlight (seconds)
    pub duration_secs: f64,
    /// Sleep between iterations while an instance holds the spotlight
    pub tick: Duration,
    /// Pause right after an election
    pub settle: Duration,
    /// Sleep while there is nothing to rotate
    pub idle_tick: Duration,
}

impl Default for SpotlightTiming {
    fn default() -> Self {
        Self {
            duration_secs: 20.0,
            tick: Duration::from_millis(1000),
            settle: Duration::from_millis(300),
            idle_tick: Duration::from_millis(500),
        }
    }
}

impl SpotlightTiming {
    /// Replace values that would stall rotation with their defaults.
    /// A duration must be finite and not negative, and no interval may be zero.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            duration_secs: if is_valid_duration(self.duration_secs) {
                self.duration_secs
            } else {
                warn!(
                    "Invalid spotlight duration {}, using {}s",
                    self.duration_secs, defaults.duration_secs
                );
                defaults.duration_secs
            },
            tick: non_zero("spotlight tick", self.tick, defaults.tick),
            settle: non_zero("spotlight settle", self.settle, defaults.settle),
            idle_tick: non_zero("spotlight idle tick", self.idle_tick, defaults.idle_tick),
        }
    }
}

pub(crate) fn is_valid_duration(secs: f64) -> bool {
    secs.is_finite() && secs >= 0.0
}
