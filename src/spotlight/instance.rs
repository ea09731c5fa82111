//! A window paired with its slideshow engine

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::slideshow::SlideEngine;

/// Scheduler-assigned identifier, unique for the life of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to the window an instance belongs to.
/// The scheduler never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowHandle(String);

impl WindowHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

/// One registered window
///
/// Clones share the engine and the `active` flag, so the window layer can
/// keep a clone and read what the scheduler decides.
#[derive(Debug, Clone)]
pub struct Instance {
    id: InstanceId,
    engine: SlideEngine,
    window: WindowHandle,
    active: Arc<AtomicBool>,
}

impl Instance {
    pub(crate) fn new(id: InstanceId, engine: SlideEngine, window: WindowHandle) -> Self {
        Self {
            id,
            engine,
            window,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn engine(&self) -> &SlideEngine {
        &self.engine
    }

    pub fn window(&self) -> &WindowHandle {
        &self.window
    }

    /// Whether this instance currently holds the spotlight
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns true if the flag changed
    pub(crate) fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst) != active
    }
}
