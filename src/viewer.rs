//! Headless window layer
//!
//! Stands in for a GUI window: follows one instance's notifications and keeps
//! the title, start-button label and spotlight flag that window would show.
//! It only ever listens; it never reaches into the engine's counters.

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::slide::Slide;
use crate::slideshow::{EngineStatus, SlideEngine};
use crate::spotlight::{Instance, InstanceId, SpotlightEvent, SpotlightScheduler};

pub const MAIN_TITLE: &str = "Image Viewer";

/// Title for a window showing `slide`
pub fn window_title(slide: Option<&Slide>) -> String {
    match slide.and_then(Slide::display_name) {
        Some(name) => format!("{} - {}", MAIN_TITLE, name),
        None => MAIN_TITLE.to_string(),
    }
}

/// Start-button label after `status`
pub fn button_label(status: EngineStatus) -> &'static str {
    match status {
        EngineStatus::CannotStart | EngineStatus::Stopped => "Start Slideshow",
        EngineStatus::CanStart | EngineStatus::Started => "Stop Slideshow",
    }
}

/// What a window currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub title: String,
    pub button: &'static str,
    pub in_spotlight: bool,
}

/// Follows one instance until it is deregistered or shutdown is requested
pub struct Viewer {
    id: InstanceId,
    state: watch::Receiver<ViewState>,
    task: JoinHandle<()>,
}

impl Viewer {
    pub fn attach(
        instance: &Instance,
        scheduler: &SpotlightScheduler,
        runtime: &Handle,
        shutdown: CancellationToken,
    ) -> Self {
        let engine = instance.engine();
        let initial = ViewState {
            title: window_title(engine.current_slide().as_ref()),
            button: engine.status().map(button_label).unwrap_or("Start Slideshow"),
            in_spotlight: instance.is_active(),
        };
        let (state_tx, state) = watch::channel(initial);

        let follower = Follower {
            id: instance.id(),
            label: instance.window().label().to_string(),
            engine: engine.clone(),
            values: engine.subscribe_values(),
            status: engine.subscribe_status(),
            events: scheduler.subscribe(),
            state_tx,
        };
        let task = runtime.spawn(follower.run(shutdown));

        Self {
            id: instance.id(),
            state,
            task,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Watch for view changes
    pub fn changes(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Wait for the follower task to finish
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

struct Follower {
    id: InstanceId,
    label: String,
    /// Read back after a lagged receiver
    engine: SlideEngine,
    values: broadcast::Receiver<Slide>,
    status: broadcast::Receiver<EngineStatus>,
    events: broadcast::Receiver<SpotlightEvent>,
    state_tx: watch::Sender<ViewState>,
}

impl Follower {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let open = tokio::select! {
                _ = shutdown.cancelled() => false,
                value = self.values.recv() => self.on_value(value),
                status = self.status.recv() => self.on_status(status),
                event = self.events.recv() => self.on_event(event),
            };
            if !open {
                break;
            }
        }

        debug!("[{}] Viewer closed", self.label);
    }

    /// Returns false once the engine is gone
    fn on_value(&self, value: Result<Slide, RecvError>) -> bool {
        let title = match value {
            Ok(slide) => window_title(Some(&slide)),
            Err(RecvError::Lagged(skipped)) => {
                debug!("[{}] Skipped {} slide updates", self.label, skipped);
                window_title(self.engine.current_slide().as_ref())
            }
            Err(RecvError::Closed) => return false,
        };
        info!("[{}] {}", self.label, title);
        self.state_tx.send_modify(|view| view.title = title);
        true
    }

    fn on_status(&self, status: Result<EngineStatus, RecvError>) -> bool {
        let status = match status {
            Ok(status) => Some(status),
            Err(RecvError::Lagged(skipped)) => {
                debug!("[{}] Skipped {} status updates", self.label, skipped);
                self.engine.status()
            }
            Err(RecvError::Closed) => return false,
        };
        if let Some(status) = status {
            let button = button_label(status);
            info!("[{}] {} (button: {})", self.label, status, button);
            self.state_tx.send_modify(|view| view.button = button);
        }
        true
    }

    /// Returns false once this instance is deregistered
    fn on_event(&self, event: Result<SpotlightEvent, RecvError>) -> bool {
        match event {
            Ok(SpotlightEvent::Activated(id)) if id == self.id => {
                info!("[{}] In the spotlight", self.label);
                self.state_tx.send_modify(|view| view.in_spotlight = true);
            }
            Ok(SpotlightEvent::Deactivated(id)) if id == self.id => {
                debug!("[{}] Left the spotlight", self.label);
                self.state_tx.send_modify(|view| view.in_spotlight = false);
            }
            Ok(SpotlightEvent::Deregistered(id)) if id == self.id => return false,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return false,
        }
        true
    }
}
