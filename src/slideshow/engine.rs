//! Slide engine
//!
//! Owns the ordered slides of one window and a background tick loop that
//! advances them on a delay. The window layer drives it through plain
//! synchronous calls and learns about changes only through two broadcast
//! channels: one carrying the newly-current [`Slide`], one carrying
//! [`EngineStatus`] transitions.
//!
//! Every mutation happens under one lock per engine, and notifications are
//! sent while that lock is held so they arrive in the order the state
//! actually changed.
//!
//! Lifecycle is one-way: an engine can be started once and stopped once.
//! Pausing is the reversible way to halt it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EngineStatus, EngineTiming};
use crate::error::SlideError;
use crate::slide::{ImageLoader, Slide};

/// Upper bound for the per-slide delay (seconds)
pub const MAX_DELAY_SECS: f64 = 5.0;

const VALUE_CHANNEL_CAPACITY: usize = 64;
const STATUS_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct EngineState {
    slides: Vec<Slide>,
    /// Raw position; always read modulo `slides.len()`
    current_index: usize,
    delay_secs: f64,
    elapsed_secs: f64,
    lifecycle: Lifecycle,
    paused: bool,
    last_status: Option<EngineStatus>,
}

impl EngineState {
    fn position(&self) -> Option<usize> {
        if self.slides.is_empty() {
            None
        } else {
            Some(self.current_index % self.slides.len())
        }
    }

    fn step(&mut self, forward: bool) -> Option<Slide> {
        let len = self.slides.len();
        let position = self.position()?;
        self.current_index = if forward {
            (position + 1) % len
        } else {
            (position + len - 1) % len
        };
        Some(self.slides[self.current_index].clone())
    }
}

struct Shared {
    name: String,
    timing: EngineTiming,
    loader: Arc<dyn ImageLoader>,
    runtime: Handle,
    state: Mutex<EngineState>,
    value_tx: broadcast::Sender<Slide>,
    status_tx: broadcast::Sender<EngineStatus>,
    /// Wakes a paused loop as soon as it is unpaused
    resume: Notify,
    cancel: CancellationToken,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_paused(&self) -> bool {
        self.state().paused
    }

    fn emit_status(&self, state: &mut EngineState, status: EngineStatus) {
        debug!("[{}] Status: {}", self.name, status);
        state.last_status = Some(status);
        let _ = self.status_tx.send(status);
    }

    fn emit_value(&self, slide: &Slide) {
        let _ = self.value_tx.send(slide.clone());
    }

    /// Account one running tick and advance once the delay has passed
    fn tick(&self) {
        let mut state = self.state();
        if state.paused || state.lifecycle != Lifecycle::Running {
            return;
        }

        state.elapsed_secs += self.timing.tick.as_secs_f64();
        if state.elapsed_secs >= state.delay_secs {
            state.elapsed_secs = 0.0;
            if let Some(slide) = state.step(true) {
                debug!("[{}] Advanced to {:?}", self.name, slide.path());
                self.emit_value(&slide);
            }
        }
    }
}

async fn run_tick_loop(shared: Arc<Shared>) {
    info!("[{}] Slideshow loop started", shared.name);

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        if shared.is_paused() {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                _ = shared.resume.notified() => {}
                _ = tokio::time::sleep(shared.timing.paused_tick) => {}
            }
            continue;
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.timing.tick) => {}
        }
        shared.tick();
    }

    info!("[{}] Slideshow loop exited", shared.name);
}

/// Sequencer for one window's slides
///
/// Cheap to clone; clones share the same slides, loop and channels.
#[derive(Clone)]
pub struct SlideEngine {
    shared: Arc<Shared>,
}

impl SlideEngine {
    /// Create an idle engine. The tick loop is spawned on `runtime` by [`start`](Self::start).
    pub fn new(
        name: impl Into<String>,
        timing: EngineTiming,
        loader: Arc<dyn ImageLoader>,
        runtime: Handle,
    ) -> Self {
        let timing = timing.sanitized();
        let (value_tx, _) = broadcast::channel(VALUE_CHANNEL_CAPACITY);
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        let state = EngineState {
            slides: Vec::new(),
            current_index: 0,
            delay_secs: timing.default_delay_secs.min(MAX_DELAY_SECS),
            elapsed_secs: 0.0,
            lifecycle: Lifecycle::Idle,
            paused: false,
            last_status: None,
        };

        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                timing,
                loader,
                runtime,
                state: Mutex::new(state),
                value_tx,
                status_tx,
                resume: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Receive every newly-current slide
    pub fn subscribe_values(&self) -> broadcast::Receiver<Slide> {
        self.shared.value_tx.subscribe()
    }

    /// Receive every status transition
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Load the image at `path` and append it.
    ///
    /// Nothing is added when the image can't be loaded; the error is logged
    /// and handed back for the caller to ignore or report.
    pub fn add_slide(&self, path: impl AsRef<Path>) -> Result<(), SlideError> {
        let path = path.as_ref();
        match Slide::try_load(path, self.shared.loader.as_ref()) {
            Ok(slide) => {
                self.push_slides(vec![slide]);
                Ok(())
            }
            Err(e) => {
                warn!("[{}] Skipping slide: {}", self.shared.name, e);
                Err(e)
            }
        }
    }

    /// Add each path in turn, skipping the ones that fail. Returns how many were added.
    pub fn add_slide_paths<I, P>(&self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .filter(|path| self.add_slide(path).is_ok())
            .count()
    }

    /// Append already-built slides. Slides that failed to load are dropped.
    pub fn add_slides(&self, slides: Vec<Slide>) -> usize {
        if slides.is_empty() {
            return 0;
        }

        let (loaded, unloaded): (Vec<_>, Vec<_>) = slides.into_iter().partition(Slide::is_loaded);
        for slide in &unloaded {
            warn!("[{}] Dropping unloaded slide {:?}", self.shared.name, slide.path());
        }

        self.push_slides(loaded)
    }

    fn push_slides(&self, slides: Vec<Slide>) -> usize {
        if slides.is_empty() {
            return 0;
        }

        let count = slides.len();
        let mut state = self.shared.state();
        let was_empty = state.slides.is_empty();
        state.slides.extend(slides);
        debug!("[{}] {} slide(s) added, {} total", self.shared.name, count, state.slides.len());

        if was_empty && state.lifecycle == Lifecycle::Idle {
            self.shared.emit_status(&mut state, EngineStatus::CanStart);
        }
        count
    }

    /// Remove the first slide with this path
    pub fn remove_slide(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut state = self.shared.state();
        match state.slides.iter().position(|slide| slide.path() == path) {
            Some(index) => {
                state.slides.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the slide at `index` in insertion order
    pub fn remove_slide_at(&self, index: usize) -> bool {
        let mut state = self.shared.state();
        if index < state.slides.len() {
            state.slides.remove(index);
            true
        } else {
            false
        }
    }

    /// Slide at `index` in insertion order
    pub fn slide(&self, index: usize) -> Option<Slide> {
        self.shared.state().slides.get(index).cloned()
    }

    pub fn slide_by_path(&self, path: impl AsRef<Path>) -> Option<Slide> {
        let path = path.as_ref();
        self.shared
            .state()
            .slides
            .iter()
            .find(|slide| slide.path() == path)
            .cloned()
    }

    pub fn has_slide(&self, path: impl AsRef<Path>) -> bool {
        self.slide_by_path(path).is_some()
    }

    pub fn slides(&self) -> Vec<Slide> {
        self.shared.state().slides.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state().slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state().slides.is_empty()
    }

    /// Index of the current slide, if there is one
    pub fn position(&self) -> Option<usize> {
        self.shared.state().position()
    }

    pub fn current_slide(&self) -> Option<Slide> {
        let state = self.shared.state();
        state.position().map(|index| state.slides[index].clone())
    }

    /// Move forward one slide, wrapping at the end
    pub fn next(&self) -> Option<Slide> {
        self.navigate(true)
    }

    /// Move back one slide, wrapping at the start
    pub fn previous(&self) -> Option<Slide> {
        self.navigate(false)
    }

    fn navigate(&self, forward: bool) -> Option<Slide> {
        let mut state = self.shared.state();
        let slide = state.step(forward)?;
        self.shared.emit_value(&slide);
        Some(slide)
    }

    /// Set the per-slide delay, capped at [`MAX_DELAY_SECS`].
    /// Zero or negative delays advance on every tick.
    pub fn set_delay(&self, secs: f64) {
        if secs.is_nan() {
            warn!("[{}] Ignoring NaN slide delay", self.shared.name);
            return;
        }
        self.shared.state().delay_secs = secs.min(MAX_DELAY_SECS);
    }

    pub fn delay(&self) -> f64 {
        self.shared.state().delay_secs
    }

    /// Spawn the tick loop. Refused (with `CANNOT_START`) when the engine has
    /// already been started or has nothing to show.
    pub fn start(&self) -> bool {
        let mut state = self.shared.state();

        match state.lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running => {
                warn!("[{}] Slideshow already running", self.shared.name);
                self.shared.emit_status(&mut state, EngineStatus::CannotStart);
                return false;
            }
            Lifecycle::Stopped => {
                warn!("[{}] Slideshow was stopped and cannot be restarted", self.shared.name);
                self.shared.emit_status(&mut state, EngineStatus::CannotStart);
                return false;
            }
        }

        if state.slides.is_empty() {
            warn!("[{}] No slides found! Please add some first.", self.shared.name);
            self.shared.emit_status(&mut state, EngineStatus::CannotStart);
            return false;
        }

        state.lifecycle = Lifecycle::Running;
        state.paused = false;
        state.elapsed_secs = 0.0;
        self.shared.emit_status(&mut state, EngineStatus::Started);

        self.shared.runtime.spawn(run_tick_loop(Arc::clone(&self.shared)));
        info!(
            "[{}] Slideshow started with {} slides, {:.2}s delay",
            self.shared.name,
            state.slides.len(),
            state.delay_secs
        );
        true
    }

    /// Halt advancing. No-op unless running and not already paused.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state();
        if state.lifecycle != Lifecycle::Running || state.paused {
            return false;
        }

        state.paused = true;
        self.shared.emit_status(&mut state, EngineStatus::Stopped);
        true
    }

    /// Resume advancing. No-op unless paused.
    pub fn unpause(&self) -> bool {
        let mut state = self.shared.state();
        if !state.paused {
            return false;
        }

        state.paused = false;
        self.shared.emit_status(&mut state, EngineStatus::Started);
        self.shared.resume.notify_one();
        true
    }

    /// End the tick loop for good. Use [`pause`](Self::pause) for a reversible halt.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state();
        if state.lifecycle != Lifecycle::Running {
            return false;
        }

        state.lifecycle = Lifecycle::Stopped;
        state.paused = false;
        self.shared.cancel.cancel();
        self.shared.emit_status(&mut state, EngineStatus::Stopped);
        info!("[{}] Killed slideshow loop", self.shared.name);
        true
    }

    /// True while the tick loop is alive
    pub fn is_running(&self) -> bool {
        self.shared.state().lifecycle == Lifecycle::Running
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// True once `start` has succeeded, even after `stop`
    pub fn has_started(&self) -> bool {
        self.shared.state().lifecycle != Lifecycle::Idle
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.state().lifecycle == Lifecycle::Stopped
    }

    /// Running with something to show
    pub fn can_start(&self) -> bool {
        let state = self.shared.state();
        state.lifecycle == Lifecycle::Running && !state.slides.is_empty()
    }

    /// Last status broadcast, if any
    pub fn status(&self) -> Option<EngineStatus> {
        self.shared.state().last_status
    }
}

impl std::fmt::Debug for SlideEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("SlideEngine")
            .field("name", &self.shared.name)
            .field("slides", &state.slides.len())
            .field("position", &state.position())
            .field("lifecycle", &state.lifecycle)
            .field("paused", &state.paused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::testing::MemoryLoader;
    use std::path::PathBuf;
    use std::time::Duration;

    fn engine_with(paths: &[&str]) -> SlideEngine {
        let engine = SlideEngine::new("test", EngineTiming::default(), MemoryLoader::any(), Handle::current());
        for path in paths {
            engine.add_slide(path).unwrap();
        }
        engine
    }

    fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn paths(slides: &[Slide]) -> Vec<PathBuf> {
        slides.iter().map(|s| s.path().to_path_buf()).collect()
    }

    #[tokio::test]
    async fn test_next_and_previous_are_inverse() {
        let engine = engine_with(&["a.png", "b.png", "c.png"]);
        assert_eq!(engine.position(), Some(0));

        engine.next();
        engine.previous();
        assert_eq!(engine.position(), Some(0));

        engine.previous();
        assert_eq!(engine.position(), Some(2));
        engine.next();
        assert_eq!(engine.position(), Some(0));
    }

    #[tokio::test]
    async fn test_next_wraps_after_full_cycle() {
        let engine = engine_with(&["a.png", "b.png", "c.png", "d.png"]);
        let start = engine.current_slide().unwrap();
        for _ in 0..engine.len() {
            engine.next();
        }
        assert_eq!(engine.current_slide().unwrap().path(), start.path());
    }

    #[tokio::test]
    async fn test_navigation_emits_values() {
        let engine = engine_with(&["a.png", "b.png"]);
        let mut values = engine.subscribe_values();

        engine.next();
        engine.previous();

        assert_eq!(
            paths(&drain(&mut values)),
            vec![PathBuf::from("b.png"), PathBuf::from("a.png")]
        );
    }

    #[tokio::test]
    async fn test_empty_engine_refuses_everything() {
        let engine = engine_with(&[]);
        let mut status = engine.subscribe_status();

        assert!(engine.next().is_none());
        assert!(engine.previous().is_none());
        assert!(engine.current_slide().is_none());
        assert!(!engine.can_start());

        assert!(!engine.start());
        assert!(!engine.is_running());
        assert_eq!(drain(&mut status), vec![EngineStatus::CannotStart]);
        assert_eq!(engine.status(), Some(EngineStatus::CannotStart));
    }

    #[tokio::test]
    async fn test_delay_is_capped() {
        let engine = engine_with(&["a.png"]);
        engine.set_delay(7.5);
        assert_eq!(engine.delay(), MAX_DELAY_SECS);
        engine.set_delay(3.0);
        assert_eq!(engine.delay(), 3.0);
        engine.set_delay(0.0);
        assert_eq!(engine.delay(), 0.0);
        engine.set_delay(-1.0);
        assert_eq!(engine.delay(), -1.0);
        engine.set_delay(f64::NAN);
        assert_eq!(engine.delay(), -1.0);
    }

    #[tokio::test]
    async fn test_pause_when_not_running_is_silent() {
        let engine = engine_with(&["a.png"]);
        let mut status = engine.subscribe_status();

        assert!(!engine.pause());
        assert!(!engine.is_paused());
        assert!(drain(&mut status).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_pause_notifies_once() {
        let engine = engine_with(&["a.png"]);
        assert!(engine.start());
        let mut status = engine.subscribe_status();

        assert!(engine.pause());
        assert!(!engine.pause());
        assert_eq!(drain(&mut status), vec![EngineStatus::Stopped]);

        assert!(engine.unpause());
        assert!(!engine.unpause());
        assert_eq!(drain(&mut status), vec![EngineStatus::Started]);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_slides_advance_each_second() {
        let engine = engine_with(&["a.png", "b.png"]);
        engine.set_delay(1.0);
        let mut values = engine.subscribe_values();

        assert!(engine.start());
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(
            paths(&drain(&mut values)),
            vec![PathBuf::from("b.png"), PathBuf::from("a.png")]
        );
        assert_eq!(engine.position(), Some(0));
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_advances_every_tick() {
        let engine = engine_with(&["a.png", "b.png", "c.png"]);
        engine.set_delay(0.0);
        let mut values = engine.subscribe_values();

        engine.start();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert_eq!(drain(&mut values).len(), 3);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_longer_delay_within_one_tick() {
        let engine = engine_with(&["a.png", "b.png"]);
        engine.set_delay(2.5);
        let mut values = engine.subscribe_values();

        engine.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(drain(&mut values).is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(drain(&mut values).len(), 1);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_engine_holds_position() {
        let engine = engine_with(&["a.png", "b.png"]);
        let mut values = engine.subscribe_values();

        engine.start();
        engine.pause();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(drain(&mut values).is_empty());
        assert_eq!(engine.position(), Some(0));

        engine.unpause();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(paths(&drain(&mut values)), vec![PathBuf::from("b.png")]);
        engine.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_final() {
        let engine = engine_with(&["a.png", "b.png"]);
        let mut values = engine.subscribe_values();
        let mut status = engine.subscribe_status();

        assert!(engine.start());
        assert!(engine.stop());
        assert!(!engine.stop());
        assert!(!engine.is_running());
        assert!(engine.is_stopped());

        assert!(!engine.start());
        assert_eq!(
            drain(&mut status),
            vec![EngineStatus::Started, EngineStatus::Stopped, EngineStatus::CannotStart]
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut values).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_refused() {
        let engine = engine_with(&["a.png"]);
        assert!(engine.start());
        assert!(engine.can_start());

        let mut status = engine.subscribe_status();
        assert!(!engine.start());
        assert!(engine.is_running());
        assert_eq!(drain(&mut status), vec![EngineStatus::CannotStart]);
        engine.stop();
    }

    #[tokio::test]
    async fn test_missing_source_is_not_added() {
        let engine = SlideEngine::new(
            "test",
            EngineTiming::default(),
            MemoryLoader::with_paths(["a.png", "b.png"]),
            Handle::current(),
        );

        assert!(engine.add_slide("a.png").is_ok());
        assert!(engine.add_slide("missing.png").unwrap_err().is_not_found());
        assert_eq!(engine.len(), 1);

        let added = engine.add_slide_paths(["gone.png", "b.png", "also-gone.png"]);
        assert_eq!(added, 1);
        assert_eq!(paths(&engine.slides()), vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    }

    #[tokio::test]
    async fn test_add_slides_keeps_only_loaded() {
        let loader = MemoryLoader::with_paths(["a.png"]);
        let engine = SlideEngine::new("test", EngineTiming::default(), loader.clone(), Handle::current());

        assert_eq!(engine.add_slides(Vec::new()), 0);

        let slides = vec![
            Slide::load("a.png", loader.as_ref()),
            Slide::load("nope.png", loader.as_ref()),
            Slide::load("a.png", loader.as_ref()),
        ];
        assert_eq!(engine.add_slides(slides), 2);
        assert_eq!(engine.len(), 2);
    }

    #[tokio::test]
    async fn test_can_start_announced_once() {
        let engine = engine_with(&[]);
        let mut status = engine.subscribe_status();

        engine.add_slide("a.png").unwrap();
        engine.add_slide("b.png").unwrap();
        assert_eq!(drain(&mut status), vec![EngineStatus::CanStart]);
    }

    #[tokio::test]
    async fn test_remove_and_lookup() {
        let engine = engine_with(&["a.png", "b.png", "a.png", "c.png"]);

        assert!(engine.has_slide("c.png"));
        assert!(engine.slide(3).is_some());
        assert!(engine.slide(4).is_none());

        assert!(engine.remove_slide("a.png"));
        assert_eq!(
            paths(&engine.slides()),
            vec![PathBuf::from("b.png"), PathBuf::from("a.png"), PathBuf::from("c.png")]
        );
        assert!(!engine.remove_slide("zzz.png"));

        assert!(engine.remove_slide_at(2));
        assert!(!engine.remove_slide_at(2));
        assert!(!engine.has_slide("c.png"));
        assert_eq!(engine.len(), 2);
    }

    #[tokio::test]
    async fn test_position_renormalizes_after_removal() {
        let engine = engine_with(&["a.png", "b.png", "c.png"]);
        engine.next();
        engine.next();
        assert_eq!(engine.position(), Some(2));

        engine.remove_slide("c.png");
        assert_eq!(engine.position(), Some(0));
        assert_eq!(engine.current_slide().unwrap().path(), Path::new("a.png"));

        engine.remove_slide_at(0);
        engine.remove_slide_at(0);
        assert_eq!(engine.position(), None);
        assert!(engine.next().is_none());
    }
}
