//! Spotlight scheduler
//!
//! Keeps the registry of instances and runs a loop that rotates the
//! spotlight among them in registration order. With zero or one registered
//! instance there is nothing to rotate and the sole instance is left active
//! under its own control.
//!
//! Lock order: the registry lock is always taken before any engine lock.
//! Engines never call back into the scheduler.
//!
//! One scheduler is created by process startup and handed to whoever
//! needs it; it lives until the process shuts it down.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{is_valid_duration, Instance, InstanceId, SpotlightEvent, SpotlightTiming, WindowHandle};
use crate::slide::ImageLoader;
use crate::slideshow::{EngineTiming, SlideEngine};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct Registry {
    instances: Vec<Instance>,
    next_id: u64,
    /// Index of the last elected instance; `None` means the next election picks index 0
    cursor: Option<usize>,
    current: Option<InstanceId>,
    spotlight_elapsed: f64,
    duration_secs: f64,
    lifecycle: Lifecycle,
}

impl Registry {
    fn index_of(&self, id: InstanceId) -> Option<usize> {
        self.instances.iter().position(|instance| instance.id() == id)
    }

    fn is_any_other_playing_than(&self, id: InstanceId) -> bool {
        self.instances.iter().any(|instance| {
            instance.id() != id && instance.engine().is_running() && !instance.engine().is_paused()
        })
    }
}

struct Shared {
    timing: SpotlightTiming,
    engine_timing: EngineTiming,
    loader: Arc<dyn ImageLoader>,
    runtime: Handle,
    registry: Mutex<Registry>,
    events_tx: broadcast::Sender<SpotlightEvent>,
    cancel: CancellationToken,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active(&self, instance: &Instance, active: bool) -> bool {
        if !instance.set_active(active) {
            return false;
        }
        let event = if active {
            SpotlightEvent::Activated(instance.id())
        } else {
            SpotlightEvent::Deactivated(instance.id())
        };
        let _ = self.events_tx.send(event);
        true
    }

    fn pause_all_except(&self, registry: &Registry, id: InstanceId) {
        for instance in registry.instances.iter().filter(|i| i.id() != id) {
            if !instance.engine().is_paused() {
                instance.engine().pause();
                self.set_active(instance, false);
            }
        }
    }

    fn resume_all_except(&self, registry: &Registry, id: InstanceId) {
        for instance in registry.instances.iter().filter(|i| i.id() != id) {
            if !instance.is_active() {
                instance.engine().unpause();
                self.set_active(instance, true);
            }
        }
    }

    fn pause_all(&self, registry: &Registry) {
        for instance in &registry.instances {
            if instance.is_active() {
                instance.engine().pause();
                self.set_active(instance, false);
            }
        }
    }

    fn resume_all(&self, registry: &Registry) {
        for instance in &registry.instances {
            if instance.engine().is_paused() {
                instance.engine().unpause();
                self.set_active(instance, true);
            }
        }
    }

    /// Start the engine if it never ran, otherwise make sure it isn't paused
    fn ensure_playing(&self, instance: &Instance) {
        let engine = instance.engine();
        if !engine.has_started() {
            if !engine.is_empty() {
                engine.start();
            }
        } else if engine.is_paused() {
            engine.unpause();
        }
    }

    fn elect(&self, registry: &mut Registry) {
        let len = registry.instances.len();
        let index = match registry.cursor {
            Some(cursor) => (cursor + 1) % len,
            None => 0,
        };
        registry.cursor = Some(index);

        let elected = registry.instances[index].clone();
        registry.current = Some(elected.id());
        registry.spotlight_elapsed = 0.0;

        for other in registry.instances.iter().filter(|i| i.id() != elected.id()) {
            self.set_active(other, false);
        }
        self.set_active(&elected, true);

        if registry.is_any_other_playing_than(elected.id()) {
            self.pause_all_except(registry, elected.id());
        }

        info!("Instance {} is now in the spotlight", elected.id());
    }

    /// Run one scheduler iteration and return how long to sleep before the next
    fn tick(&self) -> Duration {
        let mut registry = self.registry();

        if registry.instances.len() <= 1 {
            registry.current = None;
            registry.spotlight_elapsed = 0.0;
            if let Some(sole) = registry.instances.first() {
                if self.set_active(sole, true) {
                    debug!("Instance {} is the only instance, leaving it active", sole.id());
                    sole.engine().unpause();
                }
            }
            return self.timing.idle_tick;
        }

        if let Some(id) = registry.current {
            if registry.index_of(id).is_none() {
                warn!("Spotlight holder {} is no longer registered, re-electing", id);
                registry.current = None;
            }
        }

        let current = registry
            .current
            .and_then(|id| registry.index_of(id))
            .map(|index| registry.instances[index].clone());

        let Some(current) = current else {
            self.elect(&mut registry);
            return self.timing.settle;
        };

        self.ensure_playing(&current);

        if registry.spotlight_elapsed >= registry.duration_secs {
            debug!("Instance {} spotlight time is up", current.id());
            registry.spotlight_elapsed = 0.0;
            registry.current = None;
            self.set_active(&current, false);
            return Duration::ZERO;
        }

        registry.spotlight_elapsed += self.timing.tick.as_secs_f64();
        self.timing.tick
    }
}

async fn run_scheduler_loop(shared: Arc<Shared>) {
    info!("Spotlight scheduler loop started");

    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        let wait = shared.tick();
        if wait.is_zero() {
            continue;
        }

        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!("Spotlight scheduler loop exited");
}

/// Registry of instances plus the loop that rotates the spotlight among them
///
/// Cheap to clone; clones share the registry and the loop.
#[derive(Clone)]
pub struct SpotlightScheduler {
    shared: Arc<Shared>,
}

impl SpotlightScheduler {
    /// Create a scheduler. Engines for registered windows use `engine_timing`
    /// and `loader`; every loop is spawned on `runtime`.
    pub fn new(
        timing: SpotlightTiming,
        engine_timing: EngineTiming,
        loader: Arc<dyn ImageLoader>,
        runtime: Handle,
    ) -> Self {
        let timing = timing.sanitized();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = Registry {
            instances: Vec::new(),
            next_id: 1,
            cursor: None,
            current: None,
            spotlight_elapsed: 0.0,
            duration_secs: timing.duration_secs,
            lifecycle: Lifecycle::Idle,
        };

        Self {
            shared: Arc::new(Shared {
                timing,
                engine_timing,
                loader,
                runtime,
                registry: Mutex::new(registry),
                events_tx,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Receive registry and spotlight changes
    pub fn subscribe(&self) -> broadcast::Receiver<SpotlightEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Register a window and hand back its instance, wrapping a fresh engine
    pub fn register(&self, window: WindowHandle) -> Instance {
        let mut registry = self.shared.registry();
        let id = InstanceId(registry.next_id);
        registry.next_id += 1;

        let engine = SlideEngine::new(
            format!("instance-{}", id),
            self.shared.engine_timing,
            Arc::clone(&self.shared.loader),
            self.shared.runtime.clone(),
        );
        let instance = Instance::new(id, engine, window);
        registry.instances.push(instance.clone());

        info!("New instance {} added for window '{}'", id, instance.window().label());
        let _ = self.shared.events_tx.send(SpotlightEvent::Registered(id));
        instance
    }

    /// Remove an instance and stop its engine
    pub fn deregister(&self, id: InstanceId) -> bool {
        let mut registry = self.shared.registry();
        let Some(index) = registry.index_of(id) else {
            return false;
        };

        let instance = registry.instances.remove(index);
        if let Some(cursor) = registry.cursor {
            if index <= cursor {
                registry.cursor = cursor.checked_sub(1);
            }
        }
        if registry.current == Some(id) {
            registry.current = None;
            registry.spotlight_elapsed = 0.0;
        }

        self.shared.set_active(&instance, false);
        instance.engine().stop();

        info!("Instance {} removed", id);
        let _ = self.shared.events_tx.send(SpotlightEvent::Deregistered(id));
        true
    }

    pub fn deregister_instance(&self, instance: &Instance) -> bool {
        self.deregister(instance.id())
    }

    pub fn pause_all_except(&self, id: InstanceId) {
        let registry = self.shared.registry();
        self.shared.pause_all_except(&registry, id);
    }

    pub fn resume_all_except(&self, id: InstanceId) {
        let registry = self.shared.registry();
        self.shared.resume_all_except(&registry, id);
    }

    pub fn pause_all(&self) {
        let registry = self.shared.registry();
        self.shared.pause_all(&registry);
    }

    pub fn resume_all(&self) {
        let registry = self.shared.registry();
        self.shared.resume_all(&registry);
    }

    /// True if any instance other than `id` is running and not paused
    pub fn is_any_other_playing_than(&self, id: InstanceId) -> bool {
        self.shared.registry().is_any_other_playing_than(id)
    }

    /// Spawn the scheduler loop. Only the first call does anything.
    pub fn start(&self) -> bool {
        let mut registry = self.shared.registry();
        if registry.lifecycle != Lifecycle::Idle {
            warn!("Spotlight scheduler already started");
            return false;
        }

        registry.lifecycle = Lifecycle::Running;
        self.shared.runtime.spawn(run_scheduler_loop(Arc::clone(&self.shared)));
        info!(
            "Starting spotlight scheduler ({:.1}s per instance)",
            registry.duration_secs
        );
        true
    }

    /// Ask the scheduler loop to exit; engines are left as they are
    pub fn stop(&self) -> bool {
        let mut registry = self.shared.registry();
        if registry.lifecycle != Lifecycle::Running {
            return false;
        }

        registry.lifecycle = Lifecycle::Stopped;
        self.shared.cancel.cancel();
        info!("Spotlight scheduler stopping");
        true
    }

    /// Stop the scheduler loop and every registered engine
    pub fn shutdown(&self) {
        self.stop();
        let registry = self.shared.registry();
        for instance in &registry.instances {
            instance.engine().stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.registry().lifecycle == Lifecycle::Running
    }

    /// Snapshot of the registered instances in registration order
    pub fn instances(&self) -> Vec<Instance> {
        self.shared.registry().instances.clone()
    }

    pub fn instance(&self, id: InstanceId) -> Option<Instance> {
        let registry = self.shared.registry();
        registry.index_of(id).map(|index| registry.instances[index].clone())
    }

    /// Ids whose `active` flag is set, read under the registry lock
    pub fn active_ids(&self) -> Vec<InstanceId> {
        self.shared
            .registry()
            .instances
            .iter()
            .filter(|instance| instance.is_active())
            .map(Instance::id)
            .collect()
    }

    /// Instance currently holding the spotlight
    pub fn current(&self) -> Option<InstanceId> {
        self.shared.registry().current
    }

    pub fn len(&self) -> usize {
        self.shared.registry().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.registry().instances.is_empty()
    }

    pub fn spotlight_duration(&self) -> f64 {
        self.shared.registry().duration_secs
    }

    /// Change how long each instance keeps the spotlight; applies from the next check
    pub fn set_spotlight_duration(&self, secs: f64) {
        if !is_valid_duration(secs) {
            warn!("Ignoring invalid spotlight duration {}", secs);
            return;
        }
        self.shared.registry().duration_secs = secs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::testing::MemoryLoader;

    fn scheduler(duration_secs: f64) -> SpotlightScheduler {
        let timing = SpotlightTiming {
            duration_secs,
            ..SpotlightTiming::default()
        };
        SpotlightScheduler::new(timing, EngineTiming::default(), MemoryLoader::any(), Handle::current())
    }

    fn register_with_slides(scheduler: &SpotlightScheduler, label: &str) -> Instance {
        let instance = scheduler.register(WindowHandle::new(label));
        instance.engine().add_slide_paths(["a.png", "b.png"]);
        instance
    }

    async fn next_activation(events: &mut broadcast::Receiver<SpotlightEvent>) -> InstanceId {
        loop {
            if let Ok(SpotlightEvent::Activated(id)) = events.recv().await {
                return id;
            }
        }
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_and_not_recycled() {
        let scheduler = scheduler(20.0);
        let a = scheduler.register(WindowHandle::new("a"));
        let b = scheduler.register(WindowHandle::new("b"));
        assert_eq!((a.id().get(), b.id().get()), (1, 2));

        assert!(scheduler.deregister(b.id()));
        assert!(!scheduler.deregister(b.id()));
        let c = scheduler.register(WindowHandle::new("c"));
        assert_eq!(c.id().get(), 3);

        assert!(scheduler.deregister_instance(&a));
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.instance(c.id()).is_some());
        assert!(scheduler.instance(a.id()).is_none());
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let scheduler = scheduler(20.0);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert!(scheduler.is_running());
        assert!(scheduler.stop());
        assert!(!scheduler.is_running());
        assert!(!scheduler.start());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_pause_and_resume() {
        let scheduler = scheduler(20.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let c = register_with_slides(&scheduler, "c");
        for instance in [&a, &b, &c] {
            assert!(instance.engine().start());
        }

        assert!(scheduler.is_any_other_playing_than(a.id()));
        scheduler.pause_all_except(a.id());
        assert!(!a.engine().is_paused());
        assert!(b.engine().is_paused() && c.engine().is_paused());
        assert!(!scheduler.is_any_other_playing_than(a.id()));

        scheduler.resume_all_except(a.id());
        assert!(!b.engine().is_paused() && !c.engine().is_paused());
        assert!(b.is_active() && c.is_active());

        scheduler.pause_all();
        assert!(!b.is_active() && !c.is_active());
        assert!(b.engine().is_paused() && c.engine().is_paused());

        scheduler.resume_all();
        assert!(!b.engine().is_paused() && !c.engine().is_paused());
        assert!(b.is_active() && c.is_active());

        scheduler.shutdown();
        assert!(!a.engine().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_follows_registration_order() {
        let scheduler = scheduler(1.0);
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|label| register_with_slides(&scheduler, label).id())
            .collect();
        let mut events = scheduler.subscribe();

        scheduler.start();

        let mut elected = Vec::new();
        for _ in 0..9 {
            let id = next_activation(&mut events).await;
            assert!(scheduler.active_ids().len() <= 1);
            elected.push(id);
        }

        let expected: Vec<_> = ids.iter().cycle().take(9).copied().collect();
        assert_eq!(elected, expected);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_elected_engine_plays_and_others_pause() {
        let scheduler = scheduler(1.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let mut events = scheduler.subscribe();

        scheduler.start();
        assert_eq!(next_activation(&mut events).await, a.id());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(a.engine().is_running() && !a.engine().is_paused());
        assert!(!b.engine().has_started());

        assert_eq!(next_activation(&mut events).await, b.id());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(a.engine().is_paused());
        assert!(b.engine().is_running() && !b.engine().is_paused());

        assert_eq!(next_activation(&mut events).await, a.id());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!a.engine().is_paused());
        assert!(b.engine().is_paused());
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_instance_stays_active() {
        let scheduler = scheduler(1.0);
        let only = register_with_slides(&scheduler, "only");
        let mut events = scheduler.subscribe();

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(only.is_active());

        for _ in 0..60 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert!(only.is_active());
        }
        assert_eq!(scheduler.current(), None);
        assert!(!only.engine().has_started());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen, vec![SpotlightEvent::Activated(only.id())]);
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spotlight_time_is_shared_fairly() {
        let scheduler = scheduler(2.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        scheduler.start();

        let sample = Duration::from_millis(100);
        let samples = 600;
        let (mut a_samples, mut b_samples) = (0u32, 0u32);
        for _ in 0..samples {
            tokio::time::sleep(sample).await;
            let active = scheduler.active_ids();
            assert!(active.len() <= 1);
            if active.contains(&a.id()) {
                a_samples += 1;
            }
            if active.contains(&b.id()) {
                b_samples += 1;
            }
        }

        let total = samples as f64 * sample.as_secs_f64();
        let share = total / 2.0;
        // one full rotation: each instance holds for its duration plus the settle pause
        let margin = 2.0 * (2.0 + 0.3) + 0.5;
        for held in [a_samples, b_samples] {
            let held_secs = held as f64 * sample.as_secs_f64();
            assert!((held_secs - share).abs() <= margin, "held {held_secs}s, share {share}s");
        }
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_deregistering_spotlight_holder_moves_on() {
        let scheduler = scheduler(1.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let c = register_with_slides(&scheduler, "c");
        let mut events = scheduler.subscribe();

        scheduler.start();
        assert_eq!(next_activation(&mut events).await, a.id());
        assert_eq!(next_activation(&mut events).await, b.id());

        assert!(scheduler.deregister(b.id()));
        assert_eq!(scheduler.current(), None);
        assert!(!b.is_active());
        assert!(b.engine().is_stopped() || !b.engine().has_started());

        assert_eq!(next_activation(&mut events).await, c.id());
        assert_eq!(next_activation(&mut events).await, a.id());
        assert_eq!(next_activation(&mut events).await, c.id());
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_collapse_to_single_instance_resumes_it() {
        let scheduler = scheduler(1.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let mut events = scheduler.subscribe();

        scheduler.start();
        assert_eq!(next_activation(&mut events).await, a.id());
        assert_eq!(next_activation(&mut events).await, b.id());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(a.engine().is_paused());

        scheduler.deregister(b.id());
        assert_eq!(next_activation(&mut events).await, a.id());
        assert!(a.is_active());
        assert!(!a.engine().is_paused());
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_spotlight_duration_validation() {
        let scheduler = scheduler(20.0);
        assert_eq!(scheduler.spotlight_duration(), 20.0);
        scheduler.set_spotlight_duration(5.0);
        assert_eq!(scheduler.spotlight_duration(), 5.0);
        scheduler.set_spotlight_duration(-1.0);
        scheduler.set_spotlight_duration(f64::NAN);
        scheduler.set_spotlight_duration(f64::INFINITY);
        assert_eq!(scheduler.spotlight_duration(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nan_duration_still_rotates() {
        let scheduler = scheduler(f64::NAN);
        assert_eq!(scheduler.spotlight_duration(), 20.0);
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let mut events = scheduler.subscribe();

        scheduler.start();
        assert_eq!(next_activation(&mut events).await, a.id());
        assert_eq!(next_activation(&mut events).await, b.id());
        assert!(b.engine().has_started());
        scheduler.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_tick_does_not_stall_rotation() {
        let timing = SpotlightTiming {
            duration_secs: 1.0,
            tick: Duration::ZERO,
            ..SpotlightTiming::default()
        };
        let scheduler =
            SpotlightScheduler::new(timing, EngineTiming::default(), MemoryLoader::any(), Handle::current());
        let a = register_with_slides(&scheduler, "a");
        let b = register_with_slides(&scheduler, "b");
        let mut events = scheduler.subscribe();

        scheduler.start();
        assert_eq!(next_activation(&mut events).await, a.id());
        assert_eq!(next_activation(&mut events).await, b.id());
        scheduler.shutdown();
    }
}
