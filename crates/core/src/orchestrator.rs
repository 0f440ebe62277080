//! The conductor: one explicitly constructed context owning the command bus,
//! the scheduler and the state store around a single shared clock.

use serde::{Deserialize, Serialize};

use crate::analysis::{AudioFeatures, ClockState, VisionFeatures};
use crate::bus::{BusStats, Command, CommandBus, SharedCommandBus};
use crate::clock::{MonotonicClock, SharedClock};
use crate::config::MaestroConfig;
use crate::record::{Directive, StatePatch, StateStore, StoreStats};
use crate::timeline::{FpsMeter, Scheduler, SchedulerStats, TickOutcome};
use crate::Result;

/// Combined observability snapshot for a diagnostics overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaestroStats {
    pub bus: BusStats,
    pub scheduler: SchedulerStats,
    pub state: StoreStats,
}

#[derive(Debug)]
pub struct Maestro {
    config: MaestroConfig,
    clock: SharedClock,
    bus: SharedCommandBus,
    scheduler: Scheduler,
    store: StateStore,
    fps: FpsMeter,
    latest_clock: Option<ClockState>,
    latest_audio: Option<AudioFeatures>,
    latest_vision: Option<VisionFeatures>,
    directives: Vec<Directive>,
    last_snapshot_ms: Option<f64>,
}

impl Maestro {
    pub fn new(config: MaestroConfig) -> Result<Self> {
        Self::with_clock(config, MonotonicClock::shared())
    }

    pub fn with_clock(config: MaestroConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let bus = SharedCommandBus::new(CommandBus::new(&config.bus, clock.clone()));
        let scheduler = Scheduler::new(&config.scheduler, clock.clone());
        let store = StateStore::new(&config.state, clock.clone());

        Ok(Self {
            config,
            clock,
            bus,
            scheduler,
            store,
            fps: FpsMeter::new(),
            latest_clock: None,
            latest_audio: None,
            latest_vision: None,
            directives: Vec::new(),
            last_snapshot_ms: None,
        })
    }

    pub fn config(&self) -> &MaestroConfig {
        &self.config
    }

    /// The clock every component of this instance reads.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Handle producers use to publish commands, possibly from other threads.
    pub fn bus(&self) -> SharedCommandBus {
        self.bus.clone()
    }

    pub fn enqueue(&self, command: Command, priority: Option<i32>) -> Result<bool> {
        self.bus.enqueue(command, priority)
    }

    pub fn start<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(Vec<Command>) + Send + 'static,
    {
        let started = self.scheduler.start(handler);
        if started {
            self.fps.reset();
            self.last_snapshot_ms = None;
        }
        started
    }

    pub fn stop(&mut self) -> bool {
        self.scheduler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs one refresh: dispatches a budgeted batch and, when the snapshot
    /// interval has elapsed, records the latest aggregated state.
    pub fn frame(&mut self) -> TickOutcome {
        let outcome = self.scheduler.tick_shared(&self.bus);

        if outcome.is_rescheduled() {
            let now = self.clock.now_ms();
            self.fps.record_frame(now);
            let due = self
                .last_snapshot_ms
                .map(|last| now - last >= self.config.state.snapshot_interval_ms)
                .unwrap_or(true);
            if due {
                self.snapshot();
                self.last_snapshot_ms = Some(now);
            }
        }

        outcome
    }

    /// Records the latest observations into the store right away.
    pub fn snapshot(&mut self) {
        let mut patch = StatePatch::new()
            .with_directives(self.directives.clone())
            .with_fps(self.fps.fps());
        patch.clock = self.latest_clock.clone();
        patch.audio = self.latest_audio.clone();
        patch.vision = self.latest_vision.clone();
        self.store.update(patch);
    }

    pub fn observe_clock(&mut self, clock: ClockState) {
        self.latest_clock = Some(clock);
    }

    pub fn observe_audio(&mut self, audio: AudioFeatures) {
        self.latest_audio = Some(audio);
    }

    pub fn observe_vision(&mut self, vision: VisionFeatures) {
        self.latest_vision = Some(vision);
    }

    pub fn set_directives(&mut self, directives: Vec<Directive>) {
        self.directives = directives;
    }

    pub fn fps(&self) -> f32 {
        self.fps.fps()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StateStore {
        &mut self.store
    }

    pub fn stats(&self) -> Result<MaestroStats> {
        Ok(MaestroStats {
            bus: self.bus.stats()?,
            scheduler: self.scheduler.stats(),
            state: self.store.stats(),
        })
    }
}
