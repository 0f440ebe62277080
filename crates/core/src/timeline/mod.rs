//! Frame-budgeted dispatch of queued commands.
//!
//! The [`Scheduler`] is ticked once per display refresh. Each tick drains the
//! [`CommandBus`] until either the per-frame command cap or the time budget is
//! reached, then hands the whole batch to the registered handler in a single
//! call. At the end of a tick the scheduler registers interest in the next
//! refresh; [`Scheduler::stop`] cancels that registration and the next tick
//! returns [`TickOutcome::Halted`].

mod refresh;

use serde::{Deserialize, Serialize};

use crate::bus::{Command, CommandBus, SharedCommandBus};
use crate::clock::SharedClock;
use crate::config::SchedulerConfig;

pub use refresh::{FpsMeter, RefreshLoop};

/// Consumer callback receiving one batch of dispatched commands per tick.
pub type BatchHandler = Box<dyn FnMut(Vec<Command>) + Send>;

/// Registration for the next refresh, issued at the end of every running tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Result of a single [`Scheduler::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran and the next refresh has been requested.
    Rescheduled(FrameRequest),
    /// The scheduler is stopped; nothing ran and nothing was rescheduled.
    Halted,
}

impl TickOutcome {
    pub fn is_rescheduled(self) -> bool {
        matches!(self, Self::Rescheduled(_))
    }
}

/// Aggregate timing counters since the last [`Scheduler::start`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub is_running: bool,
    pub frame_count: u64,
    pub total_commands_dispatched: u64,
    pub total_time_spent_ms: f64,
    pub avg_commands_per_frame: f64,
    pub avg_time_ms_per_frame: f64,
    pub budget_exceeded_count: u64,
    /// Budget overruns per hundred frames. Dequeue-side and dispatch-side
    /// overruns are counted separately, so one frame can contribute twice.
    pub budget_exceeded_percent: f64,
}

pub struct Scheduler {
    frame_budget_ms: f64,
    max_commands_per_frame: usize,
    stats_log_interval_ms: f64,
    clock: SharedClock,
    running: bool,
    handler: Option<BatchHandler>,
    pending_frame: Option<FrameRequest>,
    next_request_id: u64,
    frame_count: u64,
    total_commands_dispatched: u64,
    total_time_spent_ms: f64,
    budget_exceeded_count: u64,
    last_stats_log_ms: f64,
}

impl Scheduler {
    /// A `max_commands_per_frame` of zero is raised to one so a tick can
    /// always make progress. [`MaestroConfig::validate`](crate::MaestroConfig::validate)
    /// rejects zero outright.
    pub fn new(config: &SchedulerConfig, clock: SharedClock) -> Self {
        Self {
            frame_budget_ms: config.frame_budget_ms,
            max_commands_per_frame: config.max_commands_per_frame.max(1),
            stats_log_interval_ms: config.stats_log_interval_ms,
            clock,
            running: false,
            handler: None,
            pending_frame: None,
            next_request_id: 0,
            frame_count: 0,
            total_commands_dispatched: 0,
            total_time_spent_ms: 0.0,
            budget_exceeded_count: 0,
            last_stats_log_ms: 0.0,
        }
    }

    /// Starts ticking and registers `handler` as the batch consumer.
    ///
    /// Returns `false` without touching the current handler when the
    /// scheduler is already running.
    pub fn start<F>(&mut self, handler: F) -> bool
    where
        F: FnMut(Vec<Command>) + Send + 'static,
    {
        if self.running {
            tracing::warn!("scheduler already running, ignoring start");
            return false;
        }

        self.handler = Some(Box::new(handler));
        self.frame_count = 0;
        self.total_commands_dispatched = 0;
        self.total_time_spent_ms = 0.0;
        self.budget_exceeded_count = 0;
        self.last_stats_log_ms = self.clock.now_ms();
        self.running = true;
        self.pending_frame = Some(self.next_request());

        tracing::info!(
            frame_budget_ms = self.frame_budget_ms,
            max_commands_per_frame = self.max_commands_per_frame,
            "scheduler started"
        );
        true
    }

    /// Cancels the pending frame, drops the handler and logs final stats.
    /// Returns `false` when the scheduler was not running.
    pub fn stop(&mut self) -> bool {
        if !self.running {
            tracing::debug!("scheduler not running, ignoring stop");
            return false;
        }

        self.running = false;
        self.pending_frame = None;
        self.handler = None;
        self.log_stats();
        tracing::info!("scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether a refresh has been requested and not yet serviced.
    pub fn has_pending_frame(&self) -> bool {
        self.pending_frame.is_some()
    }

    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.pending_frame
    }

    /// Runs one frame's worth of dispatch against `bus`.
    pub fn tick(&mut self, bus: &mut CommandBus) -> TickOutcome {
        let frame_start = match self.begin_frame() {
            Some(frame_start) => frame_start,
            None => return TickOutcome::Halted,
        };
        let batch = self.drain(bus, frame_start);
        self.dispatch(batch, frame_start)
    }

    /// Like [`Scheduler::tick`], but the bus lock is held only while the
    /// batch is drained. The handler runs unlocked, so it may publish
    /// follow-up commands and producers never wait on the consumer.
    pub fn tick_shared(&mut self, bus: &SharedCommandBus) -> TickOutcome {
        let frame_start = match self.begin_frame() {
            Some(frame_start) => frame_start,
            None => return TickOutcome::Halted,
        };
        let batch = {
            let mut bus = bus.lock_for_frame();
            self.drain(&mut bus, frame_start)
        };
        self.dispatch(batch, frame_start)
    }

    /// Consumes the pending registration. Returns the frame start time, or
    /// `None` when stopped.
    fn begin_frame(&mut self) -> Option<f64> {
        let frame_start = self.clock.now_ms();
        self.pending_frame = None;
        self.running.then_some(frame_start)
    }

    fn drain(&mut self, bus: &mut CommandBus, frame_start: f64) -> Vec<Command> {
        let mut batch = Vec::with_capacity(self.max_commands_per_frame.min(bus.len()));
        while batch.len() < self.max_commands_per_frame && !bus.is_empty() {
            let elapsed = self.clock.now_ms() - frame_start;
            if elapsed >= self.frame_budget_ms {
                self.budget_exceeded_count += 1;
                break;
            }
            match bus.dequeue_one() {
                Some(command) => batch.push(command),
                None => break,
            }
        }
        batch
    }

    fn dispatch(&mut self, batch: Vec<Command>, frame_start: f64) -> TickOutcome {
        let dispatched = batch.len() as u64;
        if !batch.is_empty() {
            if let Some(handler) = self.handler.as_mut() {
                handler(batch);
            }
        }

        let frame_end = self.clock.now_ms();
        let frame_time = frame_end - frame_start;
        // The handler's cost is outside our control; track it separately.
        if frame_time >= self.frame_budget_ms && dispatched > 0 {
            self.budget_exceeded_count += 1;
        }

        self.frame_count += 1;
        self.total_commands_dispatched += dispatched;
        self.total_time_spent_ms += frame_time;

        if frame_end - self.last_stats_log_ms >= self.stats_log_interval_ms {
            self.log_stats();
            self.last_stats_log_ms = frame_end;
        }

        let request = self.next_request();
        self.pending_frame = Some(request);
        TickOutcome::Rescheduled(request)
    }

    pub fn stats(&self) -> SchedulerStats {
        let frames = self.frame_count as f64;
        let per_frame = |total: f64| if frames > 0.0 { total / frames } else { 0.0 };

        SchedulerStats {
            is_running: self.running,
            frame_count: self.frame_count,
            total_commands_dispatched: self.total_commands_dispatched,
            total_time_spent_ms: self.total_time_spent_ms,
            avg_commands_per_frame: per_frame(self.total_commands_dispatched as f64),
            avg_time_ms_per_frame: per_frame(self.total_time_spent_ms),
            budget_exceeded_count: self.budget_exceeded_count,
            budget_exceeded_percent: per_frame(self.budget_exceeded_count as f64) * 100.0,
        }
    }

    fn next_request(&mut self) -> FrameRequest {
        self.next_request_id += 1;
        FrameRequest(self.next_request_id)
    }

    fn log_stats(&self) {
        let stats = self.stats();
        tracing::info!(
            total_dispatched = stats.total_commands_dispatched,
            frames = stats.frame_count,
            avg_commands_per_frame = stats.avg_commands_per_frame,
            avg_ms_per_frame = stats.avg_time_ms_per_frame,
            budget_exceeded_pct = stats.budget_exceeded_percent,
            "scheduler stats"
        );
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.running)
            .field("frame_budget_ms", &self.frame_budget_ms)
            .field("max_commands_per_frame", &self.max_commands_per_frame)
            .field("pending_frame", &self.pending_frame)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BusConfig;

    struct Harness {
        clock: Arc<ManualClock>,
        bus: CommandBus,
        scheduler: Scheduler,
        batches: Arc<Mutex<Vec<Vec<Command>>>>,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::shared(0.0);
            let bus = CommandBus::new(&BusConfig::default(), clock.clone());
            let scheduler = Scheduler::new(&SchedulerConfig::default(), clock.clone());
            Self {
                clock,
                bus,
                scheduler,
                batches: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn start_recording(&mut self) -> bool {
            let batches = self.batches.clone();
            self.scheduler
                .start(move |batch| batches.lock().unwrap().push(batch))
        }

        fn fill(&mut self, count: usize) {
            for i in 0..count {
                assert!(self.bus.enqueue(Command::set(format!("p{i}"), 0.0), None));
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[test]
    fn dispatches_one_batch_capped_per_tick() {
        let mut h = Harness::new();
        h.fill(25);
        assert!(h.start_recording());

        for _ in 0..4 {
            assert!(h.scheduler.tick(&mut h.bus).is_rescheduled());
        }

        assert_eq!(h.batch_sizes(), vec![10, 10, 5]);
        let stats = h.scheduler.stats();
        assert_eq!(stats.frame_count, 4);
        assert_eq!(stats.total_commands_dispatched, 25);
        assert_eq!(stats.avg_commands_per_frame, 6.25);
        assert_eq!(stats.budget_exceeded_count, 0);
    }

    #[test]
    fn batches_preserve_priority_order_across_ticks() {
        let mut h = Harness::new();
        for i in 0..12 {
            h.bus.enqueue(Command::schedule(format!("s{i}"), 0.0, 0.0), None);
        }
        h.bus.enqueue(Command::pulse("beat", 1.0), None);
        h.start_recording();

        h.scheduler.tick(&mut h.bus);
        h.scheduler.tick(&mut h.bus);

        let batches = h.batches.lock().unwrap();
        assert_eq!(batches[0][0], Command::pulse("beat", 1.0));
        assert_eq!(batches[0][1].target(), "s0");
        assert_eq!(batches[1][0].target(), "s9");
        assert_eq!(batches[1].len(), 3);
    }

    #[test]
    fn dequeue_phase_stops_at_budget() {
        let mut h = Harness::new();
        h.fill(10);
        h.start_recording();
        h.clock.set_auto_step_ms(0.5);

        h.scheduler.tick(&mut h.bus);

        // Reads at 0.5, 1.0 and 1.5 fit the 2 ms budget, the read at 2.0 does not.
        assert_eq!(h.batch_sizes(), vec![3]);
        assert_eq!(h.bus.len(), 7);
        // One overrun from the dequeue loop, one from the whole tick.
        assert_eq!(h.scheduler.stats().budget_exceeded_count, 2);
    }

    #[test]
    fn slow_handler_counts_dispatch_overrun() {
        let mut h = Harness::new();
        h.fill(2);
        let clock = h.clock.clone();
        h.scheduler.start(move |_batch| clock.advance_ms(5.0));

        h.scheduler.tick(&mut h.bus);
        let stats = h.scheduler.stats();
        assert_eq!(stats.budget_exceeded_count, 1);
        assert_eq!(stats.total_time_spent_ms, 5.0);

        // Empty ticks never count as dispatch overruns.
        h.scheduler.tick(&mut h.bus);
        assert_eq!(h.scheduler.stats().budget_exceeded_count, 1);
    }

    #[test]
    fn empty_bus_does_not_invoke_handler() {
        let mut h = Harness::new();
        h.start_recording();
        assert!(h.scheduler.tick(&mut h.bus).is_rescheduled());
        assert!(h.batch_sizes().is_empty());
        assert_eq!(h.scheduler.stats().frame_count, 1);
    }

    #[test]
    fn stop_cancels_registration_and_halts_ticks() {
        let mut h = Harness::new();
        assert!(!h.scheduler.has_pending_frame());
        assert_eq!(h.scheduler.tick(&mut h.bus), TickOutcome::Halted);

        h.start_recording();
        assert!(h.scheduler.has_pending_frame());
        let first = h.scheduler.pending_frame().unwrap();
        let outcome = h.scheduler.tick(&mut h.bus);
        assert_eq!(outcome, TickOutcome::Rescheduled(FrameRequest(first.id() + 1)));

        assert!(h.scheduler.stop());
        assert!(!h.scheduler.has_pending_frame());
        h.fill(3);
        assert_eq!(h.scheduler.tick(&mut h.bus), TickOutcome::Halted);
        assert!(!h.scheduler.has_pending_frame());
        assert_eq!(h.bus.len(), 3);
        assert!(h.batch_sizes().is_empty());
    }

    #[test]
    fn double_start_and_double_stop_are_no_ops() {
        let mut h = Harness::new();
        assert!(!h.scheduler.stop());
        assert!(h.start_recording());

        let replaced = Arc::new(Mutex::new(0));
        let counter = replaced.clone();
        assert!(!h.scheduler.start(move |_| *counter.lock().unwrap() += 1));

        h.fill(1);
        h.scheduler.tick(&mut h.bus);
        assert_eq!(*replaced.lock().unwrap(), 0);
        assert_eq!(h.batch_sizes(), vec![1]);

        assert!(h.scheduler.stop());
        assert!(!h.scheduler.stop());
        assert!(!h.scheduler.is_running());
    }

    #[test]
    fn restart_resets_counters() {
        let mut h = Harness::new();
        h.fill(4);
        h.start_recording();
        h.scheduler.tick(&mut h.bus);
        h.scheduler.stop();
        assert_eq!(h.scheduler.stats().total_commands_dispatched, 4);

        h.start_recording();
        let stats = h.scheduler.stats();
        assert!(stats.is_running);
        assert_eq!(stats.frame_count, 0);
        assert_eq!(stats.total_commands_dispatched, 0);
        assert_eq!(stats.avg_time_ms_per_frame, 0.0);
    }

    #[test]
    fn shared_tick_releases_bus_before_dispatch() {
        let clock = ManualClock::shared(0.0);
        let bus = SharedCommandBus::new(CommandBus::new(&BusConfig::default(), clock.clone()));
        let mut scheduler = Scheduler::new(&SchedulerConfig::default(), clock);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let publisher = bus.clone();
        scheduler.start(move |batch: Vec<Command>| {
            for command in &batch {
                if command.target() == "beat" {
                    publisher
                        .enqueue(Command::set("follow", 1.0), None)
                        .unwrap();
                }
            }
            sink.lock().unwrap().push(batch);
        });

        bus.enqueue(Command::pulse("beat", 1.0), None).unwrap();
        assert!(scheduler.tick_shared(&bus).is_rescheduled());
        assert_eq!(bus.len().unwrap(), 1);

        scheduler.tick_shared(&bus);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![Command::pulse("beat", 1.0)], vec![Command::set("follow", 1.0)]]
        );
        assert!(bus.is_empty().unwrap());

        scheduler.stop();
        assert_eq!(scheduler.tick_shared(&bus), TickOutcome::Halted);
    }

    #[test]
    fn zero_command_cap_still_makes_progress() {
        let clock = ManualClock::shared(0.0);
        let mut bus = CommandBus::new(&BusConfig::default(), clock.clone());
        let config = SchedulerConfig {
            max_commands_per_frame: 0,
            ..SchedulerConfig::default()
        };
        let mut scheduler = Scheduler::new(&config, clock);
        bus.enqueue(Command::set("a", 0.0), None);
        bus.enqueue(Command::set("b", 0.0), None);

        scheduler.start(|_| {});
        scheduler.tick(&mut bus);
        assert_eq!(scheduler.stats().total_commands_dispatched, 1);
        assert_eq!(bus.len(), 1);
    }
}
