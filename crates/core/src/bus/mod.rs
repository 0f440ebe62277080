//! Bounded, priority-ordered queue of pending commands.
//!
//! The bus is a plain data structure: it stamps entries with the time they
//! were accepted and rate-limits its overflow warning, but all draining and
//! pacing policy lives in the [`Scheduler`](crate::Scheduler).

mod command;
mod shared;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::config::BusConfig;

pub use command::{Command, CommandKind, QueueEntry, UNKNOWN_PRIORITY};
pub use shared::SharedCommandBus;

/// Observability snapshot of a [`CommandBus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    pub size: usize,
    pub capacity: usize,
    /// `size / capacity`, in `[0, 1]`.
    pub utilization: f64,
    pub overflows_since_last_warning: u64,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_overflows: u64,
}

/// Bounded priority queue. Entries come out in non-increasing priority order,
/// FIFO among equal priorities. A full bus rejects new commands instead of
/// evicting queued ones.
#[derive(Debug)]
pub struct CommandBus {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    overflow_warning_interval_ms: f64,
    overflows_since_last_warning: u64,
    last_overflow_warning_ms: f64,
    total_enqueued: u64,
    total_dequeued: u64,
    total_overflows: u64,
    clock: SharedClock,
}

impl CommandBus {
    /// A capacity of zero is raised to one. [`MaestroConfig::validate`](crate::MaestroConfig::validate)
    /// rejects zero outright.
    pub fn new(config: &BusConfig, clock: SharedClock) -> Self {
        let capacity = config.capacity.max(1);
        let now = clock.now_ms();
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            overflow_warning_interval_ms: config.overflow_warning_interval_ms,
            overflows_since_last_warning: 0,
            last_overflow_warning_ms: now,
            total_enqueued: 0,
            total_dequeued: 0,
            total_overflows: 0,
            clock,
        }
    }

    /// Queues `command`, using its kind's default priority unless one is
    /// given. Returns `false` and drops the command when the bus is full.
    pub fn enqueue(&mut self, command: Command, priority: Option<i32>) -> bool {
        let now = self.clock.now_ms();

        if self.is_full() {
            self.record_overflow(now);
            return false;
        }

        let priority = priority.unwrap_or_else(|| command.default_priority());
        // Insert behind every entry of equal or higher priority.
        let index = self.entries.partition_point(|entry| entry.priority >= priority);
        self.entries.insert(
            index,
            QueueEntry {
                command,
                priority,
                enqueued_at_ms: now,
            },
        );
        self.total_enqueued += 1;
        true
    }

    /// Removes and returns up to `max_count` commands, most urgent first.
    pub fn dequeue(&mut self, max_count: usize) -> Vec<Command> {
        let count = max_count.min(self.entries.len());
        self.total_dequeued += count as u64;
        self.entries
            .drain(..count)
            .map(|entry| entry.command)
            .collect()
    }

    pub fn dequeue_one(&mut self) -> Option<Command> {
        let entry = self.entries.pop_front()?;
        self.total_dequeued += 1;
        Some(entry.command)
    }

    /// Copies of the next `max_count` commands in dequeue order.
    pub fn peek(&self, max_count: usize) -> Vec<Command> {
        self.entries
            .iter()
            .take(max_count)
            .map(|entry| entry.command.clone())
            .collect()
    }

    pub fn peek_entries(&self, max_count: usize) -> Vec<QueueEntry> {
        self.entries.iter().take(max_count).cloned().collect()
    }

    /// Discards every queued command and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        tracing::debug!(discarded, "command bus cleared");
        discarded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn utilization(&self) -> f64 {
        self.entries.len() as f64 / self.capacity as f64
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            size: self.len(),
            capacity: self.capacity,
            utilization: self.utilization(),
            overflows_since_last_warning: self.overflows_since_last_warning,
            total_enqueued: self.total_enqueued,
            total_dequeued: self.total_dequeued,
            total_overflows: self.total_overflows,
        }
    }

    fn record_overflow(&mut self, now: f64) {
        self.overflows_since_last_warning += 1;
        self.total_overflows += 1;

        if now - self.last_overflow_warning_ms > self.overflow_warning_interval_ms {
            tracing::warn!(
                dropped = self.overflows_since_last_warning,
                capacity = self.capacity,
                "command bus full, dropping commands"
            );
            self.overflows_since_last_warning = 0;
            self.last_overflow_warning_ms = now;
        }
    }
}
