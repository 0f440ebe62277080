//! Monotonic millisecond time sources shared by the orchestration components.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic time, expressed in fractional milliseconds since an
/// arbitrary origin.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> f64;
}

/// Shared handle used by every component that needs the time.
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock backed by [`Instant`], with its origin at construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1_000.0
    }
}

/// Hand-driven clock for deterministic timing.
///
/// Time only moves through [`ManualClock::set_ms`], [`ManualClock::advance_ms`]
/// or the optional auto-step, which advances the clock after every read.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_bits: AtomicU64,
    step_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start_ms.to_bits()),
            step_bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn shared(start_ms: f64) -> Arc<Self> {
        Arc::new(Self::new(start_ms))
    }

    pub fn set_ms(&self, now_ms: f64) {
        self.now_bits.store(now_ms.to_bits(), Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: f64) {
        let now = f64::from_bits(self.now_bits.load(Ordering::SeqCst));
        self.set_ms(now + delta_ms);
    }

    /// Makes every subsequent read advance the clock by `step_ms`.
    pub fn set_auto_step_ms(&self, step_ms: f64) {
        self.step_bits.store(step_ms.to_bits(), Ordering::SeqCst);
    }

    /// Current time without triggering the auto-step.
    pub fn peek_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        let now = self.peek_ms();
        let step = f64::from_bits(self.step_bits.load(Ordering::SeqCst));
        if step != 0.0 {
            self.set_ms(now + step);
        }
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(first >= 0.0);
        assert!(second >= first);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(100.0);
        assert_eq!(clock.now_ms(), 100.0);
        assert_eq!(clock.now_ms(), 100.0);

        clock.advance_ms(2.5);
        assert_eq!(clock.now_ms(), 102.5);

        clock.set_auto_step_ms(1.0);
        assert_eq!(clock.now_ms(), 102.5);
        assert_eq!(clock.now_ms(), 103.5);
        assert_eq!(clock.peek_ms(), 104.5);
    }
}
