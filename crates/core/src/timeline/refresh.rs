use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use super::TickOutcome;

const FPS_WINDOW_MS: f64 = 1_000.0;

/// Host-side stand-in for a display refresh callback. Paces a self-rescheduling
/// tick function at a fixed refresh rate.
#[derive(Debug)]
pub struct RefreshLoop {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl RefreshLoop {
    pub fn new(refresh_hz: f64) -> Self {
        let hz = if refresh_hz.is_finite() && refresh_hz > 0.0 {
            refresh_hz
        } else {
            crate::config::DEFAULT_REFRESH_HZ
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / hz),
            next_deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the next refresh is due. A late frame re-anchors the
    /// cadence at the current instant instead of firing a catch-up burst.
    pub fn wait_for_refresh(&mut self) {
        let now = Instant::now();
        match self.next_deadline {
            Some(deadline) if deadline > now => {
                thread::sleep(deadline - now);
                self.next_deadline = Some(deadline + self.interval);
            }
            _ => self.next_deadline = Some(now + self.interval),
        }
    }

    /// Drives `tick` once per refresh until it halts or `max_frames` have run.
    /// Returns the number of ticks that rescheduled themselves.
    pub fn run<F>(&mut self, max_frames: u64, mut tick: F) -> u64
    where
        F: FnMut() -> TickOutcome,
    {
        let mut frames = 0;
        while frames < max_frames {
            self.wait_for_refresh();
            if !tick().is_rescheduled() {
                break;
            }
            frames += 1;
        }
        frames
    }
}

/// Rolling frame-rate estimate over the last second of frames.
#[derive(Debug, Default, Clone)]
pub struct FpsMeter {
    frames: VecDeque<f64>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, now_ms: f64) {
        self.frames.push_back(now_ms);
        while let Some(&oldest) = self.frames.front() {
            if now_ms - oldest > FPS_WINDOW_MS {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn fps(&self) -> f32 {
        match (self.frames.front(), self.frames.back()) {
            (Some(first), Some(last)) if last > first => {
                ((self.frames.len() - 1) as f64 * 1_000.0 / (last - first)) as f32
            }
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }
}
