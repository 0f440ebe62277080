use std::collections::BTreeMap;

use crate::bus::Command;
use crate::config::SceneConfig;

#[derive(Debug, Clone, PartialEq)]
struct Ramp {
    from: f32,
    to: f32,
    start_ms: f64,
    duration_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Decay {
    peak: f32,
    start_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Pending {
    target: String,
    value: f32,
    execute_at_ms: f64,
}

/// Render-side parameter state driven by dispatched command batches.
///
/// `Set` writes immediately, `Pulse` jumps then decays linearly back to zero,
/// `Ramp` interpolates from the current value and `Schedule` fires once the
/// scene time reaches its execution time.
#[derive(Debug, Clone)]
pub struct SceneState {
    pulse_decay_ms: f64,
    parameters: BTreeMap<String, f32>,
    ramps: BTreeMap<String, Ramp>,
    decays: BTreeMap<String, Decay>,
    pending: Vec<Pending>,
    applied: u64,
}

impl SceneState {
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            pulse_decay_ms: config.pulse_decay_ms,
            parameters: BTreeMap::new(),
            ramps: BTreeMap::new(),
            decays: BTreeMap::new(),
            pending: Vec::new(),
            applied: 0,
        }
    }

    /// Applies one dispatched batch, in order, at scene time `now_ms`.
    pub fn apply_batch(&mut self, batch: Vec<Command>, now_ms: f64) {
        for command in batch {
            self.apply(command, now_ms);
        }
        self.advance(now_ms);
    }

    /// Moves animations forward and fires due scheduled values.
    pub fn advance(&mut self, now_ms: f64) {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.execute_at_ms <= now_ms);
        self.pending = waiting;
        for pending in due {
            self.write(pending.target, pending.value);
        }

        let mut finished = Vec::new();
        for (target, ramp) in &self.ramps {
            let progress = if ramp.duration_ms <= 0.0 {
                1.0
            } else {
                ((now_ms - ramp.start_ms) / ramp.duration_ms).clamp(0.0, 1.0) as f32
            };
            let value = ramp.from + (ramp.to - ramp.from) * progress;
            self.parameters.insert(target.clone(), value);
            if progress >= 1.0 {
                finished.push(target.clone());
            }
        }
        for target in finished {
            self.ramps.remove(&target);
        }

        let mut finished = Vec::new();
        for (target, decay) in &self.decays {
            let remaining = if self.pulse_decay_ms <= 0.0 {
                0.0
            } else {
                (1.0 - (now_ms - decay.start_ms) / self.pulse_decay_ms).clamp(0.0, 1.0) as f32
            };
            self.parameters.insert(target.clone(), decay.peak * remaining);
            if remaining <= 0.0 {
                finished.push(target.clone());
            }
        }
        for target in finished {
            self.decays.remove(&target);
        }
    }

    pub fn value(&self, target: &str) -> Option<f32> {
        self.parameters.get(target).copied()
    }

    pub fn parameters(&self) -> &BTreeMap<String, f32> {
        &self.parameters
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Total commands applied since construction.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    fn apply(&mut self, command: Command, now_ms: f64) {
        self.applied += 1;
        match command {
            Command::Set { target, value } => self.write(target, value),
            Command::Pulse { target, intensity } => {
                self.ramps.remove(&target);
                self.parameters.insert(target.clone(), intensity);
                self.decays.insert(
                    target,
                    Decay {
                        peak: intensity,
                        start_ms: now_ms,
                    },
                );
            }
            Command::Ramp {
                target,
                value,
                duration_ms,
            } => {
                self.decays.remove(&target);
                let from = self.value(&target).unwrap_or(0.0);
                self.ramps.insert(
                    target,
                    Ramp {
                        from,
                        to: value,
                        start_ms: now_ms,
                        duration_ms,
                    },
                );
            }
            Command::Schedule {
                target,
                value,
                execute_at_ms,
            } => self.pending.push(Pending {
                target,
                value,
                execute_at_ms,
            }),
        }
    }

    /// A direct write overrides any animation running on the target.
    fn write(&mut self, target: String, value: f32) {
        self.ramps.remove(&target);
        self.decays.remove(&target);
        self.parameters.insert(target, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> SceneState {
        SceneState::new(&SceneConfig {
            pulse_decay_ms: 100.0,
        })
    }

    #[test]
    fn set_writes_immediately() {
        let mut scene = scene();
        scene.apply_batch(vec![Command::set("hue", 0.3)], 0.0);
        assert_eq!(scene.value("hue"), Some(0.3));
        assert_eq!(scene.applied(), 1);
        assert_eq!(scene.value("missing"), None);
    }

    #[test]
    fn pulses_decay_back_to_zero() {
        let mut scene = scene();
        scene.apply_batch(vec![Command::pulse("beat", 0.8)], 0.0);
        assert_eq!(scene.value("beat"), Some(0.8));

        scene.advance(50.0);
        assert!((scene.value("beat").unwrap() - 0.4).abs() < 1e-6);

        scene.advance(150.0);
        assert_eq!(scene.value("beat"), Some(0.0));
    }

    #[test]
    fn ramps_interpolate_from_current_value() {
        let mut scene = scene();
        scene.apply_batch(vec![Command::set("zoom", 0.2)], 0.0);
        scene.apply_batch(vec![Command::ramp("zoom", 1.0, 200.0)], 100.0);

        scene.advance(200.0);
        assert!((scene.value("zoom").unwrap() - 0.6).abs() < 1e-6);
        scene.advance(400.0);
        assert_eq!(scene.value("zoom"), Some(1.0));
    }

    #[test]
    fn scheduled_values_fire_when_due() {
        let mut scene = scene();
        scene.apply_batch(
            vec![
                Command::schedule("palette", 0.5, 1_000.0),
                Command::schedule("strobe", 1.0, 0.0),
            ],
            10.0,
        );
        assert_eq!(scene.value("strobe"), Some(1.0));
        assert_eq!(scene.value("palette"), None);
        assert_eq!(scene.pending_count(), 1);

        scene.advance(999.0);
        assert_eq!(scene.value("palette"), None);
        scene.advance(1_000.0);
        assert_eq!(scene.value("palette"), Some(0.5));
        assert_eq!(scene.pending_count(), 0);
    }

    #[test]
    fn set_cancels_running_animation() {
        let mut scene = scene();
        scene.apply_batch(vec![Command::ramp("zoom", 1.0, 1_000.0)], 0.0);
        scene.apply_batch(vec![Command::set("zoom", 0.1)], 10.0);
        scene.advance(500.0);
        assert_eq!(scene.value("zoom"), Some(0.1));
    }
}
