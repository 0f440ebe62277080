//! Bounded history of orchestration snapshots.
//!
//! Every [`StateStore::update`] merges a [`StatePatch`] into the current
//! state, stamps it with the store's clock and appends a copy to a ring
//! buffer. Reads always hand out owned copies so callers can never reach
//! into stored history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::analysis::{AudioFeatures, ClockState, VisionFeatures};
use crate::clock::SharedClock;
use crate::config::StateConfig;
use crate::Result;

/// High-level directive currently in effect (a scene cue, an effect preset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub name: String,
    pub target: String,
    pub value: f32,
}

impl Directive {
    pub fn new(name: impl Into<String>, target: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            value,
        }
    }
}

/// Point-in-time snapshot of everything the orchestrator knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaestroState {
    pub timestamp: f64,
    pub clock: Option<ClockState>,
    pub audio: Option<AudioFeatures>,
    pub vision: Option<VisionFeatures>,
    pub active_directives: Vec<Directive>,
    pub fps: f32,
}

/// Partial update for [`StateStore::update`]. Fields left as `None` keep
/// their current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub clock: Option<ClockState>,
    pub audio: Option<AudioFeatures>,
    pub vision: Option<VisionFeatures>,
    pub active_directives: Option<Vec<Directive>>,
    pub fps: Option<f32>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(mut self, clock: ClockState) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_audio(mut self, audio: AudioFeatures) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_vision(mut self, vision: VisionFeatures) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_directives(mut self, directives: Vec<Directive>) -> Self {
        self.active_directives = Some(directives);
        self
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = Some(fps);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub history_size: usize,
    pub max_history_size: usize,
    pub oldest_timestamp: Option<f64>,
    pub newest_timestamp: Option<f64>,
    pub current_fps: f32,
    pub active_directive_count: usize,
}

#[derive(Debug)]
pub struct StateStore {
    current: MaestroState,
    history: VecDeque<MaestroState>,
    max_history_size: usize,
    clock: SharedClock,
}

impl StateStore {
    /// A `max_history_size` of zero is raised to one, so the latest snapshot
    /// is always retrievable. [`MaestroConfig::validate`](crate::MaestroConfig::validate)
    /// rejects zero outright.
    pub fn new(config: &StateConfig, clock: SharedClock) -> Self {
        let max_history_size = config.max_history_size.max(1);
        Self {
            current: MaestroState::default(),
            history: VecDeque::with_capacity(max_history_size + 1),
            max_history_size,
            clock,
        }
    }

    /// Merges `patch` into the current state, timestamps it and records a
    /// copy, evicting the oldest snapshot once the history is full.
    pub fn update(&mut self, patch: StatePatch) {
        let StatePatch {
            clock,
            audio,
            vision,
            active_directives,
            fps,
        } = patch;

        if clock.is_some() {
            self.current.clock = clock;
        }
        if audio.is_some() {
            self.current.audio = audio;
        }
        if vision.is_some() {
            self.current.vision = vision;
        }
        if let Some(directives) = active_directives {
            self.current.active_directives = directives;
        }
        if let Some(fps) = fps {
            self.current.fps = fps;
        }
        self.current.timestamp = self.clock.now_ms();

        self.history.push_back(self.current.clone());
        while self.history.len() > self.max_history_size {
            self.history.pop_front();
        }
    }

    pub fn current(&self) -> MaestroState {
        self.current.clone()
    }

    /// All recorded snapshots, oldest first.
    pub fn history(&self) -> Vec<MaestroState> {
        self.history.iter().cloned().collect()
    }

    /// Snapshot closest to `timestamp`. On equal distance the older
    /// snapshot wins.
    pub fn state_at(&self, timestamp: f64) -> Option<MaestroState> {
        let mut best: Option<(&MaestroState, f64)> = None;
        for state in &self.history {
            let distance = (state.timestamp - timestamp).abs();
            if best.map_or(true, |(_, best_distance)| distance < best_distance) {
                best = Some((state, distance));
            }
        }
        best.map(|(state, _)| state.clone())
    }

    /// Snapshots recorded within `[start_ms, end_ms]`, oldest first.
    pub fn states_between(&self, start_ms: f64, end_ms: f64) -> Vec<MaestroState> {
        self.history
            .iter()
            .filter(|state| state.timestamp >= start_ms && state.timestamp <= end_ms)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.current = MaestroState::default();
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            history_size: self.history.len(),
            max_history_size: self.max_history_size,
            oldest_timestamp: self.history.front().map(|state| state.timestamp),
            newest_timestamp: self.history.back().map(|state| state.timestamp),
            current_fps: self.current.fps,
            active_directive_count: self.current.active_directives.len(),
        }
    }

    /// Serializes the recorded history for offline inspection.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.history)?)
    }
}
