//! Feature types produced by the analysis pipelines and consumed by the
//! orchestrator. Extraction itself happens outside this crate.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Tempo and phase reported by beat tracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockState {
    pub bpm: f32,
    /// Position inside the current beat, `[0, 1)`.
    pub beat_phase: f32,
    /// Position inside the current bar, `[0, 1)`.
    pub bar_phase: f32,
    /// Beats elapsed since tracking started.
    pub beat_count: u64,
    pub beats_per_bar: u32,
    pub confidence: f32,
}

impl ClockState {
    /// Derives a perfectly steady clock at `bpm` after `elapsed_ms`.
    pub fn steady(bpm: f32, elapsed_ms: f64) -> Self {
        let beats_per_bar = DEFAULT_BEATS_PER_BAR;
        if bpm <= 0.0 {
            return Self {
                bpm,
                beats_per_bar,
                ..Default::default()
            };
        }

        let beats = elapsed_ms.max(0.0) / Self::beat_ms_for(bpm);
        let bars = beats / beats_per_bar as f64;
        Self {
            bpm,
            beat_phase: beats.fract() as f32,
            bar_phase: bars.fract() as f32,
            beat_count: beats.floor() as u64,
            beats_per_bar,
            confidence: 1.0,
        }
    }

    /// Length of one beat in milliseconds, or `None` without a tempo.
    pub fn beat_ms(&self) -> Option<f64> {
        (self.bpm > 0.0).then(|| Self::beat_ms_for(self.bpm))
    }

    pub fn bar_index(&self) -> u64 {
        self.beat_count / u64::from(self.beats_per_bar.max(1))
    }

    /// Milliseconds until the next bar line, measured from now.
    pub fn ms_to_next_bar(&self) -> Option<f64> {
        let bar_ms = self.beat_ms()? * f64::from(self.beats_per_bar.max(1));
        Some((1.0 - f64::from(self.bar_phase)) * bar_ms)
    }

    fn beat_ms_for(bpm: f32) -> f64 {
        60_000.0 / f64::from(bpm)
    }
}

/// Per-block audio descriptors, normalised to `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFeatures {
    pub rms: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub spectral_centroid: f32,
    /// A transient was detected in this block.
    pub onset: bool,
}

/// Camera-derived descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionFeatures {
    pub motion: f32,
    pub brightness: f32,
    pub presence: f32,
}
