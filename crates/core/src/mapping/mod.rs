use serde::{Deserialize, Serialize};

use crate::analysis::{AudioFeatures, ClockState};
use crate::bus::Command;

/// Audio descriptor a mapping reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureSource {
    Rms,
    Bass,
    Mid,
    Treble,
    SpectralCentroid,
}

impl FeatureSource {
    pub fn read(self, features: &AudioFeatures) -> f32 {
        match self {
            Self::Rms => features.rms,
            Self::Bass => features.bass,
            Self::Mid => features.mid,
            Self::Treble => features.treble,
            Self::SpectralCentroid => features.spectral_centroid,
        }
    }
}

/// How a mapped value reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum MappingMode {
    Set,
    Ramp {
        #[serde(rename = "durationMs")]
        duration_ms: f64,
    },
}

/// Describes how a feature should be routed to a render parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDescriptor {
    pub source: FeatureSource,
    pub target: String,
    pub gain: f32,
    pub mode: MappingMode,
}

impl MappingDescriptor {
    pub fn set(source: FeatureSource, target: impl Into<String>, gain: f32) -> Self {
        Self {
            source,
            target: target.into(),
            gain,
            mode: MappingMode::Set,
        }
    }

    pub fn ramp(
        source: FeatureSource,
        target: impl Into<String>,
        gain: f32,
        duration_ms: f64,
    ) -> Self {
        Self {
            source,
            target: target.into(),
            gain,
            mode: MappingMode::Ramp { duration_ms },
        }
    }

    fn command(&self, features: &AudioFeatures) -> Command {
        let value = (self.source.read(features) * self.gain).clamp(0.0, 1.0);
        match self.mode {
            MappingMode::Set => Command::set(self.target.clone(), value),
            MappingMode::Ramp { duration_ms } => {
                Command::ramp(self.target.clone(), value, duration_ms)
            }
        }
    }
}

/// Feature-to-command producer. Continuous descriptors become `Set`/`Ramp`
/// commands every evaluation; beats become pulses and bar lines become
/// scheduled cues.
#[derive(Debug, Clone)]
pub struct FeatureMapper {
    descriptors: Vec<MappingDescriptor>,
    beat_target: String,
    bar_target: String,
    last_beat: Option<u64>,
    last_bar: Option<u64>,
}

impl FeatureMapper {
    pub fn new(beat_target: impl Into<String>, bar_target: impl Into<String>) -> Self {
        Self {
            descriptors: Vec::new(),
            beat_target: beat_target.into(),
            bar_target: bar_target.into(),
            last_beat: None,
            last_bar: None,
        }
    }

    pub fn live_defaults() -> Self {
        let mut mapper = Self::new("beat", "palette");
        mapper.push(MappingDescriptor::set(FeatureSource::Rms, "intensity", 1.5));
        mapper.push(MappingDescriptor::ramp(FeatureSource::Bass, "zoom", 1.0, 120.0));
        mapper.push(MappingDescriptor::set(
            FeatureSource::SpectralCentroid,
            "hue",
            1.0,
        ));
        mapper
    }

    pub fn push(&mut self, descriptor: MappingDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn descriptors(&self) -> &[MappingDescriptor] {
        &self.descriptors
    }

    /// Produces the commands for one observation at `now_ms`.
    pub fn evaluate(
        &mut self,
        audio: &AudioFeatures,
        clock: Option<&ClockState>,
        now_ms: f64,
    ) -> Vec<Command> {
        let mut commands: Vec<Command> = self
            .descriptors
            .iter()
            .map(|descriptor| descriptor.command(audio))
            .collect();

        let new_beat = clock
            .map(|clock| self.last_beat.replace(clock.beat_count) != Some(clock.beat_count))
            .unwrap_or(false);
        if new_beat || audio.onset {
            let intensity = clock.map(|clock| clock.confidence).unwrap_or(1.0);
            commands.push(Command::pulse(self.beat_target.clone(), intensity.max(audio.rms)));
        }

        if let Some(clock) = clock {
            let bar = clock.bar_index();
            if self.last_bar.replace(bar) != Some(bar) {
                if let Some(delay) = clock.ms_to_next_bar() {
                    let value = ((bar + 1) % 8) as f32 / 8.0;
                    commands.push(Command::schedule(
                        self.bar_target.clone(),
                        value,
                        now_ms + delay,
                    ));
                }
            }
        }

        commands
    }

    pub fn reset(&mut self) {
        self.last_beat = None;
        self.last_bar = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CommandKind;

    fn features(rms: f32, bass: f32) -> AudioFeatures {
        AudioFeatures {
            rms,
            bass,
            spectral_centroid: 0.25,
            ..Default::default()
        }
    }

    #[test]
    fn continuous_descriptors_emit_every_evaluation() {
        let mut mapper = FeatureMapper::live_defaults();
        let commands = mapper.evaluate(&features(0.8, 0.4), None, 0.0);

        assert_eq!(
            commands,
            vec![
                Command::set("intensity", 1.0),
                Command::ramp("zoom", 0.4, 120.0),
                Command::set("hue", 0.25),
            ]
        );
    }

    #[test]
    fn beats_pulse_once_and_bars_schedule_cues() {
        let mut mapper = FeatureMapper::new("beat", "palette");
        let audio = features(0.1, 0.0);

        let first = mapper.evaluate(&audio, Some(&ClockState::steady(120.0, 100.0)), 100.0);
        let kinds: Vec<CommandKind> = first.iter().map(Command::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Pulse, CommandKind::Schedule]);
        match &first[1] {
            Command::Schedule { execute_at_ms, .. } => assert!((execute_at_ms - 2_000.0).abs() < 1e-3),
            other => panic!("expected schedule, got {other:?}"),
        }

        let same_beat = mapper.evaluate(&audio, Some(&ClockState::steady(120.0, 300.0)), 300.0);
        assert!(same_beat.is_empty());

        let next_beat = mapper.evaluate(&audio, Some(&ClockState::steady(120.0, 600.0)), 600.0);
        assert_eq!(next_beat, vec![Command::pulse("beat", 1.0)]);
    }

    #[test]
    fn onsets_pulse_without_a_clock() {
        let mut mapper = FeatureMapper::new("beat", "palette");
        let audio = AudioFeatures {
            rms: 0.6,
            onset: true,
            ..Default::default()
        };
        assert_eq!(mapper.evaluate(&audio, None, 0.0), vec![Command::pulse("beat", 1.0)]);
    }

    #[test]
    fn descriptors_deserialize_from_json() {
        let descriptor: MappingDescriptor = serde_json::from_str(
            r#"{ "source": "bass", "target": "zoom", "gain": 2.0,
                 "mode": { "mode": "ramp", "durationMs": 80.0 } }"#,
        )
        .unwrap();
        assert_eq!(descriptor, MappingDescriptor::ramp(FeatureSource::Bass, "zoom", 2.0, 80.0));
    }
}
