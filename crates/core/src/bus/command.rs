use serde::{Deserialize, Serialize};

/// Priority assigned when nothing better is known. Every [`CommandKind`]
/// maps above it.
pub const UNKNOWN_PRIORITY: i32 = 0;

/// Control directive published by feature producers and applied by the render
/// consumer once the scheduler dispatches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Instantaneous visual accent on `target`.
    Pulse { target: String, intensity: f32 },
    /// Jump `target` to `value`.
    Set { target: String, value: f32 },
    /// Glide `target` to `value` over `duration_ms`.
    Ramp {
        target: String,
        value: f32,
        #[serde(rename = "durationMs")]
        duration_ms: f64,
    },
    /// Set `target` to `value` once the clock reaches `execute_at_ms`.
    Schedule {
        target: String,
        value: f32,
        #[serde(rename = "executeAtMs")]
        execute_at_ms: f64,
    },
}

impl Command {
    pub fn pulse(target: impl Into<String>, intensity: f32) -> Self {
        Self::Pulse {
            target: target.into(),
            intensity,
        }
    }

    pub fn set(target: impl Into<String>, value: f32) -> Self {
        Self::Set {
            target: target.into(),
            value,
        }
    }

    pub fn ramp(target: impl Into<String>, value: f32, duration_ms: f64) -> Self {
        Self::Ramp {
            target: target.into(),
            value,
            duration_ms,
        }
    }

    pub fn schedule(target: impl Into<String>, value: f32, execute_at_ms: f64) -> Self {
        Self::Schedule {
            target: target.into(),
            value,
            execute_at_ms,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Pulse { .. } => CommandKind::Pulse,
            Self::Set { .. } => CommandKind::Set,
            Self::Ramp { .. } => CommandKind::Ramp,
            Self::Schedule { .. } => CommandKind::Schedule,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Pulse { target, .. }
            | Self::Set { target, .. }
            | Self::Ramp { target, .. }
            | Self::Schedule { target, .. } => target,
        }
    }

    pub fn default_priority(&self) -> i32 {
        self.kind().default_priority()
    }
}

/// Discriminator of a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Pulse,
    Set,
    Ramp,
    Schedule,
}

impl CommandKind {
    /// Higher is more urgent. Pulses outrank everything so beat accents are
    /// never starved by queued cues.
    pub const fn default_priority(self) -> i32 {
        match self {
            Self::Pulse => 100,
            Self::Set => 50,
            Self::Ramp => 40,
            Self::Schedule => 30,
        }
    }
}

/// A queued command together with its effective priority and the time it
/// was accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub command: Command,
    pub priority: i32,
    pub enqueued_at_ms: f64,
}
