//! Real-time command orchestration core for audio-reactive visuals.
//!
//! Feature producers publish [`Command`]s into a bounded priority
//! [`CommandBus`]. A [`Scheduler`] ticked once per display refresh drains the
//! bus under a strict per-frame time budget and hands each batch to the render
//! consumer, so the frame loop never waits on command processing. A
//! [`StateStore`] keeps a bounded history of orchestration snapshots for
//! inspection and coarse replay. [`Maestro`] owns all three around a single
//! shared [`Clock`].

pub mod analysis;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod mapping;
pub mod orchestrator;
pub mod record;
pub mod scene;
pub mod timeline;

pub use analysis::{AudioFeatures, ClockState, VisionFeatures};
pub use bus::{BusStats, Command, CommandBus, CommandKind, QueueEntry, SharedCommandBus};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::{BusConfig, MaestroConfig, SceneConfig, SchedulerConfig, StateConfig};
pub use error::{MaestroError, Result};
pub use mapping::{FeatureMapper, FeatureSource, MappingDescriptor, MappingMode};
pub use orchestrator::{Maestro, MaestroStats};
pub use record::{Directive, MaestroState, StatePatch, StateStore, StoreStats};
pub use scene::SceneState;
pub use timeline::{
    BatchHandler, FpsMeter, FrameRequest, RefreshLoop, Scheduler, SchedulerStats, TickOutcome,
};
