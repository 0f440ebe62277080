use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use clap::{Parser, Subcommand};
use maestro_core::{
    AudioFeatures, ClockState, Command, Directive, FeatureMapper, Maestro, MaestroConfig,
    MaestroError, RefreshLoop, SceneState, SharedCommandBus, TickOutcome,
};
use tracing_subscriber::EnvFilter;

fn main() -> maestro_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            config,
            frames,
            bpm,
            burst,
            history,
        } => {
            let config = load_config(config.as_deref())?;
            run_live(config, frames, bpm, burst, history.as_deref())
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> maestro_core::Result<MaestroConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            MaestroConfig::load(path)
        }
        None => Ok(MaestroConfig::live_defaults()),
    }
}

fn run_live(
    config: MaestroConfig,
    max_frames: u64,
    bpm: f32,
    burst: usize,
    history: Option<&Path>,
) -> maestro_core::Result<()> {
    tracing::info!(max_frames, bpm, burst, "starting live mode");

    let mut refresh = RefreshLoop::new(config.scheduler.refresh_hz);
    let scene = Arc::new(Mutex::new(SceneState::new(&config.scene)));
    let mut maestro = Maestro::new(config)?;
    let mut mapper = FeatureMapper::live_defaults();

    let sink = scene.clone();
    let clock = maestro.clock();
    maestro.start(move |batch| {
        if let Ok(mut scene) = sink.lock() {
            scene.apply_batch(batch, clock.now_ms());
        }
    });

    let stop_burst = Arc::new(AtomicBool::new(false));
    let burst_thread = (burst > 0).then(|| {
        spawn_burst_producer(maestro.bus(), burst, refresh.interval(), stop_burst.clone())
    });

    let origin = maestro.now_ms();
    let mut failure = None;
    let frames = refresh.run(max_frames, || {
        match live_frame(&mut maestro, &mut mapper, &scene, bpm, origin) {
            Ok(outcome) => outcome,
            Err(err) => {
                failure = Some(err);
                TickOutcome::Halted
            }
        }
    });
    tracing::info!(frames, "live loop finished");

    stop_burst.store(true, Ordering::Relaxed);
    if let Some(handle) = burst_thread {
        if handle.join().is_err() {
            tracing::warn!("burst producer panicked");
        }
    }
    maestro.stop();
    if let Some(err) = failure {
        return Err(err);
    }

    let stats = maestro.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if let Some(path) = history {
        tracing::info!(?path, snapshots = maestro.store().len(), "writing state history");
        std::fs::write(path, maestro.store().to_json()?)?;
    }

    Ok(())
}

/// One refresh of the live feed: publishes the mapper's commands, ticks the
/// orchestrator and folds the scene palette back in as a directive.
fn live_frame(
    maestro: &mut Maestro,
    mapper: &mut FeatureMapper,
    scene: &Mutex<SceneState>,
    bpm: f32,
    origin: f64,
) -> maestro_core::Result<TickOutcome> {
    let now = maestro.now_ms();
    let clock = ClockState::steady(bpm, now - origin);
    let audio = synthesize_features(&clock, now - origin);
    for command in mapper.evaluate(&audio, Some(&clock), now) {
        maestro.enqueue(command, None)?;
    }
    maestro.observe_clock(clock);
    maestro.observe_audio(audio);

    let outcome = maestro.frame();

    let palette = {
        let mut scene = scene
            .lock()
            .map_err(|_| MaestroError::Poisoned("scene state"))?;
        scene.advance(maestro.now_ms());
        scene.value("palette")
    };
    if let Some(value) = palette {
        maestro.set_directives(vec![Directive::new("palette-cycle", "palette", value)]);
    }

    Ok(outcome)
}

/// Floods the bus with pulses from another thread to exercise overload
/// shedding.
fn spawn_burst_producer(
    bus: SharedCommandBus,
    per_interval: usize,
    interval: std::time::Duration,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut round = 0u64;
        while !stop.load(Ordering::Relaxed) {
            for i in 0..per_interval {
                let target = format!("burst-{}", (round as usize + i) % 16);
                if bus.enqueue(Command::pulse(target, 0.5), None).is_err() {
                    return;
                }
            }
            round += 1;
            thread::sleep(interval);
        }
    })
}

/// Beat-locked stand-in for the audio analysis pipeline.
fn synthesize_features(clock: &ClockState, elapsed_ms: f64) -> AudioFeatures {
    let envelope = (1.0 - clock.beat_phase).powi(3);
    let sway = ((elapsed_ms / 1_000.0) * 0.7).sin() as f32;
    AudioFeatures {
        rms: 0.2 + 0.6 * envelope,
        bass: envelope,
        mid: 0.5 + 0.4 * sway,
        treble: 0.3 + 0.2 * (1.0 - clock.bar_phase),
        spectral_centroid: 0.4 + 0.3 * sway,
        onset: false,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time command orchestration for audio-reactive visuals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the orchestration loop against a simulated beat-locked feed.
    Live {
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of refresh frames to run before shutting down.
        #[arg(short, long, default_value_t = 600)]
        frames: u64,
        /// Tempo of the simulated feed.
        #[arg(long, default_value_t = 128.0)]
        bpm: f32,
        /// Extra pulses per refresh pushed from a background producer.
        #[arg(long, default_value_t = 0)]
        burst: usize,
        /// Write the recorded state history to this path as JSON.
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON.
    Config {
        /// Optional JSON configuration file to validate and print.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::ManualClock;

    #[test]
    fn refresh_loop_drives_live_frames_until_stopped() {
        let clock = ManualClock::shared(0.0);
        let config = MaestroConfig::live_defaults();
        let scene = Mutex::new(SceneState::new(&config.scene));
        let mut maestro = Maestro::with_clock(config, clock).unwrap();
        let mut mapper = FeatureMapper::live_defaults();
        let mut refresh = RefreshLoop::new(1_000.0);

        // Not started yet: the first tick halts the loop.
        let frames = refresh.run(10, || {
            live_frame(&mut maestro, &mut mapper, &scene, 128.0, 0.0).unwrap()
        });
        assert_eq!(frames, 0);

        maestro.start(|_| {});
        let frames = refresh.run(10, || {
            live_frame(&mut maestro, &mut mapper, &scene, 128.0, 0.0).unwrap()
        });
        assert_eq!(frames, 10);
        assert_eq!(maestro.scheduler().stats().frame_count, 10);
        let stats = maestro.stats().unwrap();
        assert!(stats.bus.total_enqueued > 0);
        assert!(stats.scheduler.total_commands_dispatched > 0);
    }
}
