//! slowverb - command-line player
//!
//! Plays one file through the effects engine and prints progress until the
//! track ends or Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use slowverb_common::human_time::format_progress;
use slowverb_common::{EffectParam, PresetId, SessionSnapshot, SessionState};
use slowverb_engine::audio::{AudioFile, DeviceOutput, ManualDriver, OutputDriver};
use slowverb_engine::capability::{detect_with_config, EnvironmentSignals};
use slowverb_engine::config::Config;
use slowverb_engine::graph::Renderer;
use slowverb_engine::playback::{ControllerOptions, PlaybackController};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Context rate for headless rendering
const HEADLESS_SAMPLE_RATE: u32 = 44100;
const HEADLESS_SPEEDUP: f64 = 8.0;

/// Command-line arguments for slowverb
#[derive(Parser, Debug)]
#[command(name = "slowverb")]
#[command(about = "Slowed + reverb audio player")]
#[command(version)]
struct Args {
    /// Audio file to play
    file: PathBuf,

    /// Start from a built-in preset (bedroom, vaporwave, chill, midnight)
    #[arg(short, long)]
    preset: Option<PresetId>,

    /// Playback rate, applied after the preset
    #[arg(short, long)]
    rate: Option<f64>,

    /// Reverb wet level (0.0-1.0)
    #[arg(long)]
    wet: Option<f64>,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    cutoff: Option<f64>,

    /// Keep the original pitch when slowing down
    #[arg(long)]
    preserve_pitch: bool,

    /// Config file (overrides SLOWVERB_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render without an output device
    #[arg(long)]
    headless: bool,

    /// Print snapshots as JSON lines instead of a progress line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.clone()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting slowverb v{}", env!("CARGO_PKG_VERSION"));

    let capabilities = detect_with_config(&EnvironmentSignals::from_host(), &config.settings);

    let (renderer, driver, manual): (Arc<Renderer>, Arc<dyn OutputDriver>, Option<ManualDriver>) =
        if args.headless {
            let driver = ManualDriver::new(HEADLESS_SAMPLE_RATE);
            (driver.renderer(), Arc::new(driver.clone()), Some(driver))
        } else {
            let buffer_frames = config.output_buffer_frames(&capabilities);
            let (device, renderer) = DeviceOutput::open(Some(buffer_frames))
                .context("Failed to open audio output (try --headless)")?;
            info!("Output device: {}", device.device_name());
            (renderer, Arc::new(device), None)
        };

    let controller = PlaybackController::with_output(
        renderer,
        driver,
        capabilities,
        config.settings.clone(),
        ControllerOptions::default(),
    )
    .context("Failed to initialize playback engine")?;

    if let Some(preset) = args.preset {
        controller.apply_preset(preset).await?;
    }
    let overrides = [
        (EffectParam::PlaybackRate, args.rate),
        (EffectParam::ReverbWet, args.wet),
        (EffectParam::LowPass, args.cutoff),
    ];
    for (param, value) in overrides {
        if let Some(value) = value {
            controller.set_effect_parameter(param, value).await?;
        }
    }
    if args.preserve_pitch {
        controller
            .set_effect_parameter(EffectParam::PreservePitch, 1.0)
            .await?;
    }

    let file = AudioFile::from_path(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    controller.select_file(file).await?;
    controller.play().await?;

    // Headless output is pumped one chunk at a time, faster than real time
    if let Some(driver) = manual {
        let chunk = capabilities.chunk_size as usize;
        let period = Duration::from_secs_f64(
            chunk as f64 / HEADLESS_SAMPLE_RATE as f64 / HEADLESS_SPEEDUP,
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                driver.pump(chunk);
            }
        });
    }

    let mut snapshots = controller.subscribe();
    let mut last_printed = -1.0f64;
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if args.json {
                    println!("{}", serde_json::to_string(&snapshot)?);
                } else if (snapshot.current_time_seconds - last_printed).abs() >= 1.0
                    || snapshot.state != SessionState::Playing
                {
                    last_printed = snapshot.current_time_seconds;
                    print_progress(&snapshot);
                }
                match snapshot.state {
                    SessionState::Ended => break,
                    SessionState::Error => {
                        let message = snapshot
                            .last_error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "unknown error".to_string());
                        bail!("Playback failed: {}", message);
                    }
                    _ => {}
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
        }
    }

    if let Some(error) = controller.snapshot().last_error {
        warn!("Last notice: {}", error.message);
    }
    controller.shutdown().await;
    Ok(())
}

fn print_progress(snapshot: &SessionSnapshot) {
    println!(
        "[{}] {} {} (x{:.2}, {} tier)",
        snapshot.state,
        snapshot.file_name.as_deref().unwrap_or("-"),
        format_progress(snapshot.current_time_seconds, snapshot.duration_seconds),
        snapshot.parameters.playback_rate,
        snapshot.quality_tier,
    );
}
