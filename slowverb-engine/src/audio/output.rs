//! Audio output drivers
//!
//! An [`OutputDriver`] pulls frames from a [`Renderer`] and can be suspended and
//! resumed. Two implementations:
//! - [`DeviceOutput`]: the default cpal device, owned by a dedicated thread
//!   because `cpal::Stream` is not `Send` on every platform
//! - [`ManualDriver`]: no device; the host pumps frames explicitly (headless
//!   rendering, tests)

use crate::audio::types::AudioFrame;
use crate::error::{Error, Result};
use crate::graph::render::Renderer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Preferred context rate when the device supports it
pub const PREFERRED_SAMPLE_RATE: u32 = 44100;

/// A destination that pulls audio from the renderer
pub trait OutputDriver: Send + Sync {
    /// Rate the renderer must produce
    fn sample_rate(&self) -> u32;

    /// Start pulling frames. May block briefly.
    ///
    /// # Errors
    /// `Error::NeedsUserGesture` when the platform refuses to start output
    /// until the user interacts; retrying later is valid.
    fn resume(&self) -> Result<()>;

    /// Stop pulling frames; the engine clock stops with it
    fn suspend(&self) -> Result<()>;

    fn is_running(&self) -> bool;
}

enum DeviceCommand {
    Resume(mpsc::Sender<Result<()>>),
    Suspend(mpsc::Sender<Result<()>>),
    Shutdown,
}

/// Default output device driven through cpal.
///
/// The stream is created paused; [`resume`](OutputDriver::resume) starts it.
pub struct DeviceOutput {
    commands: mpsc::Sender<DeviceCommand>,
    sample_rate: u32,
    device_name: String,
    running: Arc<AtomicBool>,
    /// Stream error flag, set by the audio callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl DeviceOutput {
    /// Open the default output device.
    ///
    /// # Arguments
    /// - `buffer_size`: Optional buffer size in frames (None = device default)
    ///
    /// # Returns
    /// The driver and the renderer it pulls from, created at the device's rate
    ///
    /// # Errors
    /// `Error::EngineUnavailable` if there is no usable output device
    pub fn open(buffer_size: Option<u32>) -> Result<(Self, Arc<Renderer>)> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, String, Arc<Renderer>)>>();
        let (command_tx, command_rx) = mpsc::channel::<DeviceCommand>();
        let running = Arc::new(AtomicBool::new(false));
        let error_flag = Arc::new(AtomicBool::new(false));
        let error_count = Arc::new(AtomicU32::new(0));

        let thread_running = Arc::clone(&running);
        let thread_error_flag = Arc::clone(&error_flag);
        let thread_error_count = Arc::clone(&error_count);

        std::thread::Builder::new()
            .name("slowverb-output".to_string())
            .spawn(move || {
                let opened = open_stream(buffer_size, thread_error_flag, thread_error_count);
                let (stream, sample_rate, name, renderer) = match opened {
                    Ok(parts) => parts,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok((sample_rate, name, renderer)));

                // Keep the stream alive on this thread until shutdown
                while let Ok(command) = command_rx.recv() {
                    match command {
                        DeviceCommand::Resume(reply) => {
                            let result = stream.play().map_err(|e| {
                                Error::NeedsUserGesture(format!("Output refused to start: {}", e))
                            });
                            if result.is_ok() {
                                thread_running.store(true, Ordering::SeqCst);
                            }
                            let _ = reply.send(result);
                        }
                        DeviceCommand::Suspend(reply) => {
                            let result = stream.pause().map_err(|e| {
                                Error::AudioOutput(format!("Failed to pause stream: {}", e))
                            });
                            thread_running.store(false, Ordering::SeqCst);
                            let _ = reply.send(result);
                        }
                        DeviceCommand::Shutdown => break,
                    }
                }

                thread_running.store(false, Ordering::SeqCst);
                info!("Audio output thread stopped");
            })
            .map_err(|e| Error::EngineUnavailable(format!("Failed to spawn output thread: {}", e)))?;

        let (sample_rate, device_name, renderer) = ready_rx
            .recv()
            .map_err(|_| Error::EngineUnavailable("Output thread exited during setup".to_string()))??;

        info!("Audio output ready on '{}' at {}Hz", device_name, sample_rate);

        Ok((
            Self {
                commands: command_tx,
                sample_rate,
                device_name,
                running,
                error_flag,
                error_count,
            },
            renderer,
        ))
    }

    /// Get device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Check if an audio stream error has occurred.
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Number of stream errors reported by the device
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    fn request(&self, make: impl FnOnce(mpsc::Sender<Result<()>>) -> DeviceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| Error::EngineUnavailable("Output thread is gone".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| Error::EngineUnavailable("Output thread is gone".to_string()))?
    }
}

impl OutputDriver for DeviceOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&self) -> Result<()> {
        self.request(DeviceCommand::Resume)
    }

    fn suspend(&self) -> Result<()> {
        self.request(DeviceCommand::Suspend)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCommand::Shutdown);
    }
}

/// Open the default device and build a paused stream.
fn open_stream(
    buffer_size: Option<u32>,
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
) -> Result<(Stream, u32, String, Arc<Renderer>)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::EngineUnavailable("No default output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using default audio device: {}", name);

    let (mut config, sample_format) = get_best_config(&device)?;

    if let Some(size) = buffer_size {
        config.buffer_size = cpal::BufferSize::Fixed(size);
        debug!("Using requested buffer size: {} frames", size);
    } else {
        debug!("Using device default buffer size");
    }

    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
        config.sample_rate.0, config.channels, sample_format, config.buffer_size
    );

    let renderer = Arc::new(Renderer::new(config.sample_rate.0));

    let stream = match sample_format {
        SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, renderer.clone(), error_flag, error_count)?
        }
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &config, renderer.clone(), error_flag, error_count)?
        }
        SampleFormat::U16 => {
            build_stream::<u16>(&device, &config, renderer.clone(), error_flag, error_count)?
        }
        other => {
            return Err(Error::EngineUnavailable(format!(
                "Unsupported sample format: {:?}",
                other
            )));
        }
    };

    // Some backends start streams on creation
    if let Err(e) = stream.pause() {
        warn!("Could not pause new stream: {}", e);
    }

    Ok((stream, config.sample_rate.0, name, renderer))
}

/// Get the best supported configuration for playback.
///
/// Prefers 44.1kHz stereo f32, falls back to the device default.
fn get_best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported_configs = device
        .supported_output_configs()
        .map_err(|e| Error::EngineUnavailable(format!("Failed to get device configs: {}", e)))?;

    let preferred = supported_configs.find(|config| {
        config.channels() == 2
            && config.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
            && config.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
            && config.sample_format() == SampleFormat::F32
    });

    if let Some(supported_config) = preferred {
        let sample_format = supported_config.sample_format();
        let config = supported_config
            .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
            .config();
        return Ok((config, sample_format));
    }

    let supported_config = device
        .default_output_config()
        .map_err(|e| Error::EngineUnavailable(format!("Failed to get default config: {}", e)))?;

    let sample_format = supported_config.sample_format();
    Ok((supported_config.config(), sample_format))
}

/// Build an output stream for sample type `T`.
///
/// The callback renders into a reused frame buffer, clamps, and converts.
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    renderer: Arc<Renderer>,
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut frames: Vec<AudioFrame> = Vec::with_capacity(4096);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let needed = data.len() / channels.max(1);
                if frames.len() != needed {
                    frames.resize(needed, AudioFrame::zero());
                }
                renderer.render(&mut frames);

                for (out, frame) in data.chunks_mut(channels.max(1)).zip(frames.iter()) {
                    let mut frame = *frame;
                    frame.clamp();
                    out[0] = T::from_sample(frame.left);
                    if channels > 1 {
                        out[1] = T::from_sample(frame.right);
                    }
                    for extra in out.iter_mut().skip(2) {
                        *extra = T::EQUILIBRIUM;
                    }
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
                error_count.fetch_add(1, Ordering::SeqCst);
            },
            None, // No timeout
        )
        .map_err(|e| Error::EngineUnavailable(format!("Failed to build stream: {}", e)))
}

struct ManualShared {
    renderer: Arc<Renderer>,
    running: AtomicBool,
    requires_gesture: AtomicBool,
}

/// Device-less driver: frames are rendered only when the host calls [`pump`](Self::pump).
///
/// Clones share state, so a test can keep one clone for pumping while the engine
/// owns another.
#[derive(Clone)]
pub struct ManualDriver {
    shared: Arc<ManualShared>,
}

impl ManualDriver {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            shared: Arc::new(ManualShared {
                renderer: Arc::new(Renderer::new(sample_rate)),
                running: AtomicBool::new(false),
                requires_gesture: AtomicBool::new(false),
            }),
        }
    }

    pub fn renderer(&self) -> Arc<Renderer> {
        self.shared.renderer.clone()
    }

    /// Refuse to resume until [`grant_gesture`](Self::grant_gesture) is called
    pub fn require_gesture(&self) {
        self.shared.requires_gesture.store(true, Ordering::SeqCst);
    }

    /// Record that the user interacted
    pub fn grant_gesture(&self) {
        self.shared.requires_gesture.store(false, Ordering::SeqCst);
    }

    /// Render `frames` frames if running; returns what was rendered.
    pub fn pump(&self, frames: usize) -> Vec<AudioFrame> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let mut out = vec![AudioFrame::zero(); frames];
        self.shared.renderer.render(&mut out);
        out
    }

    /// Pump in quanta of `block` frames until `seconds` of audio have been rendered
    pub fn pump_seconds(&self, seconds: f64, block: usize) -> Vec<AudioFrame> {
        let total = (seconds * self.shared.renderer.sample_rate() as f64).round() as usize;
        let block = block.max(1);
        let mut rendered = Vec::with_capacity(total);
        while rendered.len() < total {
            let chunk = self.pump(block.min(total - rendered.len()));
            if chunk.is_empty() {
                break;
            }
            rendered.extend(chunk);
        }
        rendered
    }
}

impl OutputDriver for ManualDriver {
    fn sample_rate(&self) -> u32 {
        self.shared.renderer.sample_rate()
    }

    fn resume(&self) -> Result<()> {
        if self.shared.requires_gesture.load(Ordering::SeqCst) {
            return Err(Error::NeedsUserGesture(
                "Output is waiting for user interaction".to_string(),
            ));
        }
        self.shared.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> Result<()> {
        self.shared.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}
