//! Media-element transport
//!
//! The compatibility path: no full decode up front. A background thread decodes
//! progressively into a lock-free ring and the [`ElementSourceNode`] drains it at
//! the playback rate. The element keeps its own playback time (track frames
//! consumed), which the controller reads instead of the engine clock.
//!
//! Starting at an offset decodes and discards everything before it.

use crate::audio::decoder::{probe, StreamInfo, StreamingDecoder};
use crate::audio::types::{AudioFile, AudioFrame};
use crate::error::{Error, Result};
use crate::graph::nodes::{SourceControl, SourceHandle, SourceNode};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ring capacity in seconds of context-rate audio
const RING_SECONDS: f64 = 0.5;
const MIN_RING_FRAMES: usize = 4096;
/// Decoder back-off while the ring is full
const FULL_RING_SLEEP: Duration = Duration::from_millis(5);

/// A loaded file playable through the element transport
#[derive(Debug, Clone)]
pub struct MediaElement {
    file: AudioFile,
    info: StreamInfo,
    duration_seconds: f64,
    context_rate: u32,
}

impl MediaElement {
    /// Probe `file` for playback into a context running at `context_rate`.
    ///
    /// Blocking: may scan the whole file when the container has no frame count.
    pub fn open(file: &AudioFile, context_rate: u32) -> Result<Self> {
        let info = probe(file)?;
        let duration_seconds = info.duration_seconds.unwrap_or(0.0);
        if duration_seconds <= 0.0 {
            return Err(Error::UnsupportedFormat(format!(
                "{} contains no decodable audio",
                file.name
            )));
        }
        Ok(Self {
            file: file.clone(),
            info,
            duration_seconds,
            context_rate,
        })
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Start a fresh decode at `offset_seconds` and return its source node.
    ///
    /// Each call is independent, so rewinding is just starting again at 0.
    pub fn start(
        &self,
        offset_seconds: f64,
        handle: &SourceHandle,
    ) -> Result<(ElementSourceNode, ElementClock)> {
        let file_rate = self.info.sample_rate.max(1);
        let start_frame = (offset_seconds.clamp(0.0, self.duration_seconds) * file_rate as f64)
            .round() as u64;

        let capacity = ((self.context_rate as f64 * RING_SECONDS) as usize).max(MIN_RING_FRAMES);
        let (producer, consumer) = HeapRb::<AudioFrame>::new(capacity).split();

        let finished = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let consumed = Arc::new(AtomicU64::new(0));

        let feeder = DecodeFeeder {
            bytes: self.file.bytes.clone(),
            extension: self.file.extension().map(str::to_string),
            skip_frames: start_frame,
            producer,
            finished: finished.clone(),
            cancelled: cancelled.clone(),
            control: handle.control(),
        };
        std::thread::Builder::new()
            .name("slowverb-element".to_string())
            .spawn(move || feeder.run())
            .map_err(|e| Error::Internal(format!("Failed to spawn decode thread: {}", e)))?;

        debug!(
            "Element started at frame {} of {} ({}Hz → {}Hz)",
            start_frame, self.file.name, file_rate, self.context_rate
        );

        let node = ElementSourceNode {
            consumer,
            control: handle.control(),
            finished,
            cancelled,
            consumed: consumed.clone(),
            rate_ratio: file_rate as f64 / self.context_rate.max(1) as f64,
            current: None,
            next: None,
            phase: 0.0,
            exhausted: false,
        };
        let clock = ElementClock {
            start_frame,
            consumed,
            sample_rate: file_rate,
        };
        Ok((node, clock))
    }
}

/// The element's own notion of playback time
#[derive(Debug, Clone)]
pub struct ElementClock {
    start_frame: u64,
    consumed: Arc<AtomicU64>,
    sample_rate: u32,
}

impl ElementClock {
    /// Track position in seconds
    pub fn current_time(&self) -> f64 {
        (self.start_frame + self.consumed.load(Ordering::Acquire)) as f64 / self.sample_rate as f64
    }
}

struct DecodeFeeder {
    bytes: Arc<[u8]>,
    extension: Option<String>,
    skip_frames: u64,
    producer: HeapProd<AudioFrame>,
    finished: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    control: Arc<SourceControl>,
}

impl DecodeFeeder {
    fn should_stop(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.control.is_stopped()
    }

    fn run(mut self) {
        if let Err(e) = self.feed() {
            warn!("Element decode stopped early: {}", e);
        }
        self.finished.store(true, Ordering::Release);
    }

    fn feed(&mut self) -> Result<()> {
        let mut decoder = StreamingDecoder::open(self.bytes.clone(), self.extension.as_deref())?;
        let mut to_skip = self.skip_frames as usize;

        while let Some([left, right]) = decoder.next_chunk()? {
            if self.should_stop() {
                return Ok(());
            }

            let skip = to_skip.min(left.len());
            to_skip -= skip;
            let frames: Vec<AudioFrame> = left[skip..]
                .iter()
                .zip(&right[skip..])
                .map(|(&l, &r)| AudioFrame::from_stereo(l, r))
                .collect();

            let mut written = 0;
            while written < frames.len() {
                written += self.producer.push_slice(&frames[written..]);
                if written < frames.len() {
                    if self.should_stop() {
                        return Ok(());
                    }
                    std::thread::sleep(FULL_RING_SLEEP);
                }
            }
        }
        Ok(())
    }
}

enum Pull {
    Frame(AudioFrame),
    Starved,
    End,
}

/// Render-side end of the element transport.
///
/// Resamples from the file rate to the context rate on the fly with linear
/// interpolation; the playback rate scales the step.
pub struct ElementSourceNode {
    consumer: HeapCons<AudioFrame>,
    control: Arc<SourceControl>,
    finished: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    consumed: Arc<AtomicU64>,
    rate_ratio: f64,
    current: Option<AudioFrame>,
    next: Option<AudioFrame>,
    phase: f64,
    exhausted: bool,
}

impl ElementSourceNode {
    fn pull(&mut self) -> Pull {
        if let Some(frame) = self.consumer.try_pop() {
            return Pull::Frame(frame);
        }
        // The feeder sets `finished` after its last push
        if self.finished.load(Ordering::Acquire) {
            match self.consumer.try_pop() {
                Some(frame) => Pull::Frame(frame),
                None => Pull::End,
            }
        } else {
            Pull::Starved
        }
    }
}

impl SourceNode for ElementSourceNode {
    fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.control.is_stopped() {
            return None;
        }
        if self.exhausted {
            self.control.mark_ended();
            return None;
        }

        let current = match self.current {
            Some(frame) => frame,
            None => match self.pull() {
                Pull::Frame(frame) => {
                    self.current = Some(frame);
                    frame
                }
                // Buffering: hold position, emit silence
                Pull::Starved => return Some(AudioFrame::zero()),
                Pull::End => {
                    self.exhausted = true;
                    self.control.mark_ended();
                    return None;
                }
            },
        };
        let next = match self.next {
            Some(frame) => frame,
            None => match self.pull() {
                Pull::Frame(frame) => {
                    self.next = Some(frame);
                    frame
                }
                Pull::Starved => return Some(AudioFrame::zero()),
                Pull::End => current,
            },
        };

        let frac = self.phase.min(1.0) as f32;
        let out = AudioFrame {
            left: current.left + (next.left - current.left) * frac,
            right: current.right + (next.right - current.right) * frac,
        };

        self.phase += self.control.rate().max(0.0) * self.rate_ratio;
        while self.phase >= 1.0 {
            self.phase -= 1.0;
            self.consumed.fetch_add(1, Ordering::AcqRel);
            match self.next.take() {
                Some(frame) => {
                    self.current = Some(frame);
                    if self.phase >= 1.0 {
                        match self.pull() {
                            Pull::Frame(frame) => self.next = Some(frame),
                            Pull::Starved => break,
                            Pull::End => {
                                self.exhausted = true;
                                break;
                            }
                        }
                    }
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        Some(out)
    }
}

impl Drop for ElementSourceNode {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
