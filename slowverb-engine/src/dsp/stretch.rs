//! Pitch-preserving time stretch
//!
//! Offline render of a rate-adjusted copy of a decoded buffer. The algorithm is a
//! nearest-sample index remap: output frame `i` takes input frame `floor(i × rate)`.
//! The stride absorbs the rate change, so the result plays at native rate 1.0 for
//! the stretched duration. It is deliberately approximate; there is no phase
//! vocoder here.

use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use slowverb_common::QualityTier;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a stretch request
#[derive(Debug, Clone)]
pub struct StretchOutcome {
    /// Buffer to hand to the source node
    pub buffer: Arc<PcmBuffer>,
    /// Rate the source node should play `buffer` at
    pub native_rate: f64,
    /// Set when the render fell back to the original buffer
    pub degraded: Option<String>,
}

impl StretchOutcome {
    fn passthrough(buffer: Arc<PcmBuffer>, rate: f64) -> Self {
        Self {
            buffer,
            native_rate: rate,
            degraded: None,
        }
    }

    /// Whether `buffer` is a pre-rendered copy played at 1.0
    pub fn is_rendered(&self) -> bool {
        self.degraded.is_none() && self.native_rate == 1.0
    }
}

/// Render `input` at `rate` by nearest-sample resampling.
///
/// Output length is `floor(frames / rate)` at the input sample rate.
///
/// # Errors
///
/// `Error::InvalidState` when `rate` is not a positive finite number.
pub fn stretch_nearest(input: &PcmBuffer, rate: f64) -> Result<PcmBuffer> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::InvalidState(format!("Invalid stretch rate {}", rate)));
    }

    let in_frames = input.frames();
    let out_frames = (in_frames as f64 / rate).floor() as usize;

    let channels = input
        .channels
        .iter()
        .map(|channel| {
            (0..out_frames)
                .map(|i| {
                    let src = (i as f64 * rate).floor() as usize;
                    channel.get(src).copied().unwrap_or(0.0)
                })
                .collect()
        })
        .collect();

    Ok(PcmBuffer::new(input.sample_rate, channels))
}

/// Asynchronous front end over [`stretch_nearest`].
///
/// Never fails: every error is converted into the original buffer played at
/// native rate plus a `degraded` warning.
#[derive(Debug, Clone, Copy)]
pub struct TimeStretchProcessor {
    tier: QualityTier,
}

impl TimeStretchProcessor {
    pub fn new(tier: QualityTier) -> Self {
        Self { tier }
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    /// Produce the buffer and native rate to play.
    ///
    /// # Arguments
    ///
    /// * `buffer` - Decoded source buffer
    /// * `rate` - Requested playback rate
    /// * `preserve_pitch` - Pre-render instead of using native rate control
    pub async fn stretch(
        &self,
        buffer: Arc<PcmBuffer>,
        rate: f64,
        preserve_pitch: bool,
    ) -> StretchOutcome {
        if !preserve_pitch || rate == 1.0 {
            return StretchOutcome::passthrough(buffer, rate);
        }

        if self.tier == QualityTier::Basic {
            return Self::fallback(
                buffer,
                rate,
                "Pitch preservation is not available on this device".to_string(),
            );
        }

        let source = buffer.clone();
        let started = std::time::Instant::now();
        let rendered =
            tokio::task::spawn_blocking(move || stretch_nearest(&source, rate)).await;

        match rendered {
            Ok(Ok(stretched)) => {
                debug!(
                    "Stretched {} frames to {} at rate {:.2} in {:?}",
                    buffer.frames(),
                    stretched.frames(),
                    rate,
                    started.elapsed()
                );
                StretchOutcome {
                    buffer: Arc::new(stretched),
                    native_rate: 1.0,
                    degraded: None,
                }
            }
            Ok(Err(e)) => Self::fallback(buffer, rate, e.to_string()),
            Err(join_error) => Self::fallback(
                buffer,
                rate,
                format!("Offline render failed: {}", join_error),
            ),
        }
    }

    fn fallback(buffer: Arc<PcmBuffer>, rate: f64, reason: String) -> StretchOutcome {
        warn!("Time stretch fell back to native rate: {}", reason);
        let native_rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        StretchOutcome {
            buffer,
            native_rate,
            degraded: Some(reason),
        }
    }
}
