//! Reverb impulse synthesis
//!
//! Generates a stereo noise-decay impulse response. Each channel is independent
//! white noise shaped by a power-law envelope and a one-pole smoother, so left and
//! right differ and the convolver output has stereo width.

use crate::audio::types::PcmBuffer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::debug;

/// Weight of the new raw sample in the smoothing recursion
const SMOOTHING_NEW: f64 = 0.8;
/// Weight of the previous output sample in the smoothing recursion
const SMOOTHING_PREV: f64 = 0.2;

/// Impulse length in frames: `round(sample_rate × min(decay, cap))`, at least one frame
pub fn impulse_length(sample_rate: u32, decay_seconds: f64, max_seconds: Option<f64>) -> usize {
    let seconds = match max_seconds {
        Some(cap) => decay_seconds.min(cap),
        None => decay_seconds,
    };
    if !seconds.is_finite() || seconds <= 0.0 {
        return 1;
    }
    ((sample_rate as f64 * seconds).round() as usize).max(1)
}

/// Noise-decay impulse generator
///
/// Owns its random source so tests can seed it. Every call to
/// [`synthesize`](Self::synthesize) produces a fresh buffer; nothing is cached.
pub struct ReverbSynthesizer<R: Rng = StdRng> {
    rng: R,
}

impl ReverbSynthesizer<StdRng> {
    /// Synthesizer seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic synthesizer
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for ReverbSynthesizer<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ReverbSynthesizer<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Generate a two-channel impulse response.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Rate of the audio context the convolver runs at
    /// * `room_size` - Envelope exponent; larger values decay more slowly
    /// * `decay_seconds` - Requested impulse length
    /// * `max_seconds` - Tier cap on the impulse length (`None` = uncapped)
    ///
    /// # Returns
    ///
    /// A new buffer of [`impulse_length`] frames per channel.
    pub fn synthesize(
        &mut self,
        sample_rate: u32,
        room_size: f64,
        decay_seconds: f64,
        max_seconds: Option<f64>,
    ) -> Arc<PcmBuffer> {
        let length = impulse_length(sample_rate, decay_seconds, max_seconds);
        let exponent = if room_size.is_finite() { room_size.max(0.0) } else { 1.0 };

        let channels = (0..2)
            .map(|_| self.synthesize_channel(length, exponent))
            .collect();

        debug!(
            "Synthesized impulse: {} frames at {}Hz (room={:.2}, decay={:.2}s, cap={:?})",
            length, sample_rate, room_size, decay_seconds, max_seconds
        );

        Arc::new(PcmBuffer::new(sample_rate, channels))
    }

    fn synthesize_channel(&mut self, length: usize, exponent: f64) -> Vec<f32> {
        let mut out = Vec::with_capacity(length);
        let mut previous = 0.0f64;
        for i in 0..length {
            let envelope = ((length - i) as f64 / length as f64).powf(exponent);
            let raw = self.rng.gen_range(-1.0..1.0) * envelope;
            // Recursive: each output depends on the one before it
            let sample = if i == 0 {
                raw
            } else {
                SMOOTHING_NEW * raw + SMOOTHING_PREV * previous
            };
            previous = sample;
            out.push(sample as f32);
        }
        out
    }
}
