//! Stereo biquad low-pass filter
//!
//! Direct Form II Transposed with coefficients from the Audio EQ Cookbook
//! (Robert Bristow-Johnson). The resonance follows the browser `BiquadFilterNode`
//! default for low-pass, a Q of 1 dB.

use crate::audio::types::AudioFrame;
use std::f64::consts::PI;

/// Low-pass resonance in dB
pub const DEFAULT_Q_DB: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
struct ChannelState {
    z1: f64,
    z2: f64,
}

/// A 2nd-order low-pass filter applied to both channels of a stereo stream.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    frequency: f64,
    q_db: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    left: ChannelState,
    right: ChannelState,

    sample_rate: f64,
}

impl LowPassFilter {
    pub fn new(sample_rate: u32, frequency: f64) -> Self {
        let mut f = LowPassFilter {
            frequency,
            q_db: DEFAULT_Q_DB,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            left: ChannelState::default(),
            right: ChannelState::default(),
            sample_rate: sample_rate as f64,
        };
        f.update_coefficients();
        f
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Change the cutoff. No-op when unchanged, so callers may set it every block.
    pub fn set_frequency(&mut self, frequency: f64) {
        if (frequency - self.frequency).abs() > f64::EPSILON {
            self.frequency = frequency;
            self.update_coefficients();
        }
    }

    /// Recompute filter coefficients from current parameters.
    fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        // Above Nyquist the filter passes everything
        if self.frequency >= nyquist {
            self.b0 = 1.0;
            self.b1 = 0.0;
            self.b2 = 0.0;
            self.a1 = 0.0;
            self.a2 = 0.0;
            return;
        }

        let w0 = 2.0 * PI * self.frequency.max(1.0) / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / 2.0 * 10f64.powf(-self.q_db / 20.0);

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        let b2 = b0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    #[inline]
    fn step(&self, state: &mut ChannelState, input: f64) -> f64 {
        let output = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * output + state.z2;
        state.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Filter one stereo frame.
    pub fn process(&mut self, frame: AudioFrame) -> AudioFrame {
        let mut left = self.left;
        let mut right = self.right;
        let out = AudioFrame {
            left: self.step(&mut left, frame.left as f64) as f32,
            right: self.step(&mut right, frame.right as f64) as f32,
        };
        self.left = left;
        self.right = right;
        out
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.left = ChannelState::default();
        self.right = ChannelState::default();
    }
}
