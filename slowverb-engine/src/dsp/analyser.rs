//! Spectrum analyser
//!
//! Split in two halves:
//! - [`AnalyserTap`] lives in the render path and records the most recent
//!   `fft_size` mono samples. It never blocks: if the control side holds the
//!   window, the samples for that quantum are skipped.
//! - [`Analyser`] lives on the control side and turns the window into byte
//!   frequency data the way the browser `AnalyserNode` does (Blackman window,
//!   magnitude / fftSize, temporal smoothing, dB scaled into 0..=255).

use crate::audio::types::AudioFrame;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use slowverb_common::QualityTier;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex, TryLockError};

pub const DEFAULT_MIN_DECIBELS: f32 = -100.0;
pub const DEFAULT_MAX_DECIBELS: f32 = -30.0;

/// FFT size and smoothing for one tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    pub smoothing: f32,
}

impl AnalyserSettings {
    /// Coarser and smoother on lower tiers
    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::Basic => Self {
                fft_size: 64,
                smoothing: 0.85,
            },
            QualityTier::Medium => Self {
                fft_size: 128,
                smoothing: 0.8,
            },
            QualityTier::High => Self {
                fft_size: 256,
                smoothing: 0.75,
            },
        }
    }
}

struct TimeDomainWindow {
    samples: Vec<f32>,
    write: usize,
}

/// Render-side recorder feeding an [`Analyser`]
#[derive(Clone)]
pub struct AnalyserTap {
    window: Arc<Mutex<TimeDomainWindow>>,
}

impl AnalyserTap {
    /// Record a block of frames (downmixed to mono)
    pub fn record(&self, frames: &[AudioFrame]) {
        let mut window = match self.window.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let len = window.samples.len();
        if len == 0 {
            return;
        }
        for frame in frames {
            let w = window.write;
            window.samples[w] = frame.mono();
            window.write = (w + 1) % len;
        }
    }
}

/// Control-side spectrum analyser
pub struct Analyser {
    settings: AnalyserSettings,
    min_decibels: f32,
    max_decibels: f32,
    window: Arc<Mutex<TimeDomainWindow>>,
    blackman: Vec<f32>,
    smoothed: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
}

impl Analyser {
    /// Create an analyser and the tap that feeds it
    pub fn new(settings: AnalyserSettings) -> (Self, AnalyserTap) {
        let fft_size = settings.fft_size.max(2);
        let window = Arc::new(Mutex::new(TimeDomainWindow {
            samples: vec![0.0; fft_size],
            write: 0,
        }));

        let blackman = (0..fft_size)
            .map(|i| {
                let x = i as f32 / fft_size as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        let analyser = Self {
            settings: AnalyserSettings {
                fft_size,
                smoothing: settings.smoothing.clamp(0.0, 1.0),
            },
            min_decibels: DEFAULT_MIN_DECIBELS,
            max_decibels: DEFAULT_MAX_DECIBELS,
            window: window.clone(),
            blackman,
            smoothed: vec![0.0; fft_size / 2],
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        };
        (analyser, AnalyserTap { window })
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    /// Number of frequency bins (half the FFT size)
    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    pub fn smoothing(&self) -> f32 {
        self.settings.smoothing
    }

    /// Fill `out` with byte frequency data.
    ///
    /// At most [`frequency_bin_count`](Self::frequency_bin_count) entries are written.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_spectrum();

        let range = self.max_decibels - self.min_decibels;
        for (byte, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * magnitude.log10();
            let scaled = 255.0 / range * (db - self.min_decibels);
            *byte = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }

    /// Forget smoothing history and recorded samples
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
        let mut window = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        window.samples.iter_mut().for_each(|s| *s = 0.0);
        window.write = 0;
    }

    fn update_spectrum(&mut self) {
        let n = self.settings.fft_size;
        {
            let window = match self.window.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Oldest sample first
            for i in 0..n {
                let s = window.samples[(window.write + i) % n];
                self.buffer[i] = Complex::new(s * self.blackman[i], 0.0);
            }
        }

        self.fft.process(&mut self.buffer);

        let tau = self.settings.smoothing;
        let norm = 1.0 / n as f32;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[k].norm() * norm;
            let value = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if value.is_finite() { value } else { 0.0 };
        }
    }
}
