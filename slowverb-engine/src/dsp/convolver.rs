//! Partitioned FFT convolution
//!
//! Uniformly partitioned overlap-save convolution. The impulse response is cut
//! into `block`-sized partitions whose spectra are computed once when the kernel
//! is built; the realtime side only runs one forward and one inverse FFT per
//! block plus a multiply-accumulate over the partitions.
//!
//! Input is gathered into blocks, so the output lags the input by one block.

use crate::audio::types::{AudioFrame, PcmBuffer};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Default partition size in frames
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

// Power normalization constants of the browser convolver
const GAIN_CALIBRATION_DB: f32 = -58.0;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Pre-transformed impulse response, ready to be swapped into a [`Convolver`]
pub struct ConvolverKernel {
    block: usize,
    /// `[channel][partition][bin]`
    partitions: Vec<Vec<Vec<Complex<f32>>>>,
    scale: f32,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    ir_frames: usize,
}

impl ConvolverKernel {
    /// Transform `ir` into partition spectra.
    ///
    /// # Arguments
    ///
    /// * `ir` - Impulse response (first two channels used; mono applies to both sides)
    /// * `block` - Partition size in frames
    /// * `normalize` - Apply power normalization so wet loudness is independent of the IR
    pub fn new(ir: &PcmBuffer, block: usize, normalize: bool) -> Self {
        let block = block.max(1);
        let fft_size = block * 2;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let ir_frames = ir.frames().max(1);
        let partition_count = ir_frames.div_ceil(block);
        let channel_count = ir.channel_count().clamp(1, 2);

        let mut scratch = vec![Complex::new(0.0, 0.0); forward.get_inplace_scratch_len()];
        let partitions = (0..channel_count)
            .map(|c| {
                let samples = ir.channels.get(c).map(Vec::as_slice).unwrap_or(&[]);
                (0..partition_count)
                    .map(|p| {
                        let mut spectrum = vec![Complex::new(0.0, 0.0); fft_size];
                        let start = p * block;
                        for (i, bin) in spectrum.iter_mut().take(block).enumerate() {
                            if let Some(&s) = samples.get(start + i) {
                                bin.re = s;
                            }
                        }
                        forward.process_with_scratch(&mut spectrum, &mut scratch);
                        spectrum
                    })
                    .collect()
            })
            .collect();

        let scale = if normalize {
            normalization_scale(ir)
        } else {
            1.0
        };

        Self {
            block,
            partitions,
            scale,
            forward,
            inverse,
            ir_frames,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.first().map(Vec::len).unwrap_or(0)
    }

    pub fn ir_frames(&self) -> usize {
        self.ir_frames
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    fn channel(&self, index: usize) -> &[Vec<Complex<f32>>] {
        let last = self.partitions.len().saturating_sub(1);
        &self.partitions[index.min(last)]
    }
}

/// Gain that makes the IR's RMS power land on a fixed calibration level
pub fn normalization_scale(ir: &PcmBuffer) -> f32 {
    let frames = ir.frames();
    let channels = ir.channel_count();
    if frames == 0 || channels == 0 {
        return 1.0;
    }

    let sum: f32 = ir
        .channels
        .iter()
        .flat_map(|c| c.iter())
        .map(|s| s * s)
        .sum();
    let power = (sum / (channels * frames) as f32).sqrt();
    let power = if power.is_finite() && power >= MIN_POWER {
        power
    } else {
        MIN_POWER
    };

    let mut scale = 1.0 / power;
    scale *= 10f32.powf(GAIN_CALIBRATION_DB * 0.05);
    if ir.sample_rate > 0 {
        scale *= GAIN_CALIBRATION_SAMPLE_RATE / ir.sample_rate as f32;
    }
    scale
}

struct ChannelState {
    /// Previous block followed by the block being gathered
    input: Vec<f32>,
    /// Frequency-domain delay line of past input spectra
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    accumulator: Vec<Complex<f32>>,
    output: Vec<f32>,
}

impl ChannelState {
    fn new(block: usize, partitions: usize) -> Self {
        let fft_size = block * 2;
        Self {
            input: vec![0.0; fft_size],
            history: vec![vec![Complex::new(0.0, 0.0); fft_size]; partitions.max(1)],
            head: 0,
            accumulator: vec![Complex::new(0.0, 0.0); fft_size],
            output: vec![0.0; block],
        }
    }

    fn process_block(
        &mut self,
        kernel_channel: &[Vec<Complex<f32>>],
        kernel: &ConvolverKernel,
        scratch: &mut [Complex<f32>],
    ) {
        let block = kernel.block;
        let fft_size = block * 2;
        let partitions = self.history.len();

        // Newest spectrum goes one slot back so history[head + k] is k blocks old
        self.head = (self.head + partitions - 1) % partitions;
        let slot = &mut self.history[self.head];
        for (bin, &s) in slot.iter_mut().zip(self.input.iter()) {
            *bin = Complex::new(s, 0.0);
        }
        kernel.forward.process_with_scratch(slot, scratch);

        for bin in self.accumulator.iter_mut() {
            *bin = Complex::new(0.0, 0.0);
        }
        for (k, h) in kernel_channel.iter().enumerate().take(partitions) {
            let x = &self.history[(self.head + k) % partitions];
            for ((acc, &xv), &hv) in self.accumulator.iter_mut().zip(x.iter()).zip(h.iter()) {
                *acc += xv * hv;
            }
        }
        kernel
            .inverse
            .process_with_scratch(&mut self.accumulator, scratch);

        // Overlap-save: keep the second half, which is free of circular wrap
        let gain = kernel.scale / fft_size as f32;
        for (out, acc) in self.output.iter_mut().zip(self.accumulator[block..].iter()) {
            *out = acc.re * gain;
        }

        self.input.copy_within(block.., 0);
    }
}

/// Stereo convolver running on the render thread.
///
/// A stereo IR is applied per channel: left input with IR channel 0, right input
/// with IR channel 1.
pub struct Convolver {
    kernel: Arc<ConvolverKernel>,
    channels: [ChannelState; 2],
    scratch: Vec<Complex<f32>>,
    position: usize,
}

impl Convolver {
    pub fn new(kernel: Arc<ConvolverKernel>) -> Self {
        let block = kernel.block;
        let partitions = kernel.partition_count();
        let scratch_len = kernel
            .forward
            .get_inplace_scratch_len()
            .max(kernel.inverse.get_inplace_scratch_len());
        Self {
            channels: [
                ChannelState::new(block, partitions),
                ChannelState::new(block, partitions),
            ],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            position: 0,
            kernel,
        }
    }

    pub fn kernel(&self) -> &Arc<ConvolverKernel> {
        &self.kernel
    }

    /// Output latency in frames
    pub fn latency(&self) -> usize {
        self.kernel.block
    }

    /// Push one input frame and pull one output frame.
    pub fn process(&mut self, frame: AudioFrame) -> AudioFrame {
        let block = self.kernel.block;
        let pos = self.position;

        self.channels[0].input[block + pos] = frame.left;
        self.channels[1].input[block + pos] = frame.right;
        let out = AudioFrame {
            left: self.channels[0].output[pos],
            right: self.channels[1].output[pos],
        };

        self.position += 1;
        if self.position == block {
            self.position = 0;
            let kernel = &self.kernel;
            for (index, state) in self.channels.iter_mut().enumerate() {
                state.process_block(kernel.channel(index), kernel, &mut self.scratch);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_impulse(frames: usize, delay: usize) -> PcmBuffer {
        let mut ch = vec![0.0; frames];
        ch[delay] = 1.0;
        PcmBuffer::new(44100, vec![ch.clone(), ch])
    }

    fn run(convolver: &mut Convolver, input: &[f32]) -> Vec<f32> {
        input
            .iter()
            .map(|&s| convolver.process(AudioFrame::from_mono(s)).left)
            .collect()
    }

    #[test]
    fn test_unit_impulse_delays_by_one_block() {
        let kernel = Arc::new(ConvolverKernel::new(&unit_impulse(64, 0), 16, false));
        let mut convolver = Convolver::new(kernel);

        let input: Vec<f32> = (0..96).map(|i| (i as f32 * 0.1).sin()).collect();
        let output = run(&mut convolver, &input);

        for i in 0..16 {
            assert!(output[i].abs() < 1e-5);
        }
        for i in 16..96 {
            assert!(
                (output[i] - input[i - 16]).abs() < 1e-4,
                "sample {}: {} vs {}",
                i,
                output[i],
                input[i - 16]
            );
        }
    }

    #[test]
    fn test_delayed_impulse_spans_partitions() {
        // Impulse at frame 40 lands in the third 16-frame partition
        let kernel = Arc::new(ConvolverKernel::new(&unit_impulse(64, 40), 16, false));
        assert_eq!(kernel.partition_count(), 4);
        let mut convolver = Convolver::new(kernel);

        let mut input = vec![0.0; 128];
        input[3] = 1.0;
        let output = run(&mut convolver, &input);

        let peak = output
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 3 + 40 + 16);
        assert!((output[peak] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_stereo_ir_applies_per_channel() {
        let mut left = vec![0.0; 32];
        let mut right = vec![0.0; 32];
        left[0] = 1.0;
        right[0] = 0.5;
        let ir = PcmBuffer::new(44100, vec![left, right]);
        let mut convolver = Convolver::new(Arc::new(ConvolverKernel::new(&ir, 8, false)));

        let mut outputs = Vec::new();
        for _ in 0..24 {
            outputs.push(convolver.process(AudioFrame::from_stereo(1.0, 1.0)));
        }
        let last = outputs[23];
        assert!((last.left - 1.0).abs() < 1e-4);
        assert!((last.right - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_normalization_uses_calibration() {
        // Constant IR of 0.5: RMS power 0.5
        let ir = PcmBuffer::new(44100, vec![vec![0.5; 100], vec![0.5; 100]]);
        let expected = (1.0 / 0.5) * 10f32.powf(-58.0 * 0.05);
        assert!((normalization_scale(&ir) - expected).abs() < 1e-6);

        // Silence is clamped to the minimum power
        let silent = PcmBuffer::silent(88200, 2, 100);
        let expected = (1.0 / MIN_POWER) * 10f32.powf(-58.0 * 0.05) * 0.5;
        assert!((normalization_scale(&silent) - expected).abs() < 1e-3);
    }
}
