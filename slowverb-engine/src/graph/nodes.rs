//! Graph nodes
//!
//! Render-side node types and the lock-free parameter block shared with the
//! control side. Sources implement [`SourceNode`]; everything else is a fixed
//! slot in the [`GraphProcessor`](super::render::GraphProcessor).

use crate::audio::types::{AudioFrame, PcmBuffer};
use crate::dsp::{Analyser, AnalyserSettings, AnalyserTap, Convolver, ConvolverKernel, LowPassFilter};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// f32 stored as bits in an `AtomicU32`
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// f64 stored as bits in an `AtomicU64`
#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Live graph parameters, read by the renderer once per quantum
#[derive(Debug)]
pub struct GraphParams {
    pub gain: AtomicF32,
    pub wet: AtomicF32,
    pub dry: AtomicF32,
    pub cutoff_hz: AtomicF32,
}

impl GraphParams {
    pub fn new(gain: f32, wet: f32, cutoff_hz: f32) -> Self {
        Self {
            gain: AtomicF32::new(gain),
            wet: AtomicF32::new(wet),
            dry: AtomicF32::new(1.0 - wet),
            cutoff_hz: AtomicF32::new(cutoff_hz),
        }
    }

    /// Set wet and the matching dry level together
    pub fn set_mix(&self, wet: f32) {
        self.wet.store(wet);
        self.dry.store(1.0 - wet);
    }
}

/// A node that produces audio
pub trait SourceNode: Send {
    /// Next output frame, or `None` once the source has nothing more to play
    fn next_frame(&mut self) -> Option<AudioFrame>;
}

/// State shared between a running source and its control-side handle
#[derive(Debug)]
pub struct SourceControl {
    rate: AtomicF64,
    stopped: AtomicBool,
    ended: AtomicBool,
}

impl SourceControl {
    fn new(rate: f64) -> Self {
        Self {
            rate: AtomicF64::new(rate),
            stopped: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate.load()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

/// Control-side handle to a connected source
#[derive(Debug, Clone)]
pub struct SourceHandle {
    control: Arc<SourceControl>,
}

impl SourceHandle {
    pub fn new(rate: f64) -> Self {
        Self {
            control: Arc::new(SourceControl::new(rate)),
        }
    }

    pub fn control(&self) -> Arc<SourceControl> {
        self.control.clone()
    }

    /// Update the playback rate in place
    pub fn set_rate(&self, rate: f64) {
        self.control.rate.store(rate);
    }

    pub fn rate(&self) -> f64 {
        self.control.rate()
    }

    /// Stop producing audio. A stopped source never reports `ended`.
    pub fn stop(&self) {
        self.control.stopped.store(true, Ordering::Release);
    }

    /// Whether the source ran out of audio on its own
    pub fn has_ended(&self) -> bool {
        !self.control.is_stopped() && self.control.ended.load(Ordering::Acquire)
    }
}

/// Plays an in-memory buffer with a variable rate.
///
/// The read cursor is fractional; samples between frames are linearly interpolated.
pub struct BufferSourceNode {
    buffer: Arc<PcmBuffer>,
    cursor: f64,
    control: Arc<SourceControl>,
}

impl BufferSourceNode {
    /// Create a node that starts playing `buffer` at `start_frame`
    pub fn new(buffer: Arc<PcmBuffer>, start_frame: f64, handle: &SourceHandle) -> Self {
        Self {
            buffer,
            cursor: start_frame.max(0.0),
            control: handle.control(),
        }
    }
}

impl SourceNode for BufferSourceNode {
    fn next_frame(&mut self) -> Option<AudioFrame> {
        if self.control.is_stopped() {
            return None;
        }

        let frames = self.buffer.frames();
        let index = self.cursor.floor() as usize;
        if index >= frames {
            self.control.mark_ended();
            return None;
        }

        let current = self.buffer.frame(index)?;
        let frac = (self.cursor - index as f64) as f32;
        let frame = match self.buffer.frame(index + 1) {
            Some(next) if frac > 0.0 => AudioFrame {
                left: current.left + (next.left - current.left) * frac,
                right: current.right + (next.right - current.right) * frac,
            },
            _ => current,
        };

        self.cursor += self.control.rate().max(0.0);
        Some(frame)
    }
}

/// Constructs the optional processing nodes of a graph.
///
/// Every method may fail when the runtime cannot provide the feature; the graph
/// manager reacts by demoting the tier. The default methods always succeed.
pub trait NodeFactory: Send + Sync {
    fn create_filter(&self, sample_rate: u32, cutoff_hz: f64) -> Result<LowPassFilter> {
        Ok(LowPassFilter::new(sample_rate, cutoff_hz))
    }

    fn create_convolver(&self, kernel: Arc<ConvolverKernel>) -> Result<Convolver> {
        Ok(Convolver::new(kernel))
    }

    fn create_analyser(&self, settings: AnalyserSettings) -> Result<(Analyser, AnalyserTap)> {
        Ok(Analyser::new(settings))
    }
}

/// Factory backed by the built-in DSP
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultNodeFactory;

impl NodeFactory for DefaultNodeFactory {}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Arc<PcmBuffer> {
        let ch: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        Arc::new(PcmBuffer::new(100, vec![ch.clone(), ch]))
    }

    #[test]
    fn test_buffer_source_interpolates() {
        let handle = SourceHandle::new(0.5);
        let mut node = BufferSourceNode::new(ramp(4), 0.0, &handle);

        let out: Vec<f32> = (0..6).filter_map(|_| node.next_frame()).map(|f| f.left).collect();
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);
    }

    #[test]
    fn test_buffer_source_ends_once_exhausted() {
        let handle = SourceHandle::new(1.0);
        let mut node = BufferSourceNode::new(ramp(3), 1.0, &handle);

        assert!(node.next_frame().is_some());
        assert!(node.next_frame().is_some());
        assert!(!handle.has_ended());
        assert!(node.next_frame().is_none());
        assert!(handle.has_ended());
    }

    #[test]
    fn test_stopped_source_never_reports_ended() {
        let handle = SourceHandle::new(1.0);
        let mut node = BufferSourceNode::new(ramp(2), 0.0, &handle);
        handle.stop();
        assert!(node.next_frame().is_none());
        assert!(!handle.has_ended());
    }

    #[test]
    fn test_rate_changes_apply_in_place() {
        let handle = SourceHandle::new(1.0);
        let mut node = BufferSourceNode::new(ramp(10), 0.0, &handle);
        node.next_frame();
        handle.set_rate(2.0);
        assert_eq!(node.next_frame().map(|f| f.left), Some(1.0));
        assert_eq!(node.next_frame().map(|f| f.left), Some(3.0));
    }

    #[test]
    fn test_mix_keeps_dry_complement() {
        let params = GraphParams::new(0.8, 0.3, 8000.0);
        assert!((params.dry.load() - 0.7).abs() < 1e-6);
        params.set_mix(0.5);
        assert_eq!(params.wet.load(), 0.5);
        assert_eq!(params.dry.load(), 0.5);
    }
}
