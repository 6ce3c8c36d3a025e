//! Render side of the audio graph
//!
//! The [`Renderer`] is what the output driver pulls from. It owns the engine
//! clock and the currently installed [`GraphProcessor`]. The render path never
//! waits on the control side: if the graph is being swapped, that quantum is
//! rendered as silence.
//!
//! Anything replaced on the control side (old graphs, old sources) is handed back
//! to the caller and dropped there, not on the render thread. Convolvers for a
//! new impulse are built on the control side and cross over through a
//! [`ConvolverHandoff`]; the ones they replace are collected there too.
//!
//! The clock only advances for quanta the graph actually rendered, so the
//! engine time and the source cursors never drift apart.

use super::nodes::{GraphParams, SourceNode};
use super::GraphTopology;
use crate::audio::types::AudioFrame;
use crate::dsp::{AnalyserTap, Convolver, LowPassFilter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

/// Monotonic clock driven by rendered frames
#[derive(Debug)]
pub struct EngineClock {
    sample_rate: u32,
    frames: AtomicU64,
}

impl EngineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, frames: usize) {
        self.frames.fetch_add(frames as u64, Ordering::AcqRel);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Seconds of audio rendered so far
    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Mailbox shared by a [`ReverbPath`] and its [`ConvolverHandoff`].
///
/// `incoming` being set implies `retired` is empty: the control side collects
/// `retired` whenever it publishes.
#[derive(Default)]
struct ConvolverSlot {
    incoming: Option<Convolver>,
    retired: Option<Convolver>,
}

/// Wet path on the render side
pub struct ReverbPath {
    convolver: Convolver,
    slot: Arc<Mutex<ConvolverSlot>>,
}

/// Control side of a [`ReverbPath`]
pub struct ConvolverHandoff {
    slot: Arc<Mutex<ConvolverSlot>>,
}

impl ReverbPath {
    pub fn new(convolver: Convolver) -> (Self, ConvolverHandoff) {
        let slot = Arc::new(Mutex::new(ConvolverSlot::default()));
        let handoff = ConvolverHandoff { slot: slot.clone() };
        (Self { convolver, slot }, handoff)
    }

    /// Install a published convolver, leaving the replaced one for collection.
    ///
    /// Retried on the next quantum if the control side holds the slot.
    fn sync_convolver(&mut self) {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::WouldBlock) => return,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        if let Some(next) = slot.incoming.take() {
            slot.retired = Some(std::mem::replace(&mut self.convolver, next));
        }
    }
}

impl ConvolverHandoff {
    /// Hand `convolver` to the render thread.
    ///
    /// Replaces one that was published but not yet installed; only the
    /// newest is ever installed. Returns true if one was replaced.
    pub fn publish(&self, convolver: Convolver) -> bool {
        let (superseded, retired) = {
            let mut slot = lock_slot(&self.slot);
            (slot.incoming.replace(convolver), slot.retired.take())
        };
        drop(retired);
        superseded.is_some()
    }

    /// Drop the convolver the render thread replaced, if any. Returns how many.
    pub fn collect_retired(&self) -> usize {
        let retired = lock_slot(&self.slot).retired.take();
        usize::from(retired.is_some())
    }
}

fn lock_slot(slot: &Mutex<ConvolverSlot>) -> MutexGuard<'_, ConvolverSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Render-side graph for one topology
pub struct GraphProcessor {
    topology: GraphTopology,
    params: Arc<GraphParams>,
    source: Option<Box<dyn SourceNode>>,
    filter: Option<LowPassFilter>,
    reverb: Option<ReverbPath>,
    tap: AnalyserTap,
    analysed: Vec<AudioFrame>,
}

impl GraphProcessor {
    /// Basic topology: source → gain → analyser + destination
    pub fn basic(params: Arc<GraphParams>, tap: AnalyserTap) -> Self {
        Self {
            topology: GraphTopology::Basic,
            params,
            source: None,
            filter: None,
            reverb: None,
            tap,
            analysed: Vec::new(),
        }
    }

    /// Standard topology: source → filter → gain, fanned out to the analyser,
    /// the dry gain and the convolver → wet gain
    pub fn standard(
        params: Arc<GraphParams>,
        tap: AnalyserTap,
        filter: LowPassFilter,
        reverb: ReverbPath,
    ) -> Self {
        Self {
            topology: GraphTopology::Standard,
            params,
            source: None,
            filter: Some(filter),
            reverb: Some(reverb),
            tap,
            analysed: Vec::new(),
        }
    }

    pub fn topology(&self) -> GraphTopology {
        self.topology
    }

    /// Swap the active source, returning the previous one
    pub fn set_source(
        &mut self,
        source: Option<Box<dyn SourceNode>>,
    ) -> Option<Box<dyn SourceNode>> {
        std::mem::replace(&mut self.source, source)
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Render one quantum into `out`
    pub fn render(&mut self, out: &mut [AudioFrame]) {
        let gain = self.params.gain.load();
        let wet = self.params.wet.load();
        let dry = self.params.dry.load();

        if let Some(filter) = self.filter.as_mut() {
            filter.set_frequency(self.params.cutoff_hz.load() as f64);
        }
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.sync_convolver();
        }
        if self.analysed.len() < out.len() {
            self.analysed.resize(out.len(), AudioFrame::zero());
        }

        for (i, frame) in out.iter_mut().enumerate() {
            let mut signal = self
                .source
                .as_mut()
                .and_then(|s| s.next_frame())
                .unwrap_or_default();

            if let Some(filter) = self.filter.as_mut() {
                signal = filter.process(signal);
            }

            let post_gain = signal.scaled(gain);
            self.analysed[i] = post_gain;

            *frame = match self.reverb.as_mut() {
                Some(reverb) => {
                    let mut mixed = post_gain.scaled(dry);
                    mixed.add(&reverb.convolver.process(post_gain).scaled(wet));
                    mixed
                }
                None => post_gain,
            };
        }

        self.tap.record(&self.analysed[..out.len()]);
    }
}

/// What the output driver pulls from
pub struct Renderer {
    clock: EngineClock,
    graph: Mutex<Option<GraphProcessor>>,
}

impl Renderer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            clock: EngineClock::new(sample_rate),
            graph: Mutex::new(None),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate
    }

    pub fn clock(&self) -> &EngineClock {
        &self.clock
    }

    /// Fill `out` and advance the clock. Called from the output thread.
    ///
    /// A quantum lost to a graph swap is silent and leaves the clock where it was.
    pub fn render(&self, out: &mut [AudioFrame]) {
        match self.graph.try_lock() {
            Ok(mut guard) => render_into(guard.as_mut(), out),
            Err(TryLockError::WouldBlock) => {
                out.fill(AudioFrame::zero());
                return;
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                render_into(poisoned.into_inner().as_mut(), out)
            }
        }
        self.clock.advance(out.len());
    }

    /// Install a new graph, returning the old one
    pub fn install(&self, graph: Option<GraphProcessor>) -> Option<GraphProcessor> {
        let mut guard = match self.graph.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, graph)
    }

    /// Run `f` against the installed graph, if any
    pub fn with_graph<R>(&self, f: impl FnOnce(&mut GraphProcessor) -> R) -> Option<R> {
        let mut guard = match self.graph.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_mut().map(f)
    }
}

fn render_into(graph: Option<&mut GraphProcessor>, out: &mut [AudioFrame]) {
    match graph {
        Some(graph) => graph.render(out),
        None => out.fill(AudioFrame::zero()),
    }
}
