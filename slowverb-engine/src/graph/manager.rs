//! Graph construction and rewiring
//!
//! The manager owns the process-wide quality tier. Building a graph installs a
//! fresh [`GraphProcessor`] into the renderer after tearing down whatever was
//! there. If a node cannot be constructed the tier is demoted one step and the
//! build is retried with a narrower graph; demotion never reverses.

use super::context::AudioContext;
use super::nodes::{GraphParams, NodeFactory, SourceHandle, SourceNode};
use super::render::{ConvolverHandoff, GraphProcessor, ReverbPath};
use super::GraphTopology;
use crate::audio::types::PcmBuffer;
use crate::dsp::convolver::DEFAULT_BLOCK_SIZE;
use crate::dsp::{Analyser, AnalyserSettings, Convolver, ConvolverKernel, ReverbSynthesizer};
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use slowverb_common::config::SlowverbConfig;
use slowverb_common::{EffectParameters, QualityTier, TransportMode};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of a build, including any demotion it caused
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// Tier in force when the build started
    pub requested_tier: QualityTier,
    /// Tier the graph was actually built at
    pub tier: QualityTier,
    /// Why the tier was lowered, when it was
    pub reason: Option<String>,
}

impl BuildReport {
    pub fn is_degraded(&self) -> bool {
        self.tier != self.requested_tier
    }
}

/// Control-side view of the installed graph
pub struct AudioGraph {
    tier: QualityTier,
    topology: GraphTopology,
    params: Arc<GraphParams>,
    analyser: Analyser,
    reverb: Option<ReverbControl>,
    active: Option<SourceHandle>,
}

/// Control-side half of the wet path
struct ReverbControl {
    /// Impulse most recently published
    kernel: ArcSwap<ConvolverKernel>,
    handoff: ConvolverHandoff,
}

impl AudioGraph {
    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn topology(&self) -> GraphTopology {
        self.topology
    }

    pub fn analyser(&mut self) -> &mut Analyser {
        &mut self.analyser
    }

    /// Handle of the connected source, if any
    pub fn active_source(&self) -> Option<&SourceHandle> {
        self.active.as_ref()
    }

    /// Push volume, mix and cutoff to the live nodes.
    ///
    /// On the basic topology only volume has a node to land on.
    pub fn apply_parameters(&self, parameters: &EffectParameters) {
        self.params.gain.store(parameters.volume as f32);
        if self.topology.has_effects() {
            self.params.set_mix(parameters.reverb_wet as f32);
            self.params.cutoff_hz.store(parameters.low_pass_hz as f32);
        }
    }

    /// Impulse currently published to the convolver
    pub fn current_kernel(&self) -> Option<Arc<ConvolverKernel>> {
        self.reverb.as_ref().map(|reverb| reverb.kernel.load_full())
    }
}

/// Builds and rewires the one live graph
pub struct AudioGraphManager {
    context: AudioContext,
    factory: Arc<dyn NodeFactory>,
    tier: Mutex<QualityTier>,
    synthesizer: Mutex<ReverbSynthesizer>,
    config: Arc<SlowverbConfig>,
}

impl AudioGraphManager {
    pub fn new(
        context: AudioContext,
        factory: Arc<dyn NodeFactory>,
        tier: QualityTier,
        config: Arc<SlowverbConfig>,
    ) -> Self {
        Self::with_synthesizer(context, factory, tier, config, ReverbSynthesizer::new())
    }

    /// Use a specific synthesizer (seeded in tests)
    pub fn with_synthesizer(
        context: AudioContext,
        factory: Arc<dyn NodeFactory>,
        tier: QualityTier,
        config: Arc<SlowverbConfig>,
        synthesizer: ReverbSynthesizer,
    ) -> Self {
        Self {
            context,
            factory,
            tier: Mutex::new(tier),
            synthesizer: Mutex::new(synthesizer),
            config,
        }
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Current (possibly demoted) tier
    pub fn tier(&self) -> QualityTier {
        *lock(&self.tier)
    }

    /// Build a graph for `mode` at the current tier and install it.
    ///
    /// The previously installed graph is torn down first.
    ///
    /// # Errors
    /// `Error::EngineUnavailable` when not even the basic graph can be built.
    pub fn build(
        &self,
        mode: TransportMode,
        parameters: &EffectParameters,
    ) -> Result<(AudioGraph, BuildReport)> {
        if let Some(mut previous) = self.context.renderer().install(None) {
            drop(previous.set_source(None));
            debug!("Tore down previous {:?} graph", previous.topology());
        }

        let requested_tier = self.tier();
        let mut tier = requested_tier;
        let mut reason = None;

        let (graph, processor) = loop {
            let topology = if tier.supports_effects() && mode == TransportMode::GraphNode {
                GraphTopology::Standard
            } else {
                GraphTopology::Basic
            };

            match self.build_at(tier, topology, parameters) {
                Ok(built) => break built,
                Err(e) => match tier.demoted() {
                    Some(lower) => {
                        warn!(
                            "Graph build failed at {} tier ({}), retrying at {}",
                            tier, e, lower
                        );
                        reason.get_or_insert_with(|| e.to_string());
                        tier = lower;
                    }
                    None => {
                        return Err(Error::EngineUnavailable(format!(
                            "Cannot build even a basic graph: {}",
                            e
                        )));
                    }
                },
            }
        };

        if tier != requested_tier {
            *lock(&self.tier) = tier;
            info!("Quality tier demoted from {} to {}", requested_tier, tier);
        }

        self.context.renderer().install(Some(processor));
        info!(
            "Built {:?} graph at {} tier for {} transport",
            graph.topology, tier, mode
        );

        Ok((
            graph,
            BuildReport {
                requested_tier,
                tier,
                reason,
            },
        ))
    }

    fn build_at(
        &self,
        tier: QualityTier,
        topology: GraphTopology,
        parameters: &EffectParameters,
    ) -> Result<(AudioGraph, GraphProcessor)> {
        let sample_rate = self.context.sample_rate();
        let (analyser, tap) = self
            .factory
            .create_analyser(AnalyserSettings::for_tier(tier))?;
        let params = Arc::new(GraphParams::new(
            parameters.volume as f32,
            parameters.reverb_wet as f32,
            parameters.low_pass_hz as f32,
        ));

        let (processor, reverb) = match topology {
            GraphTopology::Basic => (GraphProcessor::basic(params.clone(), tap), None),
            GraphTopology::Standard => {
                let filter = self
                    .factory
                    .create_filter(sample_rate, parameters.low_pass_hz)?;
                let kernel = Arc::new(self.synthesize_kernel(
                    tier,
                    parameters.reverb_room_size,
                    parameters.reverb_decay_seconds,
                ));
                let convolver = self.factory.create_convolver(kernel.clone())?;
                let (path, handoff) = ReverbPath::new(convolver);
                let control = ReverbControl {
                    kernel: ArcSwap::new(kernel),
                    handoff,
                };
                (
                    GraphProcessor::standard(params.clone(), tap, filter, path),
                    Some(control),
                )
            }
        };

        let graph = AudioGraph {
            tier,
            topology,
            params,
            analyser,
            reverb,
            active: None,
        };
        Ok((graph, processor))
    }

    fn synthesize_impulse(&self, tier: QualityTier, room_size: f64, decay: f64) -> Arc<PcmBuffer> {
        let max_seconds = self.config.reverb_max_seconds(tier);
        lock(&self.synthesizer).synthesize(self.context.sample_rate(), room_size, decay, max_seconds)
    }

    fn synthesize_kernel(&self, tier: QualityTier, room_size: f64, decay: f64) -> ConvolverKernel {
        let impulse = self.synthesize_impulse(tier, room_size, decay);
        ConvolverKernel::new(&impulse, DEFAULT_BLOCK_SIZE, true)
    }

    /// Regenerate the impulse and publish a convolver for it.
    ///
    /// The convolver is built here so the render thread only swaps it in.
    /// Returns false on graphs without reverb.
    pub fn update_impulse(&self, graph: &AudioGraph, room_size: f64, decay: f64) -> bool {
        let Some(reverb) = graph.reverb.as_ref() else {
            return false;
        };
        let kernel = Arc::new(self.synthesize_kernel(graph.tier, room_size, decay));
        debug!(
            "Publishing new impulse: {} frames, {} partitions",
            kernel.ir_frames(),
            kernel.partition_count()
        );
        if reverb.handoff.publish(Convolver::new(kernel.clone())) {
            debug!("Replaced an impulse the render side had not picked up yet");
        }
        reverb.kernel.store(kernel);
        true
    }

    /// Connect `source` as the graph's only source.
    ///
    /// Any previous source is stopped and disconnected first.
    ///
    /// # Errors
    /// `Error::InvalidState` if no graph is installed.
    pub fn connect(
        &self,
        graph: &mut AudioGraph,
        source: Box<dyn SourceNode>,
        handle: SourceHandle,
    ) -> Result<()> {
        if let Some(previous) = graph.active.take() {
            previous.stop();
        }
        let replaced = self
            .context
            .renderer()
            .with_graph(|processor| processor.set_source(Some(source)))
            .ok_or_else(|| Error::InvalidState("No graph is installed".to_string()))?;
        drop(replaced);
        graph.active = Some(handle);
        Ok(())
    }

    /// Stop and disconnect the active source, if any
    pub fn disconnect(&self, graph: &mut AudioGraph) {
        if let Some(previous) = graph.active.take() {
            previous.stop();
        }
        let replaced = self
            .context
            .renderer()
            .with_graph(|processor| processor.set_source(None));
        drop(replaced);
    }

    /// Disconnect everything and uninstall the graph
    pub fn teardown(&self, mut graph: AudioGraph) {
        self.disconnect(&mut graph);
        if let Some(processor) = self.context.renderer().install(None) {
            debug!("Tore down {:?} graph", processor.topology());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
