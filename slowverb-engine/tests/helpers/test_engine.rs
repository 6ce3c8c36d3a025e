//! Controller wired to a [`ManualDriver`] for deterministic integration tests
//!
//! The engine clock only advances when a test pumps frames, and the ticker is
//! disabled so end-of-track detection happens on explicit `tick()` calls.

use slowverb_common::config::SlowverbConfig;
use slowverb_common::{EngineEvent, EventBus, QualityTier, SessionSnapshot, TransportMode};
use slowverb_engine::audio::{AudioFrame, ManualDriver};
use slowverb_engine::capability::Capabilities;
use slowverb_engine::dsp::ReverbSynthesizer;
use slowverb_engine::graph::{AudioContext, AudioGraphManager, DefaultNodeFactory, NodeFactory};
use slowverb_engine::playback::{ControllerOptions, PlaybackController};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::audio_generator::{sine_file, TEST_SAMPLE_RATE};

/// Render quantum used when pumping
pub const PUMP_BLOCK: usize = 256;

pub struct TestEngineBuilder {
    tier: QualityTier,
    transport: TransportMode,
    factory: Arc<dyn NodeFactory>,
    config: SlowverbConfig,
    max_file_size_bytes: Option<u64>,
    require_gesture: bool,
}

impl Default for TestEngineBuilder {
    fn default() -> Self {
        Self {
            tier: QualityTier::High,
            transport: TransportMode::GraphNode,
            factory: Arc::new(DefaultNodeFactory),
            config: SlowverbConfig::default(),
            max_file_size_bytes: None,
            require_gesture: false,
        }
    }
}

impl TestEngineBuilder {
    pub fn tier(mut self, tier: QualityTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn NodeFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn config(mut self, config: SlowverbConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_file_size_bytes(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = Some(bytes);
        self
    }

    /// Output refuses to start until `driver.grant_gesture()`
    pub fn require_gesture(mut self) -> Self {
        self.require_gesture = true;
        self
    }

    pub fn build(self) -> TestEngine {
        let driver = ManualDriver::new(TEST_SAMPLE_RATE);
        if self.require_gesture {
            driver.require_gesture();
        }
        let context = AudioContext::new(driver.renderer(), Arc::new(driver.clone()))
            .expect("rates match");
        let config = Arc::new(self.config);
        let manager = Arc::new(AudioGraphManager::with_synthesizer(
            context,
            self.factory,
            self.tier,
            config.clone(),
            ReverbSynthesizer::seeded(42),
        ));
        let capabilities = Capabilities {
            tier: self.tier,
            transport_mode: self.transport,
            max_file_size_bytes: self
                .max_file_size_bytes
                .unwrap_or_else(|| config.max_file_size_bytes(self.tier)),
            chunk_size: PUMP_BLOCK as u32,
        };
        let event_bus = EventBus::new(1024);
        let events = event_bus.subscribe();
        let controller = PlaybackController::new(
            manager,
            capabilities,
            config,
            event_bus,
            ControllerOptions {
                auto_tick: false,
                ..Default::default()
            },
        );

        TestEngine {
            controller,
            driver,
            events,
        }
    }
}

pub struct TestEngine {
    pub controller: Arc<PlaybackController>,
    pub driver: ManualDriver,
    events: broadcast::Receiver<EngineEvent>,
}

impl TestEngine {
    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::default()
    }

    /// High tier, graph transport
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Load a generated tone of `seconds`
    pub async fn load_tone(&self, seconds: f64) {
        self.controller
            .select_file(sine_file("tone.wav", seconds))
            .await
            .expect("tone loads");
    }

    /// Render `seconds` of output (nothing if the output is suspended)
    pub fn advance(&self, seconds: f64) -> Vec<AudioFrame> {
        self.driver.pump_seconds(seconds, PUMP_BLOCK)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    /// Everything emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Peak absolute sample over both channels
pub fn peak(frames: &[AudioFrame]) -> f32 {
    frames
        .iter()
        .map(|f| f.left.abs().max(f.right.abs()))
        .fold(0.0, f32::max)
}
