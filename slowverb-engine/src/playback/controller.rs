//! Playback controller
//!
//! The session state machine:
//! `Idle → Loading → Ready → Playing ⇄ Paused → Ended`, `Loading → Error`, and
//! any state back through `Idle` on a new file.
//!
//! **Concurrency:** all commands serialize on one async mutex. The two long
//! suspension points (decode and pitch-preserving render) run without the lock
//! and are tagged with a generation number; a result whose generation is no
//! longer current is discarded on completion. The newest request always wins:
//! a parameter change during a pending start takes that start over.
//!
//! **Observability:** every meaningful transition republishes a
//! [`SessionSnapshot`] on a watch channel and emits an [`EngineEvent`] on the
//! bus. While playing, a self-terminating ticker republishes the snapshot (with
//! fresh visualizer bars) once per tick.

use crate::audio::decoder::decode_to_pcm;
use crate::audio::element::{ElementClock, MediaElement};
use crate::audio::output::OutputDriver;
use crate::audio::resampler::Resampler;
use crate::audio::types::{AudioFile, PcmBuffer};
use crate::capability::Capabilities;
use crate::dsp::{StretchOutcome, TimeStretchProcessor};
use crate::error::{Error, Result};
use crate::graph::{
    AudioContext, AudioGraph, AudioGraphManager, BufferSourceNode, DefaultNodeFactory, Renderer,
    SourceHandle,
};
use crate::playback::position::PlaybackPosition;
use crate::visualizer;
use slowverb_common::config::SlowverbConfig;
use slowverb_common::{
    EffectParam, EffectParameters, EngineEvent, ErrorKind, EventBus, LastError, PresetId,
    QualityTier, SessionSnapshot, SessionState, TransportMode,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// About one animation frame
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

const EVENT_BUS_CAPACITY: usize = 256;

/// Controller behaviour switches
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    /// Spawn the ticker task while playing. Disable to drive [`PlaybackController::tick`] by hand.
    pub auto_tick: bool,
    pub tick_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            auto_tick: true,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Rate-adjusted copy of the source buffer
struct ProcessedBuffer {
    rate: f64,
    outcome: StretchOutcome,
}

enum SessionMedia {
    /// Fully decoded at the context rate
    Buffer {
        source: Arc<PcmBuffer>,
        processed: Option<ProcessedBuffer>,
    },
    /// Decoded progressively during playback
    Element(MediaElement),
}

/// The one loaded file
struct AudioSession {
    id: Uuid,
    file_name: String,
    duration_seconds: f64,
    media: SessionMedia,
}

impl AudioSession {
    fn invalidate_processed(&mut self) {
        if let SessionMedia::Buffer { processed, .. } = &mut self.media {
            *processed = None;
        }
    }
}

struct Inner {
    state: SessionState,
    session: Option<AudioSession>,
    graph: Option<AudioGraph>,
    position: PlaybackPosition,
    /// Set while the media-element transport is running
    element_clock: Option<ElementClock>,
    parameters: EffectParameters,
    last_error: Option<LastError>,
    playback_enabled: bool,
    bars: Vec<f32>,
    /// Offset of a start waiting on a render
    pending_start: Option<f64>,
}

/// Drives one audio session through its lifecycle
pub struct PlaybackController {
    me: Weak<PlaybackController>,
    inner: Mutex<Inner>,
    manager: Arc<AudioGraphManager>,
    capabilities: Capabilities,
    config: Arc<SlowverbConfig>,
    event_bus: EventBus,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    load_generation: AtomicU64,
    render_generation: AtomicU64,
    ticker_active: AtomicBool,
    options: ControllerOptions,
}

impl PlaybackController {
    pub fn new(
        manager: Arc<AudioGraphManager>,
        capabilities: Capabilities,
        config: Arc<SlowverbConfig>,
        event_bus: EventBus,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let tier = manager.tier();
        let parameters = EffectParameters::default();
        let bars = visualizer::idle_bars(config.bar_count(tier));

        let mut initial = SessionSnapshot::initial(tier, capabilities.transport_mode, parameters);
        initial.visualizer_bars = bars.clone();
        let (snapshot_tx, _) = watch::channel(initial);

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                graph: None,
                position: PlaybackPosition::new(),
                element_clock: None,
                parameters,
                last_error: None,
                playback_enabled: true,
                bars,
                pending_start: None,
            }),
            manager,
            capabilities,
            config,
            event_bus,
            snapshot_tx,
            load_generation: AtomicU64::new(0),
            render_generation: AtomicU64::new(0),
            ticker_active: AtomicBool::new(false),
            options,
        })
    }

    /// Wire a controller to an output: context, default node factory, graph
    /// manager and a fresh event bus.
    ///
    /// # Errors
    /// `Error::EngineUnavailable` if the renderer and driver disagree on the sample rate.
    pub fn with_output(
        renderer: Arc<Renderer>,
        driver: Arc<dyn OutputDriver>,
        capabilities: Capabilities,
        config: Arc<SlowverbConfig>,
        options: ControllerOptions,
    ) -> Result<Arc<Self>> {
        let context = AudioContext::new(renderer, driver)?;
        let manager = Arc::new(AudioGraphManager::new(
            context,
            Arc::new(DefaultNodeFactory),
            capabilities.tier,
            config.clone(),
        ));
        Ok(Self::new(
            manager,
            capabilities,
            config,
            EventBus::new(EVENT_BUS_CAPACITY),
            options,
        ))
    }

    // ========================================
    // Observation
    // ========================================

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receive every republished snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn manager(&self) -> &Arc<AudioGraphManager> {
        &self.manager
    }

    /// Frame count of the pre-rendered buffer, if one is cached
    pub async fn processed_frames(&self) -> Option<usize> {
        let inner = self.inner.lock().await;
        match inner.session.as_ref().map(|s| &s.media) {
            Some(SessionMedia::Buffer {
                processed: Some(p), ..
            }) => Some(p.outcome.buffer.frames()),
            _ => None,
        }
    }

    // ========================================
    // Commands
    // ========================================

    /// Load a new file, replacing the current session.
    ///
    /// Rejects non-audio MIME types and files over the tier's size cap before
    /// doing any work. A newer selection supersedes one still decoding; the
    /// superseded call returns `Error::RenderStale`.
    pub async fn select_file(&self, file: AudioFile) -> Result<()> {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = self.capabilities.transport_mode;
        let sample_rate = self.manager.context().sample_rate();
        let file_name = file.name.clone();

        {
            let mut inner = self.inner.lock().await;
            if !inner.playback_enabled {
                return Err(Error::EngineUnavailable("Playback is disabled".to_string()));
            }

            self.cancel_pending_start(&mut inner);
            self.release_session(&mut inner);
            self.transition(&mut inner, SessionState::Idle);
            inner.last_error = None;

            if let Err(e) = self.validate(&file) {
                warn!("Rejected {}: {}", file_name, e);
                self.record_error(&mut inner, &e);
                self.publish(&inner);
                return Err(e);
            }

            self.transition(&mut inner, SessionState::Loading);
            if let Err(e) = self.rebuild_graph(&mut inner, mode) {
                self.transition(&mut inner, SessionState::Error);
                self.publish(&inner);
                return Err(e);
            }
            self.publish(&inner);
        }

        info!("Loading {} ({} bytes, {} transport)", file_name, file.size(), mode);
        let started = Instant::now();
        let loaded = tokio::task::spawn_blocking(move || load_media(&file, mode, sample_rate))
            .await
            .map_err(Error::from)
            .and_then(|result| result);

        let mut inner = self.inner.lock().await;
        let current = self.load_generation.load(Ordering::SeqCst);
        if generation != current {
            debug!(
                "Discarding superseded load of {} (generation {}, current {})",
                file_name, generation, current
            );
            return Err(Error::RenderStale {
                stale: generation,
                current,
            });
        }

        let media = match loaded {
            Ok(media) => media,
            Err(e) => {
                warn!("Failed to load {}: {}", file_name, e);
                self.record_error(&mut inner, &e);
                self.transition(&mut inner, SessionState::Error);
                self.publish(&inner);
                return Err(e);
            }
        };

        let duration_seconds = match &media {
            SessionMedia::Buffer { source, .. } => source.duration_seconds(),
            SessionMedia::Element(element) => element.duration_seconds(),
        };
        let session = AudioSession {
            id: Uuid::new_v4(),
            file_name: file_name.clone(),
            duration_seconds,
            media,
        };
        info!(
            "Loaded {} in {:?}: {:.2}s",
            file_name,
            started.elapsed(),
            duration_seconds
        );

        self.event_bus.emit_lossy(EngineEvent::FileLoaded {
            session_id: session.id,
            file_name,
            duration_seconds,
            transport_mode: mode,
            timestamp: chrono::Utc::now(),
        });

        inner.position.reset();
        inner.session = Some(session);
        self.transition(&mut inner, SessionState::Ready);
        self.publish(&inner);
        Ok(())
    }

    /// Start or resume playback from the current offset.
    ///
    /// A no-op while already playing. Output blocked by the platform reports
    /// `NeedsUserGesture` and leaves the state unchanged; calling again after
    /// user interaction retries.
    pub async fn play(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Playing {
            return Ok(());
        }
        if !inner.playback_enabled {
            return Err(Error::EngineUnavailable("Playback is disabled".to_string()));
        }
        if !inner.state.can_play() {
            return Err(Error::InvalidState(format!("Cannot play while {}", inner.state)));
        }

        if let Err(e) = self.manager.context().resume().await {
            return Err(self.resume_failed(&mut inner, e));
        }
        if inner
            .last_error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::NeedsUserGesture)
        {
            inner.last_error = None;
        }

        let offset = inner.position.offset_seconds();
        discard_stale(self.start_transport(inner, offset).await)
    }

    /// Stop the transport and freeze the position. A no-op unless playing.
    pub async fn pause(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.cancel_pending_start(&mut inner);
        if inner.state != SessionState::Playing {
            return Ok(());
        }

        let offset = self.stop_transport(&mut inner);
        debug!("Paused at {:.3}s", offset);
        self.transition(&mut inner, SessionState::Paused);
        self.publish(&inner);
        Ok(())
    }

    /// Rewind to zero and stop, landing in `Ready`
    pub async fn seek_to_start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.cancel_pending_start(&mut inner);
        if !inner.state.has_file() {
            return Err(Error::InvalidState(format!(
                "Nothing to rewind while {}",
                inner.state
            )));
        }

        if inner.state == SessionState::Playing {
            self.stop_transport(&mut inner);
        }
        inner.position.reset();
        self.transition(&mut inner, SessionState::Ready);
        self.publish(&inner);
        Ok(())
    }

    /// Change one effect parameter (clamped into its domain)
    pub async fn set_effect_parameter(&self, param: EffectParam, value: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let previous = inner.parameters;
        let range = self.manager.tier().rate_range();
        inner.parameters.set(param, value, range)?;
        trace!("{} = {}", param, inner.parameters.get(param));
        discard_stale(self.apply_parameter_change(inner, previous, None).await)
    }

    /// Overwrite rate, mix, room, decay and cutoff with a preset
    pub async fn apply_preset(&self, preset: PresetId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let previous = inner.parameters;
        inner.parameters.apply_preset(preset.preset());
        let rate = inner.parameters.playback_rate;
        inner
            .parameters
            .set(EffectParam::PlaybackRate, rate, self.manager.tier().rate_range())?;
        info!("Applied preset {}", preset);
        discard_stale(self.apply_parameter_change(inner, previous, Some(preset)).await)
    }

    /// Render the processed audio to a file.
    ///
    /// # Errors
    /// Always `Error::NotImplemented`.
    pub async fn export(&self) -> Result<()> {
        let message = match self.manager.tier() {
            QualityTier::Basic => {
                "Export is limited on this device; use a desktop build for full export"
            }
            _ => "Export would be produced by an offline render of the processed graph",
        };
        Err(Error::NotImplemented(message.to_string()))
    }

    /// Advance time-dependent state: detect the end of the track and refresh
    /// the visualizer. Returns the published snapshot.
    pub async fn tick(&self) -> SessionSnapshot {
        let mut inner = self.inner.lock().await;
        self.tick_locked(&mut inner)
    }

    /// Release the session and the graph
    pub async fn shutdown(&self) {
        self.load_generation.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock().await;
        self.cancel_pending_start(&mut inner);
        self.release_session(&mut inner);
        if let Some(graph) = inner.graph.take() {
            self.manager.teardown(graph);
        }
        self.transition(&mut inner, SessionState::Idle);
        self.publish(&inner);
        info!("Playback controller shut down");
    }

    // ========================================
    // Internals
    // ========================================

    fn validate(&self, file: &AudioFile) -> Result<()> {
        if !file.is_accepted() {
            return Err(Error::UnsupportedFormat(format!(
                "{} is not an audio file ({})",
                file.name,
                file.mime_type.as_deref().unwrap_or("unknown type")
            )));
        }
        let limit = self.config.max_file_size_bytes(self.manager.tier());
        let limit = limit.min(self.capabilities.max_file_size_bytes);
        if file.size() > limit {
            return Err(Error::FileTooLarge {
                size: file.size(),
                limit,
            });
        }
        Ok(())
    }

    fn rebuild_graph(&self, inner: &mut Inner, mode: TransportMode) -> Result<()> {
        drop(inner.graph.take());
        match self.manager.build(mode, &inner.parameters) {
            Ok((graph, report)) => {
                if report.is_degraded() {
                    let reason = report
                        .reason
                        .clone()
                        .unwrap_or_else(|| "graph construction failed".to_string());
                    self.notify_degraded(inner, report.requested_tier, report.tier, reason);

                    let rate = inner.parameters.playback_rate;
                    if let Err(e) =
                        inner
                            .parameters
                            .set(EffectParam::PlaybackRate, rate, report.tier.rate_range())
                    {
                        warn!("Could not clamp rate to demoted tier: {}", e);
                    }
                    inner.bars = visualizer::idle_bars(self.config.bar_count(report.tier));
                }
                inner.graph = Some(graph);
                Ok(())
            }
            Err(e) => {
                warn!("Audio engine unavailable: {}", e);
                inner.playback_enabled = false;
                self.record_error(inner, &e);
                Err(e)
            }
        }
    }

    /// Start the transport at `offset` track seconds.
    ///
    /// Awaits a pitch-preserving render first when one is needed, releasing the
    /// lock meanwhile. Returns `RenderStale` if another request superseded this one.
    async fn start_transport(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        offset: f64,
    ) -> Result<()> {
        let rate = inner.parameters.playback_rate;
        let preserve = inner.parameters.preserve_pitch;

        let render_source = match inner.session.as_ref().map(|s| &s.media) {
            None => return Err(Error::InvalidState("No file loaded".to_string())),
            Some(SessionMedia::Buffer { source, processed }) => {
                let cached = processed.as_ref().is_some_and(|p| p.rate == rate);
                (preserve && rate != 1.0 && !cached).then(|| source.clone())
            }
            Some(SessionMedia::Element(_)) => None,
        };

        if let Some(source) = render_source {
            let generation = self.render_generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.pending_start = Some(offset);
            let stretcher = TimeStretchProcessor::new(self.manager.tier());
            drop(inner);

            let outcome = stretcher.stretch(source, rate, true).await;

            inner = self.inner.lock().await;
            let current = self.render_generation.load(Ordering::SeqCst);
            if generation != current {
                debug!(
                    "Discarding stale render at rate {:.2} (generation {}, current {})",
                    rate, generation, current
                );
                return Err(Error::RenderStale {
                    stale: generation,
                    current,
                });
            }
            inner.pending_start = None;

            if let Some(reason) = outcome.degraded.clone() {
                let tier = self.manager.tier();
                self.notify_degraded(&mut inner, tier, tier, reason);
            }
            if let Some(session) = inner.session.as_mut() {
                if let SessionMedia::Buffer { processed, .. } = &mut session.media {
                    *processed = Some(ProcessedBuffer { rate, outcome });
                }
            }
        }

        let now = self.manager.context().current_time();
        let inner_ref = &mut *inner;
        let session = inner_ref
            .session
            .as_ref()
            .ok_or_else(|| Error::InvalidState("No file loaded".to_string()))?;
        let graph = inner_ref
            .graph
            .as_mut()
            .ok_or_else(|| Error::InvalidState("No audio graph".to_string()))?;
        let offset = offset.clamp(0.0, session.duration_seconds);

        match &session.media {
            SessionMedia::Buffer { source, processed } => {
                let (buffer, native_rate) = match processed {
                    Some(p) if preserve && p.rate == rate => {
                        (p.outcome.buffer.clone(), p.outcome.native_rate)
                    }
                    _ => (source.clone(), rate),
                };
                // Buffer seconds per track second is native_rate / rate
                let start_frame = offset * native_rate / rate * buffer.sample_rate as f64;
                let handle = SourceHandle::new(native_rate);
                let node = BufferSourceNode::new(buffer, start_frame, &handle);
                self.manager.connect(graph, Box::new(node), handle)?;
                inner_ref.element_clock = None;
            }
            SessionMedia::Element(element) => {
                let handle = SourceHandle::new(rate);
                let (node, clock) = element.start(offset, &handle)?;
                self.manager.connect(graph, Box::new(node), handle)?;
                inner_ref.element_clock = Some(clock);
            }
        }

        inner.position.start(now, offset, rate);
        info!("Playing from {:.3}s at rate {:.2}", offset, rate);
        self.transition(&mut inner, SessionState::Playing);
        self.publish(&inner);
        self.spawn_ticker();
        Ok(())
    }

    /// Disconnect the transport and freeze the position; returns the offset
    fn stop_transport(&self, inner: &mut Inner) -> f64 {
        let duration = inner.session.as_ref().map_or(0.0, |s| s.duration_seconds);
        let offset = match inner.element_clock.take() {
            Some(clock) => {
                inner.position.freeze_at(clock.current_time(), duration);
                inner.position.offset_seconds()
            }
            None => inner
                .position
                .freeze(self.manager.context().current_time(), duration),
        };
        if let Some(graph) = inner.graph.as_mut() {
            self.manager.disconnect(graph);
        }
        inner.bars = visualizer::idle_bars(self.bar_count());
        offset
    }

    async fn apply_parameter_change(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        previous: EffectParameters,
        preset: Option<PresetId>,
    ) -> Result<()> {
        let current = inner.parameters;

        if let Some(graph) = inner.graph.as_ref() {
            graph.apply_parameters(&current);
            let impulse_changed = current.reverb_room_size != previous.reverb_room_size
                || current.reverb_decay_seconds != previous.reverb_decay_seconds;
            if impulse_changed {
                self.manager.update_impulse(
                    graph,
                    current.reverb_room_size,
                    current.reverb_decay_seconds,
                );
            }
        }

        self.event_bus.emit_lossy(EngineEvent::ParametersChanged {
            parameters: current,
            preset,
            timestamp: chrono::Utc::now(),
        });

        let rate_changed = current.playback_rate != previous.playback_rate;
        let pitch_changed = current.preserve_pitch != previous.preserve_pitch;
        if rate_changed || pitch_changed {
            self.render_generation.fetch_add(1, Ordering::SeqCst);
            if let Some(session) = inner.session.as_mut() {
                session.invalidate_processed();
            }

            // Take over a start that is waiting on a render for the old values
            if let Some(offset) = inner.pending_start.take() {
                return self.start_transport(inner, offset).await;
            }

            if inner.state == SessionState::Playing {
                let on_element = inner.element_clock.is_some();
                let duration = inner.session.as_ref().map_or(0.0, |s| s.duration_seconds);
                let now = self.manager.context().current_time();

                if !on_element && (current.preserve_pitch || previous.preserve_pitch) {
                    // The buffer being played changes, so restart from here
                    let offset = inner.position.freeze(now, duration);
                    if let Some(graph) = inner.graph.as_mut() {
                        self.manager.disconnect(graph);
                    }
                    debug!(
                        "Restarting at {:.3}s for rate {:.2} (preserve_pitch={})",
                        offset, current.playback_rate, current.preserve_pitch
                    );
                    return self.start_transport(inner, offset).await;
                }

                inner.position.reanchor(now, current.playback_rate, duration);
                if let Some(handle) = inner.graph.as_ref().and_then(|g| g.active_source()) {
                    handle.set_rate(current.playback_rate);
                }
            }
        }

        self.publish(&inner);
        Ok(())
    }

    fn tick_locked(&self, inner: &mut Inner) -> SessionSnapshot {
        if inner.state == SessionState::Playing && inner.pending_start.is_none() {
            let duration = inner.session.as_ref().map_or(0.0, |s| s.duration_seconds);
            let now = self.manager.context().current_time();
            let source_ended = inner
                .graph
                .as_ref()
                .and_then(|g| g.active_source())
                .is_some_and(|h| h.has_ended());
            let ended = match inner.element_clock {
                Some(_) => source_ended,
                None => source_ended || inner.position.has_reached_end(now, duration),
            };

            if ended {
                self.finish_playback(inner);
            } else {
                let bar_count = self.bar_count();
                if let Some(graph) = inner.graph.as_mut() {
                    inner.bars = visualizer::sample(graph.analyser(), bar_count, true);
                }
            }
        }
        self.publish(inner)
    }

    /// Playing → Ended, equivalent to paused at zero
    fn finish_playback(&self, inner: &mut Inner) {
        if let Some(graph) = inner.graph.as_mut() {
            self.manager.disconnect(graph);
        }
        inner.element_clock = None;
        inner.position.reset();
        inner.bars = visualizer::idle_bars(self.bar_count());
        self.transition(inner, SessionState::Ended);
        if let Some(session) = inner.session.as_ref() {
            info!("Reached end of {}", session.file_name);
            self.event_bus.emit_lossy(EngineEvent::PlaybackEnded {
                session_id: session.id,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Invalidate any render in flight. Called with the lock held, so a start
    /// waiting on its render is always the one invalidated.
    fn cancel_pending_start(&self, inner: &mut Inner) {
        self.render_generation.fetch_add(1, Ordering::SeqCst);
        inner.pending_start = None;
    }

    /// Stop anything playing and drop the loaded file
    fn release_session(&self, inner: &mut Inner) {
        if let Some(graph) = inner.graph.as_mut() {
            self.manager.disconnect(graph);
        }
        inner.element_clock = None;
        if let Some(session) = inner.session.take() {
            debug!("Released session {} ({})", session.id, session.file_name);
        }
        inner.position.reset();
        inner.bars = visualizer::idle_bars(self.bar_count());
    }

    fn spawn_ticker(&self) {
        if !self.options.auto_tick || self.ticker_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let controller = self.me.clone();
        let period = self.options.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let mut inner = controller.inner.lock().await;
                let snapshot = controller.tick_locked(&mut inner);
                // Cleared under the lock so a concurrent play() sees a consistent flag
                if snapshot.state != SessionState::Playing {
                    controller.ticker_active.store(false, Ordering::SeqCst);
                    break;
                }
            }
            trace!("Ticker stopped");
        });
    }

    fn resume_failed(&self, inner: &mut Inner, error: Error) -> Error {
        match &error {
            Error::NeedsUserGesture(message) => {
                info!("Playback waiting for user interaction");
                inner.last_error = Some(error.to_last_error());
                self.event_bus.emit_lossy(EngineEvent::NeedsUserGesture {
                    message: message.clone(),
                    timestamp: chrono::Utc::now(),
                });
            }
            _ => {
                warn!("Audio output failed to start: {}", error);
                inner.playback_enabled = false;
                self.record_error(inner, &error);
            }
        }
        self.publish(inner);
        error
    }

    fn notify_degraded(
        &self,
        inner: &mut Inner,
        from_tier: QualityTier,
        to_tier: QualityTier,
        reason: String,
    ) {
        warn!("Capability degraded ({} → {}): {}", from_tier, to_tier, reason);
        inner.last_error = Some(LastError::new(ErrorKind::CapabilityDegraded, reason.clone()));
        self.event_bus.emit_lossy(EngineEvent::CapabilityDegraded {
            from_tier,
            to_tier,
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    fn record_error(&self, inner: &mut Inner, error: &Error) {
        let last = error.to_last_error();
        if !last.kind.is_user_visible() {
            return;
        }
        self.event_bus.emit_lossy(EngineEvent::PlaybackError {
            kind: last.kind,
            message: last.message.clone(),
            timestamp: chrono::Utc::now(),
        });
        inner.last_error = Some(last);
    }

    fn transition(&self, inner: &mut Inner, new_state: SessionState) {
        let old_state = inner.state;
        if old_state == new_state {
            return;
        }
        inner.state = new_state;
        info!("State: {} → {}", old_state, new_state);
        self.event_bus.emit_lossy(EngineEvent::StateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn bar_count(&self) -> usize {
        self.config.bar_count(self.manager.tier())
    }

    fn publish(&self, inner: &Inner) -> SessionSnapshot {
        let duration = inner.session.as_ref().map_or(0.0, |s| s.duration_seconds);
        let current_time = match (&inner.element_clock, inner.state) {
            (Some(clock), SessionState::Playing) => clock.current_time().clamp(0.0, duration),
            _ => inner
                .position
                .current(self.manager.context().current_time(), duration),
        };
        let rate = inner.parameters.playback_rate;

        let snapshot = SessionSnapshot {
            session_id: inner.session.as_ref().map(|s| s.id),
            file_name: inner.session.as_ref().map(|s| s.file_name.clone()),
            state: inner.state,
            current_time_seconds: current_time,
            duration_seconds: duration,
            playback_duration_seconds: if rate > 0.0 { duration / rate } else { duration },
            quality_tier: self.manager.tier(),
            transport_mode: self.capabilities.transport_mode,
            visualizer_bars: inner.bars.clone(),
            parameters: inner.parameters,
            last_error: inner.last_error.clone(),
            playback_enabled: inner.playback_enabled,
        };
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}

/// Superseded requests end quietly
fn discard_stale(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::RenderStale { .. }) => Ok(()),
        other => other,
    }
}

/// Blocking: decode (graph transport) or probe (element transport)
fn load_media(file: &AudioFile, mode: TransportMode, sample_rate: u32) -> Result<SessionMedia> {
    match mode {
        TransportMode::GraphNode => {
            let decoded = decode_to_pcm(file)?;
            let source = if decoded.sample_rate != sample_rate {
                Resampler::resample(&decoded, sample_rate)?
            } else {
                decoded
            };
            Ok(SessionMedia::Buffer {
                source: Arc::new(source),
                processed: None,
            })
        }
        TransportMode::MediaElement => Ok(SessionMedia::Element(MediaElement::open(
            file,
            sample_rate,
        )?)),
    }
}
