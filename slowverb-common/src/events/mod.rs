//! Event types for the Slowverb event system
//!
//! Provides the engine event definitions and the EventBus the engine publishes on.
//! The periodic view of the engine (position, visualizer bars) is carried by
//! `SessionSnapshot` instead; events are for discrete transitions and notices.

mod session_types;

pub use session_types::{
    ErrorKind, LastError, QualityTier, SessionSnapshot, SessionState, TransportMode,
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::params::{EffectParameters, PresetId};

/// Visualizer floor: bars never drop below this height so they stay visible at silence
pub const MIN_BAR_HEIGHT: f32 = 2.0;

/// Visualizer ceiling
pub const MAX_BAR_HEIGHT: f32 = 100.0;

/// Slowverb engine events
///
/// Events are broadcast via EventBus and can be serialized for any UI transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Session state changed
    StateChanged {
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A file decoded (or probed) successfully and is ready to play
    FileLoaded {
        session_id: Uuid,
        file_name: String,
        duration_seconds: f64,
        transport_mode: TransportMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A feature was downgraded at runtime
    ///
    /// Informational; playback continues in the demoted tier. The UI shows an
    /// auto-dismissing notice.
    CapabilityDegraded {
        from_tier: QualityTier,
        to_tier: QualityTier,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback was blocked by the output policy and needs a user gesture
    ///
    /// Actionable; calling `play()` again after interaction retries.
    NeedsUserGesture {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A user-visible failure (load rejection, engine unavailable, ...)
    PlaybackError {
        kind: ErrorKind,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Effect parameters changed through a command or preset
    ParametersChanged {
        parameters: EffectParameters,
        preset: Option<PresetId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback reached the end of the track
    PlaybackEnded {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Short event name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "StateChanged",
            EngineEvent::FileLoaded { .. } => "FileLoaded",
            EngineEvent::CapabilityDegraded { .. } => "CapabilityDegraded",
            EngineEvent::NeedsUserGesture { .. } => "NeedsUserGesture",
            EngineEvent::PlaybackError { .. } => "PlaybackError",
            EngineEvent::ParametersChanged { .. } => "ParametersChanged",
            EngineEvent::PlaybackEnded { .. } => "PlaybackEnded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use slowverb_common::events::{EventBus, EngineEvent, SessionState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(EngineEvent::StateChanged {
///     old_state: SessionState::Ready,
///     new_state: SessionState::Playing,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(EngineEvent::StateChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EngineEvent,
    ) -> Result<usize, broadcast::error::SendError<EngineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
