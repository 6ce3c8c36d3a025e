//! Session-level type definitions
//!
//! Supporting types for the session snapshot: lifecycle state, capability tier,
//! transport mode, and the classified error surfaced to the UI.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::EffectParameters;

/// Playback session lifecycle state
///
/// `Idle → Loading → Ready → Playing ⇄ Paused → Ended`, with `Loading → Error`
/// on a rejected file and any state returning to `Loading` on a new selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No file loaded
    #[default]
    Idle,
    /// A file is being decoded or probed
    Loading,
    /// File loaded, transport stopped at the current offset
    Ready,
    /// Transport running
    Playing,
    /// Transport stopped mid-track, offset frozen
    Paused,
    /// Reached the end of the track; offset reset to zero
    Ended,
    /// Last file was rejected; no file loaded
    Error,
}

impl SessionState {
    /// States from which `play()` may start the transport
    pub fn can_play(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Paused | SessionState::Ended)
    }

    /// States in which a file is loaded
    pub fn has_file(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Playing | SessionState::Paused | SessionState::Ended
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Loading => write!(f, "loading"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Playing => write!(f, "playing"),
            SessionState::Paused => write!(f, "paused"),
            SessionState::Ended => write!(f, "ended"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Device capability / quality level
///
/// Ordered `Basic < Medium < High`. A tier may be demoted at runtime when graph
/// construction fails, never promoted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Basic,
    Medium,
    High,
}

impl QualityTier {
    /// One step down, or `None` when already at Basic
    pub fn demoted(&self) -> Option<QualityTier> {
        match self {
            QualityTier::High => Some(QualityTier::Medium),
            QualityTier::Medium => Some(QualityTier::Basic),
            QualityTier::Basic => None,
        }
    }

    /// Whether reverb and low-pass are available at this tier
    pub fn supports_effects(&self) -> bool {
        !matches!(self, QualityTier::Basic)
    }

    /// Playback rate window the device can sustain
    pub fn rate_range(&self) -> (f64, f64) {
        match self {
            QualityTier::Basic => (0.25, 1.5),
            QualityTier::Medium => (0.25, 2.0),
            QualityTier::High => (0.1, 4.0),
        }
    }

    /// Number of visualizer bars
    pub fn bar_count(&self) -> usize {
        match self {
            QualityTier::Basic => 16,
            QualityTier::Medium | QualityTier::High => 32,
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Basic => write!(f, "basic"),
            QualityTier::Medium => write!(f, "medium"),
            QualityTier::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(QualityTier::Basic),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(crate::Error::InvalidInput(format!("Unknown tier: {}", other))),
        }
    }
}

/// How decoded audio reaches the graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransportMode {
    /// Fully decoded buffer played by a source node through the effect graph
    GraphNode,
    /// Progressive decode through a media element; gain and analyser only
    MediaElement,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::GraphNode => write!(f, "graphNode"),
            TransportMode::MediaElement => write!(f, "mediaElement"),
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "graphnode" | "graph" => Ok(TransportMode::GraphNode),
            "mediaelement" | "element" => Ok(TransportMode::MediaElement),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown transport mode: {}",
                other
            ))),
        }
    }
}

/// Classification of engine failures as seen by the UI
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Decoder rejected the file
    UnsupportedFormat,
    /// File exceeds the tier's byte cap
    FileTooLarge,
    /// No audio subsystem; playback disabled
    EngineUnavailable,
    /// A feature was downgraded; playback continues
    CapabilityDegraded,
    /// Playback blocked until the user interacts
    NeedsUserGesture,
    /// A superseded async result (never shown)
    RenderStale,
    /// Command not valid in the current state
    InvalidState,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Whether this kind is ever surfaced to the user
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ErrorKind::RenderStale)
    }

    /// Advisory notices dismiss themselves; everything else waits for the user
    pub fn is_advisory(&self) -> bool {
        matches!(self, ErrorKind::CapabilityDegraded)
    }
}

/// Most recent user-visible error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

impl LastError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Observable view of the engine, republished on every meaningful transition
/// and on every visualizer tick while playing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Identity of the loaded file (None when nothing is loaded)
    pub session_id: Option<Uuid>,
    /// Display name of the loaded file
    pub file_name: Option<String>,
    pub state: SessionState,
    /// Position within the track in track seconds
    pub current_time_seconds: f64,
    /// Track length in track seconds
    pub duration_seconds: f64,
    /// Wall-clock length of the whole track at the current playback rate
    pub playback_duration_seconds: f64,
    pub quality_tier: QualityTier,
    pub transport_mode: TransportMode,
    pub visualizer_bars: Vec<f32>,
    pub parameters: EffectParameters,
    pub last_error: Option<LastError>,
    /// False once the engine is known to be unavailable
    pub playback_enabled: bool,
}

impl SessionSnapshot {
    /// Snapshot for a freshly constructed engine
    pub fn initial(tier: QualityTier, mode: TransportMode, parameters: EffectParameters) -> Self {
        Self {
            session_id: None,
            file_name: None,
            state: SessionState::Idle,
            current_time_seconds: 0.0,
            duration_seconds: 0.0,
            playback_duration_seconds: 0.0,
            quality_tier: tier,
            transport_mode: mode,
            visualizer_bars: vec![crate::events::MIN_BAR_HEIGHT; tier.bar_count()],
            parameters,
            last_error: None,
            playback_enabled: true,
        }
    }

    /// Progress through the track in [0, 1]
    pub fn progress(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            (self.current_time_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
