//! # Slowverb Common Library
//!
//! Shared vocabulary between the playback engine and whatever presentation layer
//! drives it:
//! - Session snapshot and lifecycle types (`SessionState`, `QualityTier`, `TransportMode`)
//! - Event types (`EngineEvent`) and the broadcast `EventBus`
//! - Effect parameters and the built-in preset table
//! - TOML configuration loading
//! - Clock formatting for progress displays

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod params;

pub use error::{Error, Result};
pub use events::{
    EngineEvent, ErrorKind, EventBus, LastError, QualityTier, SessionSnapshot, SessionState,
    TransportMode,
};
pub use params::{EffectParam, EffectParameters, PresetId};
