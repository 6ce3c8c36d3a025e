//! Session lifecycle and transport control

pub mod controller;
pub mod position;

pub use controller::{ControllerOptions, PlaybackController, DEFAULT_TICK_INTERVAL};
pub use position::PlaybackPosition;
