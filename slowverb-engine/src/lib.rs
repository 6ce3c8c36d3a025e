//! # Slowverb Playback Engine
//!
//! Loads one audio file and plays it through a tier-dependent effects graph:
//! slowed playback with optional pitch preservation, synthesized convolution
//! reverb with a wet/dry mix, a low-pass filter and master volume, plus a
//! frequency-bar visualizer.
//!
//! **Architecture:** symphonia decode → rubato resample → render graph pulled
//! by a cpal output thread (or a manually pumped driver). The
//! [`PlaybackController`](playback::PlaybackController) owns the session state
//! machine and publishes [`SessionSnapshot`](slowverb_common::SessionSnapshot)s.

pub mod audio;
pub mod capability;
pub mod config;
pub mod dsp;
pub mod error;
pub mod graph;
pub mod playback;
pub mod visualizer;

pub use error::{Error, Result};
