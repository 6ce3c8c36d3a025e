//! Effect parameters and the built-in preset table
//!
//! `EffectParameters` is the full set of user-adjustable values the engine
//! applies to its graph. Every setter clamps into the documented domain, so a
//! value that reaches the engine is always usable on its own; no field depends
//! on the validity of another.
//!
//! Presets are fixed bundles of rate / wet / room size / decay / cutoff and live
//! in a process-wide constant table.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Absolute playback rate domain (tiers narrow this further)
pub const RATE_MIN: f64 = 0.1;
pub const RATE_MAX: f64 = 4.0;

/// Reverb wet mix domain
pub const WET_MIN: f64 = 0.0;
pub const WET_MAX: f64 = 0.8;

/// Room size domain (envelope exponent)
pub const ROOM_SIZE_MIN: f64 = 0.01;
pub const ROOM_SIZE_MAX: f64 = 1.5;

/// Reverb decay domain in seconds
pub const DECAY_MIN_SECONDS: f64 = 0.01;
pub const DECAY_MAX_SECONDS: f64 = 4.0;

/// Low-pass cutoff domain in Hz
pub const LOW_PASS_MIN_HZ: f64 = 500.0;
pub const LOW_PASS_MAX_HZ: f64 = 20_000.0;

/// Complete effect state applied to the audio graph
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectParameters {
    /// Playback speed multiplier
    pub playback_rate: f64,
    /// Reverb wet level; the dry level is always `1 - reverb_wet`
    pub reverb_wet: f64,
    /// Exponent of the impulse envelope (larger = slower decay shape)
    pub reverb_room_size: f64,
    /// Impulse length in seconds before the tier cap
    pub reverb_decay_seconds: f64,
    /// Low-pass cutoff frequency
    pub low_pass_hz: f64,
    /// Master gain (0.0-1.0)
    pub volume: f64,
    /// Pre-render a rate-adjusted buffer instead of using native rate control
    pub preserve_pitch: bool,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            playback_rate: 0.8,
            reverb_wet: 0.3,
            reverb_room_size: 0.7,
            reverb_decay_seconds: 2.5,
            low_pass_hz: 8000.0,
            volume: 0.8,
            preserve_pitch: false,
        }
    }
}

impl EffectParameters {
    /// Set one parameter, clamping into its domain.
    ///
    /// `rate_range` is the tier-specific playback rate window; it is always a
    /// subset of `[RATE_MIN, RATE_MAX]`.
    ///
    /// # Errors
    /// `InvalidInput` for NaN or infinite values.
    pub fn set(&mut self, param: EffectParam, value: f64, rate_range: (f64, f64)) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::InvalidInput(format!(
                "{} must be a finite number, got {}",
                param, value
            )));
        }

        match param {
            EffectParam::PlaybackRate => {
                let (lo, hi) = rate_range;
                self.playback_rate = value.clamp(lo.max(RATE_MIN), hi.min(RATE_MAX));
            }
            EffectParam::ReverbWet => self.reverb_wet = value.clamp(WET_MIN, WET_MAX),
            EffectParam::ReverbRoomSize => {
                self.reverb_room_size = value.clamp(ROOM_SIZE_MIN, ROOM_SIZE_MAX)
            }
            EffectParam::ReverbDecay => {
                self.reverb_decay_seconds = value.clamp(DECAY_MIN_SECONDS, DECAY_MAX_SECONDS)
            }
            EffectParam::LowPass => self.low_pass_hz = value.clamp(LOW_PASS_MIN_HZ, LOW_PASS_MAX_HZ),
            EffectParam::Volume => self.volume = value.clamp(0.0, 1.0),
            EffectParam::PreservePitch => self.preserve_pitch = value != 0.0,
        }
        Ok(())
    }

    /// Read one parameter back as a number (`preserve_pitch` reads as 0/1)
    pub fn get(&self, param: EffectParam) -> f64 {
        match param {
            EffectParam::PlaybackRate => self.playback_rate,
            EffectParam::ReverbWet => self.reverb_wet,
            EffectParam::ReverbRoomSize => self.reverb_room_size,
            EffectParam::ReverbDecay => self.reverb_decay_seconds,
            EffectParam::LowPass => self.low_pass_hz,
            EffectParam::Volume => self.volume,
            EffectParam::PreservePitch => {
                if self.preserve_pitch {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Dry level paired with the current wet level
    pub fn dry_level(&self) -> f64 {
        1.0 - self.reverb_wet
    }

    /// Overwrite the preset-controlled fields.
    ///
    /// Volume and pitch preservation are left untouched.
    pub fn apply_preset(&mut self, preset: &Preset) {
        self.playback_rate = preset.playback_rate;
        self.reverb_wet = preset.reverb_wet;
        self.reverb_room_size = preset.reverb_room_size;
        self.reverb_decay_seconds = preset.reverb_decay_seconds;
        self.low_pass_hz = preset.low_pass_hz;
    }
}

/// Names accepted by `set_effect_parameter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectParam {
    PlaybackRate,
    ReverbWet,
    ReverbRoomSize,
    ReverbDecay,
    LowPass,
    Volume,
    PreservePitch,
}

impl EffectParam {
    pub const ALL: [EffectParam; 7] = [
        EffectParam::PlaybackRate,
        EffectParam::ReverbWet,
        EffectParam::ReverbRoomSize,
        EffectParam::ReverbDecay,
        EffectParam::LowPass,
        EffectParam::Volume,
        EffectParam::PreservePitch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectParam::PlaybackRate => "playbackRate",
            EffectParam::ReverbWet => "reverbWet",
            EffectParam::ReverbRoomSize => "reverbRoomSize",
            EffectParam::ReverbDecay => "reverbDecay",
            EffectParam::LowPass => "lowPassFilter",
            EffectParam::Volume => "volume",
            EffectParam::PreservePitch => "preservePitch",
        }
    }

    /// Whether changing this parameter means the impulse response must be rebuilt
    pub fn affects_impulse(&self) -> bool {
        matches!(self, EffectParam::ReverbRoomSize | EffectParam::ReverbDecay)
    }
}

impl fmt::Display for EffectParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectParam {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "playbackrate" | "rate" | "speed" => Ok(EffectParam::PlaybackRate),
            "reverbwet" | "wet" | "reverb" => Ok(EffectParam::ReverbWet),
            "reverbroomsize" | "roomsize" => Ok(EffectParam::ReverbRoomSize),
            "reverbdecay" | "reverbdecayseconds" | "decay" => Ok(EffectParam::ReverbDecay),
            "lowpassfilter" | "lowpass" | "lowpasshz" | "filter" => Ok(EffectParam::LowPass),
            "volume" => Ok(EffectParam::Volume),
            "preservepitch" => Ok(EffectParam::PreservePitch),
            _ => Err(Error::InvalidInput(format!("Unknown effect parameter: {}", s))),
        }
    }
}

/// A named bundle of effect values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub playback_rate: f64,
    pub reverb_wet: f64,
    pub reverb_room_size: f64,
    pub reverb_decay_seconds: f64,
    pub low_pass_hz: f64,
}

/// Built-in preset identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetId {
    Bedroom,
    Vaporwave,
    Chill,
    Midnight,
}

const BEDROOM: Preset = Preset {
    playback_rate: 0.8,
    reverb_wet: 0.3,
    reverb_room_size: 0.7,
    reverb_decay_seconds: 2.5,
    low_pass_hz: 6000.0,
};

const VAPORWAVE: Preset = Preset {
    playback_rate: 0.6,
    reverb_wet: 0.5,
    reverb_room_size: 1.2,
    reverb_decay_seconds: 4.0,
    low_pass_hz: 4000.0,
};

const CHILL: Preset = Preset {
    playback_rate: 0.75,
    reverb_wet: 0.2,
    reverb_room_size: 0.5,
    reverb_decay_seconds: 1.5,
    low_pass_hz: 8000.0,
};

const MIDNIGHT: Preset = Preset {
    playback_rate: 0.65,
    reverb_wet: 0.45,
    reverb_room_size: 0.9,
    reverb_decay_seconds: 3.2,
    low_pass_hz: 4500.0,
};

impl PresetId {
    pub const ALL: [PresetId; 4] = [
        PresetId::Bedroom,
        PresetId::Vaporwave,
        PresetId::Chill,
        PresetId::Midnight,
    ];

    /// The fixed values for this preset
    pub fn preset(&self) -> &'static Preset {
        match self {
            PresetId::Bedroom => &BEDROOM,
            PresetId::Vaporwave => &VAPORWAVE,
            PresetId::Chill => &CHILL,
            PresetId::Midnight => &MIDNIGHT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetId::Bedroom => "bedroom",
            PresetId::Vaporwave => "vaporwave",
            PresetId::Chill => "chill",
            PresetId::Midnight => "midnight",
        }
    }
}

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bedroom" => Ok(PresetId::Bedroom),
            "vaporwave" => Ok(PresetId::Vaporwave),
            "chill" => Ok(PresetId::Chill),
            "midnight" | "midnight-drive" | "midnight_drive" => Ok(PresetId::Midnight),
            _ => Err(Error::InvalidInput(format!("Unknown preset: {}", s))),
        }
    }
}
