//! Test helper modules for slowverb-engine integration tests
//!
//! - audio_generator: in-memory WAV files with known content
//! - test_engine: a controller wired to a manually pumped output
//! - error_injection: node factories that fail on purpose

#![allow(dead_code, unused_imports)]

pub mod audio_generator;
pub mod error_injection;
pub mod test_engine;

pub use audio_generator::{sine_file, sine_wav_bytes, TEST_SAMPLE_RATE};
pub use error_injection::{NoAnalyserFactory, NoConvolverFactory};
pub use test_engine::{peak, TestEngine, TestEngineBuilder, PUMP_BLOCK};
