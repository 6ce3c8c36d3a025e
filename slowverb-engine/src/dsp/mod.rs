//! Signal processing building blocks
//!
//! Everything here is plain single-threaded DSP; the graph decides which thread
//! each piece runs on.

pub mod analyser;
pub mod biquad;
pub mod convolver;
pub mod reverb;
pub mod stretch;

pub use analyser::{Analyser, AnalyserSettings, AnalyserTap};
pub use biquad::LowPassFilter;
pub use convolver::{Convolver, ConvolverKernel};
pub use reverb::ReverbSynthesizer;
pub use stretch::{StretchOutcome, TimeStretchProcessor};
