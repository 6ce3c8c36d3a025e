//! Audio I/O: decoding, resampling, output drivers and the media-element transport

pub mod decoder;
pub mod element;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::{decode_to_pcm, probe, StreamInfo, StreamingDecoder};
pub use element::{ElementClock, ElementSourceNode, MediaElement};
pub use output::{DeviceOutput, ManualDriver, OutputDriver};
pub use resampler::Resampler;
pub use types::{AudioFile, AudioFrame, PcmBuffer, ACCEPTED_MIME_TYPES};
