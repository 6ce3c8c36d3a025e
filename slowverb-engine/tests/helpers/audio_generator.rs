//! Audio test file generation
//!
//! WAVs are built in memory with hound so tests never touch the filesystem.

use hound::{SampleFormat, WavSpec, WavWriter};
use slowverb_engine::audio::AudioFile;
use std::f32::consts::PI;
use std::io::Cursor;

/// Low rate keeps decode and render cheap
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Encode a sine wave as 16-bit PCM WAV bytes.
///
/// # Arguments
/// * `sample_rate` - Rate written to the header
/// * `channels` - 1 or 2 (both channels carry the same tone)
/// * `seconds` - Length of the tone
/// * `frequency_hz` - Tone frequency
/// * `amplitude` - Peak amplitude 0.0-1.0
pub fn sine_wav_bytes(
    sample_rate: u32,
    channels: u16,
    seconds: f64,
    frequency_hz: f32,
    amplitude: f32,
) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).expect("wav header");
        let frames = (seconds * sample_rate as f64).round() as usize;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).expect("wav sample");
            }
        }
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}

/// A mono 440 Hz tone at [`TEST_SAMPLE_RATE`], typed `audio/wav`
pub fn sine_file(name: &str, seconds: f64) -> AudioFile {
    AudioFile::new(
        name,
        Some("audio/wav".to_string()),
        sine_wav_bytes(TEST_SAMPLE_RATE, 1, seconds, 440.0, 0.5),
    )
}
