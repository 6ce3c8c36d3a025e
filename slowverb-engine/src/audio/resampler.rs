//! Audio resampling using rubato
//!
//! Converts a decoded track to the audio context's rate so the graph never
//! runs mixed rates. The track is fed through in fixed chunks and the tail is
//! flushed with a partial chunk, then the result is trimmed to the exact
//! converted length so the track's duration is unchanged.

use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Input frames per rubato call
const CHUNK_FRAMES: usize = 4096;

/// Sample rate converter for whole decoded tracks
pub struct Resampler;

impl Resampler {
    /// Resample a planar buffer to `output_rate`.
    ///
    /// # Returns
    /// A new buffer at `output_rate` holding `round(frames × output_rate / input_rate)`
    /// frames, or a copy when the rates already match.
    ///
    /// # Errors
    /// `Error::Decode` if rubato rejects the ratio or the input shape
    pub fn resample(input: &PcmBuffer, output_rate: u32) -> Result<PcmBuffer> {
        let input_rate = input.sample_rate;
        if input_rate == output_rate {
            return Ok(input.clone());
        }

        let channels = input.channel_count();
        let input_frames = input.frames();
        if input_frames == 0 || channels == 0 {
            return Ok(PcmBuffer::silent(output_rate, channels, 0));
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let target_frames = (input_frames as f64 * ratio).round() as usize;
        let mut resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

        // Leading output is filter delay; skip it so the track starts on time
        let delay = resampler.output_delay();
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(target_frames + delay); channels];

        let mut position = 0;
        while position < input_frames {
            let end = (position + CHUNK_FRAMES).min(input_frames);
            let chunk: Vec<&[f32]> = input.channels.iter().map(|c| &c[position..end]).collect();
            let processed = if end - position == CHUNK_FRAMES {
                resampler.process(chunk.as_slice(), None)
            } else {
                resampler.process_partial(Some(chunk.as_slice()), None)
            }
            .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            append(&mut output, processed);
            position = end;
        }

        // Drain the filter until the delayed tail is out
        while output[0].len() < target_frames + delay {
            let processed = resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            if processed.first().map_or(true, Vec::is_empty) {
                break;
            }
            append(&mut output, processed);
        }

        for channel in &mut output {
            channel.drain(..delay.min(channel.len()));
            channel.resize(target_frames, 0.0);
        }

        debug!(
            "Resampled {} frames at {}Hz to {} frames at {}Hz",
            input_frames, input_rate, target_frames, output_rate
        );
        Ok(PcmBuffer::new(output_rate, output))
    }
}

fn append(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(processed) {
        channel.extend(samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, frames: usize) -> PcmBuffer {
        let samples: Vec<f32> = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect();
        PcmBuffer::new(rate, vec![samples.clone(), samples])
    }

    #[test]
    fn test_same_rate_is_a_copy() {
        let input = PcmBuffer::new(44100, vec![vec![0.1, 0.3], vec![0.2, 0.4]]);
        assert_eq!(Resampler::resample(&input, 44100).unwrap(), input);
    }

    #[test]
    fn test_empty_input() {
        let output = Resampler::resample(&PcmBuffer::silent(48000, 2, 0), 44100).unwrap();
        assert_eq!(output.sample_rate, 44100);
        assert_eq!(output.frames(), 0);
    }

    #[test]
    fn test_duration_is_preserved() {
        // Not a multiple of the chunk size, so the partial path runs too
        let input = tone(48000, 48000 + 1234);
        let output = Resampler::resample(&input, 44100).unwrap();

        assert_eq!(output.channel_count(), 2);
        assert_eq!(output.frames(), ((48000 + 1234) as f64 * 44100.0 / 48000.0).round() as usize);
        assert!((output.duration_seconds() - input.duration_seconds()).abs() < 1e-4);
    }

    #[test]
    fn test_upsampled_tone_keeps_its_level() {
        let output = Resampler::resample(&tone(8000, 8000), 44100).unwrap();
        let middle = &output.channels[0][10_000..30_000];
        let peak = middle.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak {}", peak);
    }
}
