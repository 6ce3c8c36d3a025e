//! Audio decoder using symphonia
//!
//! Decodes in-memory audio blobs (MP3, AAC/M4A, Vorbis, FLAC, WAV) to planar
//! stereo f32. Two entry points share one packet loop:
//! - [`decode_to_pcm`] decodes the whole file up front for the graph-node transport
//! - [`StreamingDecoder`] hands out chunks on demand for the media-element transport

use crate::audio::types::{AudioFile, PcmBuffer};
use crate::error::{Error, Result};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Stream parameters learned from probing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    /// Native sample rate of the file
    pub sample_rate: u32,
    /// Channel count in the file (output is always stereo)
    pub channels: usize,
    /// Duration from container metadata, when present
    pub duration_seconds: Option<f64>,
}

/// Pull-based decoder over an in-memory file.
///
/// Every chunk is planar stereo: mono sources are duplicated and channels past
/// the second are dropped.
pub struct StreamingDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl StreamingDecoder {
    /// Probe the file and open a decoder for its first audio track.
    ///
    /// # Errors
    /// `Error::UnsupportedFormat` if no format reader or codec accepts the data
    pub fn open(bytes: Arc<[u8]>, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Create a hint to help the format registry guess the format
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to probe format: {}", e)))?;

        let format = probed.format;

        // Get the default audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::UnsupportedFormat("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat("Sample rate not found".to_string()))?;

        let channels = codec_params.channels.map(|c| c.count()).unwrap_or(2);

        let duration_seconds = codec_params.n_frames.map(|n| match codec_params.time_base {
            Some(tb) => {
                let time = tb.calc_time(n);
                time.seconds as f64 + time.frac
            }
            None => n as f64 / sample_rate as f64,
        });

        debug!(
            "Audio format: sample_rate={}, channels={}, duration={:?}",
            sample_rate, channels, duration_seconds
        );

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            info: StreamInfo {
                sample_rate,
                channels,
                duration_seconds,
            },
            sample_buf: None,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Decode the next packet of the audio track.
    ///
    /// Returns `Ok(None)` at end of stream. Corrupt packets are skipped with a warning.
    pub fn next_chunk(&mut self) -> Result<Option<[Vec<f32>; 2]>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Stream reset required, treating as end of stream");
                    return Ok(None);
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    return Ok(None);
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let needs_new = self
                .sample_buf
                .as_ref()
                .map_or(true, |b| b.capacity() < frames * spec.channels.count());
            if needs_new {
                self.sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }

            let Some(buf) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_planar_ref(decoded);

            let channel_count = spec.channels.count().max(1);
            let samples = buf.samples();
            let left = samples[..frames].to_vec();
            let right = if channel_count >= 2 {
                samples[frames..frames * 2].to_vec()
            } else {
                left.clone()
            };
            return Ok(Some([left, right]));
        }
    }
}

/// Decode an entire file to planar stereo at its native sample rate.
///
/// # Errors
/// - `Error::UnsupportedFormat` if probing fails or the file decodes to nothing
/// - `Error::Decode` for unrecoverable decoder failures mid-stream
pub fn decode_to_pcm(file: &AudioFile) -> Result<PcmBuffer> {
    let started = std::time::Instant::now();
    let mut decoder = StreamingDecoder::open(file.bytes.clone(), file.extension())?;
    let info = decoder.info();

    let mut left = Vec::new();
    let mut right = Vec::new();
    while let Some([l, r]) = decoder.next_chunk()? {
        left.extend_from_slice(&l);
        right.extend_from_slice(&r);
    }

    if left.is_empty() {
        return Err(Error::UnsupportedFormat(format!(
            "{} contains no decodable audio",
            file.name
        )));
    }

    debug!(
        "Decoded {} frames at {}Hz in {:?}",
        left.len(),
        info.sample_rate,
        started.elapsed()
    );

    Ok(PcmBuffer::new(info.sample_rate, vec![left, right]))
}

/// Probe a file without decoding it.
///
/// Used by the media-element transport, which decodes progressively during playback.
/// Falls back to a full decode pass when the container carries no frame count.
pub fn probe(file: &AudioFile) -> Result<StreamInfo> {
    let mut decoder = StreamingDecoder::open(file.bytes.clone(), file.extension())?;
    let mut info = decoder.info();

    if info.duration_seconds.is_none() {
        let mut frames = 0usize;
        while let Some([l, _]) = decoder.next_chunk()? {
            frames += l.len();
        }
        info.duration_seconds = Some(frames as f64 / info.sample_rate as f64);
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let s = ((i as f32 * 0.05).sin() * 8000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_wav_to_stereo() {
        let file = AudioFile::new("tone.wav", Some("audio/wav".into()), wav_bytes(22050, 1, 2205));
        let pcm = decode_to_pcm(&file).unwrap();

        assert_eq!(pcm.sample_rate, 22050);
        assert_eq!(pcm.channel_count(), 2);
        assert_eq!(pcm.frames(), 2205);
        assert_eq!(pcm.channels[0], pcm.channels[1]);
    }

    #[test]
    fn test_probe_reports_duration() {
        let file = AudioFile::new("tone.wav", None, wav_bytes(8000, 2, 16000));
        let info = probe(&file).unwrap();

        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 2);
        let duration = info.duration_seconds.unwrap();
        assert!((duration - 2.0).abs() < 0.01, "duration was {}", duration);
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let file = AudioFile::new("noise.mp3", Some("audio/mpeg".into()), vec![0x42; 512]);
        let err = decode_to_pcm(&file).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)), "got {:?}", err);
    }
}
