//! Core audio data types
//!
//! Defines the decoded PCM buffer, the stereo frame passed between the graph and
//! the output device, and the in-memory file blob handed over by the host.

use std::sync::Arc;

/// Decoded PCM audio held entirely in memory.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Planar: one `Vec` per channel, all of equal length
/// - Immutable once decoded; shared through `Arc<PcmBuffer>`
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Per-channel samples
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Create a buffer from planar channel data
    ///
    /// Channels shorter than the longest are padded with silence.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self {
            sample_rate,
            channels,
        }
    }

    /// Silent buffer of the given shape
    pub fn silent(sample_rate: u32, channel_count: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channel_count],
        }
    }

    /// Number of frames per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Stereo frame at `index`; mono is duplicated and extra channels ignored
    pub fn frame(&self, index: usize) -> Option<AudioFrame> {
        let left = *self.channels.first()?.get(index)?;
        let right = self
            .channels
            .get(1)
            .and_then(|c| c.get(index).copied())
            .unwrap_or(left);
        Some(AudioFrame { left, right })
    }
}

/// AudioFrame represents a single stereo sample (one frame of audio).
///
/// Used for passing audio data between the graph and the output device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioFrame {
    /// Left channel sample
    pub left: f32,

    /// Right channel sample
    pub right: f32,
}

impl AudioFrame {
    /// Create a silent frame (0.0, 0.0)
    pub fn zero() -> Self {
        AudioFrame { left: 0.0, right: 0.0 }
    }

    /// Create a frame from mono sample (duplicate to both channels)
    pub fn from_mono(sample: f32) -> Self {
        AudioFrame { left: sample, right: sample }
    }

    /// Create a frame from left and right samples
    pub fn from_stereo(left: f32, right: f32) -> Self {
        AudioFrame { left, right }
    }

    /// Apply gain to both channels
    pub fn scaled(self, gain: f32) -> Self {
        AudioFrame {
            left: self.left * gain,
            right: self.right * gain,
        }
    }

    /// Add another frame to this frame (for mixing)
    pub fn add(&mut self, other: &AudioFrame) {
        self.left += other.left;
        self.right += other.right;
    }

    /// Clamp samples to valid range [-1.0, 1.0] to prevent clipping
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }

    /// Mono downmix, as fed to the analyser
    pub fn mono(&self) -> f32 {
        0.5 * (self.left + self.right)
    }
}

/// MIME types the file picker offers; any other `audio/*` type is accepted too
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "audio/mp3",
    "audio/mpeg",
    "audio/mp4",
    "audio/m4a",
    "audio/x-m4a",
    "audio/wav",
    "audio/x-wav",
    "audio/aac",
    "audio/ogg",
    "audio/webm",
];

/// An in-memory audio file selected by the user
#[derive(Debug, Clone)]
pub struct AudioFile {
    /// Display name (usually the original file name)
    pub name: String,

    /// MIME type reported by the host, if any
    pub mime_type: Option<String>,

    /// Encoded bytes
    pub bytes: Arc<[u8]>,
}

impl AudioFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes: Arc::from(bytes),
        }
    }

    /// Read a file from disk, guessing the MIME type from its extension
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string);
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the MIME type passes the accept filter
    ///
    /// A missing MIME type is accepted; the decoder decides.
    pub fn is_accepted(&self) -> bool {
        match self.mime_type.as_deref() {
            None => true,
            Some(mime) => {
                let mime = mime.trim().to_ascii_lowercase();
                ACCEPTED_MIME_TYPES.contains(&mime.as_str()) || mime.starts_with("audio/")
            }
        }
    }

    /// File extension, used as a probe hint
    pub fn extension(&self) -> Option<&str> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp3" => Some("audio/mpeg"),
        "mp4" => Some("audio/mp4"),
        "m4a" => Some("audio/x-m4a"),
        "wav" => Some("audio/wav"),
        "aac" => Some("audio/aac"),
        "ogg" | "oga" => Some("audio/ogg"),
        "webm" => Some("audio/webm"),
        "flac" => Some("audio/flac"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_buffer_shape() {
        let buf = PcmBuffer::new(48000, vec![vec![0.5; 480], vec![0.25; 240]]);
        assert_eq!(buf.frames(), 480);
        assert_eq!(buf.channels[1].len(), 480);
        assert_eq!(buf.channels[1][300], 0.0);
        assert!((buf.duration_seconds() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_mono_frame_is_duplicated() {
        let buf = PcmBuffer::new(44100, vec![vec![0.3, 0.6]]);
        assert_eq!(buf.frame(1), Some(AudioFrame::from_mono(0.6)));
        assert_eq!(buf.frame(2), None);
    }

    #[test]
    fn test_accept_filter() {
        let file = |mime: Option<&str>| AudioFile::new("a.mp3", mime.map(str::to_string), vec![]);
        assert!(file(Some("audio/mpeg")).is_accepted());
        assert!(file(Some("audio/flac")).is_accepted());
        assert!(file(Some("AUDIO/X-M4A")).is_accepted());
        assert!(file(None).is_accepted());
        assert!(!file(Some("image/png")).is_accepted());
        assert!(!file(Some("video/mp4")).is_accepted());
    }

    #[test]
    fn test_frame_helpers() {
        let mut frame = AudioFrame::from_stereo(0.8, -0.4).scaled(2.0);
        assert_eq!(frame.mono(), 0.4);
        frame.clamp();
        assert_eq!(frame, AudioFrame::from_stereo(1.0, -0.8));
    }
}
