//! Playback position bookkeeping
//!
//! Position is anchored: while playing it is
//! `offset + (now - anchor) × rate`, and every rate change re-anchors at the
//! moment of the change so earlier time is never credited at the new rate.
//! All positions are in track seconds.

/// Anchor triple plus a playing flag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    /// Engine clock time at which playback of `offset_seconds` began
    anchor_clock_time: f64,
    /// Track position at the anchor (or the frozen position while paused)
    offset_seconds: f64,
    /// Track seconds per clock second since the anchor
    rate_at_anchor: f64,
    playing: bool,
}

impl Default for PlaybackPosition {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackPosition {
    pub fn new() -> Self {
        Self {
            anchor_clock_time: 0.0,
            offset_seconds: 0.0,
            rate_at_anchor: 1.0,
            playing: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn offset_seconds(&self) -> f64 {
        self.offset_seconds
    }

    pub fn rate(&self) -> f64 {
        self.rate_at_anchor
    }

    /// Unclamped position; may run past the end of the track
    pub fn raw(&self, now: f64) -> f64 {
        if self.playing {
            self.offset_seconds + (now - self.anchor_clock_time).max(0.0) * self.rate_at_anchor
        } else {
            self.offset_seconds
        }
    }

    /// Position clamped into `[0, duration]`
    pub fn current(&self, now: f64, duration: f64) -> f64 {
        self.raw(now).clamp(0.0, duration.max(0.0))
    }

    /// Whether a running transport has reached the end of the track
    pub fn has_reached_end(&self, now: f64, duration: f64) -> bool {
        self.playing && self.raw(now) >= duration
    }

    /// Begin playing `offset` at clock time `now`
    pub fn start(&mut self, now: f64, offset: f64, rate: f64) {
        self.anchor_clock_time = now;
        self.offset_seconds = offset.max(0.0);
        self.rate_at_anchor = rate;
        self.playing = true;
    }

    /// Apply a new rate from `now` on
    pub fn reanchor(&mut self, now: f64, rate: f64, duration: f64) {
        if self.playing {
            self.offset_seconds = self.current(now, duration);
            self.anchor_clock_time = now;
        }
        self.rate_at_anchor = rate;
    }

    /// Stop advancing and return the frozen position
    pub fn freeze(&mut self, now: f64, duration: f64) -> f64 {
        self.offset_seconds = self.current(now, duration);
        self.playing = false;
        self.offset_seconds
    }

    /// Stop advancing at an externally measured position
    pub fn freeze_at(&mut self, offset: f64, duration: f64) {
        self.offset_seconds = offset.clamp(0.0, duration.max(0.0));
        self.playing = false;
    }

    /// Back to the start, not playing
    pub fn reset(&mut self) {
        self.offset_seconds = 0.0;
        self.playing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advances_at_rate() {
        let mut pos = PlaybackPosition::new();
        pos.start(10.0, 2.0, 0.5);
        assert!((pos.current(14.0, 100.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_reanchor_credits_each_interval_at_its_own_rate() {
        let mut pos = PlaybackPosition::new();
        pos.start(0.0, 0.0, 1.0);
        pos.reanchor(4.0, 0.5, 100.0);
        // 4s at 1.0 then 4s at 0.5
        assert!((pos.current(8.0, 100.0) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_to_duration() {
        let mut pos = PlaybackPosition::new();
        pos.start(0.0, 9.0, 2.0);
        assert_eq!(pos.current(5.0, 10.0), 10.0);
        assert!(pos.has_reached_end(5.0, 10.0));
        assert!(!pos.has_reached_end(0.25, 10.0));
    }

    #[test]
    fn test_freeze_holds_position() {
        let mut pos = PlaybackPosition::new();
        pos.start(0.0, 1.0, 1.0);
        assert_eq!(pos.freeze(2.0, 10.0), 3.0);
        assert_eq!(pos.current(50.0, 10.0), 3.0);
        assert!(!pos.has_reached_end(50.0, 3.0));
    }

    #[test]
    fn test_reset() {
        let mut pos = PlaybackPosition::new();
        pos.start(0.0, 4.0, 1.0);
        pos.reset();
        assert!(!pos.is_playing());
        assert_eq!(pos.current(10.0, 10.0), 0.0);
    }
}
