//! Visualizer sampling
//!
//! Reduces analyser byte frequency data to a fixed number of bars in
//! `[MIN_BAR_HEIGHT, MAX_BAR_HEIGHT]`.

use crate::dsp::Analyser;
use slowverb_common::events::{MAX_BAR_HEIGHT, MIN_BAR_HEIGHT};

/// Bars for a silent or stopped visualizer
pub fn idle_bars(bar_count: usize) -> Vec<f32> {
    vec![MIN_BAR_HEIGHT; bar_count]
}

/// Group `bins` into `bar_count` bars.
///
/// Groups are contiguous and `ceil(bins / bar_count)` wide; the last group may
/// be short, and bars past the end of the data stay at the floor.
pub fn reduce(bins: &[u8], bar_count: usize) -> Vec<f32> {
    if bar_count == 0 {
        return Vec::new();
    }
    let group = bins.len().div_ceil(bar_count).max(1);

    (0..bar_count)
        .map(|bar| {
            let start = (bar * group).min(bins.len());
            let end = (start + group).min(bins.len());
            let slice = &bins[start..end];
            if slice.is_empty() {
                return MIN_BAR_HEIGHT;
            }
            let average = slice.iter().map(|&b| b as f32).sum::<f32>() / slice.len() as f32;
            (average / 255.0 * MAX_BAR_HEIGHT).clamp(MIN_BAR_HEIGHT, MAX_BAR_HEIGHT)
        })
        .collect()
}

/// Sample the analyser once.
///
/// Returns all floor values when not playing, without touching the analyser.
pub fn sample(analyser: &mut Analyser, bar_count: usize, playing: bool) -> Vec<f32> {
    if !playing {
        return idle_bars(bar_count);
    }
    let mut bins = vec![0u8; analyser.frequency_bin_count()];
    analyser.byte_frequency_data(&mut bins);
    reduce(&bins, bar_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::AudioFrame;
    use crate::dsp::AnalyserSettings;
    use slowverb_common::QualityTier;

    #[test]
    fn test_even_groups() {
        let bins = [255u8, 255, 0, 0, 51, 51, 102, 102];
        let bars = reduce(&bins, 4);
        for (bar, expected) in bars.iter().zip([100.0f32, 2.0, 20.0, 40.0]) {
            assert!((bar - expected).abs() < 1e-3, "{} vs {}", bar, expected);
        }
    }

    #[test]
    fn test_short_last_group() {
        // 5 bins into 2 bars: groups of 3 and 2
        let bins = [255u8, 0, 0, 255, 255];
        let bars = reduce(&bins, 2);
        assert!((bars[0] - 100.0 / 3.0).abs() < 1e-4);
        assert_eq!(bars[1], 100.0);
    }

    #[test]
    fn test_more_bars_than_bins() {
        let bars = reduce(&[255u8; 8], 16);
        assert_eq!(bars.len(), 16);
        assert!(bars[..8].iter().all(|&b| b == 100.0));
        assert!(bars[8..].iter().all(|&b| b == MIN_BAR_HEIGHT));
    }

    #[test]
    fn test_always_bar_count_in_range() {
        for tier in [QualityTier::Basic, QualityTier::Medium, QualityTier::High] {
            let (mut analyser, tap) = Analyser::new(AnalyserSettings::for_tier(tier));
            let frames: Vec<AudioFrame> = (0..512)
                .map(|i| AudioFrame::from_mono(((i as f32) * 0.3).sin()))
                .collect();
            tap.record(&frames);

            for &count in &[1usize, 7, 16, 32, 100] {
                let bars = sample(&mut analyser, count, true);
                assert_eq!(bars.len(), count);
                assert!(bars
                    .iter()
                    .all(|&b| (MIN_BAR_HEIGHT..=MAX_BAR_HEIGHT).contains(&b)));
            }
        }
    }

    #[test]
    fn test_not_playing_is_all_floor() {
        let (mut analyser, tap) = Analyser::new(AnalyserSettings::for_tier(QualityTier::High));
        tap.record(&vec![AudioFrame::from_mono(0.9); 256]);
        assert_eq!(sample(&mut analyser, 32, false), vec![2.0; 32]);
    }
}
