//! Waveform sampler
//!
//! Reduces the first channel of a buffer to roughly one point per pixel
//! column and splits the points at the playhead.

use crate::audio::buffer::DecodedAudioBuffer;

/// One vertex of the waveform polyline, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformPoint {
    pub x: f32,
    pub y: f32,
}

/// Waveform points divided at the playhead
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformSplit {
    pub played: Vec<WaveformPoint>,
    pub remaining: Vec<WaveformPoint>,
}

impl WaveformSplit {
    pub fn len(&self) -> usize {
        self.played.len() + self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty() && self.remaining.is_empty()
    }

    /// All points in order
    pub fn points(&self) -> impl Iterator<Item = &WaveformPoint> {
        self.played.iter().chain(self.remaining.iter())
    }
}

/// Waveform outline for one buffer at one size, reusable across frames
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformPoints {
    points: Vec<WaveformPoint>,
    width: usize,
}

impl WaveformPoints {
    /// Pick every `ceil(frames / width)`-th sample of channel 0.
    ///
    /// Empty for a zero width or an empty buffer.
    pub fn compute(buffer: &DecodedAudioBuffer, width: usize, height: f32) -> Self {
        let Some(samples) = buffer.channel(0) else {
            return Self::default();
        };
        if width == 0 || samples.is_empty() {
            return Self::default();
        }

        let step = samples.len().div_ceil(width);
        let advance = width as f64 / (samples.len() as f64 / step as f64);
        let points = samples
            .iter()
            .step_by(step)
            .enumerate()
            .map(|(k, &s)| WaveformPoint {
                x: (k as f64 * advance) as f32,
                y: (1.0 + s) * height / 2.0,
            })
            .collect();

        Self { points, width }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn as_slice(&self) -> &[WaveformPoint] {
        &self.points
    }

    /// Index of the first point past the playhead
    pub fn split_index(&self, current_time: f64, duration: f64) -> usize {
        if duration <= 0.0 {
            return 0;
        }
        if current_time >= duration {
            return self.points.len();
        }
        let playhead = playhead_x(current_time, duration, self.width);
        self.points
            .iter()
            .position(|p| p.x > playhead)
            .unwrap_or(self.points.len())
    }

    /// Divide the points into played and remaining
    pub fn split(&self, current_time: f64, duration: f64) -> WaveformSplit {
        if duration <= 0.0 {
            return WaveformSplit::default();
        }
        let (played, remaining) = self.points.split_at(self.split_index(current_time, duration));
        WaveformSplit {
            played: played.to_vec(),
            remaining: remaining.to_vec(),
        }
    }
}

/// Playhead position in pixels for a canvas `width` wide
pub fn playhead_x(current_time: f64, duration: f64, width: usize) -> f32 {
    if duration <= 0.0 {
        return 0.0;
    }
    let fraction = (current_time / duration).clamp(0.0, 1.0);
    (fraction * width as f64) as f32
}

/// Sample the waveform of `buffer` and split it at `current_time`.
///
/// Zero width, zero frames or zero duration yield an empty split.
pub fn sample_waveform(
    buffer: &DecodedAudioBuffer,
    width: usize,
    height: f32,
    current_time: f64,
) -> WaveformSplit {
    WaveformPoints::compute(buffer, width, height).split(current_time, buffer.duration())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<f32>, rate: u32) -> DecodedAudioBuffer {
        DecodedAudioBuffer::from_planar(vec![samples], rate).unwrap()
    }

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| (i % 200) as f32 / 100.0 - 1.0).collect()
    }

    #[test]
    fn ten_seconds_at_1400_px_splits_in_the_middle() {
        let buffer = mono(vec![0.0; 441_000], 44100);
        let split = sample_waveform(&buffer, 1400, 400.0, 5.0);

        assert_eq!(split.len(), 1400);
        assert!(
            (699..=701).contains(&split.played.len()),
            "split at {}",
            split.played.len()
        );
    }

    #[test]
    fn point_count_matches_width_when_stride_divides() {
        for (frames, width) in [(1000, 100), (44100, 441), (800, 800), (1_000_000, 1000)] {
            let buffer = mono(vec![0.0; frames], 8000);
            let points = WaveformPoints::compute(&buffer, width, 100.0);
            assert_eq!(points.len(), width, "frames {} width {}", frames, width);
        }
    }

    #[test]
    fn point_count_never_exceeds_width() {
        for (frames, width) in [(1001, 100), (99, 100), (12345, 777), (3, 2), (1, 50)] {
            let buffer = mono(vec![0.0; frames], 8000);
            let points = WaveformPoints::compute(&buffer, width, 100.0);
            let step = frames.div_ceil(width);
            assert_eq!(points.len(), frames.div_ceil(step));
            assert!(points.len() <= width);
        }
    }

    #[test]
    fn partition_preserves_all_points_in_order() {
        let buffer = mono(ramp(50_000), 10_000);
        for t in [0.0, 0.3, 1.7, 2.5, 4.99, 5.0, 9.0] {
            let split = sample_waveform(&buffer, 625, 200.0, t);
            assert_eq!(split.len(), 625);
            let xs: Vec<f32> = split.points().map(|p| p.x).collect();
            assert!(xs.windows(2).all(|w| w[0] <= w[1]), "x not monotonic at t={}", t);
        }
    }

    #[test]
    fn played_grows_with_time() {
        let buffer = mono(ramp(50_000), 10_000);
        let points = WaveformPoints::compute(&buffer, 500, 100.0);
        let mut last = 0;
        for i in 0..=50 {
            let index = points.split_index(i as f64 * 0.1, buffer.duration());
            assert!(index >= last);
            last = index;
        }
        assert_eq!(last, 500);
    }

    #[test]
    fn at_or_past_end_everything_is_played() {
        let buffer = mono(ramp(10_000), 1000);
        for t in [10.0, 10.5, 1e9] {
            let split = sample_waveform(&buffer, 250, 100.0, t);
            assert!(split.remaining.is_empty());
            assert_eq!(split.played.len(), 250);
        }
    }

    #[test]
    fn at_start_only_origin_is_played() {
        let buffer = mono(ramp(10_000), 1000);
        let split = sample_waveform(&buffer, 250, 100.0, 0.0);
        assert_eq!(split.played.len(), 1);
        assert_eq!(split.played[0].x, 0.0);
    }

    #[test]
    fn y_maps_sample_range_onto_height() {
        let buffer = mono(vec![-1.0, 0.0, 1.0, 0.5], 4);
        let points = WaveformPoints::compute(&buffer, 4, 400.0);
        let ys: Vec<f32> = points.as_slice().iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![0.0, 200.0, 400.0, 300.0]);
    }

    #[test]
    fn stride_picks_samples_not_averages() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let buffer = mono(samples, 10);
        let points = WaveformPoints::compute(&buffer, 4, 2.0);
        // step = ceil(10 / 4) = 3 picks samples 0, 3, 6, 9
        let ys: Vec<f32> = points.as_slice().iter().map(|p| p.y).collect();
        assert_eq!(ys.len(), 4);
        for (y, expected) in ys.iter().zip([1.0, 1.3, 1.6, 1.9]) {
            assert!((y - expected).abs() < 1e-6, "{} vs {}", y, expected);
        }
    }

    #[test]
    fn x_advance_uses_fractional_column_width() {
        let buffer = mono(vec![0.0; 10], 10);
        let points = WaveformPoints::compute(&buffer, 4, 2.0);
        // advance = 4 / (10 / 3)
        let xs: Vec<f32> = points.as_slice().iter().map(|p| p.x).collect();
        for (k, x) in xs.iter().enumerate() {
            assert!((x - k as f32 * 1.2).abs() < 1e-5);
        }
    }

    #[test]
    fn only_first_channel_is_drawn() {
        let buffer =
            DecodedAudioBuffer::from_planar(vec![vec![1.0; 100], vec![-1.0; 100]], 100).unwrap();
        let split = sample_waveform(&buffer, 10, 10.0, 0.5);
        assert!(split.points().all(|p| p.y == 10.0));
    }

    #[test]
    fn degenerate_inputs_give_empty_split() {
        let buffer = mono(vec![0.0; 100], 100);
        assert!(sample_waveform(&buffer, 0, 100.0, 0.5).is_empty());

        let empty = mono(Vec::new(), 100);
        assert!(sample_waveform(&empty, 100, 100.0, 0.0).is_empty());
        assert!(WaveformPoints::compute(&empty, 100, 100.0).is_empty());

        let points = WaveformPoints::compute(&buffer, 10, 10.0);
        assert!(points.split(0.5, 0.0).is_empty());
    }

    #[test]
    fn playhead_is_clamped_to_canvas() {
        assert_eq!(playhead_x(5.0, 10.0, 1400), 700.0);
        assert_eq!(playhead_x(-1.0, 10.0, 1400), 0.0);
        assert_eq!(playhead_x(20.0, 10.0, 1400), 1400.0);
        assert_eq!(playhead_x(1.0, 0.0, 1400), 0.0);
    }
}
