//! Spectrum sampler
//!
//! Per-frame pulls from an analyser, plus reduction of the bins to a fixed
//! number of display bars.

use crate::audio::analyser::AnalyserHandle;
use crate::audio::types::FrequencySnapshot;

/// Current byte magnitudes, one per frequency bin
pub fn sample_spectrum(analyser: &AnalyserHandle) -> FrequencySnapshot {
    let mut bins = vec![0u8; analyser.frequency_bin_count()];
    analyser.get_byte_frequency_data(&mut bins);
    bins
}

/// Current waveform as bytes centred on 128, `fft_size` long
pub fn sample_time_domain(analyser: &AnalyserHandle) -> Vec<u8> {
    let mut samples = vec![0u8; analyser.fft_size()];
    analyser.get_byte_time_domain_data(&mut samples);
    samples
}

/// Collapse a snapshot into `bars` values in `0.0..=1.0`, taking the peak bin
/// of each group
pub fn bar_levels(snapshot: &[u8], bars: usize) -> Vec<f32> {
    if bars == 0 || snapshot.is_empty() {
        return Vec::new();
    }
    (0..bars)
        .map(|bar| {
            let start = bar * snapshot.len() / bars;
            let end = ((bar + 1) * snapshot.len() / bars).max(start + 1).min(snapshot.len());
            let peak = snapshot[start.min(snapshot.len() - 1)..end]
                .iter()
                .copied()
                .max()
                .unwrap_or(0);
            peak as f32 / 255.0
        })
        .collect()
}
