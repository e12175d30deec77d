//! Decoded audio buffer
//!
//! Planar `f32` sample data produced by the loader. Immutable once built and
//! shared through `Arc` between the manager, the graph's source node and the
//! waveform sampler.

use crate::error::{PlayerError, Result};

/// Fully decoded multi-channel audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
    frames: usize,
}

impl DecodedAudioBuffer {
    /// Build from planar channel data. All channels must have the same length.
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(PlayerError::Decode("Buffer has no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(PlayerError::Decode("Sample rate is zero".to_string()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(PlayerError::Decode(
                "Channels have mismatched lengths".to_string(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
            frames,
        })
    }

    /// Build from interleaved samples (`frame0_ch0, frame0_ch1, ...`)
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Result<Self> {
        if channel_count == 0 {
            return Err(PlayerError::Decode("Buffer has no channels".to_string()));
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &sample) in frame.iter().enumerate() {
                channels[ch].push(sample);
            }
        }
        Self::from_planar(channels, sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Total duration in seconds (`frames / sample_rate`)
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Samples of one channel, `None` if out of range
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Sample at `frame` of channel `ch`; callers guarantee bounds
    pub(crate) fn sample(&self, ch: usize, frame: usize) -> f32 {
        self.channels[ch][frame]
    }
}
