//! Playback graph nodes
//!
//! Each node is a `rodio::Source` wrapping the previous one:
//! `BufferSourceNode -> GainNode -> AnalyserNode`. State the manager needs to
//! observe (frame position, end of buffer, gain) lives in atomics shared with
//! the owning [`PlaybackGraph`](super::graph::PlaybackGraph).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rodio::Source;

use crate::config::audio::RENDER_QUANTUM;

use super::analyser::AnalyserHandle;
use super::buffer::DecodedAudioBuffer;

/// The assembled chain handed to an output
pub type GraphSource = AnalyserNode<GainNode<BufferSourceNode>>;

/// Plays a decoded buffer once from the start, interleaving its channels
pub struct BufferSourceNode {
    buffer: Arc<DecodedAudioBuffer>,
    frame: usize,
    channel: usize,
    position: Arc<AtomicU64>,
    ended: Arc<AtomicBool>,
}

impl BufferSourceNode {
    pub fn new(
        buffer: Arc<DecodedAudioBuffer>,
        position: Arc<AtomicU64>,
        ended: Arc<AtomicBool>,
    ) -> Self {
        position.store(0, Ordering::Relaxed);
        Self {
            buffer,
            frame: 0,
            channel: 0,
            position,
            ended,
        }
    }
}

impl Iterator for BufferSourceNode {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.frame >= self.buffer.frames() {
            self.ended.store(true, Ordering::Release);
            return None;
        }
        let sample = self.buffer.sample(self.channel, self.frame);
        self.channel += 1;
        if self.channel == self.buffer.channel_count() {
            self.channel = 0;
            self.frame += 1;
            self.position.store(self.frame as u64, Ordering::Release);
        }
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let channels = self.buffer.channel_count();
        let remaining = (self.buffer.frames() - self.frame.min(self.buffer.frames())) * channels
            - self.channel;
        (remaining, Some(remaining))
    }
}

impl Source for BufferSourceNode {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.buffer.channel_count() as u16
    }

    fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(self.buffer.duration()))
    }
}

/// Scales samples by a multiplier that can change while playing
pub struct GainNode<S> {
    inner: S,
    gain: Arc<AtomicU32>,
}

impl<S> GainNode<S>
where
    S: Source<Item = f32>,
{
    /// `gain` holds the multiplier as `f32` bits
    pub fn new(inner: S, gain: Arc<AtomicU32>) -> Self {
        Self { inner, gain }
    }
}

impl<S> Iterator for GainNode<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.inner.next()?;
        Some(sample * f32::from_bits(self.gain.load(Ordering::Relaxed)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for GainNode<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Pass-through stage that feeds a down-mixed copy of the signal to an analyser.
///
/// Samples are batched per render quantum before taking the analyser lock.
pub struct AnalyserNode<S> {
    inner: S,
    analyser: AnalyserHandle,
    channels: u16,
    channel: u16,
    frame_sum: f32,
    quantum: Vec<f32>,
}

impl<S> AnalyserNode<S>
where
    S: Source<Item = f32>,
{
    pub fn new(inner: S, analyser: AnalyserHandle) -> Self {
        let channels = inner.channels().max(1);
        Self {
            inner,
            analyser,
            channels,
            channel: 0,
            frame_sum: 0.0,
            quantum: Vec::with_capacity(RENDER_QUANTUM),
        }
    }

    fn flush(&mut self) {
        if !self.quantum.is_empty() {
            self.analyser.push(&self.quantum);
            self.quantum.clear();
        }
    }
}

impl<S> Iterator for AnalyserNode<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = match self.inner.next() {
            Some(s) => s,
            None => {
                self.flush();
                return None;
            }
        };

        self.frame_sum += sample;
        self.channel += 1;
        if self.channel == self.channels {
            self.quantum.push(self.frame_sum / self.channels as f32);
            self.channel = 0;
            self.frame_sum = 0.0;
            if self.quantum.len() >= RENDER_QUANTUM {
                self.flush();
            }
        }
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for AnalyserNode<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
