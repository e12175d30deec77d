//! Playback graph
//!
//! One-shot chain of source, gain and analyser bound to a shared decoded
//! buffer. A graph can be started once; replaying builds a new graph.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;

use crate::error::{PlayerError, Result};

use super::analyser::{AnalyserHandle, AnalyserOptions};
use super::buffer::DecodedAudioBuffer;
use super::nodes::{AnalyserNode, BufferSourceNode, GainNode, GraphSource};
use super::output::AudioOutput;

pub struct PlaybackGraph {
    /// Chain waiting to be attached; `None` once started
    source: Option<GraphSource>,
    position: Arc<AtomicU64>,
    ended: Arc<AtomicBool>,
    gain: Arc<AtomicU32>,
    analyser: AnalyserHandle,
    sample_rate: u32,
    duration: f64,
    end_reported: bool,
}

impl PlaybackGraph {
    /// Assemble source -> gain -> analyser for `buffer`
    pub fn build(buffer: Arc<DecodedAudioBuffer>, gain: f32, options: AnalyserOptions) -> Self {
        let position = Arc::new(AtomicU64::new(0));
        let ended = Arc::new(AtomicBool::new(false));
        let gain = Arc::new(AtomicU32::new(gain.to_bits()));
        let analyser = AnalyserHandle::new(options);
        let sample_rate = buffer.sample_rate();
        let duration = buffer.duration();

        let source = BufferSourceNode::new(buffer, position.clone(), ended.clone());
        let chain = AnalyserNode::new(GainNode::new(source, gain.clone()), analyser.clone());

        Self {
            source: Some(chain),
            position,
            ended,
            gain,
            analyser,
            sample_rate,
            duration,
            end_reported: false,
        }
    }

    /// Suspend the output clock and attach the chain to it.
    ///
    /// Fails if this graph has already been started.
    pub fn start(&mut self, output: &mut dyn AudioOutput) -> Result<()> {
        let source = self.source.take().ok_or_else(|| {
            PlayerError::Audio("Playback graph has already been started".to_string())
        })?;
        output.suspend().wait()?;
        output.attach(source)?;
        debug!("Graph started frozen at 0 ({:.2}s)", self.duration);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.source.is_none()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Frames pulled through the source so far
    pub fn frames_played(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Playback position in seconds, never past the buffer's end
    pub fn current_time(&self) -> f64 {
        let seconds = self.frames_played() as f64 / self.sample_rate as f64;
        seconds.min(self.duration)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// True exactly once, the first time it is called after the source ran out
    pub(crate) fn take_end(&mut self) -> bool {
        if self.end_reported || !self.has_ended() {
            return false;
        }
        self.end_reported = true;
        true
    }

    pub fn analyser(&self) -> &AnalyserHandle {
        &self.analyser
    }
}
