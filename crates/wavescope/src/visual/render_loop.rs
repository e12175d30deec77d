//! Render loop driver
//!
//! A cooperative per-frame task pumped by the presentation thread. Each due
//! frame samples the waveform and spectrum from a [`FrameSource`] and hands
//! the result to a [`FramePresenter`]. The loop is restarted when the
//! playback key changes; restarting always cancels the previous token first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::trace;

use crate::audio::buffer::DecodedAudioBuffer;
use crate::audio::manager::PlaybackManager;
use crate::audio::types::{FrequencySnapshot, PlaybackState};
use crate::config::render::{DEFAULT_WAVEFORM_HEIGHT, DEFAULT_WAVEFORM_WIDTH, FRAME_INTERVAL_MS};

use super::spectrum::sample_spectrum;
use super::waveform::{WaveformPoint, WaveformPoints};

/// Shared cancellation flag. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inputs whose change restarts the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopKey {
    pub playing: bool,
    pub reset_count: u64,
}

impl LoopKey {
    pub fn of(player: &PlaybackManager) -> Self {
        Self {
            playing: player.state() == PlaybackState::Playing,
            reset_count: player.reset_count(),
        }
    }
}

/// Everything the presentation needs to draw one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameData {
    pub played: Vec<WaveformPoint>,
    pub remaining: Vec<WaveformPoint>,
    pub current_time: f64,
    pub duration: f64,
    pub spectrum: Option<FrequencySnapshot>,
}

/// Where frame data comes from
pub trait FrameSource {
    fn waveform_buffer(&self) -> Option<Arc<DecodedAudioBuffer>>;
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    /// `None` when there is nothing to analyse
    fn spectrum(&self) -> Option<FrequencySnapshot>;
}

/// Where frame data goes
pub trait FramePresenter {
    fn present(&mut self, frame: &FrameData);
}

impl FrameSource for PlaybackManager {
    fn waveform_buffer(&self) -> Option<Arc<DecodedAudioBuffer>> {
        self.buffer().cloned()
    }

    fn current_time(&self) -> f64 {
        PlaybackManager::current_time(self)
    }

    fn duration(&self) -> f64 {
        PlaybackManager::duration(self)
    }

    fn spectrum(&self) -> Option<FrequencySnapshot> {
        self.analyser().map(sample_spectrum)
    }
}

pub struct RenderLoop {
    token: Option<CancellationToken>,
    key: Option<LoopKey>,
    interval: Duration,
    next_frame: Option<Instant>,
    width: usize,
    height: f32,
    outline: Option<(Arc<DecodedAudioBuffer>, WaveformPoints)>,
    frames: u64,
}

impl Default for RenderLoop {
    fn default() -> Self {
        Self::new(DEFAULT_WAVEFORM_WIDTH, DEFAULT_WAVEFORM_HEIGHT)
    }
}

impl RenderLoop {
    /// A stopped loop drawing onto a `width` x `height` canvas
    pub fn new(width: usize, height: f32) -> Self {
        Self {
            token: None,
            key: None,
            interval: Duration::from_millis(FRAME_INTERVAL_MS),
            next_frame: None,
            width,
            height,
            outline: None,
            frames: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Resize the canvas. The waveform outline is recomputed on the next frame.
    pub fn set_canvas(&mut self, width: usize, height: f32) {
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.outline = None;
        }
    }

    /// Cancel the running task (if any) and start a new one
    pub fn restart(&mut self) -> CancellationToken {
        self.cancel();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        self.next_frame = None;
        trace!("Render loop restarted");
        token
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    /// Restart when `key` differs from the last one seen. Returns whether it did.
    pub fn sync(&mut self, key: LoopKey) -> bool {
        if self.key == Some(key) && self.is_running() {
            return false;
        }
        self.key = Some(key);
        self.restart();
        true
    }

    pub fn is_running(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Token of the running task, for a view that cancels on teardown
    pub fn token(&self) -> Option<CancellationToken> {
        self.token.clone()
    }

    /// Frames presented since creation
    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Present a frame if one is due. Never blocks.
    pub fn pump<S, P>(&mut self, now: Instant, source: &S, presenter: &mut P) -> bool
    where
        S: FrameSource + ?Sized,
        P: FramePresenter + ?Sized,
    {
        if !self.is_running() {
            return false;
        }
        if self.next_frame.is_some_and(|due| now < due) {
            return false;
        }

        let frame = self.build_frame(source);
        presenter.present(&frame);
        self.frames += 1;
        self.next_frame = Some(now + self.interval);
        true
    }

    /// Time left until the next frame is due, zero if overdue or not scheduled
    pub fn time_to_next_frame(&self, now: Instant) -> Duration {
        self.next_frame
            .map_or(Duration::ZERO, |due| due.saturating_duration_since(now))
    }

    fn build_frame<S: FrameSource + ?Sized>(&mut self, source: &S) -> FrameData {
        let current_time = source.current_time();
        let duration = source.duration();
        let spectrum = source.spectrum();

        let Some(buffer) = source.waveform_buffer() else {
            self.outline = None;
            return FrameData {
                current_time,
                duration,
                spectrum,
                ..Default::default()
            };
        };

        let stale = self
            .outline
            .as_ref()
            .map_or(true, |(cached, _)| !Arc::ptr_eq(cached, &buffer));
        if stale {
            let points = WaveformPoints::compute(&buffer, self.width, self.height);
            self.outline = Some((buffer, points));
        }

        let split = match self.outline {
            Some((_, ref points)) => points.split(current_time, duration),
            None => Default::default(),
        };
        FrameData {
            played: split.played,
            remaining: split.remaining,
            current_time,
            duration,
            spectrum,
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}
