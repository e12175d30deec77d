//! Playback manager
//!
//! Owns the decoded buffer, the current playback graph and the output, and
//! runs the `Idle -> Playing <-> Paused -> Idle` state machine.
//!
//! Pausing and resuming are asynchronous on the output side. The requested
//! transition is kept as pending until its completion resolves; `poll()`
//! applies it without blocking, while `settle()` and every state-mutating
//! call wait for it first, so transitions never interleave.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

use crate::error::{PlayerError, Result};

use super::analyser::{AnalyserHandle, AnalyserOptions};
use super::buffer::DecodedAudioBuffer;
use super::events::EventBus;
use super::graph::PlaybackGraph;
use super::loader::AudioLoader;
use super::output::{AudioOutput, Completion, RodioOutput};
use super::types::{AssetSource, PlaybackState, PlayerEvent, VolumeLevel};

/// Clock change requested from the output but not yet confirmed
struct PendingTransition {
    target: PlaybackState,
    event: PlayerEvent,
    completion: Completion,
}

pub struct PlaybackManager {
    output: Box<dyn AudioOutput>,
    loader: AudioLoader,
    buffer: Option<Arc<DecodedAudioBuffer>>,
    graph: Option<PlaybackGraph>,
    state: PlaybackState,
    volume: VolumeLevel,
    reset_count: u64,
    pending: Option<PendingTransition>,
    events: EventBus,
    analyser_options: AnalyserOptions,
    closed: bool,
}

impl PlaybackManager {
    /// Create a manager driving `output`
    pub fn new(output: Box<dyn AudioOutput>) -> Result<Self> {
        Ok(Self::with_loader(output, AudioLoader::new()?))
    }

    pub fn with_loader(output: Box<dyn AudioOutput>, loader: AudioLoader) -> Self {
        Self {
            output,
            loader,
            buffer: None,
            graph: None,
            state: PlaybackState::Idle,
            volume: VolumeLevel::default(),
            reset_count: 0,
            pending: None,
            events: EventBus::new(),
            analyser_options: AnalyserOptions::default(),
            closed: false,
        }
    }

    /// Create a manager playing through the default audio device
    pub fn open_default() -> Result<Self> {
        Self::new(Box::new(RodioOutput::open_default()?))
    }

    // --- Operations ---

    /// Fetch, decode and prime `source`. Only effective while idle.
    ///
    /// On any failure the manager is left as it was.
    pub fn load(&mut self, source: &AssetSource) -> Result<()> {
        self.settle();
        if self.state != PlaybackState::Idle {
            debug!("Ignoring load of {} while {}", source, self.state);
            return Ok(());
        }
        let buffer = self.loader.load(source)?;
        self.load_buffer(buffer)
    }

    /// Prime an already decoded buffer. Only effective while idle.
    pub fn load_buffer(&mut self, buffer: DecodedAudioBuffer) -> Result<()> {
        self.settle();
        if self.state != PlaybackState::Idle {
            debug!("Ignoring buffer load while {}", self.state);
            return Ok(());
        }
        let buffer = Arc::new(buffer);
        self.install_graph(buffer.clone())?;

        let event = PlayerEvent::Loaded {
            duration: buffer.duration(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channel_count(),
        };
        info!(
            "Loaded {:.2}s ({} ch, {} Hz)",
            buffer.duration(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        self.buffer = Some(buffer);
        self.events.emit(event);
        Ok(())
    }

    /// Start from the beginning on a fresh graph
    pub fn play(&mut self) {
        self.settle();
        if self.state != PlaybackState::Idle {
            debug!("Ignoring play while {}", self.state);
            return;
        }
        let Some(buffer) = self.buffer.clone() else {
            debug!("Ignoring play with nothing loaded");
            return;
        };
        if let Err(e) = self.install_graph(buffer) {
            self.report_failure("play", e);
            return;
        }
        if let Err(e) = self.output.resume().wait() {
            self.report_failure("play", e);
            return;
        }
        self.state = PlaybackState::Playing;
        info!("Playing");
        self.events.emit(PlayerEvent::Playing);
    }

    /// Request a suspend; the state becomes `Paused` once the output confirms
    pub fn pause(&mut self) {
        self.settle();
        if self.state != PlaybackState::Playing {
            debug!("Ignoring pause while {}", self.state);
            return;
        }
        let completion = self.output.suspend();
        self.begin_transition(PlaybackState::Paused, PlayerEvent::Paused, completion);
    }

    /// Request a resume; the state becomes `Playing` once the output confirms
    pub fn resume(&mut self) {
        self.settle();
        if self.state != PlaybackState::Paused {
            debug!("Ignoring resume while {}", self.state);
            return;
        }
        let completion = self.output.resume();
        self.begin_transition(PlaybackState::Playing, PlayerEvent::Resumed, completion);
    }

    /// Throw the graph away and rebuild it frozen at the start
    pub fn reset(&mut self) {
        self.settle();
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            debug!("Ignoring reset while {}", self.state);
            return;
        }
        let Some(buffer) = self.buffer.clone() else {
            debug!("Ignoring reset with nothing loaded");
            return;
        };
        if let Err(e) = self.install_graph(buffer) {
            self.report_failure("reset", e);
            return;
        }
        self.state = PlaybackState::Idle;
        self.reset_count += 1;
        info!("Reset (#{})", self.reset_count);
        self.events.emit(PlayerEvent::Reset);
    }

    /// Set the volume level, clamped to `1..=10`. Applies to the current graph
    /// immediately, or to the next one built.
    pub fn set_volume(&mut self, level: i32) {
        self.settle();
        self.volume = VolumeLevel::new(level);
        if let Some(ref graph) = self.graph {
            graph.set_gain(self.volume.gain());
        }
        debug!("Volume {}", self.volume);
        self.events.emit(PlayerEvent::VolumeChanged(self.volume));
    }

    /// Move the volume by `delta` levels
    pub fn step_volume(&mut self, delta: i32) {
        self.set_volume(self.volume.step(delta).get() as i32);
    }

    /// Apply a confirmed transition and report end of buffer. Never blocks.
    pub fn poll(&mut self) {
        if let Some(outcome) = self.pending.as_ref().and_then(|p| p.completion.poll()) {
            if let Some(pending) = self.pending.take() {
                self.finish_transition(pending.target, pending.event, outcome);
            }
        }
        if let Some(ref mut graph) = self.graph {
            if graph.take_end() {
                info!("Reached end of buffer");
                self.events.emit(PlayerEvent::Ended);
            }
        }
    }

    /// Block until any pending transition has been applied
    pub fn settle(&mut self) {
        if let Some(pending) = self.pending.take() {
            let outcome = pending.completion.wait();
            self.finish_transition(pending.target, pending.event, outcome);
        }
    }

    /// Detach the graph and shut the output down
    pub fn close(mut self) {
        self.teardown();
    }

    // --- Queries ---

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn volume(&self) -> VolumeLevel {
        self.volume
    }

    /// Gain multiplier for the current level
    pub fn gain(&self) -> f32 {
        self.volume.gain()
    }

    /// Seconds played on the current graph; 0 with no graph
    pub fn current_time(&self) -> f64 {
        self.graph.as_ref().map_or(0.0, PlaybackGraph::current_time)
    }

    /// Duration of the loaded buffer; 0 with nothing loaded
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration())
    }

    pub fn buffer(&self) -> Option<&Arc<DecodedAudioBuffer>> {
        self.buffer.as_ref()
    }

    /// Analyser of the current graph
    pub fn analyser(&self) -> Option<&AnalyserHandle> {
        self.graph.as_ref().map(PlaybackGraph::analyser)
    }

    /// Number of resets performed so far
    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending.is_some()
    }

    /// Subscribe to player events
    pub fn events(&self) -> Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    // --- Internals ---

    /// Replace the current graph with a fresh one for `buffer`, started frozen at 0
    fn install_graph(&mut self, buffer: Arc<DecodedAudioBuffer>) -> Result<()> {
        if self.graph.take().is_some() {
            self.output.detach();
        }
        let mut graph = PlaybackGraph::build(buffer, self.volume.gain(), self.analyser_options);
        graph.start(self.output.as_mut())?;
        self.graph = Some(graph);
        Ok(())
    }

    fn begin_transition(&mut self, target: PlaybackState, event: PlayerEvent, completion: Completion) {
        self.pending = Some(PendingTransition {
            target,
            event,
            completion,
        });
        // outputs that answer synchronously take effect right away
        self.poll();
    }

    fn finish_transition(&mut self, target: PlaybackState, event: PlayerEvent, outcome: Result<()>) {
        match outcome {
            Ok(()) => {
                self.state = target;
                info!("{}", self.state);
                self.events.emit(event);
            }
            Err(e) => self.report_failure("transition", e),
        }
    }

    fn report_failure(&self, operation: &str, err: PlayerError) {
        warn!("{} failed: {}", operation, err);
        self.events.emit(PlayerEvent::Error(err.to_string()));
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending = None;
        if self.graph.take().is_some() {
            self.output.detach();
        }
        self.output.shutdown();
        debug!("Playback manager closed");
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loader::tests::make_wav;
    use crate::audio::output::ManualOutput;
    use crate::config::output::COMMAND_TIMEOUT_SECS;
    use std::io::Write;
    use std::thread;
    use std::time::Duration;

    const RATE: u32 = 44100;

    fn manager() -> (PlaybackManager, ManualOutput) {
        let output = ManualOutput::new();
        let player = PlaybackManager::new(output.boxed()).unwrap();
        (player, output)
    }

    fn tone(seconds: f64) -> DecodedAudioBuffer {
        let frames = (seconds * RATE as f64) as usize;
        let samples = (0..frames)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin() * 0.8)
            .collect();
        DecodedAudioBuffer::from_planar(vec![samples], RATE).unwrap()
    }

    fn constant(value: f32, frames: usize) -> DecodedAudioBuffer {
        DecodedAudioBuffer::from_planar(vec![vec![value; frames]], RATE).unwrap()
    }

    fn drain(rx: &Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
        rx.try_iter().collect()
    }

    fn playing(seconds: f64) -> (PlaybackManager, ManualOutput) {
        let (mut player, output) = manager();
        player.load_buffer(tone(seconds)).unwrap();
        player.play();
        assert_eq!(player.state(), PlaybackState::Playing);
        (player, output)
    }

    // --- Initial state ---

    #[test]
    fn new_manager_is_idle_and_empty() {
        let (player, output) = manager();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.volume().get(), 5);
        assert!((player.gain() - 0.5).abs() < f32::EPSILON);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.duration(), 0.0);
        assert!(player.buffer().is_none());
        assert!(player.analyser().is_none());
        assert!(!output.is_attached());
    }

    // --- load ---

    #[test]
    fn load_primes_a_frozen_graph() {
        let (mut player, output) = manager();
        let events = player.events();
        player.load_buffer(tone(2.0)).unwrap();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.current_time(), 0.0);
        assert!((player.duration() - 2.0).abs() < 1e-9);
        assert!(output.is_attached());
        assert!(output.is_suspended());
        assert!(output.render(1000).is_empty());
        assert_eq!(player.analyser().map(|a| a.frequency_bin_count()), Some(128));
        assert_eq!(
            drain(&events),
            vec![PlayerEvent::Loaded {
                duration: 2.0,
                sample_rate: RATE,
                channels: 1
            }]
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(&make_wav(8000, 2, &[1000; 16000])).unwrap();
        let (mut player, _output) = manager();

        player
            .load(&AssetSource::File(file.path().to_path_buf()))
            .unwrap();
        assert!((player.duration() - 1.0).abs() < 1e-9);
        assert_eq!(player.buffer().unwrap().channel_count(), 2);
    }

    #[test]
    fn failed_load_leaves_manager_untouched() {
        let (mut player, output) = manager();
        player.load_buffer(tone(1.0)).unwrap();
        let events = player.events();

        let err = player
            .load(&AssetSource::parse("/no/such/dir/audio.mp3"))
            .unwrap_err();
        assert!(err.is_fetch());
        assert!((player.duration() - 1.0).abs() < 1e-9);
        assert_eq!(output.attach_count(), 1);
        assert!(output.is_attached());
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn undecodable_file_is_decode_error() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"<html>not audio</html>").unwrap();
        let (mut player, _output) = manager();

        let err = player
            .load(&AssetSource::File(file.path().to_path_buf()))
            .unwrap_err();
        assert!(err.is_decode());
        assert!(player.buffer().is_none());
    }

    // --- play / current_time ---

    #[test]
    fn play_starts_clock_from_zero() {
        let (mut player, output) = manager();
        let events = player.events();
        player.load_buffer(tone(1.0)).unwrap();
        player.play();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(!output.is_suspended());
        assert_eq!(output.attach_count(), 2, "play builds a new graph");
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(drain(&events).last(), Some(&PlayerEvent::Playing));

        output.render(4410);
        assert!((player.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn current_time_increases_while_playing() {
        let (player, output) = playing(2.0);
        let mut last = player.current_time();
        for _ in 0..10 {
            output.render(512);
            let now = player.current_time();
            assert!(now > last, "{} should exceed {}", now, last);
            last = now;
        }
    }

    #[test]
    fn current_time_capped_at_duration() {
        let (player, output) = playing(0.5);
        output.render(RATE as usize);
        assert!((player.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn play_without_buffer_is_noop() {
        let (mut player, output) = manager();
        let events = player.events();
        player.play();
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(output.attach_count(), 0);
        assert!(drain(&events).is_empty());
    }

    // --- pause / resume ---

    #[test]
    fn pause_freezes_time() {
        let (mut player, output) = playing(2.0);
        output.render(1000);
        player.pause();

        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!player.has_pending_transition());
        let frozen = player.current_time();
        assert!(output.render(1000).is_empty());
        assert_eq!(player.current_time(), frozen);
    }

    #[test]
    fn resume_continues_from_pause_point() {
        let (mut player, output) = playing(2.0);
        output.render(RATE as usize / 2);
        player.pause();
        let events = player.events();
        player.resume();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(drain(&events), vec![PlayerEvent::Resumed]);
        output.render(RATE as usize / 4);
        assert!((player.current_time() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn pending_pause_waits_for_output() {
        let (mut player, output) = playing(2.0);
        output.hold_transitions();
        player.pause();

        assert!(player.has_pending_transition());
        assert_eq!(player.state(), PlaybackState::Playing);
        player.poll();
        assert_eq!(player.state(), PlaybackState::Playing);

        output.release_transitions();
        player.poll();
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(!player.has_pending_transition());
    }

    #[test]
    fn next_call_settles_pending_pause_first() {
        let (mut player, output) = playing(2.0);
        let events = player.events();
        output.hold_transitions();
        player.pause();

        let releaser = output.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            releaser.release_transitions();
        });

        // resume must observe Paused, not the stale Playing
        player.resume();
        handle.join().unwrap();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(
            drain(&events),
            vec![PlayerEvent::Paused, PlayerEvent::Resumed]
        );
    }

    #[test]
    fn late_confirmation_still_flips_state() {
        let (mut player, output) = playing(2.0);
        let events = player.events();
        output.hold_transitions();
        player.pause();

        let releaser = output.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(COMMAND_TIMEOUT_SECS * 1000 + 500));
            releaser.release_transitions();
        });

        player.resume();
        handle.join().unwrap();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(!output.is_suspended());
        assert_eq!(output.render(64).len(), 64);
        assert_eq!(
            drain(&events),
            vec![PlayerEvent::Paused, PlayerEvent::Resumed]
        );
    }

    #[test]
    fn failed_transition_keeps_state() {
        let (mut player, output) = playing(2.0);
        let events = player.events();
        output.fail_next_transition("device lost");
        player.pause();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!(!player.has_pending_transition());
        match drain(&events).as_slice() {
            [PlayerEvent::Error(msg)] => assert!(msg.contains("device lost")),
            other => panic!("unexpected events {:?}", other),
        }
    }

    // --- reset ---

    #[test]
    fn play_then_reset_returns_to_start() {
        let (mut player, output) = playing(2.0);
        output.render(RATE as usize);
        player.reset();

        assert_eq!(player.current_time(), 0.0);
        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.reset_count(), 1);
        assert!(output.is_suspended());
        assert!(output.render(100).is_empty());
    }

    #[test]
    fn reset_from_paused() {
        let (mut player, output) = playing(2.0);
        output.render(100);
        player.pause();
        let events = player.events();
        player.reset();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.current_time(), 0.0);
        assert_eq!(drain(&events), vec![PlayerEvent::Reset]);
    }

    #[test]
    fn play_after_reset_starts_over() {
        let (mut player, output) = playing(2.0);
        output.render(RATE as usize);
        player.reset();
        player.play();

        assert_eq!(player.state(), PlaybackState::Playing);
        output.render(441);
        assert!((player.current_time() - 0.01).abs() < 1e-9);
    }

    // --- No-op law ---

    #[test]
    fn invalid_operations_from_idle_are_noops() {
        let (mut player, output) = manager();
        player.load_buffer(tone(1.0)).unwrap();
        let events = player.events();
        let attached = output.attach_count();

        player.pause();
        player.resume();
        player.reset();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.reset_count(), 0);
        assert_eq!(output.attach_count(), attached);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn invalid_operations_from_playing_are_noops() {
        let (mut player, output) = playing(1.0);
        let events = player.events();
        let attached = output.attach_count();
        output.render(100);

        player.play();
        player.resume();
        player.load_buffer(tone(3.0)).unwrap();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!((player.duration() - 1.0).abs() < 1e-9);
        assert_eq!(output.attach_count(), attached);
        assert!(player.current_time() > 0.0);
        assert!(drain(&events).is_empty());
    }

    #[test]
    fn invalid_operations_from_paused_are_noops() {
        let (mut player, output) = playing(1.0);
        output.render(100);
        player.pause();
        let events = player.events();
        let time = player.current_time();

        player.play();
        player.pause();
        player.load_buffer(tone(3.0)).unwrap();

        assert_eq!(player.state(), PlaybackState::Paused);
        assert_eq!(player.current_time(), time);
        assert!(drain(&events).is_empty());
    }

    // --- Volume ---

    #[test]
    fn volume_clamps_at_bounds() {
        let (mut player, _output) = manager();
        player.set_volume(0);
        let low = player.volume();
        player.set_volume(1);
        assert_eq!(player.volume(), low);

        player.set_volume(15);
        let high = player.volume();
        player.set_volume(10);
        assert_eq!(player.volume(), high);

        player.set_volume(12);
        assert_eq!(player.volume().get(), 10);
        assert_eq!(player.gain(), 1.0);
    }

    #[test]
    fn volume_before_load_is_applied_to_new_graph() {
        let (mut player, output) = manager();
        player.set_volume(2);
        player.load_buffer(constant(1.0, 1000)).unwrap();
        player.play();

        let samples = output.render(10);
        assert!(samples.iter().all(|&s| (s - 0.2).abs() < 1e-6), "{:?}", samples);
    }

    #[test]
    fn volume_change_applies_immediately() {
        let (mut player, output) = manager();
        player.load_buffer(constant(1.0, 1000)).unwrap();
        player.play();
        assert!(output.render(1).iter().all(|&s| (s - 0.5).abs() < 1e-6));

        let events = player.events();
        player.step_volume(3);
        assert_eq!(player.volume().get(), 8);
        assert!(output.render(1).iter().all(|&s| (s - 0.8).abs() < 1e-6));
        assert_eq!(
            drain(&events),
            vec![PlayerEvent::VolumeChanged(VolumeLevel::new(8))]
        );
    }

    #[test]
    fn step_volume_saturates_on_huge_delta() {
        let (mut player, _output) = manager();
        player.step_volume(i32::MAX);
        assert_eq!(player.volume().get(), 10);
        player.step_volume(i32::MIN);
        assert_eq!(player.volume().get(), 1);
    }

    // --- End of buffer ---

    #[test]
    fn ended_is_emitted_once() {
        let (mut player, output) = playing(0.1);
        let events = player.events();
        player.poll();
        assert!(drain(&events).is_empty());

        output.render(RATE as usize);
        player.poll();
        player.poll();
        assert_eq!(drain(&events), vec![PlayerEvent::Ended]);
    }

    // --- Lifecycle ---

    #[test]
    fn close_shuts_output_down() {
        let (player, output) = playing(1.0);
        player.close();
        assert!(output.is_shut_down());
        assert!(!output.is_attached());
    }

    #[test]
    fn drop_shuts_output_down() {
        let output = ManualOutput::new();
        {
            let mut player = PlaybackManager::new(output.boxed()).unwrap();
            player.load_buffer(tone(0.5)).unwrap();
        }
        assert!(output.is_shut_down());
    }

    #[test]
    fn spectrum_available_while_playing() {
        let (player, output) = playing(1.0);
        output.render(4096);
        let analyser = player.analyser().unwrap();
        let mut bins = vec![0u8; analyser.frequency_bin_count()];
        for _ in 0..20 {
            analyser.get_byte_frequency_data(&mut bins);
        }
        assert!(bins.iter().any(|&b| b > 0));
    }
}
