//! Audio outputs
//!
//! An [`AudioOutput`] is the sink end of the playback graph plus the clock
//! that pulls samples through it. Suspending and resuming the clock is
//! asynchronous: both return a [`Completion`] that resolves once the output
//! has actually changed state.
//!
//! Two outputs are provided:
//! - [`RodioOutput`] plays through the default device on a dedicated thread.
//! - [`ManualOutput`] renders only when asked to, for offline rendering and tests.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use rodio::{OutputStreamBuilder, Sink, Source};

use crate::config::output::COMMAND_TIMEOUT_SECS;
use crate::error::{PlayerError, Result};

use super::nodes::GraphSource;

type Outcome = std::result::Result<(), String>;

/// Create a linked completer/completion pair
pub fn completion() -> (Completer, Completion) {
    let (tx, rx) = bounded(1);
    (Completer { tx }, Completion { rx })
}

/// Resolving side of a [`Completion`]. Dropping it unresolved fails the completion.
pub struct Completer {
    tx: Sender<Outcome>,
}

impl Completer {
    pub fn complete(self, outcome: Outcome) {
        let _ = self.tx.send(outcome);
    }
}

/// One-shot notification that an output transition finished
pub struct Completion {
    rx: Receiver<Outcome>,
}

impl Completion {
    /// A completion that has already succeeded
    pub fn resolved() -> Self {
        let (done, completion) = completion();
        done.complete(Ok(()));
        completion
    }

    /// A completion that has already failed
    pub fn failed(message: impl Into<String>) -> Self {
        let (done, completion) = completion();
        done.complete(Err(message.into()));
        completion
    }

    /// Non-blocking check. `None` while still pending.
    pub fn poll(&self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome.map_err(PlayerError::Audio)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// Block until resolved. A late answer still counts; a dropped completer fails.
    pub fn wait(self) -> Result<()> {
        let timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
        let mut waited = 0;
        loop {
            match self.rx.recv_timeout(timeout) {
                Ok(outcome) => return outcome.map_err(PlayerError::Audio),
                Err(RecvTimeoutError::Timeout) => {
                    waited += COMMAND_TIMEOUT_SECS;
                    warn!("Audio output has not answered after {}s, still waiting", waited);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(abandoned()),
            }
        }
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<()> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome.map_err(PlayerError::Audio),
            Err(RecvTimeoutError::Timeout) => Err(PlayerError::Audio(
                "Timed out waiting for audio output".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(abandoned()),
        }
    }
}

fn abandoned() -> PlayerError {
    PlayerError::Audio("Audio output dropped the request".to_string())
}

/// Sink and clock for a playback graph
pub trait AudioOutput: Send {
    /// Connect a graph. Replaces any graph already attached.
    fn attach(&mut self, source: GraphSource) -> Result<()>;

    /// Disconnect the attached graph, if any
    fn detach(&mut self);

    /// Stop pulling samples
    fn suspend(&mut self) -> Completion;

    /// Start pulling samples again
    fn resume(&mut self) -> Completion;

    /// Release the device. Called once when the owning manager closes.
    fn shutdown(&mut self) {}
}

enum OutputCommand {
    Attach(GraphSource),
    Detach,
    Suspend(Completer),
    Resume(Completer),
    Shutdown,
}

/// Default-device output backed by rodio.
///
/// The device stream lives on its own thread (cpal streams may be `!Send`);
/// each attached graph gets a fresh `Sink` on the stream's mixer.
pub struct RodioOutput {
    cmd_tx: Sender<OutputCommand>,
    thread: Option<JoinHandle<()>>,
}

impl RodioOutput {
    /// Open the default output device.
    ///
    /// Blocks until the device stream is initialized (or fails).
    pub fn open_default() -> Result<Self> {
        let (cmd_tx, cmd_rx) = bounded::<OutputCommand>(16);
        let (init_tx, init_rx) = bounded::<Outcome>(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || Self::run(cmd_rx, init_tx))
            .map_err(|e| PlayerError::Audio(format!("Failed to spawn audio thread: {}", e)))?;

        let init_result = init_rx
            .recv()
            .map_err(|_| PlayerError::Audio("Audio thread terminated during init".to_string()))?;
        init_result.map_err(PlayerError::Audio)?;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    fn send(&self, cmd: OutputCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| PlayerError::Audio("Audio thread is not running".to_string()))
    }

    fn request(&self, make: impl FnOnce(Completer) -> OutputCommand) -> Completion {
        let (done, completion) = completion();
        match self.send(make(done)) {
            Ok(()) => completion,
            Err(e) => Completion::failed(e.to_string()),
        }
    }

    fn shutdown_inner(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// The output's main loop, running on the dedicated thread
    fn run(cmd_rx: Receiver<OutputCommand>, init_tx: Sender<Outcome>) {
        let mut stream = match OutputStreamBuilder::open_default_stream() {
            Ok(s) => s,
            Err(e) => {
                let _ = init_tx.send(Err(format!("Failed to open audio output: {}", e)));
                return;
            }
        };
        stream.log_on_drop(false);
        info!("Audio output opened");

        // `stream` is declared before `sink` so the sink is dropped first
        let mut sink: Option<Sink> = None;
        let mut suspended = false;

        let _ = init_tx.send(Ok(()));

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                OutputCommand::Attach(source) => {
                    drop(sink.take());
                    let next = Sink::connect_new(stream.mixer());
                    if suspended {
                        next.pause();
                    }
                    next.append(source);
                    sink = Some(next);
                    debug!("Graph attached (suspended: {})", suspended);
                }
                OutputCommand::Detach => {
                    if sink.take().is_some() {
                        debug!("Graph detached");
                    }
                }
                OutputCommand::Suspend(done) => {
                    if let Some(ref s) = sink {
                        s.pause();
                    }
                    suspended = true;
                    done.complete(Ok(()));
                }
                OutputCommand::Resume(done) => {
                    if let Some(ref s) = sink {
                        s.play();
                    }
                    suspended = false;
                    done.complete(Ok(()));
                }
                OutputCommand::Shutdown => break,
            }
        }

        drop(sink);
        info!("Audio output closed");
    }
}

impl AudioOutput for RodioOutput {
    fn attach(&mut self, source: GraphSource) -> Result<()> {
        self.send(OutputCommand::Attach(source))
    }

    fn detach(&mut self) {
        if let Err(e) = self.send(OutputCommand::Detach) {
            warn!("Detach failed: {}", e);
        }
    }

    fn suspend(&mut self) -> Completion {
        self.request(OutputCommand::Suspend)
    }

    fn resume(&mut self) -> Completion {
        self.request(OutputCommand::Resume)
    }

    fn shutdown(&mut self) {
        self.shutdown_inner();
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClockChange {
    Suspend,
    Resume,
}

#[derive(Default)]
struct ManualState {
    source: Option<GraphSource>,
    suspended: bool,
    hold: bool,
    held: Vec<(ClockChange, Completer)>,
    fail_next: Option<String>,
    attach_count: usize,
    shut_down: bool,
}

impl ManualState {
    fn change(&mut self, change: ClockChange) -> Completion {
        if self.shut_down {
            return Completion::failed("Output is shut down");
        }
        if let Some(message) = self.fail_next.take() {
            return Completion::failed(message);
        }
        let (done, completion) = completion();
        if self.hold {
            self.held.push((change, done));
        } else {
            self.apply(change);
            done.complete(Ok(()));
        }
        completion
    }

    fn apply(&mut self, change: ClockChange) {
        self.suspended = change == ClockChange::Suspend;
    }
}

/// Output whose clock only advances when [`ManualOutput::render`] is called.
///
/// Clones share the same state, so one clone can be handed to a manager while
/// another drives rendering.
#[derive(Clone, Default)]
pub struct ManualOutput {
    state: Arc<Mutex<ManualState>>,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A boxed clone, ready to give to a manager
    pub fn boxed(&self) -> Box<dyn AudioOutput> {
        Box::new(self.clone())
    }

    /// Pull up to `frames` frames through the attached graph.
    ///
    /// Returns the interleaved samples produced; empty while suspended, with
    /// nothing attached, or once the graph has run out.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        if state.suspended {
            return Vec::new();
        }
        let Some(source) = state.source.as_mut() else {
            return Vec::new();
        };
        let channels = source.channels().max(1) as usize;
        source.by_ref().take(frames * channels).collect()
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().map(|s| s.suspended).unwrap_or(false)
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().map(|s| s.source.is_some()).unwrap_or(false)
    }

    /// Number of graphs attached so far
    pub fn attach_count(&self) -> usize {
        self.state.lock().map(|s| s.attach_count).unwrap_or(0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().map(|s| s.shut_down).unwrap_or(false)
    }

    /// Queue clock changes instead of applying them
    pub fn hold_transitions(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.hold = true;
        }
    }

    /// Apply every queued clock change in order and stop queueing
    pub fn release_transitions(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.hold = false;
            for (change, done) in std::mem::take(&mut state.held) {
                state.apply(change);
                done.complete(Ok(()));
            }
        }
    }

    /// Make the next suspend or resume fail with `message`
    pub fn fail_next_transition(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(message.to_string());
        }
    }
}

impl AudioOutput for ManualOutput {
    fn attach(&mut self, source: GraphSource) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| PlayerError::Audio("Output state poisoned".to_string()))?;
        if state.shut_down {
            return Err(PlayerError::Audio("Output is shut down".to_string()));
        }
        state.source = Some(source);
        state.attach_count += 1;
        Ok(())
    }

    fn detach(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.source = None;
        }
    }

    fn suspend(&mut self) -> Completion {
        match self.state.lock() {
            Ok(mut state) => state.change(ClockChange::Suspend),
            Err(_) => Completion::failed("Output state poisoned"),
        }
    }

    fn resume(&mut self) -> Completion {
        match self.state.lock() {
            Ok(mut state) => state.change(ClockChange::Resume),
            Err(_) => Completion::failed("Output state poisoned"),
        }
    }

    fn shutdown(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.source = None;
            state.shut_down = true;
            // unblock anyone still waiting on a held change
            for (_, done) in state.held.drain(..) {
                done.complete(Err("Output is shut down".to_string()));
            }
        }
    }
}
