//! Visualization subsystem
//!
//! Per-frame sampling of the waveform and spectrum, and the loop that
//! delivers them to a presentation layer.
//!

pub mod render_loop;
pub mod spectrum;
pub mod waveform;

pub use render_loop::{
    CancellationToken, FrameData, FramePresenter, FrameSource, LoopKey, RenderLoop,
};
pub use spectrum::{bar_levels, sample_spectrum, sample_time_domain};
pub use waveform::{playhead_x, sample_waveform, WaveformPoint, WaveformPoints, WaveformSplit};
