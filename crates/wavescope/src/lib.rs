//! Wavescope: audio playback and visualization engine
//!
//! Loads a single encoded audio asset, plays it through a
//! source → gain → analyser → output graph, and samples waveform and
//! spectrum data once per display frame for a presentation layer.
//!
//! ## Quick start
//!
//! ```no_run
//! use wavescope::audio::{AssetSource, PlaybackManager};
//!
//! let mut player = PlaybackManager::open_default()?;
//! player.load(&AssetSource::parse("http://localhost:3000/api/audio"))?;
//! player.play();
//! # Ok::<(), wavescope::error::PlayerError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod visual;
