//! Audio subsystem
//!
//! Loading and decoding, the playback graph and its nodes, outputs, and the
//! manager that ties them together.
//!

pub mod analyser;
pub mod buffer;
pub mod events;
pub mod graph;
pub mod loader;
pub mod manager;
pub mod nodes;
pub mod output;
pub mod types;

pub use analyser::{AnalyserHandle, AnalyserOptions};
pub use buffer::DecodedAudioBuffer;
pub use events::EventBus;
pub use graph::PlaybackGraph;
pub use loader::{decode_asset, AudioLoader};
pub use manager::PlaybackManager;
pub use nodes::GraphSource;
pub use output::{AudioOutput, Completion, ManualOutput, RodioOutput};
pub use types::{
    AssetSource, EncodedAudioAsset, FrequencySnapshot, PlaybackState, PlayerEvent, VolumeLevel,
};
