//! Shared audio types
//!
//! Pure data types used across the audio subsystem.

use std::fmt;
use std::path::PathBuf;

use crate::config::volume::{DEFAULT_LEVEL, MAX_LEVEL, MIN_LEVEL};

/// Current playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "Idle"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
        }
    }
}

/// User-facing volume level, always within `MIN_LEVEL..=MAX_LEVEL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeLevel(u8);

impl VolumeLevel {
    /// Create a level, clamping out-of-range input
    pub fn new(level: i32) -> Self {
        Self(level.clamp(MIN_LEVEL as i32, MAX_LEVEL as i32) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Linear gain multiplier (`level / 10`)
    pub fn gain(self) -> f32 {
        self.0 as f32 / MAX_LEVEL as f32
    }

    /// Move by `delta` steps, saturating at the bounds
    pub fn step(self, delta: i32) -> Self {
        Self::new((self.0 as i32).saturating_add(delta))
    }
}

impl Default for VolumeLevel {
    fn default() -> Self {
        Self(DEFAULT_LEVEL)
    }
}

impl fmt::Display for VolumeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, MAX_LEVEL)
    }
}

/// Byte magnitudes for one analyser pull, one entry per frequency bin
pub type FrequencySnapshot = Vec<u8>;

/// Where an encoded asset comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    Http(String),
    File(PathBuf),
}

impl AssetSource {
    /// Interpret a user-supplied string: `http(s)://` is a URL, anything else a path
    pub fn parse(input: &str) -> Self {
        let lower = input.trim_start().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            AssetSource::Http(input.trim().to_string())
        } else {
            AssetSource::File(PathBuf::from(input))
        }
    }

    /// File extension of the URL path or file path, lowercased
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            AssetSource::Http(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                let path = path.split("//").nth(1).unwrap_or(path);
                path.split_once('/').map(|(_, p)| p)?.rsplit('/').next()?.to_string()
            }
            AssetSource::File(path) => path.file_name()?.to_str()?.to_string(),
        };
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetSource::Http(url) => write!(f, "{}", url),
            AssetSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Raw encoded bytes as fetched, before decoding
#[derive(Clone)]
pub struct EncodedAudioAsset {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
    pub origin: AssetSource,
}

impl EncodedAudioAsset {
    /// Format hint for the probe: container extension from the origin, else from the MIME type
    pub fn format_hint(&self) -> Option<String> {
        self.origin
            .extension()
            .or_else(|| self.mime_type.as_deref().and_then(mime_to_extension))
    }
}

impl fmt::Debug for EncodedAudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedAudioAsset")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Map an audio MIME type to the extension symphonia's probe understands
pub fn mime_to_extension(mime: &str) -> Option<String> {
    let essence = mime.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "audio/mpeg" | "audio/mpeg3" | "audio/mp3" | "audio/x-mpeg-3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "wav",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/ogg" | "application/ogg" | "audio/vorbis" => "ogg",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "mp4",
        "audio/aac" | "audio/aacp" => "aac",
        _ => return None,
    };
    Some(ext.to_string())
}

/// Events emitted by the playback manager
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A new buffer was decoded and primed
    Loaded {
        duration: f64,
        sample_rate: u32,
        channels: usize,
    },
    /// Playback started from the beginning
    Playing,
    /// Clock suspended
    Paused,
    /// Clock resumed
    Resumed,
    /// Graph rebuilt at position zero
    Reset,
    VolumeChanged(VolumeLevel),
    /// The source ran out of samples
    Ended,
    /// A transition failed on the output side
    Error(String),
}
