//! Configuration constants for the wavescope engine

/// Audio graph configuration
pub mod audio {
    /// Analyser transform size (yields `FFT_SIZE / 2` frequency bins)
    pub const FFT_SIZE: usize = 256;

    /// Analyser smoothing between successive pulls (0.0-1.0, higher = smoother)
    pub const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

    /// Magnitude mapped to byte value 0
    pub const MIN_DECIBELS: f32 = -100.0;

    /// Magnitude mapped to byte value 255
    pub const MAX_DECIBELS: f32 = -30.0;

    /// Frames per batch in which graph nodes publish position and analyser data
    pub const RENDER_QUANTUM: usize = 128;
}

/// Volume control configuration
pub mod volume {
    /// Lowest selectable level
    pub const MIN_LEVEL: u8 = 1;

    /// Highest selectable level
    pub const MAX_LEVEL: u8 = 10;

    /// Level applied before the user touches the controls
    pub const DEFAULT_LEVEL: u8 = 5;
}

/// Network-related configuration
pub mod network {
    /// User agent for HTTP requests
    pub const USER_AGENT: &str = concat!("Wavescope/", env!("CARGO_PKG_VERSION"));

    /// Connection timeout in seconds
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;

    /// Whole-request timeout in seconds (the asset is fetched in one piece)
    pub const READ_TIMEOUT_SECS: u64 = 60;
}

/// Render loop configuration
pub mod render {
    /// Target interval between presented frames (~60fps)
    pub const FRAME_INTERVAL_MS: u64 = 16;

    /// Default waveform width in pixels
    pub const DEFAULT_WAVEFORM_WIDTH: usize = 1400;

    /// Default waveform height in pixels
    pub const DEFAULT_WAVEFORM_HEIGHT: f32 = 400.0;
}

/// Output device configuration
pub mod output {
    /// Maximum time to wait for the output thread to acknowledge a command
    pub const COMMAND_TIMEOUT_SECS: u64 = 5;
}
