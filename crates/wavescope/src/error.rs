//! Error types for Wavescope
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("{}", friendly_fetch_error(.0))]
    Fetch(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

impl PlayerError {
    /// True when the asset could not be retrieved (network, HTTP status or file read)
    pub fn is_fetch(&self) -> bool {
        matches!(self, PlayerError::Fetch(_) | PlayerError::Io(_))
    }

    /// True when the payload was retrieved but is not decodable audio
    pub fn is_decode(&self) -> bool {
        matches!(self, PlayerError::Decode(_))
    }
}

/// Result type alias for Wavescope
pub type Result<T> = std::result::Result<T, PlayerError>;

fn friendly_fetch_error(e: &reqwest::Error) -> String {
    if let Some(status) = e.status() {
        return match e.url() {
            Some(url) => format!("Server returned HTTP {} for {}", status.as_u16(), url),
            None => format!("Server returned HTTP {}", status.as_u16()),
        };
    }
    if e.is_builder() {
        if let Some(url) = e.url() {
            return format!("Invalid URL: {url}");
        }
        return "Invalid URL".to_string();
    }
    if e.is_connect() {
        if let Some(url) = e.url() {
            return format!("Could not connect to {}", url.host_str().unwrap_or("server"));
        }
        return "Could not connect to server".to_string();
    }
    if e.is_timeout() {
        return "Connection timed out".to_string();
    }
    if e.is_body() || e.is_decode() {
        return "Invalid response from server".to_string();
    }
    format!("Network error: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = PlayerError::Decode("no audio track".to_string());
        assert_eq!(err.to_string(), "Decode error: no audio track");
        assert!(err.is_decode());
        assert!(!err.is_fetch());
    }

    #[test]
    fn io_error_counts_as_fetch() {
        let err = PlayerError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing.mp3",
        ));
        assert!(err.is_fetch());
        assert!(err.to_string().contains("missing.mp3"));
    }

    #[test]
    fn audio_error_is_neither_fetch_nor_decode() {
        let err = PlayerError::Audio("device gone".to_string());
        assert!(!err.is_fetch());
        assert!(!err.is_decode());
    }

    #[test]
    fn invalid_url_is_friendly() {
        let client = reqwest::blocking::Client::new();
        let err = client.get("not a url").send().unwrap_err();
        let err = PlayerError::from(err);
        assert!(err.is_fetch());
        assert!(err.to_string().starts_with("Invalid URL"));
    }
}
