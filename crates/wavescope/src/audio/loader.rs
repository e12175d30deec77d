//! Audio source loader
//!
//! Fetches an encoded asset over HTTP (or from disk) and decodes it in full
//! with Symphonia into a [`DecodedAudioBuffer`].

use std::io::Cursor;
use std::time::Duration;

use log::{debug, info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecType, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::config::network::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT};
use crate::error::{PlayerError, Result};

use super::buffer::DecodedAudioBuffer;
use super::types::{AssetSource, EncodedAudioAsset};

/// Convert a symphonia codec type to a human-readable name
pub fn codec_type_to_name(codec: CodecType) -> String {
    use symphonia::core::codecs::*;
    match codec {
        CODEC_TYPE_AAC => "AAC".to_string(),
        CODEC_TYPE_FLAC => "FLAC".to_string(),
        CODEC_TYPE_MP3 => "MP3".to_string(),
        CODEC_TYPE_VORBIS => "Vorbis".to_string(),
        CODEC_TYPE_PCM_U8 => "PCM 8-bit".to_string(),
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM 16-bit".to_string(),
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM 24-bit".to_string(),
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM 32-bit".to_string(),
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM 32-bit Float".to_string(),
        CODEC_TYPE_PCM_F64LE | CODEC_TYPE_PCM_F64BE => "PCM 64-bit Float".to_string(),
        _ => "Audio".to_string(),
    }
}

/// Fetches and decodes audio assets
pub struct AudioLoader {
    client: reqwest::blocking::Client,
}

impl AudioLoader {
    /// Create a loader with the standard HTTP client configuration
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch then decode
    pub fn load(&self, source: &AssetSource) -> Result<DecodedAudioBuffer> {
        let asset = self.fetch(source)?;
        decode_asset(&asset)
    }

    /// Retrieve the encoded bytes without decoding them
    pub fn fetch(&self, source: &AssetSource) -> Result<EncodedAudioAsset> {
        match source {
            AssetSource::Http(url) => {
                let resp = self.client.get(url).send()?.error_for_status()?;
                let mime_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = resp.bytes()?.to_vec();
                info!(
                    "Fetched {} bytes from {} ({})",
                    bytes.len(),
                    url,
                    mime_type.as_deref().unwrap_or("no content type")
                );
                Ok(EncodedAudioAsset {
                    bytes,
                    mime_type,
                    origin: source.clone(),
                })
            }
            AssetSource::File(path) => {
                let bytes = std::fs::read(path)?;
                info!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(EncodedAudioAsset {
                    bytes,
                    mime_type: None,
                    origin: source.clone(),
                })
            }
        }
    }
}

/// Decode a complete encoded asset into planar samples.
///
/// Corrupt packets are skipped; a payload that yields no frames at all is a
/// decode error.
pub fn decode_asset(asset: &EncodedAudioAsset) -> Result<DecodedAudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(asset.bytes.clone())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = asset.format_hint() {
        hint.with_extension(&ext);
    }
    if let Some(ref mime) = asset.mime_type {
        hint.mime_type(mime);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PlayerError::Decode(format!("Probe error: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlayerError::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| PlayerError::Decode(format!("Decoder creation error: {}", e)))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut skipped_packets = 0u64;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                if interleaved.is_empty() {
                    return Err(PlayerError::Decode(format!("Read error: {}", e)));
                }
                warn!("Stopping decode early after read error: {}", e);
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = spec.channels.count();
                if !interleaved.is_empty() && count != channel_count {
                    return Err(PlayerError::Decode(format!(
                        "Channel count changed mid-stream ({} -> {})",
                        channel_count, count
                    )));
                }
                channel_count = count;
                sample_rate = spec.rate;

                let capacity = decoded.capacity();
                let needs_alloc = sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < capacity * count);
                if needs_alloc {
                    sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
                }
                if let Some(ref mut buf) = sample_buf {
                    buf.copy_interleaved_ref(decoded);
                    interleaved.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                skipped_packets += 1;
                debug!("Skipping corrupt packet: {}", e);
            }
            Err(e) => return Err(PlayerError::Decode(format!("Decoder error: {}", e))),
        }
    }

    if interleaved.is_empty() || channel_count == 0 {
        return Err(PlayerError::Decode("No audio frames decoded".to_string()));
    }

    let buffer = DecodedAudioBuffer::from_interleaved(&interleaved, channel_count, sample_rate)?;
    info!(
        "Decoded {} from {}: {} ch, {} Hz, {:.2}s{}",
        codec_type_to_name(codec_params.codec),
        asset.origin,
        buffer.channel_count(),
        buffer.sample_rate(),
        buffer.duration(),
        if skipped_packets > 0 {
            format!(", {} packets skipped", skipped_packets)
        } else {
            String::new()
        }
    );
    Ok(buffer)
}
