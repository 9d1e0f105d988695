//! Capture trait definitions
//!
//! Platform-agnostic interface to a microphone encoder. A started capture
//! delivers encoded chunks over a channel at a fixed cadence; stopping it
//! flushes the last chunk and closes the channel.

use crate::config::CaptureConstraints;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    MicrophoneAccessDenied(String),

    #[error("Audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported encoding: {0}")]
    UnsupportedMimeType(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Parameters for starting a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    /// Encoding negotiated with [`choose_mime_type`]
    pub mime_type: String,
    /// Chunk flush cadence
    pub timeslice: Duration,
    pub constraints: CaptureConstraints,
}

/// Something the encoder reports while running
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// An encoded chunk
    Data(Vec<u8>),
    /// The encoder hit an error; the capture is no longer trustworthy
    Error(String),
}

/// Handle used to end a running capture
pub trait CaptureControl: Send {
    /// Stop encoding; the event channel closes after the final chunk
    fn stop(&mut self);

    /// Release the input device
    fn release(&mut self);
}

/// A running capture
pub struct ActiveCapture {
    /// Encoding actually produced by the device
    pub mime_type: String,
    pub events: mpsc::UnboundedReceiver<CaptureEvent>,
    pub control: Box<dyn CaptureControl>,
}

/// Media capture capability of the host platform
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Whether the device can encode to `mime_type`
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Acquire the microphone and start encoding
    async fn start(&self, request: CaptureRequest) -> CaptureResult<ActiveCapture>;
}

/// Pick the first supported encoding, or `fallback`
pub fn choose_mime_type(
    capture: &dyn AudioCapture,
    preferences: &[String],
    fallback: &str,
) -> String {
    match preferences
        .iter()
        .find(|mime| capture.is_type_supported(mime.as_str()))
    {
        Some(mime) => {
            tracing::debug!("Using MIME type: {}", mime);
            mime.clone()
        }
        None => {
            tracing::warn!("No preferred MIME type supported, using {}", fallback);
            fallback.to_string()
        }
    }
}

/// File extension for an audio MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let base = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match base.as_str() {
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        _ => "webm",
    }
}

/// MIME type for an audio file extension
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "webm" => Some("audio/webm"),
        "m4a" | "mp4" => Some("audio/mp4"),
        "mp3" => Some("audio/mpeg"),
        "ogg" | "opus" => Some("audio/ogg"),
        "wav" => Some("audio/wav"),
        _ => None,
    }
}
