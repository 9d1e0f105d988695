//! Recorder errors

use crate::capture::CaptureError;
use crate::storage::StoreError;
use thiserror::Error;

/// Errors reported by the recording engine
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Microphone access denied: {0}")]
    MicrophoneAccessDenied(String),

    #[error("Recording already in progress")]
    RecordingInProgress,

    #[error("No active recording to stop")]
    NotRecording,

    #[error("No audio data captured")]
    EmptyCapture,

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Recording not found: {0}")]
    NotFound(String),

    #[error("Recording {0} has no audio")]
    NoAudio(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CaptureError> for RecordingError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::MicrophoneAccessDenied(msg) => RecordingError::MicrophoneAccessDenied(msg),
            other => RecordingError::CaptureFailed(other.to_string()),
        }
    }
}

pub type RecordingResult<T> = Result<T, RecordingError>;
