//! Error types and handling
//!
//! Common error types used across the application, and their frontend shape.

use crate::capture::CaptureError;
use crate::migration::MigrationError;
use crate::recorder::RecordingError;
use crate::storage::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Stable code the frontend can switch on
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Recording(error) => match error {
                RecordingError::MicrophoneAccessDenied(_) => "MICROPHONE_ACCESS_DENIED",
                RecordingError::RecordingInProgress => "RECORDING_IN_PROGRESS",
                RecordingError::NotRecording => "NOT_RECORDING",
                RecordingError::EmptyCapture => "EMPTY_CAPTURE",
                RecordingError::CaptureFailed(_) => "CAPTURE_FAILED",
                RecordingError::NotFound(_) => "NOT_FOUND",
                RecordingError::NoAudio(_) => "NO_AUDIO",
                RecordingError::Store(_) => "STORAGE_ERROR",
                RecordingError::Io(_) => "IO_ERROR",
            },
            AppError::Capture(CaptureError::MicrophoneAccessDenied(_)) => "MICROPHONE_ACCESS_DENIED",
            AppError::Capture(_) => "CAPTURE_FAILED",
            AppError::Store(_) => "STORAGE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error response for frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl From<RecordingError> for ErrorResponse {
    fn from(error: RecordingError) -> Self {
        AppError::from(error).into()
    }
}

impl From<MigrationError> for ErrorResponse {
    fn from(error: MigrationError) -> Self {
        AppError::from(error).into()
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let response = ErrorResponse::from(RecordingError::RecordingInProgress);
        assert_eq!(response.code, "RECORDING_IN_PROGRESS");
        assert_eq!(response.message, "Recording already in progress");

        let response = ErrorResponse::from(RecordingError::MicrophoneAccessDenied(
            "Permission denied".to_string(),
        ));
        assert_eq!(response.code, "MICROPHONE_ACCESS_DENIED");

        let response: ErrorResponse =
            AppError::from(StoreError::TransactionFailed("quota".to_string())).into();
        assert_eq!(response.code, "STORAGE_ERROR");
        assert!(response.message.contains("quota"));
    }

    #[test]
    fn test_nested_store_error_keeps_code() {
        let error = RecordingError::Store(StoreError::Backend("down".to_string()));
        assert_eq!(AppError::from(error).code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_serializes_for_frontend() {
        let response = ErrorResponse::from(RecordingError::NotFound("recording_1_a".to_string()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Recording not found: recording_1_a");
    }
}
