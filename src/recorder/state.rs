//! Recording state management
//!
//! Defines the recorder state machine and the recording data model.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Prefix of every recording id
pub const RECORDING_ID_PREFIX: &str = "recording_";

const ID_SUFFIX_LEN: usize = 8;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// No capture in progress
    #[default]
    Idle,
    /// Capturing audio
    Recording,
    /// Capture stopped, audio being persisted
    Finalizing,
}

/// Lifecycle status of a stored recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Processing,
    Completed,
    Failed,
}

impl RecordingStatus {
    /// Parse a status string, `None` for anything unrecognized
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "recording" => Some(Self::Recording),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One question asked during the interview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewQuestion {
    pub question: String,
    pub answer: String,
    /// Answer duration in milliseconds
    pub duration: u64,
}

/// Audio description, filled in once the capture is finalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetadata {
    pub file_size: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

/// Metadata of one interview recording
///
/// Audio bytes are never part of this row; they live in the audio table under
/// the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub session_id: String,
    pub job_title: String,
    pub company_name: String,
    /// Capture start time
    pub timestamp: DateTime<Utc>,
    /// Milliseconds between capture start and finalization, 0 while recording
    pub duration: u64,
    pub questions: Vec<InterviewQuestion>,
    pub status: RecordingStatus,
    pub metadata: AudioMetadata,
}

/// Generate a recording id embedding the capture start time
pub fn generate_recording_id(started_at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!(
        "{}{}_{}",
        RECORDING_ID_PREFIX,
        started_at.timestamp_millis(),
        suffix
    )
}

/// Extract the creation epoch (ms) embedded in a `recording_<epochMs>_<suffix>` id
pub fn recording_id_epoch_ms(id: &str) -> Option<i64> {
    let rest = id.strip_prefix(RECORDING_ID_PREFIX)?;
    let epoch = rest.split('_').next()?;
    if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    epoch.parse().ok()
}
