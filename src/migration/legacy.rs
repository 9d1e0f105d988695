//! Legacy representation
//!
//! The older store kept a JSON array of loosely typed recordings under one key
//! and a JSON object of `id -> data URL` audio under another. Numbers may show
//! up as strings, timestamps as ISO strings or epoch milliseconds, and the
//! company field was called `company`.

use crate::recorder::state::{
    recording_id_epoch_ms, AudioMetadata, InterviewQuestion, Recording, RecordingStatus,
};
use crate::storage::AudioBlob;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a data URL could not be turned into audio
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("not a data URL")]
    NotDataUrl,

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("data URL payload is empty")]
    Empty,
}

/// Decode `data:<mimeType>[;params];base64,<payload>`
///
/// The MIME type falls back to `fallback_mime` when the header has none.
pub fn decode_data_url(data_url: &str, fallback_mime: &str) -> Result<AudioBlob, DataUrlError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or(DataUrlError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;

    let mut params = header.split(';');
    let mime_type = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(fallback_mime)
        .to_string();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUrlError::NotBase64);
    }

    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if payload.is_empty() {
        return Err(DataUrlError::Empty);
    }
    let data = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if data.is_empty() {
        return Err(DataUrlError::Empty);
    }

    Ok(AudioBlob::new(data, mime_type))
}

/// Legacy statuses were `recording`, `processing` and `completed`. The
/// capture that produced a legacy row is long over, so anything but an
/// explicit failure counts as completed.
pub fn normalize_legacy_status(raw: Option<&str>) -> RecordingStatus {
    match raw.and_then(RecordingStatus::parse) {
        Some(RecordingStatus::Failed) => RecordingStatus::Failed,
        _ => RecordingStatus::Completed,
    }
}

/// One record of the legacy recordings array
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecording {
    pub id: String,
    pub session_id: String,
    pub job_title: String,
    pub company_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub duration: u64,
    pub questions: Vec<InterviewQuestion>,
    pub status: Option<String>,
}

fn loose_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn loose_u64(value: Option<&Value>) -> u64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n > 0.0 => n.round() as u64,
        _ => 0,
    }
}

fn loose_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            s.parse::<i64>()
                .ok()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        _ => None,
    }
}

fn loose_questions(value: Option<&Value>) -> Vec<InterviewQuestion> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|q| InterviewQuestion {
            question: loose_string(q.get("question")).unwrap_or_default(),
            answer: loose_string(q.get("answer")).unwrap_or_default(),
            duration: loose_u64(q.get("duration")),
        })
        .collect()
}

impl LegacyRecording {
    /// Read one legacy record; only a usable id is mandatory
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let object: &Map<String, Value> =
            value.as_object().ok_or("legacy record is not an object")?;
        let id = loose_string(object.get("id"))
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or("legacy record has no id")?;

        Ok(Self {
            session_id: loose_string(object.get("sessionId")).unwrap_or_default(),
            job_title: loose_string(object.get("jobTitle")).unwrap_or_default(),
            company_name: loose_string(object.get("companyName"))
                .or_else(|| loose_string(object.get("company")))
                .unwrap_or_default(),
            timestamp: loose_timestamp(object.get("timestamp")),
            duration: loose_u64(object.get("duration")),
            questions: loose_questions(object.get("questions")),
            status: loose_string(object.get("status")),
            id,
        })
    }

    /// Creation time: the stored timestamp, else the epoch in the id, else now
    pub fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
            .or_else(|| {
                recording_id_epoch_ms(&self.id)
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            })
            .unwrap_or_else(Utc::now)
    }

    /// Convert to the new schema; audio metadata is filled in by the caller
    pub fn to_recording(&self, status: RecordingStatus, mime_type: &str) -> Recording {
        Recording {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            job_title: self.job_title.clone(),
            company_name: self.company_name.clone(),
            timestamp: self.created_at(),
            duration: self.duration,
            questions: self.questions.clone(),
            status,
            metadata: AudioMetadata {
                file_size: 0,
                mime_type: mime_type.to_string(),
                sample_rate: None,
                channels: None,
            },
        }
    }
}
