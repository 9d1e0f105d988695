//! Playback handles
//!
//! A handle is the process-local stand-in for an object URL: it is minted on
//! every load, never persisted, and keeps the audio bytes alive while held.

use super::state::Recording;
use crate::storage::AudioBlob;
use std::sync::Arc;

const PLAYBACK_URL_SCHEME: &str = "blob:interview-recorder/";

/// Ephemeral reference to loaded audio
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    url: String,
    blob: Arc<AudioBlob>,
}

impl PlaybackHandle {
    pub fn new(blob: AudioBlob) -> Self {
        Self {
            url: format!("{}{}", PLAYBACK_URL_SCHEME, uuid::Uuid::new_v4()),
            blob: Arc::new(blob),
        }
    }

    /// Unique per handle, meaningless outside this process
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn mime_type(&self) -> &str {
        &self.blob.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.blob.data
    }

    pub fn len(&self) -> usize {
        self.blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }
}

/// A recording with its audio, if any, ready for playback
#[derive(Debug, Clone)]
pub struct LoadedRecording {
    pub recording: Recording,
    pub audio: Option<PlaybackHandle>,
}
