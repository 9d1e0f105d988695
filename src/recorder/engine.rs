//! Recording engine
//!
//! Owns the capture lifecycle (idle, recording, finalizing) and the durable
//! two-table persistence of finished recordings.
//!
//! Finalization runs on a background task once the capture's chunk channel
//! closes. Its failures are never returned to the caller of `stop_recording`;
//! they are persisted as `status = failed` and broadcast as
//! [`RecordingEvent::Finalized`].

use super::error::{RecordingError, RecordingResult};
use super::playback::{LoadedRecording, PlaybackHandle};
use super::session::{CaptureSession, SessionSlot};
use super::state::{
    generate_recording_id, AudioMetadata, InterviewQuestion, RecorderState, Recording,
    RecordingStatus,
};
use crate::capture::{
    choose_mime_type, extension_for_mime, AudioCapture, CaptureEvent, CaptureRequest,
};
use crate::config::EngineConfig;
use crate::storage::{
    AudioBlob, BlobKeyValueStore, CompletedRecording, RecordingRepository, StorageInfo,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Events emitted during the capture lifecycle
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// Capture started
    Started(Recording),
    /// Capture stopped, finalization pending
    Stopping(Recording),
    /// Finalization finished; the status tells whether it succeeded
    Finalized(Recording),
    /// Recording removed from the store
    Deleted(String),
}

/// Caller-supplied description of a new capture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRecording {
    pub session_id: String,
    pub job_title: String,
    pub company_name: String,
    pub questions: Vec<InterviewQuestion>,
}

struct EngineInner {
    repository: RecordingRepository,
    capture: Arc<dyn AudioCapture>,
    config: EngineConfig,
    session: Mutex<SessionSlot>,
    finalizer: Mutex<Option<JoinHandle<Option<Recording>>>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

/// Capture state machine plus recording store
#[derive(Clone)]
pub struct RecordingEngine {
    inner: Arc<EngineInner>,
}

impl RecordingEngine {
    /// Create an engine and clean up orphaned audio before handing it out
    ///
    /// Cleanup completes before any capture can start, so a placeholder row of
    /// a fresh capture can never be mistaken for an orphan's owner going away.
    pub async fn initialize(
        store: Arc<dyn BlobKeyValueStore>,
        capture: Arc<dyn AudioCapture>,
        config: EngineConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let engine = Self {
            inner: Arc::new(EngineInner {
                repository: RecordingRepository::new(store),
                capture,
                config,
                session: Mutex::new(SessionSlot::Empty),
                finalizer: Mutex::new(None),
                event_tx,
            }),
        };

        if let Err(e) = engine.cleanup_orphaned_audio().await {
            tracing::warn!("Could not clean up orphaned audio: {}", e);
        }

        tracing::info!("Recording engine initialized");
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn repository(&self) -> &RecordingRepository {
        &self.inner.repository
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn state(&self) -> RecorderState {
        self.inner.session.lock().state()
    }

    /// The in-flight recording, if any
    pub fn current_recording(&self) -> Option<Recording> {
        self.inner.session.lock().recording().cloned()
    }

    /// True from the moment a start is accepted until capture stops
    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Start capturing a new interview recording
    pub async fn start_recording(&self, request: StartRecording) -> RecordingResult<Recording> {
        if !self.inner.session.lock().try_reserve() {
            return Err(RecordingError::RecordingInProgress);
        }

        match self.begin_capture(request).await {
            Ok(recording) => Ok(recording),
            Err(e) => {
                *self.inner.session.lock() = SessionSlot::Empty;
                tracing::error!("Failed to start recording: {}", e);
                Err(e)
            }
        }
    }

    async fn begin_capture(&self, request: StartRecording) -> RecordingResult<Recording> {
        let config = &self.inner.config;
        let mime_type = choose_mime_type(
            self.inner.capture.as_ref(),
            &config.mime_preferences,
            &config.fallback_mime_type,
        );

        tracing::info!("Starting interview recording ({})", mime_type);
        let mut active = self
            .inner
            .capture
            .start(CaptureRequest {
                mime_type,
                timeslice: config.timeslice(),
                constraints: config.constraints.clone(),
            })
            .await?;

        let started_at = Utc::now();
        let recording = Recording {
            id: generate_recording_id(started_at),
            session_id: request.session_id,
            job_title: request.job_title,
            company_name: request.company_name,
            timestamp: started_at,
            duration: 0,
            questions: request.questions,
            status: RecordingStatus::Recording,
            metadata: AudioMetadata {
                file_size: 0,
                mime_type: active.mime_type.clone(),
                sample_rate: Some(config.constraints.sample_rate),
                channels: Some(config.constraints.channels),
            },
        };

        // Placeholder row so an abrupt end still leaves a visible record.
        if let Err(e) = self.inner.repository.save_metadata(&recording).await {
            active.control.stop();
            active.control.release();
            return Err(e.into());
        }

        {
            let mut slot = self.inner.session.lock();
            *slot = SessionSlot::Occupied(CaptureSession::new(recording.clone(), active.control));
            let _ = self
                .inner
                .event_tx
                .send(RecordingEvent::Started(recording.clone()));
        }

        let task = tokio::spawn(collect_and_finalize(self.inner.clone(), active.events));
        *self.inner.finalizer.lock() = Some(task);

        tracing::info!("Recording started: {}", recording.id);
        Ok(recording)
    }

    /// Stop the active capture
    ///
    /// Releases the microphone immediately and returns the recording in
    /// `processing` state. The final status is persisted by the background
    /// finalization; use [`RecordingEngine::await_finalization`], an event
    /// subscription or a re-fetch to observe it.
    pub async fn stop_recording(&self) -> RecordingResult<Recording> {
        let recording = {
            let mut slot = self.inner.session.lock();
            let session = match slot.session_mut() {
                Some(session) if !session.finalizing => session,
                _ => return Err(RecordingError::NotRecording),
            };
            session.end_capture();
            // Sent under the lock so it always precedes `Finalized`.
            let _ = self
                .inner
                .event_tx
                .send(RecordingEvent::Stopping(session.recording.clone()));
            session.recording.clone()
        };

        tracing::info!("Stopping recording {}", recording.id);
        Ok(recording)
    }

    /// Wait for the most recent capture's finalization
    ///
    /// Returns the final recording, or `None` if no capture was started since
    /// the last call. Waits for the capture to be stopped first.
    pub async fn await_finalization(&self) -> Option<Recording> {
        let task = self.inner.finalizer.lock().take()?;
        match task.await {
            Ok(recording) => recording,
            Err(e) => {
                tracing::error!("Finalization task failed: {}", e);
                None
            }
        }
    }

    /// All stored recordings, metadata only, in no particular order
    pub async fn get_recordings(&self) -> RecordingResult<Vec<Recording>> {
        Ok(self.inner.repository.list().await?)
    }

    /// One recording with a fresh playback handle for its audio
    pub async fn get_recording(&self, id: &str) -> RecordingResult<Option<LoadedRecording>> {
        let Some(recording) = self.inner.repository.get_metadata(id).await? else {
            return Ok(None);
        };
        let audio = self
            .inner
            .repository
            .get_audio(id)
            .await?
            .map(|row| PlaybackHandle::new(row.blob));

        Ok(Some(LoadedRecording { recording, audio }))
    }

    /// Remove both rows of a recording; deleting a missing id succeeds
    pub async fn delete_recording(&self, id: &str) -> RecordingResult<bool> {
        self.inner.repository.delete(id).await?;
        tracing::info!("Recording deleted: {}", id);
        let _ = self
            .inner
            .event_tx
            .send(RecordingEvent::Deleted(id.to_string()));
        Ok(true)
    }

    /// Write a recording's audio to `dir` and return the file path
    pub async fn download_recording(&self, id: &str, dir: &Path) -> RecordingResult<PathBuf> {
        let recording = self
            .inner
            .repository
            .get_metadata(id)
            .await?
            .ok_or_else(|| RecordingError::NotFound(id.to_string()))?;
        let audio = self
            .inner
            .repository
            .get_audio(id)
            .await?
            .ok_or_else(|| RecordingError::NoAudio(id.to_string()))?;

        let path = dir.join(download_file_name(&recording, &audio.blob.mime_type));
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &audio.blob.data).await?;

        tracing::info!("Downloaded recording {} to {:?}", id, path);
        Ok(path)
    }

    /// Delete audio rows that have no metadata row; returns the deleted ids
    ///
    /// Metadata rows without audio are kept: they are visible failure records.
    pub async fn cleanup_orphaned_audio(&self) -> RecordingResult<Vec<String>> {
        let repository = &self.inner.repository;
        let recording_ids: HashSet<String> = repository.recording_ids().await?.into_iter().collect();
        let orphans: Vec<String> = repository
            .audio_ids()
            .await?
            .into_iter()
            .filter(|id| !recording_ids.contains(id))
            .collect();

        if !orphans.is_empty() {
            repository.delete_audio(&orphans).await?;
            tracing::info!("Cleaned up {} orphaned audio records", orphans.len());
        }
        Ok(orphans)
    }

    pub async fn storage_info(&self) -> RecordingResult<StorageInfo> {
        Ok(self.inner.repository.storage_info().await?)
    }

    /// Remove every recording and all audio
    pub async fn clear_all_data(&self) -> RecordingResult<()> {
        self.inner.repository.clear().await?;
        tracing::info!("All recording data cleared");
        Ok(())
    }
}

/// `interview_<jobTitle>_<timestampMs>.<ext>`, with the title made file-name safe
fn download_file_name(recording: &Recording, mime_type: &str) -> String {
    let title: String = recording
        .job_title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "interview_{}_{}.{}",
        title,
        recording.timestamp.timestamp_millis(),
        extension_for_mime(mime_type)
    )
}

async fn collect_and_finalize(
    inner: Arc<EngineInner>,
    mut events: mpsc::UnboundedReceiver<CaptureEvent>,
) -> Option<Recording> {
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut capture_error: Option<String> = None;

    while let Some(event) = events.recv().await {
        match event {
            CaptureEvent::Data(chunk) if chunk.is_empty() => {}
            CaptureEvent::Data(chunk) => {
                tracing::debug!("Audio chunk received, size: {}", chunk.len());
                chunks.push(chunk);
            }
            CaptureEvent::Error(message) => {
                tracing::error!("Capture error: {}", message);
                if let Some(session) = inner.session.lock().session_mut() {
                    session.recording.status = RecordingStatus::Failed;
                }
                capture_error.get_or_insert(message);
            }
        }
    }

    finalize(&inner, chunks, capture_error).await
}

async fn finalize(
    inner: &EngineInner,
    chunks: Vec<Vec<u8>>,
    capture_error: Option<String>,
) -> Option<Recording> {
    let (recording, started_at) = {
        let mut slot = inner.session.lock();
        let Some(session) = slot.session_mut() else {
            tracing::error!("No current recording to finalize");
            return None;
        };
        // The device may end on its own; the microphone is released either way.
        session.end_capture();
        (session.recording.clone(), session.started_at)
    };

    let id = recording.id.clone();
    tracing::info!("Finalizing recording {} ({} chunks)", id, chunks.len());

    let outcome = match capture_error {
        Some(message) => Err((recording, RecordingError::CaptureFailed(message))),
        None => persist_audio(inner, recording, started_at, chunks).await,
    };

    let recording = match outcome {
        Ok(recording) => {
            tracing::info!("Recording finalized successfully: {}", id);
            recording
        }
        Err((mut recording, error)) => {
            tracing::error!("Failed to finalize recording {}: {}", id, error);
            recording.status = RecordingStatus::Failed;
            recording.metadata.file_size = 0;
            if let Err(e) = inner.repository.save_metadata(&recording).await {
                tracing::error!("Could not persist failed status for {}: {}", id, e);
            }
            recording
        }
    };

    *inner.session.lock() = SessionSlot::Empty;
    let _ = inner
        .event_tx
        .send(RecordingEvent::Finalized(recording.clone()));
    Some(recording)
}

async fn persist_audio(
    inner: &EngineInner,
    mut recording: Recording,
    started_at: std::time::Instant,
    chunks: Vec<Vec<u8>>,
) -> Result<Recording, (Recording, RecordingError)> {
    let data = chunks.concat();
    if data.is_empty() {
        return Err((recording, RecordingError::EmptyCapture));
    }

    recording.duration = started_at.elapsed().as_millis() as u64;
    let blob = AudioBlob::new(data, recording.metadata.mime_type.clone());
    let completed = match CompletedRecording::new(recording, blob) {
        Ok(completed) => completed,
        Err(recording) => return Err((recording, RecordingError::EmptyCapture)),
    };

    let saved = inner.repository.save_complete(&completed).await;
    match saved {
        Ok(()) => Ok(completed.into_parts().0),
        Err(e) => {
            let (mut recording, _) = completed.into_parts();
            recording.duration = 0;
            Err((recording, e.into()))
        }
    }
}
