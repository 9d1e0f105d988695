//! Recording commands
//!
//! The surface a UI talks to. Results are frontend-shaped and every failure is
//! an [`ErrorResponse`].

use crate::capture::AudioCapture;
use crate::config::EngineConfig;
use crate::migration::LegacyMigrator;
use crate::recorder::{
    PlaybackHandle, RecorderState, Recording, RecordingEngine, RecordingEvent, StartRecording,
};
use crate::storage::{BlobKeyValueStore, FsStore, LegacyStore, MemoryStore, StorageInfo};
use crate::utils::error::{AppResult, ErrorResponse};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Snapshot of the recorder for the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStateInfo {
    pub state: RecorderState,
    pub is_recording: bool,
    pub current_recording: Option<Recording>,
}

/// A stored recording plus a playback URL for its audio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingDetails {
    #[serde(flatten)]
    pub recording: Recording,
    pub audio_url: Option<String>,
}

struct OpenHandle {
    recording_id: String,
    handle: PlaybackHandle,
}

/// Application state for recording
pub struct RecorderService {
    pub(super) engine: RecordingEngine,
    pub(super) migrator: LegacyMigrator,
    playback: Mutex<HashMap<String, OpenHandle>>,
}

impl RecorderService {
    pub fn new(engine: RecordingEngine, legacy: Arc<dyn LegacyStore>) -> Self {
        Self {
            migrator: LegacyMigrator::new(legacy, engine.clone()),
            engine,
            playback: Mutex::new(HashMap::new()),
        }
    }

    /// Open the durable store named by the config and initialize the engine
    ///
    /// Without `storage_dir` recordings live in memory only.
    pub async fn open(
        config: EngineConfig,
        capture: Arc<dyn AudioCapture>,
        legacy: Arc<dyn LegacyStore>,
    ) -> AppResult<Self> {
        let store: Arc<dyn BlobKeyValueStore> = match &config.storage_dir {
            Some(dir) => Arc::new(FsStore::open(dir)?),
            None => {
                tracing::warn!("No storage directory configured, recordings are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };
        let engine = RecordingEngine::initialize(store, capture, config).await;
        Ok(Self::new(engine, legacy))
    }

    pub fn engine(&self) -> &RecordingEngine {
        &self.engine
    }

    /// Lifecycle events, for UIs that do not want to poll
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.engine.subscribe()
    }

    /// Start recording
    pub async fn start_recording(
        &self,
        request: StartRecording,
    ) -> Result<Recording, ErrorResponse> {
        Ok(self.engine.start_recording(request).await?)
    }

    /// Stop recording; the returned recording is still being finalized
    pub async fn stop_recording(&self) -> Result<Recording, ErrorResponse> {
        Ok(self.engine.stop_recording().await?)
    }

    /// Get current recording state
    pub fn get_recording_state(&self) -> RecordingStateInfo {
        RecordingStateInfo {
            state: self.engine.state(),
            is_recording: self.engine.is_recording(),
            current_recording: self.engine.current_recording(),
        }
    }

    /// All recordings, newest first
    pub async fn get_recordings(&self) -> Result<Vec<Recording>, ErrorResponse> {
        let mut recordings = self.engine.get_recordings().await?;
        recordings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(recordings)
    }

    /// Load one recording and open a playback URL for its audio
    pub async fn get_recording(&self, id: &str) -> Result<Option<RecordingDetails>, ErrorResponse> {
        let Some(loaded) = self.engine.get_recording(id).await? else {
            return Ok(None);
        };

        let audio_url = loaded.audio.map(|handle| {
            let url = handle.url().to_string();
            self.playback.lock().insert(
                url.clone(),
                OpenHandle {
                    recording_id: id.to_string(),
                    handle,
                },
            );
            url
        });

        Ok(Some(RecordingDetails {
            recording: loaded.recording,
            audio_url,
        }))
    }

    /// Resolve a playback URL handed out by [`Self::get_recording`]
    pub fn playback(&self, url: &str) -> Option<PlaybackHandle> {
        self.playback.lock().get(url).map(|open| open.handle.clone())
    }

    /// Forget a playback URL
    pub fn release_playback(&self, url: &str) -> bool {
        self.playback.lock().remove(url).is_some()
    }

    pub async fn delete_recording(&self, id: &str) -> Result<bool, ErrorResponse> {
        let deleted = self.engine.delete_recording(id).await?;
        self.playback.lock().retain(|_, open| open.recording_id != id);
        Ok(deleted)
    }

    /// Save a recording's audio into `dir`; returns the written path
    pub async fn download_recording(&self, id: &str, dir: &Path) -> Result<String, ErrorResponse> {
        let path = self.engine.download_recording(id, dir).await?;
        Ok(path.to_string_lossy().to_string())
    }

    pub async fn get_storage_info(&self) -> Result<StorageInfo, ErrorResponse> {
        Ok(self.engine.storage_info().await?)
    }

    pub async fn clear_all_data(&self) -> Result<(), ErrorResponse> {
        self.engine.clear_all_data().await?;
        self.playback.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FeedCapture;
    use crate::recorder::RecordingStatus;
    use crate::storage::MemoryLegacyStore;

    async fn service() -> (RecorderService, FeedCapture) {
        let feed = FeedCapture::new();
        let service = RecorderService::open(
            EngineConfig::default(),
            Arc::new(feed.clone()),
            Arc::new(MemoryLegacyStore::new()),
        )
        .await
        .unwrap();
        (service, feed)
    }

    async fn record(service: &RecorderService, feed: &FeedCapture, title: &str) -> Recording {
        let started = service
            .start_recording(StartRecording {
                job_title: title.to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        feed.push_chunk(vec![7u8; 64]);
        service.stop_recording().await.unwrap();
        service.engine().await_finalization().await.unwrap();
        started
    }

    #[tokio::test]
    async fn test_state_reporting() {
        let (service, feed) = service().await;
        let idle = service.get_recording_state();
        assert_eq!(idle.state, RecorderState::Idle);
        assert!(idle.current_recording.is_none());

        service.start_recording(StartRecording::default()).await.unwrap();
        let busy = service.get_recording_state();
        assert_eq!(busy.state, RecorderState::Recording);
        assert!(busy.is_recording);

        let err = service
            .start_recording(StartRecording::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "RECORDING_IN_PROGRESS");

        feed.push_chunk(vec![1u8; 8]);
        service.stop_recording().await.unwrap();
        service.engine().await_finalization().await;
        assert_eq!(service.get_recording_state().state, RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_microphone_denied_code() {
        let (service, feed) = service().await;
        feed.set_permission_denied(true);
        let err = service
            .start_recording(StartRecording::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "MICROPHONE_ACCESS_DENIED");
    }

    #[tokio::test]
    async fn test_recordings_newest_first() {
        let (service, feed) = service().await;
        let first = record(&service, &feed, "First").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = record(&service, &feed, "Second").await;

        let recordings = service.get_recordings().await.unwrap();
        let ids: Vec<_> = recordings.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_playback_urls() {
        let (service, feed) = service().await;
        let recording = record(&service, &feed, "Engineer").await;

        let details = service.get_recording(&recording.id).await.unwrap().unwrap();
        assert_eq!(details.recording.status, RecordingStatus::Completed);
        let url = details.audio_url.unwrap();
        assert_eq!(service.playback(&url).unwrap().len(), 64);

        let again = service.get_recording(&recording.id).await.unwrap().unwrap();
        assert_ne!(again.audio_url.unwrap(), url);

        assert!(service.release_playback(&url));
        assert!(service.playback(&url).is_none());

        assert!(service.delete_recording(&recording.id).await.unwrap());
        assert!(service.get_recording(&recording.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_and_clear() {
        let (service, feed) = service().await;
        let recording = record(&service, &feed, "Data Engineer").await;
        let dir = tempfile::tempdir().unwrap();

        let path = service
            .download_recording(&recording.id, dir.path())
            .await
            .unwrap();
        assert!(path.contains("interview_Data_Engineer_"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 64]);

        let info = service.get_storage_info().await.unwrap();
        assert_eq!(info.recordings, 1);
        assert_eq!(info.used_space, 64);

        service.clear_all_data().await.unwrap();
        assert!(service.get_recordings().await.unwrap().is_empty());

        let err = service
            .download_recording(&recording.id, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_file_backed_service() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            storage_dir: Some(dir.path().join("store")),
            ..Default::default()
        };
        let feed = FeedCapture::new();
        let service = RecorderService::open(
            config.clone(),
            Arc::new(feed.clone()),
            Arc::new(MemoryLegacyStore::new()),
        )
        .await
        .unwrap();
        let recording = record(&service, &feed, "Persisted").await;
        drop(service);

        let reopened = RecorderService::open(
            config,
            Arc::new(FeedCapture::new()),
            Arc::new(MemoryLegacyStore::new()),
        )
        .await
        .unwrap();
        let details = reopened.get_recording(&recording.id).await.unwrap().unwrap();
        assert_eq!(details.recording.status, RecordingStatus::Completed);
        assert!(details.audio_url.is_some());
    }
}
