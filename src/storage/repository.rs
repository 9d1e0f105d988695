//! Typed access to the two recording tables
//!
//! A metadata row is the JSON form of [`Recording`]. An audio row is encoded as:
//!
//! ```text
//! [magic "AUD1"] [header_len: u32 LE] [header JSON] [audio bytes]
//! ```
//!
//! where the header carries `recordingId`, `timestamp`, `size` and `mimeType`.

use super::traits::{BlobKeyValueStore, StoreError, StoreResult, Table, WriteOp};
use crate::recorder::state::{Recording, RecordingStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const AUDIO_ROW_MAGIC: &[u8; 4] = b"AUD1";
const AUDIO_ROW_PREFIX_LEN: usize = 8;

/// Encoded audio bytes plus their MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl AudioBlob {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioRowHeader {
    recording_id: String,
    timestamp: DateTime<Utc>,
    size: u64,
    mime_type: String,
}

/// Row of the audio table
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRow {
    pub recording_id: String,
    pub timestamp: DateTime<Utc>,
    pub blob: AudioBlob,
}

impl AudioRow {
    pub fn size(&self) -> u64 {
        self.blob.len() as u64
    }

    fn encode(&self) -> StoreResult<Vec<u8>> {
        let header = serde_json::to_vec(&AudioRowHeader {
            recording_id: self.recording_id.clone(),
            timestamp: self.timestamp,
            size: self.size(),
            mime_type: self.blob.mime_type.clone(),
        })?;

        let mut out = Vec::with_capacity(AUDIO_ROW_PREFIX_LEN + header.len() + self.blob.len());
        out.extend_from_slice(AUDIO_ROW_MAGIC);
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.blob.data);
        Ok(out)
    }

    fn decode(key: &str, mut raw: Vec<u8>) -> StoreResult<Self> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            table: Table::Audio.name(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if raw.len() < AUDIO_ROW_PREFIX_LEN || &raw[..4] != AUDIO_ROW_MAGIC {
            return Err(corrupt("missing audio row header"));
        }
        let header_len = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize;
        let audio_start = AUDIO_ROW_PREFIX_LEN + header_len;
        if raw.len() < audio_start {
            return Err(corrupt("truncated audio row header"));
        }

        let header: AudioRowHeader = serde_json::from_slice(&raw[AUDIO_ROW_PREFIX_LEN..audio_start])?;
        let data = raw.split_off(audio_start);
        if data.len() as u64 != header.size {
            return Err(corrupt("audio length does not match header size"));
        }

        Ok(Self {
            recording_id: header.recording_id,
            timestamp: header.timestamp,
            blob: AudioBlob::new(data, header.mime_type),
        })
    }
}

/// A finished recording together with its audio, persisted as one unit
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    recording: Recording,
    audio: AudioBlob,
}

impl CompletedRecording {
    /// Pair a recording with its audio
    ///
    /// Marks the recording completed and makes `metadata.fileSize` and
    /// `metadata.mimeType` describe the blob. Returns the recording back if the
    /// blob is empty, since a completed recording needs audio.
    pub fn new(mut recording: Recording, audio: AudioBlob) -> Result<Self, Recording> {
        if audio.is_empty() {
            return Err(recording);
        }
        recording.status = RecordingStatus::Completed;
        recording.metadata.file_size = audio.len() as u64;
        recording.metadata.mime_type = audio.mime_type.clone();
        Ok(Self { recording, audio })
    }

    /// Override the status; used when importing rows whose capture already failed
    pub(crate) fn with_status(mut self, status: RecordingStatus) -> Self {
        self.recording.status = status;
        self
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn audio(&self) -> &AudioBlob {
        &self.audio
    }

    pub fn into_parts(self) -> (Recording, AudioBlob) {
        (self.recording, self.audio)
    }
}

/// Usage summary of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    /// Sum of `metadata.fileSize` over every recording
    pub used_space: u64,
    pub recordings: usize,
}

/// Typed view over a [`BlobKeyValueStore`]
#[derive(Clone)]
pub struct RecordingRepository {
    store: Arc<dyn BlobKeyValueStore>,
}

impl RecordingRepository {
    pub fn new(store: Arc<dyn BlobKeyValueStore>) -> Self {
        Self { store }
    }

    /// Write a metadata row alone
    pub async fn save_metadata(&self, recording: &Recording) -> StoreResult<()> {
        let row = serde_json::to_vec(recording)?;
        self.store.put(Table::Recordings, &recording.id, row).await?;
        tracing::debug!("Saved metadata for {} ({:?})", recording.id, recording.status);
        Ok(())
    }

    /// Write metadata and audio in one transaction
    pub async fn save_complete(&self, completed: &CompletedRecording) -> StoreResult<()> {
        let recording = completed.recording();
        let audio_row = AudioRow {
            recording_id: recording.id.clone(),
            timestamp: recording.timestamp,
            blob: completed.audio().clone(),
        };

        // Audio first: a store that applies the pair piecewise never exposes a
        // completed row without its audio.
        self.store
            .transaction(vec![
                WriteOp::put(Table::Audio, &recording.id, audio_row.encode()?),
                WriteOp::put(Table::Recordings, &recording.id, serde_json::to_vec(recording)?),
            ])
            .await?;

        tracing::debug!(
            "Saved recording {} with {} bytes of audio",
            recording.id,
            audio_row.size()
        );
        Ok(())
    }

    /// All metadata rows; rows that fail to parse are skipped
    pub async fn list(&self) -> StoreResult<Vec<Recording>> {
        let rows = self.store.get_all(Table::Recordings).await?;
        let mut recordings = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            match serde_json::from_slice::<Recording>(&row) {
                Ok(recording) => recordings.push(recording),
                Err(e) => tracing::warn!("Skipping unreadable recording row {}: {}", key, e),
            }
        }
        Ok(recordings)
    }

    pub async fn recording_ids(&self) -> StoreResult<Vec<String>> {
        self.store.keys(Table::Recordings).await
    }

    pub async fn count(&self) -> StoreResult<usize> {
        Ok(self.recording_ids().await?.len())
    }

    pub async fn get_metadata(&self, id: &str) -> StoreResult<Option<Recording>> {
        match self.store.get(Table::Recordings, id).await? {
            Some(row) => Ok(Some(serde_json::from_slice(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_audio(&self, id: &str) -> StoreResult<Option<AudioRow>> {
        match self.store.get(Table::Audio, id).await? {
            Some(raw) => Ok(Some(AudioRow::decode(id, raw)?)),
            None => Ok(None),
        }
    }

    pub async fn audio_ids(&self) -> StoreResult<Vec<String>> {
        self.store.keys(Table::Audio).await
    }

    /// Delete both rows of a recording in one transaction
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.store
            .transaction(vec![
                WriteOp::delete(Table::Recordings, id),
                WriteOp::delete(Table::Audio, id),
            ])
            .await
    }

    /// Delete a set of audio rows in one transaction
    pub async fn delete_audio(&self, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store
            .transaction(
                ids.iter()
                    .map(|id| WriteOp::delete(Table::Audio, id.as_str()))
                    .collect(),
            )
            .await
    }

    /// Empty both tables in one transaction
    pub async fn clear(&self) -> StoreResult<()> {
        self.store
            .transaction(
                Table::ALL
                    .iter()
                    .map(|table| WriteOp::Clear { table: *table })
                    .collect(),
            )
            .await
    }

    pub async fn storage_info(&self) -> StoreResult<StorageInfo> {
        let recordings = self.list().await?;
        Ok(StorageInfo {
            used_space: recordings.iter().map(|r| r.metadata.file_size).sum(),
            recordings: recordings.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::AudioMetadata;
    use crate::storage::memory::MemoryStore;
    use chrono::TimeZone;

    fn recording(id: &str) -> Recording {
        Recording {
            id: id.to_string(),
            session_id: "session-1".to_string(),
            job_title: "Backend Engineer".to_string(),
            company_name: "Acme".to_string(),
            timestamp: Utc.timestamp_millis_opt(1_000).unwrap(),
            duration: 0,
            questions: vec![],
            status: RecordingStatus::Processing,
            metadata: AudioMetadata {
                file_size: 0,
                mime_type: "audio/webm".to_string(),
                sample_rate: None,
                channels: None,
            },
        }
    }

    fn repository() -> (Arc<MemoryStore>, RecordingRepository) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), RecordingRepository::new(store))
    }

    #[test]
    fn test_completed_recording_requires_audio() {
        let empty = AudioBlob::new(vec![], "audio/webm");
        assert!(CompletedRecording::new(recording("r"), empty).is_err());

        let completed =
            CompletedRecording::new(recording("r"), AudioBlob::new(vec![1, 2, 3], "audio/ogg"))
                .unwrap();
        assert_eq!(completed.recording().status, RecordingStatus::Completed);
        assert_eq!(completed.recording().metadata.file_size, 3);
        assert_eq!(completed.recording().metadata.mime_type, "audio/ogg");
    }

    /// Records the tables each transaction touches, in order
    struct OrderedStore {
        inner: MemoryStore,
        puts: parking_lot::Mutex<Vec<Table>>,
    }

    #[async_trait::async_trait]
    impl BlobKeyValueStore for OrderedStore {
        async fn get(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get(table, key).await
        }

        async fn keys(&self, table: Table) -> StoreResult<Vec<String>> {
            self.inner.keys(table).await
        }

        async fn get_all(&self, table: Table) -> StoreResult<Vec<(String, Vec<u8>)>> {
            self.inner.get_all(table).await
        }

        async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
            self.puts.lock().extend(ops.iter().filter_map(|op| match op {
                WriteOp::Put { table, .. } => Some(*table),
                _ => None,
            }));
            self.inner.transaction(ops).await
        }
    }

    #[tokio::test]
    async fn test_save_complete_writes_audio_before_metadata() {
        let store = Arc::new(OrderedStore {
            inner: MemoryStore::new(),
            puts: parking_lot::Mutex::new(Vec::new()),
        });
        let repo = RecordingRepository::new(store.clone());
        let completed =
            CompletedRecording::new(recording("r1"), AudioBlob::new(vec![7; 8], "audio/webm"))
                .unwrap();
        repo.save_complete(&completed).await.unwrap();

        assert_eq!(*store.puts.lock(), vec![Table::Audio, Table::Recordings]);
    }

    #[tokio::test]
    async fn test_save_complete_writes_both_rows() {
        let (_, repo) = repository();
        let completed =
            CompletedRecording::new(recording("r1"), AudioBlob::new(vec![7; 32], "audio/webm"))
                .unwrap();
        repo.save_complete(&completed).await.unwrap();

        let meta = repo.get_metadata("r1").await.unwrap().unwrap();
        assert_eq!(meta.status, RecordingStatus::Completed);

        let audio = repo.get_audio("r1").await.unwrap().unwrap();
        assert_eq!(audio.recording_id, "r1");
        assert_eq!(audio.size(), 32);
        assert_eq!(audio.blob.data, vec![7; 32]);
        assert_eq!(audio.timestamp, meta.timestamp);
    }

    #[tokio::test]
    async fn test_corrupt_audio_row() {
        let (store, repo) = repository();
        store.put(Table::Audio, "bad", b"garbage".to_vec()).await.unwrap();

        let err = repo.get_audio("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_rows() {
        let (store, repo) = repository();
        repo.save_metadata(&recording("good")).await.unwrap();
        store
            .put(Table::Recordings, "broken", b"{not json".to_vec())
            .await
            .unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_storage_info_and_clear() {
        let (_, repo) = repository();
        for (id, size) in [("a", 10usize), ("b", 5)] {
            let completed =
                CompletedRecording::new(recording(id), AudioBlob::new(vec![0; size], "audio/webm"))
                    .unwrap();
            repo.save_complete(&completed).await.unwrap();
        }

        let info = repo.storage_info().await.unwrap();
        assert_eq!(info.used_space, 15);
        assert_eq!(info.recordings, 2);

        repo.clear().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.audio_ids().await.unwrap().is_empty());
    }
}
