//! Legacy migration
//!
//! Moves recordings out of the single-key legacy store into the two-table
//! store. Each record is handled on its own: a bad record is counted and
//! reported but never stops the run.

use super::legacy::{decode_data_url, normalize_legacy_status, LegacyRecording};
use super::reconcile::{match_audio_key, AudioMatch};
use crate::recorder::state::RecordingStatus;
use crate::recorder::RecordingEngine;
use crate::storage::{CompletedRecording, LegacyStore, RecordingRepository, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a whole migration run
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Legacy data under '{key}' is malformed: {reason}")]
    Malformed { key: String, reason: String },
}

/// Outcome of [`LegacyMigrator::migrate`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    /// False only when the run could not be carried out at all
    pub success: bool,
    pub migrated_count: usize,
    pub failed_count: usize,
    pub errors: Vec<String>,
}

/// Snapshot of both stores
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub needs_migration: bool,
    pub old_recordings_count: usize,
    pub new_recordings_count: usize,
    pub old_audio_blob_count: usize,
}

pub struct LegacyMigrator {
    legacy: Arc<dyn LegacyStore>,
    engine: RecordingEngine,
}

impl LegacyMigrator {
    pub fn new(legacy: Arc<dyn LegacyStore>, engine: RecordingEngine) -> Self {
        Self { legacy, engine }
    }

    fn repository(&self) -> &RecordingRepository {
        self.engine.repository()
    }

    async fn legacy_records(&self) -> Result<Vec<Value>, MigrationError> {
        let key = &self.engine.config().legacy_recordings_key;
        let Some(raw) = self.legacy.get_item(key).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => Ok(records),
            Ok(Value::Null) => Ok(Vec::new()),
            Ok(_) => Err(MigrationError::Malformed {
                key: key.clone(),
                reason: "expected a JSON array".to_string(),
            }),
            Err(e) => Err(MigrationError::Malformed {
                key: key.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Legacy audio as `key -> data URL`; non-string values are dropped
    async fn legacy_audio(&self) -> Result<BTreeMap<String, String>, MigrationError> {
        let key = &self.engine.config().legacy_audio_key;
        let Some(raw) = self.legacy.get_item(key).await? else {
            return Ok(BTreeMap::new());
        };
        let object = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => object,
            Ok(Value::Null) => return Ok(BTreeMap::new()),
            Ok(_) => {
                return Err(MigrationError::Malformed {
                    key: key.clone(),
                    reason: "expected a JSON object".to_string(),
                })
            }
            Err(e) => {
                return Err(MigrationError::Malformed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
        };

        Ok(object
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(url) => Some((k, url)),
                _ => {
                    tracing::warn!("Ignoring non-string legacy audio entry {}", k);
                    None
                }
            })
            .collect())
    }

    async fn load_legacy(&self) -> Result<(Vec<Value>, BTreeMap<String, String>), MigrationError> {
        Ok((self.legacy_records().await?, self.legacy_audio().await?))
    }

    /// True when legacy recordings exist and the new store is still empty
    ///
    /// Any read failure answers false.
    pub async fn needs_migration(&self) -> bool {
        let old = match self.legacy_records().await {
            Ok(records) => records.len(),
            Err(e) => {
                tracing::warn!("Could not read legacy recordings: {}", e);
                return false;
            }
        };
        if old == 0 {
            return false;
        }
        match self.repository().count().await {
            Ok(new) => new == 0,
            Err(e) => {
                tracing::warn!("Could not count recordings: {}", e);
                false
            }
        }
    }

    /// Copy every legacy recording into the new store
    ///
    /// Does nothing once the new store holds any recording.
    pub async fn migrate(&self) -> MigrationResult {
        let mut result = MigrationResult::default();

        match self.repository().count().await {
            Ok(0) => {}
            Ok(existing) => {
                tracing::info!("Store already holds {} recordings, skipping migration", existing);
                result.success = true;
                return result;
            }
            Err(e) => {
                tracing::error!("Migration aborted: {}", e);
                result.errors.push(format!("Failed to open recording store: {}", e));
                return result;
            }
        }

        let (records, audio) = match self.load_legacy().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!("Migration aborted: {}", e);
                result.errors.push(e.to_string());
                return result;
            }
        };

        tracing::info!(
            "Migrating {} legacy recordings ({} audio entries)",
            records.len(),
            audio.len()
        );

        for (index, value) in records.iter().enumerate() {
            match self.migrate_record(value, &audio).await {
                Ok(()) => result.migrated_count += 1,
                Err(message) => {
                    tracing::warn!("Legacy record #{} not migrated: {}", index, message);
                    result.failed_count += 1;
                    result.errors.push(format!("Record #{}: {}", index, message));
                }
            }
        }

        tracing::info!(
            "Migration finished: {} migrated, {} failed",
            result.migrated_count,
            result.failed_count
        );
        result.success = true;
        result
    }

    /// Migrate one record; `Err` carries a message for the result
    ///
    /// A record without usable audio is still stored, as `failed`, and also
    /// counted as a failure.
    async fn migrate_record(
        &self,
        value: &Value,
        audio: &BTreeMap<String, String>,
    ) -> Result<(), String> {
        let config = self.engine.config();
        let legacy = LegacyRecording::from_value(value)?;
        let status = normalize_legacy_status(legacy.status.as_deref());
        let recording = legacy.to_recording(status, &config.fallback_mime_type);

        let matched = match_audio_key(
            &legacy.id,
            audio.keys().map(String::as_str),
            config.match_window_ms,
        );

        let problem = match matched {
            None => format!("{}: no matching audio found", legacy.id),
            Some(found) => {
                if let AudioMatch::Nearest { key, distance_ms } = found {
                    tracing::debug!(
                        "Paired {} with audio {} ({} ms apart)",
                        legacy.id,
                        key,
                        distance_ms
                    );
                }
                let data_url = audio.get(found.key()).map(String::as_str).unwrap_or_default();
                match decode_data_url(data_url, &config.fallback_mime_type) {
                    Ok(blob) => match CompletedRecording::new(recording.clone(), blob) {
                        Ok(completed) => {
                            let completed = completed.with_status(status);
                            return self
                                .repository()
                                .save_complete(&completed)
                                .await
                                .map_err(|e| format!("{}: {}", legacy.id, e));
                        }
                        Err(_) => format!("{}: audio {} is empty", legacy.id, found.key()),
                    },
                    Err(e) => format!("{}: audio {} is unreadable: {}", legacy.id, found.key(), e),
                }
            }
        };

        let mut placeholder = recording;
        placeholder.status = RecordingStatus::Failed;
        if let Err(e) = self.repository().save_metadata(&placeholder).await {
            return Err(format!("{} (and could not be stored: {})", problem, e));
        }
        Err(problem)
    }

    /// Remove both legacy keys
    pub async fn cleanup_old_data(&self) -> Result<(), MigrationError> {
        let config = self.engine.config();
        self.legacy.remove_item(&config.legacy_recordings_key).await?;
        self.legacy.remove_item(&config.legacy_audio_key).await?;
        tracing::info!("Legacy recording data removed");
        Ok(())
    }

    /// Counts from both stores; unreadable sides count as zero
    pub async fn migration_status(&self) -> MigrationStatus {
        let old_recordings_count = self.legacy_records().await.map(|r| r.len()).unwrap_or(0);
        let old_audio_blob_count = self.legacy_audio().await.map(|a| a.len()).unwrap_or(0);
        let new_recordings_count = self.repository().count().await.unwrap_or(0);

        MigrationStatus {
            needs_migration: old_recordings_count > 0 && new_recordings_count == 0,
            old_recordings_count,
            new_recordings_count,
            old_audio_blob_count,
        }
    }
}
