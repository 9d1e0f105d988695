//! Migration commands

use super::recording::RecorderService;
use crate::migration::{MigrationResult, MigrationStatus};
use crate::utils::error::ErrorResponse;

impl RecorderService {
    pub async fn needs_migration(&self) -> bool {
        self.migrator.needs_migration().await
    }

    /// Counts from the legacy and the current store
    pub async fn get_migration_status(&self) -> MigrationStatus {
        self.migrator.migration_status().await
    }

    /// Run the migration; per-record problems are listed in the result
    pub async fn run_migration(&self) -> MigrationResult {
        self.migrator.migrate().await
    }

    /// Drop the legacy keys, typically after a successful migration
    pub async fn cleanup_old_data(&self) -> Result<(), ErrorResponse> {
        Ok(self.migrator.cleanup_old_data().await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::capture::FeedCapture;
    use crate::commands::RecorderService;
    use crate::config::{EngineConfig, LEGACY_AUDIO_KEY, LEGACY_RECORDINGS_KEY};
    use crate::storage::{FileLegacyStore, LegacyStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_migration_flow_with_file_legacy_store() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = Arc::new(FileLegacyStore::new(dir.path().join("local_storage.json")));
        legacy
            .set_item(
                LEGACY_RECORDINGS_KEY,
                json!([{ "id": "recording_1000_a", "jobTitle": "Engineer", "company": "Acme" }])
                    .to_string(),
            )
            .await
            .unwrap();
        legacy
            .set_item(
                LEGACY_AUDIO_KEY,
                json!({ "recording_1000_a": "data:audio/webm;base64,AQIDBA==" }).to_string(),
            )
            .await
            .unwrap();

        let service = RecorderService::open(
            EngineConfig::default(),
            Arc::new(FeedCapture::new()),
            legacy.clone(),
        )
        .await
        .unwrap();

        assert!(service.needs_migration().await);
        let status = service.get_migration_status().await;
        assert_eq!(status.old_recordings_count, 1);
        assert_eq!(status.old_audio_blob_count, 1);

        let result = service.run_migration().await;
        assert!(result.success);
        assert_eq!(result.migrated_count, 1);
        assert!(!service.needs_migration().await);

        let recordings = service.get_recordings().await.unwrap();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].company_name, "Acme");
        assert_eq!(recordings[0].metadata.file_size, 4);

        service.cleanup_old_data().await.unwrap();
        assert!(legacy.get_item(LEGACY_RECORDINGS_KEY).await.unwrap().is_none());
        assert!(legacy.get_item(LEGACY_AUDIO_KEY).await.unwrap().is_none());
        assert_eq!(service.get_migration_status().await.old_recordings_count, 0);
    }
}
