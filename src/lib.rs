//! Interview Recorder - durable interview audio capture.
//!
//! This is the main library crate. It captures interview audio, persists each
//! recording as a metadata row plus an audio row written together, and
//! migrates recordings left in the older single-key store.

pub mod capture;
pub mod commands;
pub mod config;
pub mod migration;
pub mod recorder;
pub mod storage;
pub mod utils;

pub use commands::RecorderService;
pub use config::EngineConfig;
pub use migration::{LegacyMigrator, MigrationResult, MigrationStatus};
pub use recorder::{
    LoadedRecording, PlaybackHandle, RecorderState, Recording, RecordingEngine, RecordingError,
    RecordingEvent, RecordingStatus, StartRecording,
};
pub use storage::{BlobKeyValueStore, FsStore, LegacyStore, MemoryStore, StorageInfo};
pub use utils::error::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// Honors `RUST_LOG`. Calling it again once a subscriber is installed is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_recorder=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if installed.is_ok() {
        tracing::info!("Starting Interview Recorder v{}", env!("CARGO_PKG_VERSION"));
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_tracing_twice() {
        super::init_tracing();
        super::init_tracing();
    }
}
