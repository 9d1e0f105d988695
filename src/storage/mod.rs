//! Durable recording storage
//!
//! Two tables keyed by recording id (metadata and audio) behind the
//! [`BlobKeyValueStore`] capability, plus the legacy single-key string store
//! recordings are migrated away from.

pub mod fs;
pub mod memory;
pub mod repository;
pub mod traits;

pub use fs::{FileLegacyStore, FsStore};
pub use memory::{MemoryLegacyStore, MemoryStore};
pub use repository::{AudioBlob, AudioRow, CompletedRecording, RecordingRepository, StorageInfo};
pub use traits::{BlobKeyValueStore, LegacyStore, StoreError, StoreResult, Table, WriteOp};
