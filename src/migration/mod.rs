//! Legacy data migration
//!
//! Reads recordings left behind in the single-key legacy store, pairs them
//! with their audio and writes them into the two-table store.

pub mod legacy;
pub mod migrator;
pub mod reconcile;

pub use legacy::{decode_data_url, DataUrlError, LegacyRecording};
pub use migrator::{LegacyMigrator, MigrationError, MigrationResult, MigrationStatus};
pub use reconcile::{match_audio_key, AudioMatch};
