//! Engine configuration
//!
//! All tunables of the capture pipeline and the legacy migration live here.
//! Every field has a default, so an empty JSON object is a valid config file.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Encodings tried in order when a capture starts.
pub const DEFAULT_MIME_PREFERENCES: [&str; 4] = [
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/mp4",
    "audio/mpeg",
];

/// Used when the capture device supports none of the preferred encodings.
pub const FALLBACK_MIME_TYPE: &str = "audio/webm";

/// Maximum distance between a legacy record and a legacy audio key.
pub const DEFAULT_MATCH_WINDOW_MS: i64 = 60 * 60 * 1000;

pub const LEGACY_RECORDINGS_KEY: &str = "interview_recordings";
pub const LEGACY_AUDIO_KEY: &str = "interview_audio_blobs";

/// Constraints handed to the capture device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_bits_per_second: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            sample_rate: 44_100,
            channels: 1,
            audio_bits_per_second: 128_000,
        }
    }
}

/// Configuration for the recording engine and the migrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Ordered encoding preferences, best first
    pub mime_preferences: Vec<String>,

    /// Encoding used when nothing in `mime_preferences` is supported
    pub fallback_mime_type: String,

    /// How often the capture device flushes a chunk
    pub timeslice_ms: u64,

    pub constraints: CaptureConstraints,

    /// Heuristic pairing window for legacy audio (exclusive)
    pub match_window_ms: i64,

    pub legacy_recordings_key: String,
    pub legacy_audio_key: String,

    /// Directory backing the durable store, if file-backed
    pub storage_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_mime_type: FALLBACK_MIME_TYPE.to_string(),
            timeslice_ms: 1000,
            constraints: CaptureConstraints::default(),
            match_window_ms: DEFAULT_MATCH_WINDOW_MS,
            legacy_recordings_key: LEGACY_RECORDINGS_KEY.to_string(),
            legacy_audio_key: LEGACY_AUDIO_KEY.to_string(),
            storage_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;

        tracing::debug!("Loaded engine config from {:?}", path);
        Ok(config)
    }

    pub fn timeslice(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeslice_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.mime_preferences[0], "audio/webm;codecs=opus");
        assert_eq!(config.fallback_mime_type, "audio/webm");
        assert_eq!(config.match_window_ms, 3_600_000);
        assert_eq!(config.timeslice_ms, 1000);
        assert_eq!(config.constraints.sample_rate, 44_100);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "matchWindowMs": 5000, "constraints": { "channels": 2 } }"#)
            .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.match_window_ms, 5000);
        assert_eq!(config.constraints.channels, 2);
        assert_eq!(config.constraints.sample_rate, 44_100);
        assert_eq!(config.legacy_audio_key, "interview_audio_blobs");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        assert!(EngineConfig::load(&dir.path().join("nope.json")).is_err());
    }
}
