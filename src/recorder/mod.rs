//! Recording system module
//!
//! This module implements the interview capture pipeline:
//! - Recording data model and recorder state machine
//! - CaptureSession slot enforcing a single active capture
//! - RecordingEngine owning capture, finalization and persistence

pub mod engine;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;

pub use engine::{RecordingEngine, RecordingEvent, StartRecording};
pub use error::{RecordingError, RecordingResult};
pub use playback::{LoadedRecording, PlaybackHandle};
pub use state::{
    AudioMetadata, InterviewQuestion, RecorderState, Recording, RecordingStatus,
};
