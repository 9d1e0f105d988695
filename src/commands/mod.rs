//! Command handlers
//!
//! This module contains every operation a UI can invoke, with results and
//! errors shaped for the frontend.

pub mod migration;
pub mod recording;

pub use recording::{RecorderService, RecordingDetails, RecordingStateInfo};
