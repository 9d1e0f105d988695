//! Capture session slot
//!
//! The engine owns exactly one slot. It is reserved synchronously on entry to
//! `start_recording`, so a second start is rejected before any await point.

use super::state::{RecorderState, Recording, RecordingStatus};
use crate::capture::CaptureControl;
use std::time::Instant;

/// State of the single in-flight capture
pub struct CaptureSession {
    pub recording: Recording,
    pub started_at: Instant,
    pub finalizing: bool,
    /// Taken when the capture is stopped
    pub control: Option<Box<dyn CaptureControl>>,
}

impl CaptureSession {
    pub fn new(recording: Recording, control: Box<dyn CaptureControl>) -> Self {
        Self {
            recording,
            started_at: Instant::now(),
            finalizing: false,
            control: Some(control),
        }
    }

    /// Stop the encoder and give the microphone back
    ///
    /// Safe to call more than once.
    pub fn end_capture(&mut self) {
        if let Some(mut control) = self.control.take() {
            control.stop();
            control.release();
        }
        self.finalizing = true;
        if self.recording.status == RecordingStatus::Recording {
            self.recording.status = RecordingStatus::Processing;
        }
    }
}

#[derive(Default)]
pub enum SessionSlot {
    #[default]
    Empty,
    /// A start is waiting for the microphone
    Reserved,
    Occupied(CaptureSession),
}

impl SessionSlot {
    pub fn state(&self) -> RecorderState {
        match self {
            SessionSlot::Empty => RecorderState::Idle,
            SessionSlot::Reserved => RecorderState::Recording,
            SessionSlot::Occupied(session) if session.finalizing => RecorderState::Finalizing,
            SessionSlot::Occupied(_) => RecorderState::Recording,
        }
    }

    /// Claim the slot, failing if anything occupies it
    pub fn try_reserve(&mut self) -> bool {
        if matches!(self, SessionSlot::Empty) {
            *self = SessionSlot::Reserved;
            true
        } else {
            false
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut CaptureSession> {
        match self {
            SessionSlot::Occupied(session) => Some(session),
            _ => None,
        }
    }

    pub fn recording(&self) -> Option<&Recording> {
        match self {
            SessionSlot::Occupied(session) => Some(&session.recording),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::state::AudioMetadata;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingControl {
        stops: Arc<AtomicUsize>,
        releases: Arc<AtomicUsize>,
    }

    impl CaptureControl for CountingControl {
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn recording() -> Recording {
        Recording {
            id: "recording_1_a".to_string(),
            session_id: "s".to_string(),
            job_title: "t".to_string(),
            company_name: "c".to_string(),
            timestamp: Utc::now(),
            duration: 0,
            questions: vec![],
            status: RecordingStatus::Recording,
            metadata: AudioMetadata {
                file_size: 0,
                mime_type: "audio/webm".to_string(),
                sample_rate: None,
                channels: None,
            },
        }
    }

    #[test]
    fn test_reserve_once() {
        let mut slot = SessionSlot::default();
        assert_eq!(slot.state(), RecorderState::Idle);
        assert!(slot.try_reserve());
        assert!(!slot.try_reserve());
        assert_eq!(slot.state(), RecorderState::Recording);
    }

    #[test]
    fn test_end_capture_is_idempotent() {
        let control = CountingControl::default();
        let stops = control.stops.clone();
        let releases = control.releases.clone();

        let mut slot = SessionSlot::Occupied(CaptureSession::new(recording(), Box::new(control)));
        let session = slot.session_mut().unwrap();
        session.end_capture();
        session.end_capture();

        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert_eq!(slot.state(), RecorderState::Finalizing);
        assert_eq!(slot.recording().unwrap().status, RecordingStatus::Processing);
    }
}
