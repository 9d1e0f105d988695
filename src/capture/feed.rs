//! Host-fed capture
//!
//! For hosts whose platform layer owns the real recorder (a webview, a mobile
//! shell): the host forwards encoded chunks with [`FeedCapture::push_chunk`]
//! and the engine consumes them like any other capture.

use super::traits::{
    ActiveCapture, AudioCapture, CaptureControl, CaptureError, CaptureEvent, CaptureRequest,
    CaptureResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct FeedState {
    permission_denied: bool,
    sender: Option<mpsc::UnboundedSender<CaptureEvent>>,
    device_in_use: bool,
    last_request: Option<CaptureRequest>,
}

/// Capture whose chunks are pushed in by the host
#[derive(Clone, Default)]
pub struct FeedCapture {
    state: Arc<Mutex<FeedState>>,
    /// `None` means every encoding is accepted
    supported_types: Option<Arc<Vec<String>>>,
}

impl FeedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the encodings the host can produce
    pub fn with_supported_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Arc::default(),
            supported_types: Some(Arc::new(types.into_iter().map(Into::into).collect())),
        }
    }

    /// Make subsequent starts fail as if the user refused the microphone
    pub fn set_permission_denied(&self, denied: bool) {
        self.state.lock().permission_denied = denied;
    }

    /// Forward one encoded chunk. Returns false when no capture is running.
    pub fn push_chunk(&self, chunk: impl Into<Vec<u8>>) -> bool {
        self.send(CaptureEvent::Data(chunk.into()))
    }

    /// Report an encoder failure. Returns false when no capture is running.
    pub fn push_error(&self, message: impl Into<String>) -> bool {
        self.send(CaptureEvent::Error(message.into()))
    }

    pub fn is_capturing(&self) -> bool {
        self.state.lock().sender.is_some()
    }

    pub fn is_device_in_use(&self) -> bool {
        self.state.lock().device_in_use
    }

    /// The request of the most recent start
    pub fn last_request(&self) -> Option<CaptureRequest> {
        self.state.lock().last_request.clone()
    }

    fn send(&self, event: CaptureEvent) -> bool {
        match &self.state.lock().sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl AudioCapture for FeedCapture {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.supported_types {
            Some(types) => types.iter().any(|t| t == mime_type),
            None => true,
        }
    }

    async fn start(&self, request: CaptureRequest) -> CaptureResult<ActiveCapture> {
        let mut state = self.state.lock();
        if state.permission_denied {
            return Err(CaptureError::MicrophoneAccessDenied(
                "Permission denied by user".to_string(),
            ));
        }
        if state.device_in_use {
            return Err(CaptureError::DeviceUnavailable(
                "Microphone is held by another capture".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.sender = Some(tx);
        state.device_in_use = true;
        state.last_request = Some(request.clone());

        tracing::debug!("Feed capture started ({})", request.mime_type);
        Ok(ActiveCapture {
            mime_type: request.mime_type,
            events: rx,
            control: Box::new(FeedControl {
                state: self.state.clone(),
            }),
        })
    }
}

struct FeedControl {
    state: Arc<Mutex<FeedState>>,
}

impl CaptureControl for FeedControl {
    fn stop(&mut self) {
        // Dropping the sender closes the channel once queued chunks are read.
        self.state.lock().sender = None;
    }

    fn release(&mut self) {
        self.state.lock().device_in_use = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConstraints;
    use std::time::Duration;

    fn request() -> CaptureRequest {
        CaptureRequest {
            mime_type: "audio/webm".to_string(),
            timeslice: Duration::from_millis(1000),
            constraints: CaptureConstraints::default(),
        }
    }

    #[tokio::test]
    async fn test_chunks_flow_until_stop() {
        let feed = FeedCapture::new();
        assert!(!feed.push_chunk(vec![0u8]));

        let mut active = feed.start(request()).await.unwrap();
        assert!(feed.push_chunk(vec![1, 2]));
        assert!(feed.push_error("boom"));

        active.control.stop();
        assert!(!feed.push_chunk(vec![3]));

        assert_eq!(active.events.recv().await, Some(CaptureEvent::Data(vec![1, 2])));
        assert_eq!(
            active.events.recv().await,
            Some(CaptureEvent::Error("boom".to_string()))
        );
        assert_eq!(active.events.recv().await, None);

        assert!(feed.is_device_in_use());
        active.control.release();
        assert!(!feed.is_device_in_use());
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let feed = FeedCapture::new();
        feed.set_permission_denied(true);
        let err = feed.start(request()).await.err().unwrap();
        assert!(matches!(err, CaptureError::MicrophoneAccessDenied(_)));
        assert!(!feed.is_device_in_use());
    }

    #[test]
    fn test_supported_types() {
        let feed = FeedCapture::with_supported_types(["audio/mp4"]);
        assert!(feed.is_type_supported("audio/mp4"));
        assert!(!feed.is_type_supported("audio/webm"));
        assert!(FeedCapture::new().is_type_supported("anything"));
    }
}
