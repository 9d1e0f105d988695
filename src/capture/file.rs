//! File-backed capture
//!
//! Plays an already encoded audio file through the capture interface, one
//! chunk per timeslice, sized from the requested bitrate. Useful for kiosks
//! replaying a prepared answer and for exercising the pipeline without a
//! microphone.

use super::traits::{
    mime_for_extension, ActiveCapture, AudioCapture, CaptureControl, CaptureError, CaptureEvent,
    CaptureRequest, CaptureResult,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const MIN_CHUNK_BYTES: usize = 1024;

/// Capture reading pre-encoded audio from a file
pub struct FileCapture {
    path: PathBuf,
    mime_type: String,
}

impl FileCapture {
    /// The encoding is derived from the file extension
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(mime_for_extension)
            .unwrap_or("audio/webm")
            .to_string();
        Self { path, mime_type }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

fn chunk_size(request: &CaptureRequest) -> usize {
    let bytes_per_sec = request.constraints.audio_bits_per_second as u128 / 8;
    let bytes = bytes_per_sec * request.timeslice.as_millis() / 1000;
    (bytes as usize).max(MIN_CHUNK_BYTES)
}

#[async_trait]
impl AudioCapture for FileCapture {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type.split(';').next().map(str::trim) == Some(self.mime_type.as_str())
    }

    async fn start(&self, request: CaptureRequest) -> CaptureResult<ActiveCapture> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CaptureError::MicrophoneAccessDenied(format!("{}: {}", self.path.display(), e))
            }
            ErrorKind::NotFound => {
                CaptureError::DeviceUnavailable(format!("{}: {}", self.path.display(), e))
            }
            _ => CaptureError::Io(e),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let size = chunk_size(&request);
        let timeslice = request.timeslice;

        tracing::info!("Capturing from file {:?} ({} bytes per chunk)", self.path, size);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(timeslice);
            interval.tick().await;
            let mut buf = vec![0u8; size];
            let mut exhausted = false;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick(), if !exhausted => {
                        match file.read(&mut buf).await {
                            Ok(0) => exhausted = true,
                            Ok(n) => {
                                if tx.send(CaptureEvent::Data(buf[..n].to_vec())).is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(CaptureEvent::Error(e.to_string()));
                                exhausted = true;
                            }
                        }
                    }
                }
            }
        });

        Ok(ActiveCapture {
            mime_type: self.mime_type.clone(),
            events: rx,
            control: Box::new(FileControl {
                stop_tx: Some(stop_tx),
                task: Some(task),
            }),
        })
    }
}

struct FileControl {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CaptureControl for FileControl {
    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    fn release(&mut self) {
        // The reader owns the file handle; abort it only if stop never ran.
        if let Some(task) = self.task.take() {
            if self.stop_tx.is_some() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConstraints;
    use std::time::Duration;
    use tempfile::tempdir;

    fn request() -> CaptureRequest {
        CaptureRequest {
            mime_type: "audio/webm".to_string(),
            timeslice: Duration::from_millis(10),
            constraints: CaptureConstraints {
                audio_bits_per_second: 8 * 1024 * 100,
                ..CaptureConstraints::default()
            },
        }
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(FileCapture::new("answer.mp3").mime_type(), "audio/mpeg");
        assert_eq!(FileCapture::new("answer").mime_type(), "audio/webm");
        assert!(FileCapture::new("a.webm").is_type_supported("audio/webm;codecs=opus"));
        assert!(!FileCapture::new("a.webm").is_type_supported("audio/mp4"));
    }

    #[test]
    fn test_chunk_size_follows_bitrate() {
        // 100 KiB/s at a 10ms timeslice is 1 KiB
        assert_eq!(chunk_size(&request()), 1024);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable_device() {
        let dir = tempdir().unwrap();
        let capture = FileCapture::new(dir.path().join("missing.webm"));
        let err = capture.start(request()).await.err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_streams_whole_file_then_stops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("answer.webm");
        let content: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        let capture = FileCapture::new(&path);
        let mut active = capture.start(request()).await.unwrap();

        let mut received = Vec::new();
        while received.len() < content.len() {
            match active.events.recv().await {
                Some(CaptureEvent::Data(chunk)) => received.extend(chunk),
                other => panic!("unexpected event {:?}", other),
            }
        }
        active.control.stop();
        active.control.release();

        assert_eq!(received, content);
        assert_eq!(active.events.recv().await, None);
    }
}
