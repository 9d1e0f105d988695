//! Audio capture sources
//!
//! The engine only talks to [`AudioCapture`]; hosts plug in their platform
//! recorder through it.

pub mod feed;
pub mod file;
pub mod traits;

pub use feed::FeedCapture;
pub use file::FileCapture;
pub use traits::{
    choose_mime_type, extension_for_mime, ActiveCapture, AudioCapture, CaptureControl,
    CaptureError, CaptureEvent, CaptureRequest, CaptureResult,
};
