mod ffmpeg;
mod synthetic;

use bytes::Bytes;
use futures::future::BoxFuture;
use std::path::PathBuf;

pub use ffmpeg::{FfmpegFrameSource, FfmpegSourceOptions};
pub use synthetic::SyntheticFrameSource;

/// One decoded frame, packed RGB24, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSample {
    /// Presentation time in seconds from the start of the video.
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    pub pixels: Bytes,
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("video file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("could not open video file {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),
}

/// Forward-only, single-pass sequence of frames.
pub trait FrameSource: Send {
    /// Yields the next frame, or `None` once the video is exhausted.
    fn next_frame(&mut self) -> BoxFuture<'_, Option<FrameSample>>;

    /// Timestamp of the most recently yielded frame (0 before the first).
    fn position(&self) -> f64;

    fn frame_rate_hint(&self) -> Option<f64> {
        None
    }

    fn total_frames_hint(&self) -> Option<u64> {
        None
    }
}
