use crate::source::{FrameSample, FrameSource, SourceError};
use bytes::Bytes;
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::download;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

const LOG_TARGET: &str = "source::ffmpeg";
const FRAME_CHANNEL_CAPACITY: usize = 8;

#[derive(Clone, Debug, Default)]
pub struct FfmpegSourceOptions {
    /// Downscale frames wider than this, keeping the aspect ratio.
    pub max_width: Option<u32>,
}

impl FfmpegSourceOptions {
    fn video_filter(&self) -> Option<String> {
        self.max_width.map(|w| format!("scale='min({w},iw)':-2"))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct StreamInfo {
    frame_rate: Option<f64>,
    total_frames: Option<u64>,
}

impl StreamInfo {
    fn from_hints(frame_rate: Option<f64>, duration_secs: Option<f64>) -> Self {
        let frame_rate = frame_rate.filter(|fps| fps.is_finite() && *fps > 0.0);
        let total_frames = match (frame_rate, duration_secs) {
            (Some(fps), Some(d)) if d.is_finite() && d > 0.0 => Some((fps * d).round() as u64),
            _ => None,
        };
        Self {
            frame_rate,
            total_frames,
        }
    }
}

/// Decodes a local video file through an ffmpeg sidecar process.
///
/// Decoding runs on a blocking thread and hands frames over a bounded channel, so
/// the decoder never runs more than a few frames ahead of the consumer. Dropping
/// the source stops the decoder and kills the ffmpeg child.
pub struct FfmpegFrameSource {
    frames: mpsc::Receiver<FrameSample>,
    position: f64,
    info: StreamInfo,
}

impl FfmpegFrameSource {
    pub async fn open(
        path: impl Into<PathBuf>,
        options: FfmpegSourceOptions,
    ) -> Result<Self, SourceError> {
        let path = path.into();
        if !path.exists() {
            return Err(SourceError::NotFound(path));
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::task::spawn_blocking(move || decode_blocking(path, options, ready_tx, frame_tx));

        let info = ready_rx.await.map_err(|_| {
            SourceError::FfmpegUnavailable("decoder thread exited before start".to_owned())
        })??;

        tracing::info!(
            target: LOG_TARGET,
            frame_rate = ?info.frame_rate,
            total_frames = ?info.total_frames,
            "video opened"
        );

        Ok(Self {
            frames: frame_rx,
            position: 0.0,
            info,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<FrameSample>> {
        async move {
            let frame = self.frames.recv().await?;
            self.position = frame.timestamp;
            Some(frame)
        }
        .boxed()
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn frame_rate_hint(&self) -> Option<f64> {
        self.info.frame_rate
    }

    fn total_frames_hint(&self) -> Option<u64> {
        self.info.total_frames
    }
}

fn spawn_decoder(
    path: &Path,
    options: &FfmpegSourceOptions,
) -> Result<(FfmpegChild, FfmpegIterator), SourceError> {
    download::auto_download().map_err(|e| SourceError::FfmpegUnavailable(e.to_string()))?;

    let mut command = FfmpegCommand::new();
    command.input(&*path.to_string_lossy());
    if let Some(filter) = options.video_filter() {
        command.args(["-vf", filter.as_str()]);
    }
    command.args(["-an"]).rawvideo();

    let mut child = command
        .spawn()
        .map_err(|e| SourceError::FfmpegUnavailable(e.to_string()))?;
    let iter = child
        .iter()
        .map_err(|e| SourceError::FfmpegUnavailable(e.to_string()))?;
    Ok((child, iter))
}

fn stop_child(child: &mut FfmpegChild) {
    // The child may already have exited; both calls are best effort.
    let _ = child.kill();
    let _ = child.wait();
}

fn decode_blocking(
    path: PathBuf,
    options: FfmpegSourceOptions,
    ready: oneshot::Sender<Result<StreamInfo, SourceError>>,
    frames: mpsc::Sender<FrameSample>,
) {
    let (mut child, mut iter) = match spawn_decoder(&path, &options) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let info = match iter.collect_metadata() {
        Ok(meta) => {
            let frame_rate = meta
                .output_streams
                .iter()
                .find_map(|s| s.video_data())
                .map(|v| f64::from(v.fps));
            StreamInfo::from_hints(frame_rate, meta.duration())
        }
        Err(e) => {
            stop_child(&mut child);
            let _ = ready.send(Err(SourceError::Unreadable {
                path,
                reason: e.to_string(),
            }));
            return;
        }
    };

    if ready.send(Ok(info)).is_err() {
        stop_child(&mut child);
        return;
    }

    let mut decoded = 0u64;
    for event in iter {
        match event {
            FfmpegEvent::OutputFrame(frame) => {
                let sample = FrameSample {
                    timestamp: f64::from(frame.timestamp),
                    width: frame.width,
                    height: frame.height,
                    pixels: Bytes::from(frame.data),
                };
                if frames.blocking_send(sample).is_err() {
                    tracing::debug!(
                        target: LOG_TARGET,
                        decoded,
                        "frame consumer gone, stopping decoder"
                    );
                    break;
                }
                decoded += 1;
            }
            FfmpegEvent::Log(LogLevel::Error, msg) | FfmpegEvent::Error(msg) => {
                tracing::warn!(target: LOG_TARGET, error = %msg, "ffmpeg reported an error");
            }
            _ => {}
        }
    }

    stop_child(&mut child);
    tracing::debug!(target: LOG_TARGET, decoded, "decoder finished");
}
