use crate::source::{FrameSample, FrameSource};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;

const SYNTHETIC_WIDTH: u32 = 2;
const SYNTHETIC_HEIGHT: u32 = 2;

/// In-memory source of blank frames at caller-chosen timestamps.
#[derive(Clone, Debug)]
pub struct SyntheticFrameSource {
    pending: VecDeque<f64>,
    position: f64,
    frame_rate: Option<f64>,
    total: u64,
}

impl SyntheticFrameSource {
    pub fn from_timestamps(timestamps: impl IntoIterator<Item = f64>) -> Self {
        let pending: VecDeque<f64> = timestamps.into_iter().collect();
        let total = pending.len() as u64;
        Self {
            pending,
            position: 0.0,
            frame_rate: None,
            total,
        }
    }

    /// `frame_count` frames spaced `1 / fps` apart, starting at t = 0.
    pub fn uniform(fps: f64, frame_count: u64) -> Self {
        let step = if fps > 0.0 { 1.0 / fps } else { 0.0 };
        let mut source = Self::from_timestamps((0..frame_count).map(|i| i as f64 * step));
        source.frame_rate = Some(fps).filter(|f| *f > 0.0);
        source
    }

    fn blank_frame(timestamp: f64) -> FrameSample {
        let len = (SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT * 3) as usize;
        FrameSample {
            timestamp,
            width: SYNTHETIC_WIDTH,
            height: SYNTHETIC_HEIGHT,
            pixels: Bytes::from(vec![0u8; len]),
        }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<FrameSample>> {
        let next = self.pending.pop_front();
        if let Some(ts) = next {
            self.position = ts;
        }
        async move { next.map(Self::blank_frame) }.boxed()
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn frame_rate_hint(&self) -> Option<f64> {
        self.frame_rate
    }

    fn total_frames_hint(&self) -> Option<u64> {
        Some(self.total)
    }
}
