use crate::emotion::{Emotion, EmotionDistribution};
use crate::source::FrameSample;
use futures::future::BoxFuture;

#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    Face(EmotionDistribution),
    NoFace,
}

#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned http {0}: {1}")]
    HttpStatus(u16, String),

    #[error("invalid classifier response: {0}")]
    InvalidResponse(String),

    #[error("invalid confidence {value} for {emotion}")]
    InvalidConfidence { emotion: Emotion, value: f64 },

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

/// Maps a single frame to an emotion distribution, or reports that no face
/// was found.
pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, frame: FrameSample) -> BoxFuture<'_, Result<Classification, ClassifyError>>;
}
