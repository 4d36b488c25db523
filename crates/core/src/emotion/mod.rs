mod classifier;
mod http;
mod tally;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use classifier::{Classification, ClassifyError, EmotionClassifier};
pub use http::HttpEmotionClassifier;
pub use tally::EmotionTally;

/// Facial emotion labels.
///
/// Declaration order is significant: it is the iteration order of every
/// emotion-keyed map in this crate and therefore the tie-break for dominant
/// label resolution (earlier wins).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    /// Case-insensitive label lookup, accepting the common adjective/noun forms
    /// classifiers emit.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" | "anger" => Some(Emotion::Angry),
            "disgust" | "disgusted" => Some(Emotion::Disgust),
            "fear" | "fearful" | "scared" => Some(Emotion::Fear),
            "happy" | "happiness" | "joy" => Some(Emotion::Happy),
            "sad" | "sadness" => Some(Emotion::Sad),
            "surprise" | "surprised" => Some(Emotion::Surprise),
            "neutral" | "calm" => Some(Emotion::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame confidence for each label, as reported by a classifier.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct EmotionDistribution {
    scores: BTreeMap<Emotion, f64>,
}

impl EmotionDistribution {
    /// Builds a distribution, rejecting negative or non-finite confidences.
    /// A label given twice keeps its last value.
    pub fn from_scores(
        scores: impl IntoIterator<Item = (Emotion, f64)>,
    ) -> Result<Self, ClassifyError> {
        let mut out = BTreeMap::new();
        for (emotion, confidence) in scores {
            if !confidence.is_finite() || confidence < 0.0 {
                return Err(ClassifyError::InvalidConfidence {
                    emotion,
                    value: confidence,
                });
            }
            out.insert(emotion, confidence);
        }
        Ok(Self { scores: out })
    }

    pub fn get(&self, emotion: Emotion) -> Option<f64> {
        self.scores.get(&emotion).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        self.scores.iter().map(|(e, c)| (*e, *c))
    }

    /// Label with the highest confidence; ties go to the earlier label.
    pub fn dominant(&self) -> Option<Emotion> {
        let mut best: Option<(Emotion, f64)> = None;
        for (emotion, confidence) in self.iter() {
            match best {
                Some((_, top)) if confidence <= top => {}
                _ => best = Some((emotion, confidence)),
            }
        }
        best.map(|(e, _)| e)
    }
}
