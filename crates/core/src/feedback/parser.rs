use crate::emotion::Emotion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PARSE_FALLBACK_TEXT: &str = "Could not parse feedback";

/// Which generation path produced a reply.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackMode {
    Face,
    Body,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("reply contains no JSON object")]
    NoObject,
    #[error("reply has no string \"feedback\" field")]
    MissingFeedback,
    #[error("reply has no \"score\" field")]
    MissingScore,
    #[error("reply score is not an integer: {0}")]
    NonIntegerScore(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedReply {
    pub feedback: String,
    /// Clamped to 0..=100.
    pub score: u8,
    /// Only read for [`FeedbackMode::Face`] replies.
    pub dominant_emotion: Option<Emotion>,
}

/// Extracts the feedback text and score from a model reply.
///
/// The reply is free text expected to contain a JSON object, possibly inside
/// a markdown fence, surrounded by prose, or nested in a wrapper object. It
/// fails when no object can be found, when `feedback` is missing or not a
/// string, or when `score` is missing or not an integer.
pub fn parse_reply(raw: &str, mode: FeedbackMode) -> Result<ParsedReply, ParseError> {
    let object = feedback_object(raw).ok_or(ParseError::NoObject)?;

    let feedback = object
        .get("feedback")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingFeedback)?
        .to_owned();

    let score = match object.get("score") {
        None => return Err(ParseError::MissingScore),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_u64().map(|v| v.min(i64::MAX as u64) as i64))
            .ok_or_else(|| ParseError::NonIntegerScore(value.to_string()))?,
    };

    let dominant_emotion = match mode {
        FeedbackMode::Face => object
            .get("dominant_emotion")
            .and_then(Value::as_str)
            .and_then(Emotion::from_label),
        FeedbackMode::Body => None,
    };

    Ok(ParsedReply {
        feedback,
        score: score.clamp(0, 100) as u8,
        dominant_emotion,
    })
}

impl ParsedReply {
    fn fallback() -> Self {
        Self {
            feedback: PARSE_FALLBACK_TEXT.to_owned(),
            score: 0,
            dominant_emotion: None,
        }
    }
}

/// Like [`parse_reply`], but an unusable reply becomes the fixed fallback
/// (`"Could not parse feedback"`, score 0).
pub fn parse_or_fallback(raw: &str, mode: FeedbackMode) -> ParsedReply {
    parse_reply(raw, mode).unwrap_or_else(|e| {
        tracing::warn!(target: "feedback::parser", ?mode, error = %e, "could not parse reply");
        ParsedReply::fallback()
    })
}

/// The first object (by position of its `{`) that has a `feedback` key, so
/// wrapper objects are looked through. Without one, the first object that
/// deserializes at all. Trailing text is ignored.
fn feedback_object(raw: &str) -> Option<Map<String, Value>> {
    let mut first = None;
    for (start, _) in raw.match_indices('{') {
        let mut values = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = values.next() {
            if map.contains_key("feedback") {
                return Some(map);
            }
            first.get_or_insert(map);
        }
    }
    first
}
