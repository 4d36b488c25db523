mod parser;
mod prompts;

use crate::emotion::{Emotion, EmotionTally};
use crate::generate::TextGenerator;
use serde::{Deserialize, Serialize};

pub use parser::{
    parse_or_fallback, parse_reply, FeedbackMode, ParseError, ParsedReply, PARSE_FALLBACK_TEXT,
};
pub use prompts::{face_prompt, summary_prompt, BODY_LANGUAGE_PROMPT};

pub const NO_FACE_TEXT: &str = "No face detected";

const LOG_TARGET: &str = "feedback";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredFeedback {
    pub text: String,
    /// 0..=100
    pub score: u8,
    /// Most common emotion as named by the model, face feedback only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<Emotion>,
}

impl ScoredFeedback {
    pub fn new(text: impl Into<String>, score: u8) -> Self {
        Self {
            text: text.into(),
            score: score.min(100),
            dominant_emotion: None,
        }
    }

    pub fn with_dominant_emotion(mut self, emotion: Option<Emotion>) -> Self {
        self.dominant_emotion = emotion;
        self
    }

    fn from_reply(raw: &str, mode: FeedbackMode) -> Self {
        let reply = parse_or_fallback(raw, mode);
        Self::new(reply.feedback, reply.score).with_dominant_emotion(reply.dominant_emotion)
    }

    fn failed(text: String) -> Self {
        Self::new(text, 0)
    }
}

/// Produces scored feedback and the closing summary through a text generator.
///
/// None of the methods fail: generation and parsing errors come back as a
/// zero score with an explanatory text.
pub struct FeedbackSynthesizer<G> {
    generator: G,
}

impl<G: TextGenerator> FeedbackSynthesizer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub async fn face_feedback(&self, tally: &EmotionTally) -> ScoredFeedback {
        let Some(dominant) = tally.dominant() else {
            tracing::info!(target: LOG_TARGET, "no accepted samples, skipping face feedback");
            return ScoredFeedback::new(NO_FACE_TEXT, 0);
        };

        match self.generator.generate(face_prompt(tally, dominant)).await {
            Ok(reply) => ScoredFeedback::from_reply(&reply, FeedbackMode::Face),
            Err(e) => ScoredFeedback::failed(format!("Face analysis error: {e}")),
        }
    }

    pub async fn body_feedback(&self) -> ScoredFeedback {
        match self.generator.generate(BODY_LANGUAGE_PROMPT.to_owned()).await {
            Ok(reply) => ScoredFeedback::from_reply(&reply, FeedbackMode::Body),
            Err(e) => ScoredFeedback::failed(format!("Body analysis error: {e}")),
        }
    }

    /// The reply text is returned as is; no score is extracted.
    pub async fn summary(&self, face: &ScoredFeedback, body: &ScoredFeedback) -> String {
        match self.generator.generate(summary_prompt(face, body)).await {
            Ok(reply) => reply.trim().to_owned(),
            Err(e) => format!("Could not generate summary: {e}"),
        }
    }

    /// Face and body feedback concurrently, then the summary of both.
    pub async fn synthesize(
        &self,
        tally: &EmotionTally,
    ) -> (ScoredFeedback, ScoredFeedback, String) {
        let (face, body) = tokio::join!(self.face_feedback(tally), self.body_feedback());
        tracing::info!(
            target: LOG_TARGET,
            face_score = face.score,
            body_score = body.score,
            "feedback generated"
        );
        let summary = self.summary(&face, &body).await;
        (face, body, summary)
    }
}
