use crate::emotion::{Emotion, EmotionTally};
use crate::feedback::ScoredFeedback;

pub const BODY_LANGUAGE_PROMPT: &str = r#"Provide general body language feedback for video presentations.
Include 3-5 concise tips about posture, gestures, and eye contact.
Reply with a single JSON object in exactly this shape:
{
    "feedback": "1. Maintain upright posture...",
    "score": 70
}"#;

pub fn face_prompt(tally: &EmotionTally, dominant: Emotion) -> String {
    format!(
        r#"Analyze these facial expression counts from a recorded presentation: {counts}
Each count is the number of sampled moments where that emotion dominated.

Generate JSON-formatted feedback with:
1. A score (0-100) based on emotional expressiveness and appropriateness
2. Concise feedback on improving facial expressions
3. Most common emotion: {dominant}

Reply with a single JSON object in exactly this shape:
{{
    "score": 75,
    "feedback": "Your frequent neutral expressions...",
    "dominant_emotion": "{dominant}"
}}"#,
        counts = tally.to_json(),
    )
}

pub fn summary_prompt(face: &ScoredFeedback, body: &ScoredFeedback) -> String {
    format!(
        r#"Create a concise overall performance summary (50-75 words) using these metrics:

Facial Analysis:
- Score: {face_score}/100
- Feedback: {face_text}

Body Language:
- Score: {body_score}/100
- Feedback: {body_text}

Provide a brief, encouraging summary that:
1. Highlights strengths and areas for improvement
2. Mentions both facial and body language aspects
3. Gives an overall performance score
4. Maintains a positive, constructive tone"#,
        face_score = face.score,
        face_text = face.text,
        body_score = body.score,
        body_text = body.text,
    )
}
