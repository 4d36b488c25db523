use crate::config::{AppConfig, SamplingInterval};
use crate::emotion::{Emotion, EmotionClassifier, EmotionTally};
use crate::feedback::{FeedbackSynthesizer, ScoredFeedback};
use crate::generate::TextGenerator;
use crate::sampling::{SampleEvent, SampleOutcome, SamplingAggregator, SessionStats};
use crate::source::{FfmpegFrameSource, FfmpegSourceOptions, FrameSource, SourceError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const LOG_TARGET: &str = "pipeline";
const PROGRESS_LOG_EVERY: u64 = 250;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub video_path: PathBuf,
    pub sampling: SamplingInterval,
    pub max_frame_width: Option<u32>,
}

impl PipelineConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            video_path: app.video_path.clone(),
            sampling: app.sampling,
            max_frame_width: app.max_frame_width,
        }
    }
}

/// Everything one run produces.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SessionResult {
    pub face_feedback: ScoredFeedback,
    pub body_feedback: ScoredFeedback,
    pub summary: String,
    pub tally: EmotionTally,
    pub stats: SessionStats,
}

impl SessionResult {
    pub fn dominant_emotion(&self) -> Option<Emotion> {
        self.tally.dominant()
    }
}

impl fmt::Display for SessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Facial Score: {}/100", self.face_feedback.score)?;
        writeln!(f, "Facial Feedback: {}", self.face_feedback.text)?;
        writeln!(f)?;
        writeln!(f, "Body Language Score: {}/100", self.body_feedback.score)?;
        writeln!(f, "Body Feedback: {}", self.body_feedback.text)?;
        writeln!(f)?;
        writeln!(f, "=== Overall Performance Summary ===")?;
        write!(f, "{}", self.summary)
    }
}

/// One isolated analysis run: sample the video, aggregate, then generate
/// feedback.
pub struct Pipeline<C, G> {
    pub classifier: C,
    pub generator: G,
    pub config: PipelineConfig,
    /// Set to end sampling early; feedback is still generated from the
    /// partial tally.
    pub stop: Arc<AtomicBool>,
}

impl<C, G> Pipeline<C, G>
where
    C: EmotionClassifier,
    G: TextGenerator,
{
    pub fn new(classifier: C, generator: G, config: PipelineConfig) -> Self {
        Self {
            classifier,
            generator,
            config,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Decodes `config.video_path` with ffmpeg and runs the session.
    ///
    /// Only a missing or unreadable video fails the run; every later error
    /// degrades into the result.
    pub async fn run(self) -> Result<SessionResult, PipelineError> {
        let options = FfmpegSourceOptions {
            max_width: self.config.max_frame_width,
        };
        let source = FfmpegFrameSource::open(self.config.video_path.clone(), options).await?;
        Ok(self.run_with_source(source).await)
    }

    pub async fn run_with_source<S: FrameSource>(self, mut source: S) -> SessionResult {
        let Pipeline {
            classifier,
            generator,
            config,
            stop,
        } = self;

        tracing::info!(
            target: LOG_TARGET,
            video = %config.video_path.display(),
            interval_secs = config.sampling.as_secs(),
            fps = ?source.frame_rate_hint(),
            total_frames = ?source.total_frames_hint(),
            "sampling started"
        );

        let mut aggregator = SamplingAggregator::new(classifier, config.sampling)
            .with_progress(progress_logger(source.total_frames_hint()));
        aggregator.drain(&mut source, &stop).await;
        // Release the decoder before the slow generation calls.
        drop(source);

        let (tally, stats) = aggregator.finish();
        tracing::info!(
            target: LOG_TARGET,
            frames = stats.frames_seen,
            attempts = stats.classification_attempts,
            accepted = stats.accepted,
            no_face = stats.no_face,
            classifier_errors = stats.classifier_errors,
            interrupted = stats.interrupted,
            tally = %tally,
            "sampling finished"
        );

        let synthesizer = FeedbackSynthesizer::new(generator);
        let (face_feedback, body_feedback, summary) = synthesizer.synthesize(&tally).await;

        SessionResult {
            face_feedback,
            body_feedback,
            summary,
            tally,
            stats,
        }
    }
}

fn progress_logger(total_frames: Option<u64>) -> impl FnMut(&SampleEvent<'_>) + Send + 'static {
    move |event: &SampleEvent<'_>| {
        if let SampleOutcome::Accepted(emotion) = event.outcome {
            tracing::debug!(
                target: LOG_TARGET,
                timestamp = event.timestamp,
                %emotion,
                tally = %event.tally,
                "sample"
            );
        }

        let seen = event.frame_index + 1;
        if seen % PROGRESS_LOG_EVERY != 0 {
            return;
        }
        match total_frames {
            Some(total) if total > 0 => tracing::info!(
                target: LOG_TARGET,
                frames = seen,
                total,
                percent = (seen * 100 / total).min(100),
                samples = event.tally.total(),
                "sampling progress"
            ),
            _ => tracing::info!(
                target: LOG_TARGET,
                frames = seen,
                samples = event.tally.total(),
                "sampling progress"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{Classification, ClassifyError};
    use crate::generate::GenerateError;
    use crate::source::FrameSample;
    use futures::future::BoxFuture;

    fn result() -> SessionResult {
        SessionResult {
            face_feedback: ScoredFeedback::new("Relax your jaw.", 72),
            body_feedback: ScoredFeedback::new("1. Sit upright.", 65),
            summary: "Nice work overall.".to_owned(),
            tally: EmotionTally::from_counts([(Emotion::Neutral, 4), (Emotion::Happy, 1)]),
            stats: SessionStats::default(),
        }
    }

    #[test]
    fn report_layout() {
        let expected = "\nFacial Score: 72/100\nFacial Feedback: Relax your jaw.\n\n\
            Body Language Score: 65/100\nBody Feedback: 1. Sit upright.\n\n\
            === Overall Performance Summary ===\nNice work overall.";
        assert_eq!(result().to_string(), expected);
    }

    #[test]
    fn json_report_has_labelled_tally() {
        let json = serde_json::to_value(result()).expect("json");
        assert_eq!(json["tally"]["neutral"], 4);
        assert_eq!(json["face_feedback"]["score"], 72);
        assert_eq!(json["stats"]["interrupted"], false);
    }

    #[test]
    fn dominant_emotion_comes_from_tally() {
        assert_eq!(result().dominant_emotion(), Some(Emotion::Neutral));
    }

    #[tokio::test]
    async fn missing_video_fails_the_run() {
        struct Unused;
        impl EmotionClassifier for Unused {
            fn classify(
                &self,
                _frame: FrameSample,
            ) -> BoxFuture<'_, Result<Classification, ClassifyError>> {
                unreachable!("no frames are decoded")
            }
        }
        impl TextGenerator for Unused {
            fn generate(&self, _prompt: String) -> BoxFuture<'_, Result<String, GenerateError>> {
                unreachable!("no generation after an asset error")
            }
        }

        let config = PipelineConfig {
            video_path: PathBuf::from("./no/such/video.mov"),
            sampling: SamplingInterval::default(),
            max_frame_width: None,
        };
        let err = Pipeline::new(Unused, Unused, config).run().await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::NotFound(_))));
    }
}
