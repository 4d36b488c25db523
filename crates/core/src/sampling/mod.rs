//! Time-gated frame sampling and session-wide emotion aggregation.
//!
//! The gate opens once `min_interval` seconds of video have passed since the
//! last *accepted* sample. Only a frame classified with a face closes it again,
//! so during a stretch without a detectable face every frame is tried.

use crate::config::SamplingInterval;
use crate::emotion::{Classification, Emotion, EmotionClassifier, EmotionTally};
use crate::source::{FrameSample, FrameSource};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_TARGET: &str = "sampling";

/// Tracks when the last sample was accepted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionClock {
    last_sample_time: f64,
    min_interval: SamplingInterval,
}

impl SessionClock {
    pub fn new(min_interval: SamplingInterval) -> Self {
        Self {
            last_sample_time: 0.0,
            min_interval,
        }
    }

    /// Literal `>=` comparison against the last accepted timestamp, which
    /// starts at 0. Frames earlier than `min_interval` into the video are
    /// therefore never sampled.
    pub fn is_open(&self, timestamp: f64) -> bool {
        timestamp - self.last_sample_time >= self.min_interval.as_secs()
    }

    pub fn advance(&mut self, timestamp: f64) {
        self.last_sample_time = timestamp;
    }

    pub fn last_sample_time(&self) -> f64 {
        self.last_sample_time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Gate closed; the classifier was not called.
    Throttled,
    NoFace,
    /// The classifier failed; handled like [`SampleOutcome::NoFace`].
    ClassifierFailed,
    Accepted(Emotion),
}

/// Passed to the progress callback once per observed frame.
#[derive(Debug)]
pub struct SampleEvent<'a> {
    pub frame_index: u64,
    pub timestamp: f64,
    pub outcome: SampleOutcome,
    pub tally: &'a EmotionTally,
}

pub type ProgressFn = Box<dyn FnMut(&SampleEvent<'_>) + Send>;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_seen: u64,
    pub throttled: u64,
    pub classification_attempts: u64,
    pub no_face: u64,
    pub classifier_errors: u64,
    pub accepted: u64,
    /// Sampling was stopped before the video ended.
    pub interrupted: bool,
}

pub struct SamplingAggregator<C> {
    classifier: C,
    clock: SessionClock,
    tally: EmotionTally,
    stats: SessionStats,
    progress: Option<ProgressFn>,
}

impl<C: EmotionClassifier> SamplingAggregator<C> {
    pub fn new(classifier: C, min_interval: SamplingInterval) -> Self {
        Self {
            classifier,
            clock: SessionClock::new(min_interval),
            tally: EmotionTally::new(),
            stats: SessionStats::default(),
            progress: None,
        }
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: FnMut(&SampleEvent<'_>) + Send + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub async fn observe(&mut self, frame: FrameSample) -> SampleOutcome {
        let timestamp = frame.timestamp;
        let frame_index = self.stats.frames_seen;
        self.stats.frames_seen += 1;

        let outcome = if !self.clock.is_open(timestamp) {
            self.stats.throttled += 1;
            SampleOutcome::Throttled
        } else {
            self.stats.classification_attempts += 1;
            match self.classifier.classify(frame).await {
                Ok(Classification::Face(distribution)) => match distribution.dominant() {
                    Some(emotion) => {
                        let count = self.tally.record(emotion);
                        self.clock.advance(timestamp);
                        self.stats.accepted += 1;
                        tracing::trace!(
                            target: LOG_TARGET,
                            timestamp,
                            %emotion,
                            count,
                            "sample accepted"
                        );
                        SampleOutcome::Accepted(emotion)
                    }
                    None => {
                        self.stats.no_face += 1;
                        SampleOutcome::NoFace
                    }
                },
                Ok(Classification::NoFace) => {
                    self.stats.no_face += 1;
                    SampleOutcome::NoFace
                }
                Err(e) => {
                    self.stats.classifier_errors += 1;
                    tracing::warn!(
                        target: LOG_TARGET,
                        timestamp,
                        error = %e,
                        "classification failed, treating frame as no face"
                    );
                    SampleOutcome::ClassifierFailed
                }
            }
        };

        if let Some(progress) = self.progress.as_mut() {
            progress(&SampleEvent {
                frame_index,
                timestamp,
                outcome,
                tally: &self.tally,
            });
        }

        outcome
    }

    /// Feeds every remaining frame of `source` through [`Self::observe`].
    ///
    /// Checks `stop` before each frame; once it is set, sampling ends and the
    /// tally gathered so far stands as the result.
    pub async fn drain<S>(&mut self, source: &mut S, stop: &AtomicBool)
    where
        S: FrameSource + ?Sized,
    {
        loop {
            if stop.load(Ordering::Relaxed) {
                self.stats.interrupted = true;
                tracing::info!(
                    target: LOG_TARGET,
                    position = source.position(),
                    accepted = self.stats.accepted,
                    "sampling stopped early, keeping partial tally"
                );
                break;
            }
            let Some(frame) = source.next_frame().await else {
                break;
            };
            self.observe(frame).await;
        }
    }

    pub fn tally(&self) -> &EmotionTally {
        &self.tally
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn finish(self) -> (EmotionTally, SessionStats) {
        (self.tally, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{ClassifyError, EmotionDistribution};
    use crate::source::SyntheticFrameSource;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Copy, Debug)]
    enum Reply {
        Face(Emotion),
        NoFace,
        Fail,
    }

    /// Replays a fixed script, then answers `NoFace`; records call timestamps.
    #[derive(Clone, Default)]
    struct ScriptedClassifier {
        script: Arc<Mutex<VecDeque<Reply>>>,
        calls: Arc<Mutex<Vec<f64>>>,
    }

    impl ScriptedClassifier {
        fn new(script: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into_iter().collect())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<f64> {
            self.calls.lock().expect("lock").clone()
        }
    }

    impl EmotionClassifier for ScriptedClassifier {
        fn classify(
            &self,
            frame: FrameSample,
        ) -> BoxFuture<'_, Result<Classification, ClassifyError>> {
            self.calls.lock().expect("lock").push(frame.timestamp);
            let reply = self.script.lock().expect("lock").pop_front();
            async move {
                match reply {
                    Some(Reply::Face(emotion)) => Ok(Classification::Face(
                        EmotionDistribution::from_scores([
                            (emotion, 90.0),
                            (Emotion::Neutral, 5.0),
                        ])?,
                    )),
                    Some(Reply::Fail) => Err(ClassifyError::InvalidResponse("boom".into())),
                    Some(Reply::NoFace) | None => Ok(Classification::NoFace),
                }
            }
            .boxed()
        }
    }

    fn interval(secs: f64) -> SamplingInterval {
        SamplingInterval::new(secs).expect("positive interval")
    }

    #[test]
    fn clock_gate_is_inclusive() {
        let mut clock = SessionClock::new(interval(2.0));
        assert!(!clock.is_open(0.0));
        assert!(!clock.is_open(1.99));
        assert!(clock.is_open(2.0));
        clock.advance(2.0);
        assert!(!clock.is_open(3.5));
        assert!(clock.is_open(4.0));
    }

    #[tokio::test]
    async fn accepted_samples_respect_min_interval() {
        let classifier =
            ScriptedClassifier::new(std::iter::repeat(Reply::Face(Emotion::Happy)).take(100));
        let accepted = Arc::new(Mutex::new(Vec::new()));
        let sink = accepted.clone();
        let mut aggregator = SamplingAggregator::new(classifier.clone(), interval(1.5))
            .with_progress(move |event| {
                if let SampleOutcome::Accepted(_) = event.outcome {
                    sink.lock().expect("lock").push(event.timestamp);
                }
            });

        // 30 fps, 9 seconds.
        let mut source = SyntheticFrameSource::uniform(30.0, 270);
        aggregator.drain(&mut source, &AtomicBool::new(false)).await;

        let accepted = accepted.lock().expect("lock").clone();
        assert!(!accepted.is_empty());
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] >= 1.5, "samples too close: {pair:?}");
        }
        // Throttled frames never reach the classifier.
        assert_eq!(classifier.calls(), accepted);
        assert_eq!(aggregator.stats().frames_seen, 270);
        assert_eq!(
            aggregator.stats().throttled + aggregator.stats().classification_attempts,
            270
        );
    }

    #[tokio::test]
    async fn no_face_keeps_gate_open_for_every_following_frame() {
        let classifier = ScriptedClassifier::new([
            Reply::NoFace,
            Reply::NoFace,
            Reply::Fail,
            Reply::Face(Emotion::Sad),
        ]);
        let mut aggregator = SamplingAggregator::new(classifier.clone(), interval(2.0));
        let mut source =
            SyntheticFrameSource::from_timestamps([0.0, 1.0, 2.0, 2.1, 2.2, 2.3, 2.4, 3.0, 4.5]);
        aggregator.drain(&mut source, &AtomicBool::new(false)).await;

        // 2.0 .. 2.3 are all tried; 2.3 succeeds and closes the gate until 4.3,
        // so 4.5 is the next frame classified.
        assert_eq!(classifier.calls(), vec![2.0, 2.1, 2.2, 2.3, 4.5]);
        assert_eq!(aggregator.tally().get(Emotion::Sad), 1);
        assert_eq!(aggregator.clock().last_sample_time(), 2.3);

        let stats = aggregator.stats();
        assert_eq!(stats.no_face, 3);
        assert_eq!(stats.classifier_errors, 1);
        assert_eq!(stats.accepted, 1);
    }

    #[tokio::test]
    async fn tally_total_equals_accepted_samples() {
        let classifier = ScriptedClassifier::new([
            Reply::Face(Emotion::Happy),
            Reply::NoFace,
            Reply::Face(Emotion::Angry),
            Reply::Fail,
            Reply::Face(Emotion::Happy),
        ]);
        let mut aggregator = SamplingAggregator::new(classifier, interval(1.0));
        let mut source = SyntheticFrameSource::uniform(2.0, 20);
        aggregator.drain(&mut source, &AtomicBool::new(false)).await;

        assert_eq!(aggregator.tally().total(), aggregator.stats().accepted);
        assert_eq!(aggregator.tally().get(Emotion::Happy), 2);
        assert_eq!(aggregator.tally().get(Emotion::Angry), 1);
        assert_eq!(aggregator.tally().dominant(), Some(Emotion::Happy));
    }

    #[tokio::test]
    async fn stop_flag_ends_sampling_with_partial_tally() {
        let classifier = ScriptedClassifier::new([Reply::Face(Emotion::Fear)]);
        let mut aggregator = SamplingAggregator::new(classifier, interval(1.0));
        let mut source = SyntheticFrameSource::uniform(1.0, 10);

        for _ in 0..3 {
            let frame = source.next_frame().await.expect("frame");
            aggregator.observe(frame).await;
        }
        aggregator.drain(&mut source, &AtomicBool::new(true)).await;

        let (tally, stats) = aggregator.finish();
        assert!(stats.interrupted);
        assert_eq!(stats.frames_seen, 3);
        assert_eq!(tally.get(Emotion::Fear), 1);
    }

    #[tokio::test]
    async fn progress_called_once_per_frame() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let classifier = ScriptedClassifier::new([Reply::Face(Emotion::Surprise)]);
        let mut aggregator = SamplingAggregator::new(classifier, interval(1.0))
            .with_progress(move |event| {
                sink.lock()
                    .expect("lock")
                    .push((event.frame_index, event.outcome, event.tally.total()));
            });
        let mut source = SyntheticFrameSource::from_timestamps([0.5, 1.0, 1.5]);
        aggregator.drain(&mut source, &AtomicBool::new(false)).await;

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                (0, SampleOutcome::Throttled, 0),
                (1, SampleOutcome::Accepted(Emotion::Surprise), 1),
                (2, SampleOutcome::Throttled, 1),
            ]
        );
    }
}
