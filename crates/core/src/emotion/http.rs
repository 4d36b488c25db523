use crate::emotion::{
    Classification, ClassifyError, Emotion, EmotionClassifier, EmotionDistribution,
};
use crate::source::FrameSample;
use futures::future::BoxFuture;
use futures::FutureExt;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

const LOG_TARGET: &str = "emotion::http";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Classifier backed by an HTTP emotion-recognition service.
///
/// Each frame is sent as a PNG body; the service answers with
/// `{"face_detected": bool, "emotion": {"happy": 97.1, ...}}`.
#[derive(Clone)]
pub struct HttpEmotionClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpEmotionClassifier {
    pub fn new(endpoint: Url) -> Result<Self, ClassifyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, endpoint })
    }
}

#[derive(Deserialize)]
struct ClassifierReply {
    #[serde(default = "face_detected_default")]
    face_detected: bool,
    #[serde(default)]
    emotion: BTreeMap<String, f64>,
}

fn face_detected_default() -> bool {
    true
}

impl ClassifierReply {
    fn into_classification(self) -> Result<Classification, ClassifyError> {
        if !self.face_detected {
            return Ok(Classification::NoFace);
        }

        let mut known = Vec::with_capacity(self.emotion.len());
        for (label, confidence) in self.emotion {
            match Emotion::from_label(&label) {
                Some(emotion) => known.push((emotion, confidence)),
                None => {
                    tracing::debug!(target: LOG_TARGET, %label, "ignoring unknown emotion label")
                }
            }
        }

        let distribution = EmotionDistribution::from_scores(known)?;
        if distribution.is_empty() {
            return Ok(Classification::NoFace);
        }
        Ok(Classification::Face(distribution))
    }
}

fn encode_png(frame: &FrameSample) -> Result<Vec<u8>, ClassifyError> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.pixels.len() != expected {
        return Err(ClassifyError::Encode(format!(
            "expected {expected} rgb24 bytes for {}x{}, got {}",
            frame.width,
            frame.height,
            frame.pixels.len()
        )));
    }

    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&frame.pixels, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| ClassifyError::Encode(e.to_string()))?;
    Ok(out)
}

impl EmotionClassifier for HttpEmotionClassifier {
    fn classify(&self, frame: FrameSample) -> BoxFuture<'_, Result<Classification, ClassifyError>> {
        async move {
            let body = encode_png(&frame)?;

            let response = self
                .client
                .post(self.endpoint.clone())
                .header(CONTENT_TYPE, "image/png")
                .body(body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(ClassifyError::HttpStatus(status.as_u16(), error_text));
            }

            let reply: ClassifierReply = response
                .json()
                .await
                .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;

            reply.into_classification()
        }
        .boxed()
    }
}
