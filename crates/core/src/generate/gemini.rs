use crate::config::{ApiKey, GenerationConfig, ModelName};
use crate::generate::{GenerateError, TextGenerator};
use crate::util::{retry_with_backoff, RetryConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const LOG_TARGET: &str = "generate::gemini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Text generation through the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: ApiKey,
    model: ModelName,
    base_url: Url,
    retry: RetryConfig,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String, GenerateError> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerateError::EmptyResponse);
        }
        Ok(text)
    }
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerateError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.as_str().trim_end_matches('/'),
            self.model.as_str()
        )
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, GenerateError> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerateError::HttpStatus(status.as_u16(), error_text));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::InvalidResponse(e.to_string()))?;

        body.into_text()
    }
}

impl TextGenerator for GeminiGenerator {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String, GenerateError>> {
        async move {
            let this = self;
            let prompt = prompt.as_str();
            tracing::debug!(
                target: LOG_TARGET,
                model = %this.model.as_str(),
                prompt_chars = prompt.len(),
                "requesting generation"
            );

            let result = retry_with_backoff(
                &this.retry,
                move || this.generate_once(prompt),
                GenerateError::is_retryable,
            )
            .await;

            if let Err(e) = &result {
                tracing::warn!(target: LOG_TARGET, error = %e, "generation failed");
            }
            result
        }
        .boxed()
    }
}
