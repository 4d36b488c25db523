mod gemini;

use crate::util::is_http_retryable;
use futures::future::BoxFuture;

pub use gemini::GeminiGenerator;

#[derive(thiserror::Error, Debug)]
pub enum GenerateError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation service returned http {0}: {1}")]
    HttpStatus(u16, String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation response contained no text")]
    EmptyResponse,
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Http(e) => e.is_timeout() || e.is_connect(),
            GenerateError::HttpStatus(status, _) => is_http_retryable(*status),
            GenerateError::InvalidResponse(_) | GenerateError::EmptyResponse => false,
        }
    }
}

/// Turns a single prompt into a single text reply.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: String) -> BoxFuture<'_, Result<String, GenerateError>>;
}
