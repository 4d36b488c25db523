use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use url::Url;

pub const DEFAULT_VIDEO_PATH: &str = "./testvid2.mov";
pub const DEFAULT_INTERVAL_SECS: f64 = 2.0;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:5005/analyze";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_CLASSIFIER_URL: &str = "INTERVIEW_COACH_CLASSIFIER_URL";
pub const ENV_VIDEO_PATH: &str = "INTERVIEW_COACH_VIDEO";

/// Minimum spacing, in seconds of video time, between two accepted samples.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SamplingInterval(f64);

impl SamplingInterval {
    pub fn new(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidInterval(secs));
        }
        Ok(Self(secs))
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }
}

impl Default for SamplingInterval {
    fn default() -> Self {
        Self(DEFAULT_INTERVAL_SECS)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelName(String);

impl ModelName {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyModelName);
        }
        Ok(Self(v))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ModelName {
    fn default() -> Self {
        Self(DEFAULT_GEMINI_MODEL.to_owned())
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new<S: Into<String>>(value: S) -> Result<Self, ConfigError> {
        let v = value.into();
        if v.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(v))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(**redacted**)")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationConfig {
    pub api_key: ApiKey,
    pub model: ModelName,
    pub base_url: Url,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub endpoint: Url,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub video_path: PathBuf,
    pub sampling: SamplingInterval,
    /// Frames wider than this are downscaled before classification.
    pub max_frame_width: Option<u32>,
    pub generation: GenerationConfig,
    pub classifier: ClassifierConfig,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("api key must not be empty")]
    EmptyApiKey,
    #[error("missing api key: pass it on the command line or set {0}")]
    MissingApiKey(&'static str),
    #[error("model name must not be empty")]
    EmptyModelName,
    #[error("sampling interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),
    #[error("max frame width must be > 0")]
    ZeroFrameWidth,
    #[error("invalid {name} url: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_key(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<Option<ApiKey>, ConfigError> {
    match cli_value {
        Some(v) => Ok(Some(ApiKey::new(v)?)),
        None => match env.var(env_key) {
            Some(v) => Ok(Some(ApiKey::new(v)?)),
            None => Ok(None),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

pub fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

pub fn validate_frame_width(width: Option<u32>) -> Result<Option<u32>, ConfigError> {
    match width {
        Some(0) => Err(ConfigError::ZeroFrameWidth),
        other => Ok(other),
    }
}
