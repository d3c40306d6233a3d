use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GenError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";
pub const DEFAULT_BASE_SIZE: u32 = 512;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_KEY_FILE: &str = ".hfgen/hf_key";

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub base_size: u32,
    pub request_timeout: Duration,
    /// Where a key saved with `set-key` is kept between runs.
    pub key_file: PathBuf,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        HuggingFaceConfig {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            base_size: DEFAULT_BASE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
        }
    }
}

impl HuggingFaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `HF_API_KEY`, `HF_API_BASE_URL`, `HF_BASE_SIZE`,
    /// `HF_REQUEST_TIMEOUT_SECS` and `HF_KEY_FILE`, keeping defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = env::var("HF_API_KEY")
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        let base_url = env::var("HF_API_BASE_URL").unwrap_or(defaults.base_url);
        let base_size = env::var("HF_BASE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.base_size);
        let request_timeout = env::var("HF_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);
        let key_file = env::var("HF_KEY_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.key_file);

        HuggingFaceConfig {
            api_key,
            base_url,
            base_size,
            request_timeout,
            key_file,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_base_size(mut self, base_size: u32) -> Self {
        self.base_size = base_size;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = path.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(GenError::ConfigError("Inference base URL is required".into()));
        }
        if self.base_size < 16 {
            return Err(GenError::ConfigError(format!(
                "Base size must be at least 16, got {}",
                self.base_size
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(GenError::ConfigError(
                "Request timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Endpoint for a model path such as `stabilityai/stable-diffusion-2-1`.
    pub fn endpoint_for(&self, model_path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), model_path)
    }
}
