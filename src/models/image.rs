use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AspectRatio, Dimensions, ModelId};
use crate::error::{GenError, Result};

pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    1
}

impl GenerationRequest {
    pub fn new(
        model_id: impl Into<String>,
        prompt: impl Into<String>,
        aspect_ratio: AspectRatio,
        count: usize,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            aspect_ratio,
            count,
        }
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.trim()
    }

    /// Checks the request shape and resolves the model.
    pub fn validate(&self) -> Result<ModelId> {
        if self.model_id.trim().is_empty() {
            return Err(GenError::ValidationError("Please select a model".into()));
        }
        if self.prompt_text().is_empty() {
            return Err(GenError::ValidationError("Please enter a prompt".into()));
        }
        if self.count == 0 {
            return Err(GenError::ValidationError(
                "Image count must be at least 1".into(),
            ));
        }
        self.model_id.parse()
    }
}

/// Generated image as handed to a display surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    pub id: Uuid,
    pub content_type: String,
    bytes: Bytes,
}

impl ImageHandle {
    pub fn new(bytes: Bytes, content_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }

    pub fn extension(&self) -> &'static str {
        match self.content_type.split(';').next().map(str::trim) {
            Some("image/jpeg") | Some("image/jpg") => "jpg",
            Some("image/webp") => "webp",
            Some("image/gif") => "gif",
            _ => "png",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success { index: usize, image: ImageHandle },
    Failure { index: usize, reason: String },
}

impl GenerationOutcome {
    pub fn index(&self) -> usize {
        match self {
            GenerationOutcome::Success { index, .. } | GenerationOutcome::Failure { index, .. } => {
                *index
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success { .. })
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            GenerationOutcome::Success { image, .. } => Some(image),
            GenerationOutcome::Failure { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GenerationOutcome::Failure { reason, .. } => Some(reason),
            GenerationOutcome::Success { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    pub index: usize,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub model: ModelId,
    pub aspect_ratio: AspectRatio,
    pub dimensions: Dimensions,
    /// Ordered by index.
    pub outcomes: Vec<GenerationOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &ImageHandle> {
        self.outcomes.iter().filter_map(GenerationOutcome::image)
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }
}
