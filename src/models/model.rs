use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::HuggingFaceConfig;
use crate::error::GenError;

/// Text-to-image models served through the inference API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "stabilityai/stable-diffusion-xl-base-1.0")]
    StableDiffusionXl,
    #[serde(rename = "stabilityai/stable-diffusion-2-1")]
    StableDiffusion21,
    #[serde(rename = "prompthero/openjourney-v4")]
    OpenjourneyV4,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [
        ModelId::StableDiffusionXl,
        ModelId::StableDiffusion21,
        ModelId::OpenjourneyV4,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::StableDiffusionXl => "stabilityai/stable-diffusion-xl-base-1.0",
            ModelId::StableDiffusion21 => "stabilityai/stable-diffusion-2-1",
            ModelId::OpenjourneyV4 => "prompthero/openjourney-v4",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::StableDiffusionXl => "Stable Diffusion XL",
            ModelId::StableDiffusion21 => "Stable Diffusion 2.1",
            ModelId::OpenjourneyV4 => "Openjourney v4",
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ModelId::StableDiffusionXl | ModelId::StableDiffusion21 => "Stability AI",
            ModelId::OpenjourneyV4 => "PromptHero",
        }
    }

    /// Default tuning merged into every request for this model.
    pub fn tuning(&self) -> BTreeMap<String, TuningValue> {
        match self {
            ModelId::StableDiffusionXl | ModelId::StableDiffusion21 | ModelId::OpenjourneyV4 => {
                BTreeMap::from([
                    ("guidance_scale".to_string(), TuningValue::Float(7.5)),
                    ("num_inference_steps".to_string(), TuningValue::Int(50)),
                ])
            }
        }
    }

    pub fn descriptor(&self, config: &HuggingFaceConfig) -> ModelDescriptor {
        ModelDescriptor {
            model: *self,
            endpoint: config.endpoint_for(self.as_str()),
            extra_parameters: self.tuning(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ModelId::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| GenError::UnknownModel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TuningValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    pub model: ModelId,
    pub endpoint: String,
    pub extra_parameters: BTreeMap<String, TuningValue>,
}
