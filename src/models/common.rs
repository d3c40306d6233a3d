use serde::{Deserialize, Serialize};

use super::model::ModelId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

impl From<ModelId> for ModelInfo {
    fn from(model: ModelId) -> Self {
        Self {
            id: model.as_str().to_string(),
            name: model.display_name().to_string(),
            provider: model.provider().to_string(),
        }
    }
}

/// Every registered image model.
pub fn supported_models() -> Vec<ModelInfo> {
    ModelId::ALL.into_iter().map(ModelInfo::from).collect()
}
