pub mod batch;
pub mod image_client;

use crate::{
    config::HuggingFaceConfig,
    credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore},
    display::DisplaySink,
    error::Result,
    models::{BatchReport, GenerationRequest},
};
use std::sync::Arc;

pub use batch::{BatchOrchestrator, BatchState};
pub use image_client::{ImageClient, InferenceOptions, InferencePayload};

#[derive(Clone)]
pub struct HuggingFaceClient {
    image_client: Arc<ImageClient>,
    batch: BatchOrchestrator,
    credentials: Arc<dyn CredentialStore>,
}

impl HuggingFaceClient {
    /// Builds a client. A key given in `config.api_key` is held in memory
    /// only, so a rejected key is never written back to disk. Without one,
    /// the key comes from `config.key_file` and `set` persists there.
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let credentials: Arc<dyn CredentialStore> = match &config.api_key {
            Some(key) => Arc::new(MemoryCredentialStore::with_key(key)?),
            None => Arc::new(FileCredentialStore::open(&config.key_file)?),
        };

        Self::with_credentials(config, credentials)
    }

    pub fn with_credentials(
        config: HuggingFaceConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        config.validate()?;

        let image_client = Arc::new(ImageClient::new(config.clone())?);
        let batch = BatchOrchestrator::new(image_client.clone(), credentials.clone(), &config);

        if credentials.get().is_none() {
            log::warn!("No Hugging Face API key configured yet");
        }

        Ok(Self {
            image_client,
            batch,
            credentials,
        })
    }

    pub fn image(&self) -> &ImageClient {
        &self.image_client
    }

    pub fn batch(&self) -> &BatchOrchestrator {
        &self.batch
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub async fn generate_batch(
        &self,
        request: &GenerationRequest,
        sink: &dyn DisplaySink,
    ) -> Result<BatchReport> {
        self.batch.generate_batch(request, sink).await
    }
}
