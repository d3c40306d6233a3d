use async_trait::async_trait;

use crate::{
    credentials::CredentialStore,
    error::Result,
    models::{Dimensions, ImageHandle},
};

/// One item of a batch as seen by a backend.
#[derive(Debug, Clone, Copy)]
pub struct ItemRequest<'a> {
    pub index: usize,
    pub model_id: &'a str,
    pub prompt: &'a str,
    pub dimensions: Dimensions,
}

/// Backend able to produce a single image.
///
/// Implementations read the key from `credentials` on every call and are
/// responsible for clearing it when the service rejects it.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_one(
        &self,
        item: ItemRequest<'_>,
        credentials: &dyn CredentialStore,
    ) -> Result<ImageHandle>;
}
