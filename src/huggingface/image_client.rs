use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    config::HuggingFaceConfig,
    credentials::CredentialStore,
    error::{GenError, Result, GENERIC_FAILURE_MESSAGE, INVALID_KEY_MESSAGE},
    generator::{ImageGenerator, ItemRequest},
    models::{Dimensions, ImageHandle, ModelDescriptor, ModelId},
};

/// Options sent with every call. Caching stays off so identical prompts still
/// produce fresh images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InferenceOptions {
    pub wait_for_model: bool,
    pub use_cache: bool,
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            wait_for_model: true,
            use_cache: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InferencePayload<'a> {
    pub inputs: &'a str,
    pub parameters: Map<String, Value>,
    pub options: InferenceOptions,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<Value>,
}

#[derive(Clone)]
pub struct ImageClient {
    client: Client,
    config: HuggingFaceConfig,
}

impl ImageClient {
    pub fn new(config: HuggingFaceConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GenError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HuggingFaceConfig {
        &self.config
    }

    /// Looks up the descriptor for a model id string.
    pub fn descriptor(&self, model_id: &str) -> Result<ModelDescriptor> {
        let model: ModelId = model_id.parse()?;
        Ok(model.descriptor(&self.config))
    }

    /// Width and height first, then the model's tuning on top.
    pub fn build_payload<'a>(
        descriptor: &ModelDescriptor,
        prompt: &'a str,
        dimensions: Dimensions,
    ) -> Result<InferencePayload<'a>> {
        let mut parameters = Map::new();
        parameters.insert("width".to_string(), Value::from(dimensions.width));
        parameters.insert("height".to_string(), Value::from(dimensions.height));
        for (name, value) in &descriptor.extra_parameters {
            parameters.insert(name.clone(), serde_json::to_value(value)?);
        }

        Ok(InferencePayload {
            inputs: prompt,
            parameters,
            options: InferenceOptions::default(),
        })
    }

    /// Generates a single image and returns the payload bytes untouched.
    ///
    /// A 401 clears the stored key before the error is returned.
    pub async fn generate_one(
        &self,
        model_id: &str,
        prompt: &str,
        dimensions: Dimensions,
        credentials: &dyn CredentialStore,
    ) -> Result<ImageHandle> {
        let api_key = credentials.get().ok_or(GenError::MissingCredential)?;
        let descriptor = self.descriptor(model_id)?;
        let payload = Self::build_payload(&descriptor, prompt, dimensions)?;

        log::debug!(
            "Requesting {}x{} image from {}",
            dimensions.width,
            dimensions.height,
            descriptor.endpoint
        );

        let response = self
            .client
            .post(&descriptor.endpoint)
            .bearer_auth(&api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::UNAUTHORIZED {
                credentials.clear();
                log::warn!("Inference API rejected the stored API key; key cleared");
                return Err(GenError::ServiceRejected {
                    status: status.as_u16(),
                    message: INVALID_KEY_MESSAGE.to_string(),
                });
            }

            return Err(GenError::ServiceRejected {
                status: status.as_u16(),
                message: service_error_message(&body),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?;

        log::debug!("Received {} bytes from {}", bytes.len(), model_id);

        Ok(ImageHandle::new(bytes, content_type))
    }
}

#[async_trait]
impl ImageGenerator for ImageClient {
    async fn generate_one(
        &self,
        item: ItemRequest<'_>,
        credentials: &dyn CredentialStore,
    ) -> Result<ImageHandle> {
        ImageClient::generate_one(self, item.model_id, item.prompt, item.dimensions, credentials)
            .await
            .map_err(|e| {
                log::debug!("Error generating image {}: {}", item.index + 1, e);
                e
            })
    }
}

/// Pulls the `error` field out of an error body. The API sends either a
/// string or a list of strings.
fn service_error_message(body: &str) -> String {
    let error = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error);

    let message = match error {
        Some(Value::String(message)) => message,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    };

    if message.trim().is_empty() {
        GENERIC_FAILURE_MESSAGE.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use serde_json::json;

    fn client_for(server: &mockito::Server) -> ImageClient {
        ImageClient::new(HuggingFaceConfig::new().with_base_url(server.url())).unwrap()
    }

    const SQUARE: Dimensions = Dimensions {
        width: 512,
        height: 512,
    };

    #[test]
    fn test_payload_shape() {
        let descriptor = ModelId::StableDiffusionXl.descriptor(&HuggingFaceConfig::new());
        let payload = ImageClient::build_payload(
            &descriptor,
            "a dragon on gold coins",
            Dimensions {
                width: 672,
                height: 384,
            },
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "inputs": "a dragon on gold coins",
                "parameters": {
                    "width": 672,
                    "height": 384,
                    "guidance_scale": 7.5,
                    "num_inference_steps": 50
                },
                "options": { "wait_for_model": true, "use_cache": false }
            })
        );
    }

    #[test]
    fn test_service_error_message_extraction() {
        assert_eq!(
            service_error_message(r#"{"error": "Model is currently loading"}"#),
            "Model is currently loading"
        );
        assert_eq!(
            service_error_message(r#"{"error": ["bad width", "bad height"]}"#),
            "bad width; bad height"
        );
        assert_eq!(service_error_message(r#"{"detail": "nope"}"#), GENERIC_FAILURE_MESSAGE);
        assert_eq!(service_error_message("<html>502</html>"), GENERIC_FAILURE_MESSAGE);
        assert_eq!(service_error_message(""), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_success_returns_raw_bytes() {
        let mut server = mockito::Server::new_async().await;
        let png: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";
        let mock = server
            .mock("POST", "/prompthero/openjourney-v4")
            .match_header("authorization", "Bearer hf_valid")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(json!({
                "inputs": "a cozy cabin",
                "parameters": { "width": 512, "height": 512 },
                "options": { "wait_for_model": true, "use_cache": false }
            })))
            .with_status(200)
            .with_header("content-type", "image/jpeg")
            .with_body(png)
            .create_async()
            .await;

        let store = MemoryCredentialStore::with_key("hf_valid").unwrap();
        let image = client_for(&server)
            .generate_one("prompthero/openjourney-v4", "a cozy cabin", SQUARE, &store)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.bytes(), png);
        assert_eq!(image.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/stabilityai/stable-diffusion-2-1")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "Authorization header is correct, but the token seems invalid"}"#)
            .create_async()
            .await;

        let store = MemoryCredentialStore::with_key("hf_revoked").unwrap();
        let err = client_for(&server)
            .generate_one("stabilityai/stable-diffusion-2-1", "castle", SQUARE, &store)
            .await
            .unwrap_err();

        assert!(err.is_credential_rejection());
        assert_eq!(err.to_string(), INVALID_KEY_MESSAGE);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_service_error_keeps_key() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/stabilityai/stable-diffusion-2-1")
            .with_status(503)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "Model is overloaded"}"#)
            .create_async()
            .await;

        let store = MemoryCredentialStore::with_key("hf_valid").unwrap();
        let err = client_for(&server)
            .generate_one("stabilityai/stable-diffusion-2-1", "castle", SQUARE, &store)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenError::ServiceRejected { status: 503, ref message } if message == "Model is overloaded"
        ));
        assert_eq!(store.get().as_deref(), Some("hf_valid"));
    }

    #[tokio::test]
    async fn test_missing_key_and_unknown_model_fail_before_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let client = client_for(&server);

        let empty = MemoryCredentialStore::new();
        let err = client
            .generate_one("prompthero/openjourney-v4", "castle", SQUARE, &empty)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::MissingCredential));

        let store = MemoryCredentialStore::with_key("hf_valid").unwrap();
        let err = client
            .generate_one("someone/unknown", "castle", SQUARE, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::UnknownModel(_)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let config = HuggingFaceConfig::new().with_base_url("http://127.0.0.1:1");
        let client = ImageClient::new(config).unwrap();
        let store = MemoryCredentialStore::with_key("hf_valid").unwrap();

        let err = client
            .generate_one("prompthero/openjourney-v4", "castle", SQUARE, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::NetworkFailure(_)));
    }
}
