//! Image gallery generation on top of the Hugging Face Inference API.
//!
//! A [`GenerationRequest`] is validated, turned into `count` concurrent
//! calls by the [`BatchOrchestrator`], and every item is reported to a
//! [`DisplaySink`] on its own, so one failing image never takes the others
//! down with it.

pub mod config;
pub mod credentials;
pub mod display;
pub mod error;
pub mod generator;
pub mod huggingface;
pub mod logger;
pub mod models;

pub use config::HuggingFaceConfig;
pub use credentials::{
    validate_api_key, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use display::{DirectoryGallery, DisplayEvent, DisplaySink, LogSink, RecordingSink};
pub use error::{ErrorKind, GenError, Result};
pub use generator::{ImageGenerator, ItemRequest};
pub use huggingface::{BatchOrchestrator, BatchState, HuggingFaceClient, ImageClient};
pub use models::{
    compute_dimensions, supported_models, AspectRatio, BatchReport, Dimensions,
    GenerationOutcome, GenerationRequest, ImageHandle, ModelDescriptor, ModelId, ModelInfo,
    Placeholder, TuningValue,
};
