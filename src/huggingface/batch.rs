use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::{
    config::HuggingFaceConfig,
    credentials::CredentialStore,
    display::DisplaySink,
    error::{GenError, Result},
    generator::{ImageGenerator, ItemRequest},
    models::{
        compute_dimensions, BatchReport, Dimensions, GenerationOutcome, GenerationRequest,
        ModelId, Placeholder,
    },
};

/// Lifecycle of a single batch. Every batch walks this once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Validating,
    ValidationFailed,
    Dispatching,
    AwaitingAll,
    Completed,
}

struct BatchTracker {
    id: Uuid,
    state: BatchState,
}

impl BatchTracker {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: BatchState::Idle,
        }
    }

    fn advance(&mut self, next: BatchState) {
        log::debug!("[batch:{}] {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Fans a request out into `count` concurrent generation calls and joins them.
#[derive(Clone)]
pub struct BatchOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    credentials: Arc<dyn CredentialStore>,
    base_size: u32,
    request_timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        credentials: Arc<dyn CredentialStore>,
        config: &HuggingFaceConfig,
    ) -> Self {
        Self {
            generator,
            credentials,
            base_size: config.base_size,
            request_timeout: config.request_timeout,
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Runs every item of `request` concurrently and waits for all of them.
    ///
    /// Validation errors and a missing key are returned before the sink sees
    /// anything. After that the call always succeeds; individual failures are
    /// reported as [`GenerationOutcome::Failure`].
    pub async fn generate_batch(
        &self,
        request: &GenerationRequest,
        sink: &dyn DisplaySink,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let mut tracker = BatchTracker::new();
        let batch_id = tracker.id;

        let (model, dimensions) = self.prepare(request, &mut tracker)?;

        tracker.advance(BatchState::Dispatching);
        log::info!(
            "[batch:{}] Generating {} image(s) with {} at {}x{}",
            batch_id,
            request.count,
            model,
            dimensions.width,
            dimensions.height
        );

        let placeholders: Vec<Placeholder> = (0..request.count)
            .map(|index| Placeholder {
                index,
                aspect_ratio: request.aspect_ratio,
            })
            .collect();
        sink.begin_batch(&placeholders);

        let model_id = model.as_str();
        let prompt = request.prompt_text();
        let items = (0..request.count).map(move |index| {
            let item = ItemRequest {
                index,
                model_id,
                prompt,
                dimensions,
            };
            self.run_item(batch_id, item)
                .inspect(move |outcome| sink.show_outcome(outcome))
        });

        tracker.advance(BatchState::AwaitingAll);
        let outcomes = join_all(items).await;
        tracker.advance(BatchState::Completed);

        let report = BatchReport {
            batch_id,
            model,
            aspect_ratio: request.aspect_ratio,
            dimensions,
            outcomes,
            elapsed: started.elapsed(),
        };

        log::info!(
            "[batch:{}] Finished: {} succeeded, {} failed in {}ms",
            batch_id,
            report.success_count(),
            report.failure_count(),
            report.elapsed.as_millis()
        );

        Ok(report)
    }

    /// Same fan-out as [`generate_batch`](Self::generate_batch), but yields
    /// outcomes as they complete instead of waiting for the whole batch.
    pub fn stream_batch(
        &self,
        request: GenerationRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = GenerationOutcome> + Send>>> {
        let mut tracker = BatchTracker::new();
        let (model, dimensions) = self.prepare(&request, &mut tracker)?;

        let (tx, rx) = tokio::sync::mpsc::channel(request.count);
        let orchestrator = self.clone();

        tokio::spawn(async move {
            tracker.advance(BatchState::Dispatching);
            let batch_id = tracker.id;
            let this = &orchestrator;
            let model_id = model.as_str();
            let prompt = request.prompt_text();

            let mut pending: FuturesUnordered<_> = (0..request.count)
                .map(move |index| {
                    this.run_item(
                        batch_id,
                        ItemRequest {
                            index,
                            model_id,
                            prompt,
                            dimensions,
                        },
                    )
                })
                .collect();

            tracker.advance(BatchState::AwaitingAll);
            while let Some(outcome) = pending.next().await {
                if tx.send(outcome).await.is_err() {
                    log::warn!("[batch:{}] Receiver dropped, discarding outcome", batch_id);
                }
            }
            tracker.advance(BatchState::Completed);
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    fn prepare(
        &self,
        request: &GenerationRequest,
        tracker: &mut BatchTracker,
    ) -> Result<(ModelId, Dimensions)> {
        tracker.advance(BatchState::Validating);

        let checked = request.validate().and_then(|model| {
            if self.credentials.get().is_none() {
                Err(GenError::MissingCredential)
            } else {
                Ok(model)
            }
        });

        match checked {
            Ok(model) => Ok((model, compute_dimensions(request.aspect_ratio, self.base_size))),
            Err(e) => {
                tracker.advance(BatchState::ValidationFailed);
                log::warn!("[batch:{}] Rejected request: {}", tracker.id, e);
                Err(e)
            }
        }
    }

    async fn run_item(&self, batch_id: Uuid, item: ItemRequest<'_>) -> GenerationOutcome {
        let index = item.index;
        let call = self.generator.generate_one(item, self.credentials.as_ref());

        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GenError::Timeout(self.request_timeout)),
        };

        match result {
            Ok(image) => {
                log::debug!(
                    "[batch:{}] Image {} ready ({} bytes)",
                    batch_id,
                    index + 1,
                    image.len()
                );
                GenerationOutcome::Success { index, image }
            }
            Err(e) => {
                log::error!("[batch:{}] Error generating image {}: {}", batch_id, index + 1, e);
                GenerationOutcome::Failure {
                    index,
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::display::{DisplayEvent, RecordingSink};
    use crate::error::INVALID_KEY_MESSAGE;
    use crate::models::{AspectRatio, ImageHandle};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fails the listed indices, delays by index so completion order differs
    /// from dispatch order, counts calls and records the key each call read.
    #[derive(Default)]
    struct ScriptedGenerator {
        fail: HashSet<usize>,
        reject: HashSet<usize>,
        hang: HashSet<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        seen_keys: Mutex<Vec<(usize, Option<String>)>>,
    }

    #[async_trait]
    impl ImageGenerator for ScriptedGenerator {
        async fn generate_one(
            &self,
            item: ItemRequest<'_>,
            credentials: &dyn CredentialStore,
        ) -> Result<ImageHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_keys
                .lock()
                .unwrap()
                .push((item.index, credentials.get()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.hang.contains(&item.index) {
                std::future::pending::<()>().await;
            }
            let delay = 30 - (item.index as u64 * 10).min(30);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.reject.contains(&item.index) {
                credentials.clear();
                return Err(GenError::ServiceRejected {
                    status: 401,
                    message: INVALID_KEY_MESSAGE.into(),
                });
            }
            if self.fail.contains(&item.index) {
                return Err(GenError::ServiceRejected {
                    status: 500,
                    message: "upstream exploded".into(),
                });
            }
            Ok(ImageHandle::new(
                Bytes::from(format!("image-{}", item.index)),
                None,
            ))
        }
    }

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> BatchOrchestrator {
        let store = MemoryCredentialStore::with_key("hf_test").unwrap();
        BatchOrchestrator::new(generator, Arc::new(store), &HuggingFaceConfig::new())
    }

    fn request(count: usize) -> GenerationRequest {
        GenerationRequest::new(
            "stabilityai/stable-diffusion-xl-base-1.0",
            "A medieval castle on a floating island",
            "16/9".parse::<AspectRatio>().unwrap(),
            count,
        )
    }

    #[tokio::test]
    async fn test_every_index_resolves_once() {
        let generator = Arc::new(ScriptedGenerator::default());
        let sink = RecordingSink::new();

        let report = orchestrator(generator.clone())
            .generate_batch(&request(3), &sink)
            .await
            .unwrap();

        let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(report.success_count(), 3);
        assert_eq!(report.dimensions.width, 672);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(generator.max_in_flight.load(Ordering::SeqCst), 3);

        for outcome in &report.outcomes {
            let expected = format!("image-{}", outcome.index());
            assert_eq!(outcome.image().unwrap().bytes(), expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let generator = Arc::new(ScriptedGenerator {
            fail: HashSet::from([1]),
            ..Default::default()
        });
        let sink = RecordingSink::new();

        let report = orchestrator(generator)
            .generate_batch(&request(3), &sink)
            .await
            .unwrap();

        assert!(report.outcomes[0].is_success());
        assert_eq!(report.outcomes[1].reason(), Some("upstream exploded"));
        assert!(report.outcomes[2].is_success());
        assert_eq!(report.failure_count(), 1);
    }

    #[tokio::test]
    async fn test_placeholders_precede_outcomes() {
        let generator = Arc::new(ScriptedGenerator::default());
        let sink = RecordingSink::new();

        orchestrator(generator)
            .generate_batch(&request(3), &sink)
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 4);
        match &events[0] {
            DisplayEvent::Pending(placeholders) => {
                assert_eq!(placeholders.len(), 3);
                assert!(placeholders
                    .iter()
                    .all(|p| p.aspect_ratio.to_string() == "16/9"));
            }
            other => panic!("expected placeholders first, got {:?}", other),
        }

        // Later indices finish first, so resolution order is reversed.
        let resolved: Vec<usize> = events[1..]
            .iter()
            .map(|event| match event {
                DisplayEvent::Resolved(outcome) => outcome.index(),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(resolved, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_validation_failure_touches_nothing() {
        let generator = Arc::new(ScriptedGenerator::default());
        let sink = RecordingSink::new();
        let orchestrator = orchestrator(generator.clone());

        let mut empty_prompt = request(3);
        empty_prompt.prompt = "   ".into();
        let err = orchestrator
            .generate_batch(&empty_prompt, &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::ValidationError(_)));

        let zero = request(0);
        assert!(orchestrator.generate_batch(&zero, &sink).await.is_err());

        let mut unknown = request(2);
        unknown.model_id = "nobody/nothing".into();
        assert!(matches!(
            orchestrator.generate_batch(&unknown, &sink).await,
            Err(GenError::UnknownModel(_))
        ));

        assert!(sink.events().is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_placeholders() {
        let generator = Arc::new(ScriptedGenerator::default());
        let orchestrator = BatchOrchestrator::new(
            generator.clone(),
            Arc::new(MemoryCredentialStore::new()),
            &HuggingFaceConfig::new(),
        );
        let sink = RecordingSink::new();

        let err = orchestrator
            .generate_batch(&request(2), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::MissingCredential));
        assert!(sink.events().is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_key_is_cleared_for_next_batch() {
        let generator = Arc::new(ScriptedGenerator {
            reject: HashSet::from([0]),
            ..Default::default()
        });
        let orchestrator = orchestrator(generator.clone());
        let sink = RecordingSink::new();

        let report = orchestrator.generate_batch(&request(3), &sink).await.unwrap();
        assert_eq!(report.outcomes[0].reason(), Some(INVALID_KEY_MESSAGE));
        // Siblings had already read the key and were not cancelled.
        assert!(report.outcomes[1].is_success());
        assert!(report.outcomes[2].is_success());
        let seen = generator.seen_keys.lock().unwrap().clone();
        for index in [1, 2] {
            assert!(seen.contains(&(index, Some("hf_test".to_string()))));
        }
        assert!(orchestrator.credentials().get().is_none());

        let err = orchestrator
            .generate_batch(&request(1), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::MissingCredential));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hung_item_times_out_alone() {
        let generator = Arc::new(ScriptedGenerator {
            hang: HashSet::from([1]),
            ..Default::default()
        });
        let store = MemoryCredentialStore::with_key("hf_test").unwrap();
        let config = HuggingFaceConfig::new().with_request_timeout(Duration::from_millis(200));
        let orchestrator = BatchOrchestrator::new(generator, Arc::new(store), &config);

        let report = orchestrator
            .generate_batch(&request(3), &RecordingSink::new())
            .await
            .unwrap();

        assert!(report.outcomes[0].is_success());
        assert!(report.outcomes[1]
            .reason()
            .unwrap()
            .starts_with("Request timed out"));
        assert!(report.outcomes[2].is_success());
    }

    #[tokio::test]
    async fn test_stream_yields_every_outcome() {
        let generator = Arc::new(ScriptedGenerator {
            fail: HashSet::from([0]),
            ..Default::default()
        });
        let stream = orchestrator(generator).stream_batch(request(3)).unwrap();

        let mut outcomes: Vec<GenerationOutcome> = stream.collect().await;
        assert_eq!(outcomes.len(), 3);
        // Completion order: fastest (highest index) first.
        assert_eq!(outcomes[0].index(), 2);

        outcomes.sort_by_key(GenerationOutcome::index);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
        assert!(outcomes[2].is_success());
    }

    #[tokio::test]
    async fn test_stream_validates_up_front() {
        let generator = Arc::new(ScriptedGenerator::default());
        let mut bad = request(2);
        bad.prompt.clear();

        assert!(orchestrator(generator.clone()).stream_batch(bad).is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }
}
