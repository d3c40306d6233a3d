use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::Result;
use crate::models::{GenerationOutcome, Placeholder};

/// Surface that renders a batch.
///
/// `begin_batch` is called once with every placeholder before any request is
/// sent, then `show_outcome` once per index as items resolve, in completion
/// order.
pub trait DisplaySink: Send + Sync {
    fn begin_batch(&self, placeholders: &[Placeholder]);
    fn show_outcome(&self, outcome: &GenerationOutcome);
}

impl<A: DisplaySink, B: DisplaySink> DisplaySink for (A, B) {
    fn begin_batch(&self, placeholders: &[Placeholder]) {
        self.0.begin_batch(placeholders);
        self.1.begin_batch(placeholders);
    }

    fn show_outcome(&self, outcome: &GenerationOutcome) {
        self.0.show_outcome(outcome);
        self.1.show_outcome(outcome);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayEvent {
    Pending(Vec<Placeholder>),
    Resolved(GenerationOutcome),
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DisplayEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DisplayEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn push(&self, event: DisplayEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

impl DisplaySink for RecordingSink {
    fn begin_batch(&self, placeholders: &[Placeholder]) {
        self.push(DisplayEvent::Pending(placeholders.to_vec()));
    }

    fn show_outcome(&self, outcome: &GenerationOutcome) {
        self.push(DisplayEvent::Resolved(outcome.clone()));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn begin_batch(&self, placeholders: &[Placeholder]) {
        if let Some(first) = placeholders.first() {
            log::info!(
                "🎨 Generating {} image(s) at {}...",
                placeholders.len(),
                first.aspect_ratio
            );
        }
    }

    fn show_outcome(&self, outcome: &GenerationOutcome) {
        match outcome {
            GenerationOutcome::Success { index, image } => log::info!(
                "✅ Image {} ready: {} bytes ({})",
                index + 1,
                image.len(),
                image.content_type
            ),
            GenerationOutcome::Failure { index, reason } => {
                log::error!("❌ Image {} failed: {}", index + 1, reason)
            }
        }
    }
}

/// Saves each finished image as `ai-image-<millis>-<n>.<ext>`.
#[derive(Debug)]
pub struct DirectoryGallery {
    dir: PathBuf,
    saved: Mutex<Vec<PathBuf>>,
}

impl DirectoryGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            saved: Mutex::new(Vec::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DisplaySink for DirectoryGallery {
    fn begin_batch(&self, _placeholders: &[Placeholder]) {}

    fn show_outcome(&self, outcome: &GenerationOutcome) {
        let GenerationOutcome::Success { index, image } = outcome else {
            return;
        };

        let filename = format!(
            "ai-image-{}-{}.{}",
            Utc::now().timestamp_millis(),
            index + 1,
            image.extension()
        );
        let path = self.dir.join(filename);

        match fs::write(&path, image.bytes()) {
            Ok(()) => {
                log::info!("💾 Image saved to: {}", path.display());
                self.saved
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(path);
            }
            Err(e) => log::error!("Failed to save image {}: {}", index + 1, e),
        }
    }
}
