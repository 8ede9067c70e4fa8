//! Scripted generation backend for tests and development.

use super::{GenerationRequest, Generator};
use crate::error::GenerationError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A mock generator that replays queued outcomes in order.
///
/// Once the queue is drained every call returns the fallback text. Every
/// prompt it receives is recorded for inspection.
pub struct MockGenerator {
    model: String,
    outcomes: Mutex<Vec<Result<String, GenerationError>>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            outcomes: Mutex::new(Vec::new()),
            fallback: "I'm a mock generator. No queued responses available.".to_string(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockGenerator that always answers with `text`.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Queue a successful answer for the next call.
    pub fn queue_response(&self, text: &str) {
        self.lock_outcomes().push(Ok(text.to_string()));
    }

    /// Queue a failure for the next call.
    pub fn queue_error(&self, err: GenerationError) {
        self.lock_outcomes().push(Err(err));
    }

    /// Number of `generate` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, Vec<Result<String, GenerationError>>> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.prompt.clone());

        let mut outcomes = self.lock_outcomes();
        if outcomes.is_empty() {
            Ok(self.fallback.clone())
        } else {
            outcomes.remove(0)
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
