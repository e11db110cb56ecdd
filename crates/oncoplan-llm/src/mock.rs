//! Test-only mock LLM provider.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{LlmError, ProviderError};
use crate::provider::{LlmProvider, Prompt};

type Handler = Arc<dyn Fn(&Prompt) -> String + Send + Sync>;

#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    handler: Option<Handler>,
    recorded: Arc<Mutex<Vec<Prompt>>>,
    calls: Arc<AtomicUsize>,
    pub default_response: String,
    pub fail_complete: bool,
    /// Zero-based call numbers that fail.
    pub fail_on_calls: Vec<usize>,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider")
            .field("default_response", &self.default_response)
            .field("fail_complete", &self.fail_complete)
            .field("fail_on_calls", &self.fail_on_calls)
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            handler: None,
            recorded: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            fail_complete: false,
            fail_on_calls: Vec::new(),
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// Answer every prompt with `response`.
    #[must_use]
    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            ..Self::default()
        }
    }

    /// Compute each answer from the prompt, independent of call order.
    #[must_use]
    pub fn with_handler(handler: impl Fn(&Prompt) -> String + Send + Sync + 'static) -> Self {
        Self {
            handler: Some(Arc::new(handler)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_complete: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_on(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_on_calls = calls.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Every prompt received so far, in arrival order.
    #[must_use]
    pub fn recorded_prompts(&self) -> Vec<Prompt> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmProvider for MockProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.clone());

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_complete || self.fail_on_calls.contains(&call) {
            return Err(LlmError::completion(
                "mock",
                ProviderError::Other("mock LLM error".into()),
            ));
        }
        if let Some(handler) = &self.handler {
            return Ok(handler(prompt));
        }
        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
