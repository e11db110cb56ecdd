//! Client-side spacing of LLM calls to stay under per-minute quotas.

use std::time::Duration;

use oncoplan_llm::{LlmError, LlmProvider, Prompt};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between the starts of consecutive calls.
///
/// Slots are handed out in the order callers arrive, so concurrent callers
/// queue up behind each other rather than bursting.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl Pacer {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_start: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until this caller's slot opens.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }
        let slot = {
            let mut next = self.next_start.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };
        if slot > Instant::now() {
            tracing::debug!(
                wait_ms = slot.saturating_duration_since(Instant::now()).as_millis(),
                "pacing LLM request"
            );
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// Provider wrapper that paces every call through a [`Pacer`].
#[derive(Debug)]
pub struct Paced<P> {
    inner: P,
    pacer: Pacer,
}

impl<P: LlmProvider> Paced<P> {
    #[must_use]
    pub fn new(inner: P, interval: Duration) -> Self {
        Self {
            inner,
            pacer: Pacer::new(interval),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &P {
        &self.inner
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.pacer.interval()
    }
}

impl<P: LlmProvider> LlmProvider for Paced<P> {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.pacer.wait().await;
        self.inner.complete(prompt).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
