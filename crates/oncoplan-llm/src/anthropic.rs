use std::fmt;
use std::time::Duration;

use crate::error::{LlmError, ProviderError};
use crate::messages::{MessagesBody, MessagesResponse};
use crate::provider::{LlmProvider, Prompt};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20240620";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const NAME: &str = "anthropic";

/// Direct Anthropic Messages API backend.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: crate::http::default_client(crate::http::DEFAULT_TIMEOUT),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = crate::http::default_client(timeout);
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let mut body = MessagesBody::from_prompt(prompt);
        body.model = Some(&self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let text = crate::http::read_success(response, NAME).await?;
        let resp: MessagesResponse = serde_json::from_str(&text)?;
        resp.into_text(NAME)
    }
}

impl LlmProvider for AnthropicProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.send(prompt)
            .await
            .map_err(|e| LlmError::completion(NAME, e))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
