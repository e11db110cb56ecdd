use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, ProviderError};
use crate::provider::{LlmProvider, Prompt};

pub const DEFAULT_MODEL: &str = "o4-mini";
pub const DEFAULT_API_VERSION: &str = "2024-02-01";
const NAME: &str = "azure_openai";

/// Azure OpenAI chat-completions backend. `deployment` doubles as the model name.
#[derive(Clone)]
pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    deployment: String,
    api_version: String,
}

impl fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl AzureOpenAiProvider {
    #[must_use]
    pub fn new(api_key: String, endpoint: String, deployment: String) -> Self {
        Self {
            client: crate::http::default_client(crate::http::DEFAULT_TIMEOUT),
            api_key,
            endpoint,
            deployment,
            api_version: DEFAULT_API_VERSION.to_owned(),
        }
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = crate::http::default_client(timeout);
        self
    }

    #[must_use]
    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    fn url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.deployment,
            self.api_version
        )
    }

    async fn send(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let body = ChatBody {
            messages: prompt
                .messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
        };

        let response = self
            .client
            .post(self.url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let text = crate::http::read_success(response, NAME).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;

        if let Some(usage) = &resp.usage {
            tracing::debug!(
                provider = NAME,
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

impl LlmProvider for AzureOpenAiProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.send(prompt)
            .await
            .map_err(|e| LlmError::completion(NAME, e))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
