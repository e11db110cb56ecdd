//! Anthropic Messages wire format, shared by the direct API and Bedrock.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider::{Prompt, Role};

#[derive(Serialize)]
pub(crate) struct MessagesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Serialize)]
pub(crate) struct ApiMessage<'a> {
    pub role: &'static str,
    pub content: Vec<TextBlock<'a>>,
}

#[derive(Serialize)]
pub(crate) struct TextBlock<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
}

impl<'a> MessagesBody<'a> {
    pub(crate) fn from_prompt(prompt: &'a Prompt) -> Self {
        let messages = prompt
            .conversation()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::Assistant => "assistant",
                    Role::User | Role::System => "user",
                },
                content: vec![TextBlock {
                    kind: "text",
                    text: &m.content,
                }],
            })
            .collect();

        Self {
            anthropic_version: None,
            model: None,
            max_tokens: prompt.max_tokens,
            system: prompt.system_text(),
            messages,
            temperature: prompt.temperature,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl MessagesResponse {
    /// Concatenate every text block in order.
    pub(crate) fn into_text(self, provider: &'static str) -> Result<String, ProviderError> {
        if let Some(usage) = &self.usage {
            tracing::debug!(
                provider,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "completion usage"
            );
        }

        let text: String = self
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            Err(ProviderError::EmptyResponse)
        } else {
            Ok(text)
        }
    }
}
