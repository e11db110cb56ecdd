use crate::anthropic::AnthropicProvider;
use crate::azure::AzureOpenAiProvider;
use crate::bedrock::BedrockProvider;
use crate::error::LlmError;
#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::provider::{LlmProvider, Prompt};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Bedrock($p) => $expr,
            AnyProvider::AzureOpenAi($p) => $expr,
            AnyProvider::Anthropic($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    Bedrock(BedrockProvider),
    AzureOpenAi(AzureOpenAiProvider),
    Anthropic(AnthropicProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.complete(prompt).await)
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }
}
