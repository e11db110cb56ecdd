use std::fmt;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::config::retry::RetryConfig;
use aws_sdk_bedrockruntime::config::timeout::TimeoutConfig;
use aws_sdk_bedrockruntime::config::{Credentials, Region};
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use tokio::sync::OnceCell;

use crate::error::{LlmError, ProviderError};
use crate::messages::{MessagesBody, MessagesResponse};
use crate::provider::{LlmProvider, Prompt};

pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_MODEL: &str = "eu.anthropic.claude-3-5-sonnet-20240620-v1:0";
const BEDROCK_VERSION: &str = "bedrock-2023-05-31";
const NAME: &str = "bedrock";

/// AWS Bedrock runtime backend invoking Anthropic models.
///
/// Credentials come from the standard AWS chain (environment, shared
/// credentials and config files, `AWS_PROFILE`, SSO, container and instance
/// roles) unless static keys are supplied. The SDK client is built on the
/// first call, so nothing is resolved at construction.
#[derive(Clone)]
pub struct BedrockProvider {
    client: OnceCell<Client>,
    credentials: Option<Credentials>,
    region: String,
    model: String,
    endpoint: Option<String>,
    timeout: Duration,
}

impl fmt::Debug for BedrockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BedrockProvider")
            .field(
                "credentials",
                &self.credentials.as_ref().map_or("<aws chain>", |_| "<static>"),
            )
            .field("region", &self.region)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BedrockProvider {
    #[must_use]
    pub fn new(region: String, model: String) -> Self {
        Self {
            client: OnceCell::new(),
            credentials: None,
            region,
            model,
            endpoint: None,
            timeout: crate::http::DEFAULT_TIMEOUT,
        }
    }

    /// Sign with these keys instead of the AWS credential chain.
    #[must_use]
    pub fn with_static_credentials(
        mut self,
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(
            access_key_id,
            secret_access_key,
            session_token,
            None,
            "oncoplan",
        ));
        self
    }

    /// Replace `https://bedrock-runtime.{region}.amazonaws.com` with another base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn has_static_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                let mut loader = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()));
                if let Some(credentials) = &self.credentials {
                    loader = loader.credentials_provider(credentials.clone());
                }
                let shared = loader.load().await;

                let mut config = aws_sdk_bedrockruntime::config::Builder::from(&shared)
                    .retry_config(RetryConfig::disabled())
                    .timeout_config(
                        TimeoutConfig::builder()
                            .connect_timeout(Duration::from_secs(30))
                            .operation_timeout(self.timeout)
                            .build(),
                    );
                if let Some(endpoint) = &self.endpoint {
                    config = config.endpoint_url(endpoint.clone());
                }
                tracing::debug!(region = %self.region, model = %self.model, "bedrock client ready");
                Client::from_conf(config.build())
            })
            .await
    }

    async fn send(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let mut body = MessagesBody::from_prompt(prompt);
        body.anthropic_version = Some(BEDROCK_VERSION);
        let payload = serde_json::to_vec(&body)?;

        let output = self
            .client()
            .await
            .invoke_model()
            .model_id(&self.model)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(invoke_error)?;

        let resp: MessagesResponse = serde_json::from_slice(output.body().as_ref())?;
        resp.into_text(NAME)
    }
}

fn invoke_error(err: SdkError<InvokeModelError>) -> ProviderError {
    if err
        .as_service_error()
        .is_some_and(InvokeModelError::is_throttling_exception)
    {
        tracing::warn!(provider = NAME, "rate limited");
        return ProviderError::RateLimited;
    }
    let detail = DisplayErrorContext(&err).to_string();
    match err.raw_response().map(|r| r.status().as_u16()) {
        Some(429) => {
            tracing::warn!(provider = NAME, "rate limited");
            ProviderError::RateLimited
        }
        Some(status) => {
            tracing::error!(provider = NAME, "API error {status}: {detail}");
            ProviderError::Status {
                status,
                body: detail,
            }
        }
        None => ProviderError::Sdk(detail),
    }
}

impl LlmProvider for BedrockProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        self.send(prompt)
            .await
            .map_err(|e| LlmError::completion(NAME, e))
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
