//! Application bootstrap: config resolution, secrets, provider construction.

use std::path::{Path, PathBuf};

use oncoplan_llm::{AnyProvider, LlmError, LlmProvider};
use oncoplan_llm::anthropic::AnthropicProvider;
use oncoplan_llm::azure::AzureOpenAiProvider;
use oncoplan_llm::bedrock::BedrockProvider;

use crate::config::{Config, ProviderKind};
use crate::pacing::Paced;
use crate::vault::{EnvVaultProvider, Secret, VaultProvider};

pub const CONFIG_ENV_VAR: &str = "ONCOPLAN_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "oncoplan.toml";

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Load config from `path` and resolve credentials from the environment.
    ///
    /// Range checks are left to [`Config::validate`], which callers run once
    /// command-line overrides have been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read or parsed.
    pub async fn load(path: PathBuf) -> anyhow::Result<Self> {
        Self::load_with_vault(path, &EnvVaultProvider).await
    }

    /// # Errors
    ///
    /// See [`AppBuilder::load`].
    pub async fn load_with_vault(
        path: PathBuf,
        vault: &dyn VaultProvider,
    ) -> anyhow::Result<Self> {
        let mut config = Config::load(&path)?;
        config.resolve_secrets(vault).await?;
        tracing::debug!(
            path = %path.display(),
            provider = %config.llm.provider,
            "configuration loaded"
        );
        Ok(Self {
            config,
            config_path: path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Build the selected backend wrapped in the configured request pacing.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MissingConfig`] when a required credential or
    /// endpoint is absent.
    pub fn build_provider(&self) -> Result<Paced<AnyProvider>, LlmError> {
        let provider = create_provider(&self.config)?;
        let delay = self.config.request_delay();
        tracing::info!(
            provider = provider.name(),
            delay_secs = delay.as_secs(),
            "LLM provider ready"
        );
        Ok(Paced::new(provider, delay))
    }
}

/// Priority: `--config` flag > `ONCOPLAN_CONFIG` env > `oncoplan.toml`.
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    if let Some(path) = cli {
        return path;
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn required(
    value: Option<&Secret>,
    provider: &'static str,
    field: &'static str,
) -> Result<String, LlmError> {
    value
        .map(Secret::expose)
        .filter(|v| !v.trim().is_empty())
        .map(str::to_owned)
        .ok_or(LlmError::MissingConfig { provider, field })
}

/// Construct the backend named by `config.llm.provider`.
///
/// No network traffic happens here; a missing credential fails before any
/// request is attempted. Bedrock without static keys defers to the AWS
/// credential chain, which is resolved on the first call.
///
/// # Errors
///
/// Returns [`LlmError::MissingConfig`] naming the absent setting.
pub fn create_provider(config: &Config) -> Result<AnyProvider, LlmError> {
    let secrets = &config.secrets;
    let timeout = config.timeout();
    match config.llm.provider {
        ProviderKind::Bedrock => {
            let cfg = &config.llm.bedrock;
            let mut provider = BedrockProvider::new(cfg.region.clone(), cfg.model.clone())
                .with_timeout(timeout);
            match (&secrets.aws_access_key_id, &secrets.aws_secret_access_key) {
                (None, None) => {
                    tracing::debug!("bedrock credentials come from the AWS credential chain");
                }
                (access_key_id, secret_access_key) => {
                    let access_key_id =
                        required(access_key_id.as_ref(), "bedrock", "AWS_ACCESS_KEY_ID")?;
                    let secret_access_key = required(
                        secret_access_key.as_ref(),
                        "bedrock",
                        "AWS_SECRET_ACCESS_KEY",
                    )?;
                    let session_token = secrets
                        .aws_session_token
                        .as_ref()
                        .map(|s| s.expose().to_owned());
                    provider = provider.with_static_credentials(
                        access_key_id,
                        secret_access_key,
                        session_token,
                    );
                }
            }
            if let Some(endpoint) = &cfg.endpoint_url {
                provider = provider.with_endpoint(endpoint.clone());
            }
            Ok(AnyProvider::Bedrock(provider))
        }
        ProviderKind::AzureOpenAi => {
            let api_key = required(
                secrets.azure_openai_api_key.as_ref(),
                "azure_openai",
                "AZURE_OPENAI_API_KEY",
            )?;
            let cfg = &config.llm.azure;
            let endpoint = cfg
                .endpoint
                .clone()
                .filter(|e| !e.trim().is_empty())
                .ok_or(LlmError::MissingConfig {
                    provider: "azure_openai",
                    field: "AZURE_OPENAI_ENDPOINT",
                })?;
            let provider = AzureOpenAiProvider::new(api_key, endpoint, cfg.model.clone())
                .with_api_version(cfg.api_version.clone())
                .with_timeout(timeout);
            Ok(AnyProvider::AzureOpenAi(provider))
        }
        ProviderKind::Anthropic => {
            let api_key = required(
                secrets.anthropic_api_key.as_ref(),
                "anthropic",
                "ANTHROPIC_API_KEY",
            )?;
            let cfg = &config.llm.anthropic;
            let mut provider =
                AnthropicProvider::new(api_key, cfg.model.clone()).with_timeout(timeout);
            if let Some(base_url) = &cfg.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Ok(AnyProvider::Anthropic(provider))
        }
    }
}
