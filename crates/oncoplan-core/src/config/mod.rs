mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::vault::{Secret, VaultProvider};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to sensible defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric setting is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("pipeline.concurrency", self.pipeline.concurrency),
            ("pipeline.cross_case_max_records", self.pipeline.cross_case_max_records),
            ("pipeline.per_doctor_max_records", self.pipeline.per_doctor_max_records),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(field));
            }
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Zero("llm.timeout_secs"));
        }
        Ok(())
    }

    /// Resolve provider credentials through the vault.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault backend fails.
    pub async fn resolve_secrets(&mut self, vault: &dyn VaultProvider) -> anyhow::Result<()> {
        let secrets = &mut self.secrets;
        for (key, slot) in [
            ("AWS_ACCESS_KEY_ID", &mut secrets.aws_access_key_id),
            ("AWS_SECRET_ACCESS_KEY", &mut secrets.aws_secret_access_key),
            ("AWS_SESSION_TOKEN", &mut secrets.aws_session_token),
            ("AZURE_OPENAI_API_KEY", &mut secrets.azure_openai_api_key),
            ("ANTHROPIC_API_KEY", &mut secrets.anthropic_api_key),
        ] {
            if let Some(val) = vault.get_secret(key).await?
                && !val.trim().is_empty()
            {
                *slot = Some(Secret::new(val));
            }
        }
        Ok(())
    }

    /// Minimum spacing between the start of consecutive LLM calls.
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(
            self.pipeline
                .request_delay_secs
                .unwrap_or_else(|| self.llm.provider.default_request_delay_secs()),
        )
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}
