//! Shared HTTP client construction and response status handling.

use std::time::Duration;

use crate::error::ProviderError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Create an HTTP client with the standard oncoplan configuration.
///
/// Config: 30s connect timeout, caller-supplied request timeout, rustls TLS,
/// `oncoplan/{version}` user-agent, redirect limit 10.
#[must_use]
pub fn default_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .user_agent(concat!("oncoplan/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}

/// Read the body of a provider response, mapping non-success statuses to
/// [`ProviderError`].
pub(crate) async fn read_success(
    response: reqwest::Response,
    provider: &'static str,
) -> Result<String, ProviderError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        tracing::warn!(provider, "rate limited");
        return Err(ProviderError::RateLimited);
    }

    let text = response.text().await?;

    if !status.is_success() {
        tracing::error!(provider, "API error {status}: {text}");
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(text)
}
