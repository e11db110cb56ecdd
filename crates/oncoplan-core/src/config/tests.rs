use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use super::*;
use crate::vault::MockVaultProvider;

const ENV_KEYS: [&str; 15] = [
    "LLM_PROVIDER",
    "LLM_TIMEOUT_SECS",
    "LLM_REQUEST_DELAY_SECS",
    "AWS_REGION",
    "BEDROCK_MODEL_ID",
    "BEDROCK_ENDPOINT_URL",
    "AZURE_OPENAI_ENDPOINT",
    "OPEN_AI_MODEL",
    "AZURE_OPENAI_API_VERSION",
    "ANTHROPIC_MODEL",
    "ANTHROPIC_BASE_URL",
    "ONCOPLAN_CONCURRENCY",
    "ONCOPLAN_ON_ERROR",
    "CROSS_ANALYSIS_MAX_RECORDS",
    "ONCOPLAN_GUIDELINES_DIR",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("oncoplan.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_when_file_missing() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::AzureOpenAi);
    assert_eq!(config.llm.timeout_secs, 120);
    assert_eq!(config.llm.bedrock.region, "eu-west-1");
    assert_eq!(config.llm.azure.model, "o4-mini");
    assert_eq!(config.llm.azure.api_version, "2024-02-01");
    assert!(config.llm.azure.endpoint.is_none());
    assert_eq!(config.pipeline.on_error, FailurePolicy::Skip);
    assert_eq!(config.pipeline.concurrency, 1);
    assert_eq!(config.pipeline.cross_case_max_records, 50);
    assert_eq!(config.pipeline.per_doctor_max_records, 100);
    assert_eq!(config.columns.patient_id, "PatId");
    assert_eq!(config.columns.doctor_patient_id, "PatID");
}

#[test]
#[serial]
fn load_missing_file_uses_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::AzureOpenAi);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn parse_full_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[llm]
provider = "bedrock"
timeout_secs = 30

[llm.bedrock]
region = "us-east-1"
model = "anthropic.claude-3-haiku"

[pipeline]
on_error = "abort"
concurrency = 4
request_delay_secs = 2

[columns]
disease = "Disease"
"#,
    );

    clear_env();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Bedrock);
    assert_eq!(config.llm.timeout_secs, 30);
    assert_eq!(config.llm.bedrock.region, "us-east-1");
    assert_eq!(config.llm.bedrock.model, "anthropic.claude-3-haiku");
    assert_eq!(config.pipeline.on_error, FailurePolicy::Abort);
    assert_eq!(config.pipeline.concurrency, 4);
    assert_eq!(config.request_delay(), Duration::from_secs(2));
    assert_eq!(config.columns.disease, "Disease");
    assert_eq!(config.columns.summary, "Summary_Conclusions");
}

#[test]
#[serial]
fn invalid_toml_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[llm\nprovider = ");
    clear_env();
    let err = Config::load(&path).unwrap_err();
    assert!(format!("{err:#}").contains("failed to parse config file"));
}

#[test]
fn unknown_provider_in_toml_falls_back_to_azure() {
    let config: Config = toml::from_str("[llm]\nprovider = \"ollama\"\n").unwrap();
    assert_eq!(config.llm.provider, ProviderKind::AzureOpenAi);
}

#[test]
fn provider_selector_is_exact() {
    assert_eq!(ProviderKind::parse("bedrock"), Some(ProviderKind::Bedrock));
    assert_eq!(ProviderKind::parse("anthropic"), Some(ProviderKind::Anthropic));
    assert_eq!(
        ProviderKind::parse("azure_openai"),
        Some(ProviderKind::AzureOpenAi)
    );
    assert_eq!(ProviderKind::parse("Bedrock"), None);
    assert_eq!(ProviderKind::parse(" anthropic"), None);
    assert_eq!(ProviderKind::from(String::new()), ProviderKind::AzureOpenAi);
}

#[test]
#[serial]
fn env_overrides_llm_settings() {
    clear_env();
    let mut config = Config::default();

    unsafe {
        std::env::set_var("LLM_PROVIDER", "anthropic");
        std::env::set_var("ANTHROPIC_MODEL", "claude-3-haiku-20240307");
        std::env::set_var("ANTHROPIC_BASE_URL", "http://127.0.0.1:9999");
        std::env::set_var("AWS_REGION", "us-west-2");
        std::env::set_var("OPEN_AI_MODEL", "gpt-4o");
        std::env::set_var("LLM_TIMEOUT_SECS", "15");
    }
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Anthropic);
    assert_eq!(config.llm.anthropic.model, "claude-3-haiku-20240307");
    assert_eq!(
        config.llm.anthropic.base_url.as_deref(),
        Some("http://127.0.0.1:9999")
    );
    assert_eq!(config.llm.bedrock.region, "us-west-2");
    assert_eq!(config.llm.azure.model, "gpt-4o");
    assert_eq!(config.timeout(), Duration::from_secs(15));
}

#[test]
#[serial]
fn env_unknown_provider_falls_back() {
    clear_env();
    let mut config = Config::default();
    config.llm.provider = ProviderKind::Bedrock;
    unsafe { std::env::set_var("LLM_PROVIDER", "gemini") };
    config.apply_env_overrides();
    clear_env();
    assert_eq!(config.llm.provider, ProviderKind::AzureOpenAi);
}

#[test]
#[serial]
fn env_overrides_pipeline_settings() {
    clear_env();
    let mut config = Config::default();
    unsafe {
        std::env::set_var("ONCOPLAN_CONCURRENCY", "3");
        std::env::set_var("ONCOPLAN_ON_ERROR", "abort");
        std::env::set_var("CROSS_ANALYSIS_MAX_RECORDS", "7");
        std::env::set_var("LLM_REQUEST_DELAY_SECS", "0");
        std::env::set_var("ONCOPLAN_GUIDELINES_DIR", "/srv/guidelines");
    }
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.pipeline.guidelines_dir, std::path::PathBuf::from("/srv/guidelines"));
    assert_eq!(config.pipeline.concurrency, 3);
    assert_eq!(config.pipeline.on_error, FailurePolicy::Abort);
    assert_eq!(config.pipeline.cross_case_max_records, 7);
    assert_eq!(config.request_delay(), Duration::ZERO);
}

#[test]
#[serial]
fn env_invalid_values_are_ignored() {
    clear_env();
    let mut config = Config::default();
    unsafe {
        std::env::set_var("ONCOPLAN_CONCURRENCY", "many");
        std::env::set_var("ONCOPLAN_ON_ERROR", "retry");
        std::env::set_var("LLM_TIMEOUT_SECS", "-1");
    }
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.pipeline.concurrency, 1);
    assert_eq!(config.pipeline.on_error, FailurePolicy::Skip);
    assert_eq!(config.llm.timeout_secs, 120);
}

#[test]
fn failure_policy_parses_exact_names() {
    assert_eq!("skip".parse::<FailurePolicy>(), Ok(FailurePolicy::Skip));
    assert_eq!("abort".parse::<FailurePolicy>(), Ok(FailurePolicy::Abort));
    let err = "Abort".parse::<FailurePolicy>().unwrap_err();
    assert!(err.contains("\"Abort\""));
    assert!("".parse::<FailurePolicy>().is_err());
}

#[test]
fn request_delay_defaults_per_provider() {
    let mut config = Config::default();
    assert_eq!(config.request_delay(), Duration::from_secs(31));
    config.llm.provider = ProviderKind::Bedrock;
    assert_eq!(config.request_delay(), Duration::from_secs(31));
    config.llm.provider = ProviderKind::Anthropic;
    assert_eq!(config.request_delay(), Duration::ZERO);
}

#[test]
fn validate_rejects_zero_concurrency() {
    let mut config = Config::default();
    config.pipeline.concurrency = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("concurrency"));
}

#[test]
fn validate_rejects_zero_timeout() {
    let mut config = Config::default();
    config.llm.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn resolve_secrets_populates_credentials() {
    let vault = MockVaultProvider::new()
        .with_secret("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .with_secret("AWS_SECRET_ACCESS_KEY", "secret")
        .with_secret("ANTHROPIC_API_KEY", "sk-ant");
    let mut config = Config::default();
    config.resolve_secrets(&vault).await.unwrap();

    let secrets = &config.secrets;
    assert_eq!(
        secrets.aws_access_key_id.as_ref().unwrap().expose(),
        "AKIDEXAMPLE"
    );
    assert_eq!(secrets.aws_secret_access_key.as_ref().unwrap().expose(), "secret");
    assert_eq!(secrets.anthropic_api_key.as_ref().unwrap().expose(), "sk-ant");
    assert!(secrets.aws_session_token.is_none());
    assert!(secrets.azure_openai_api_key.is_none());
}

#[tokio::test]
async fn resolve_secrets_ignores_blank_values() {
    let vault = MockVaultProvider::new().with_secret("AZURE_OPENAI_API_KEY", "  ");
    let mut config = Config::default();
    config.resolve_secrets(&vault).await.unwrap();
    assert!(config.secrets.azure_openai_api_key.is_none());
}

#[test]
fn secrets_are_not_serialized() {
    let mut config = Config::default();
    config.secrets.anthropic_api_key = Some(crate::vault::Secret::new("sk-ant"));
    let rendered = toml::to_string(&config).unwrap();
    assert!(!rendered.contains("sk-ant"));
    assert!(rendered.contains("azure_openai"));
}
