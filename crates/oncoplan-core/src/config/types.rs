use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::vault::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// LLM provider backend selector.
///
/// Parsing is exact and case-sensitive. Anything unrecognized falls back to
/// [`ProviderKind::AzureOpenAi`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String")]
pub enum ProviderKind {
    #[serde(rename = "bedrock")]
    Bedrock,
    #[default]
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bedrock => "bedrock",
            Self::AzureOpenAi => "azure_openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Exact match on one of the three recognized names.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bedrock" => Some(Self::Bedrock),
            "azure_openai" => Some(Self::AzureOpenAi),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    /// Default spacing between request starts, matching each service's quota.
    #[must_use]
    pub fn default_request_delay_secs(self) -> u64 {
        match self {
            Self::Bedrock | Self::AzureOpenAi => 31,
            Self::Anthropic => 0,
        }
    }
}

impl From<String> for ProviderKind {
    fn from(value: String) -> Self {
        Self::parse(&value).unwrap_or_else(|| {
            if !value.is_empty() {
                tracing::warn!(
                    "unrecognized LLM provider {value:?}, falling back to {}",
                    Self::default()
                );
            }
            Self::default()
        })
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub bedrock: BedrockConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            timeout_secs: default_timeout_secs(),
            bedrock: BedrockConfig::default(),
            azure: AzureConfig::default(),
            anthropic: AnthropicConfig::default(),
        }
    }
}

fn default_bedrock_region() -> String {
    oncoplan_llm::bedrock::DEFAULT_REGION.into()
}

fn default_bedrock_model() -> String {
    oncoplan_llm::bedrock::DEFAULT_MODEL.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BedrockConfig {
    #[serde(default = "default_bedrock_region")]
    pub region: String,
    #[serde(default = "default_bedrock_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: default_bedrock_region(),
            model: default_bedrock_model(),
            endpoint_url: None,
        }
    }
}

fn default_azure_model() -> String {
    oncoplan_llm::azure::DEFAULT_MODEL.into()
}

fn default_azure_api_version() -> String {
    oncoplan_llm::azure::DEFAULT_API_VERSION.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_azure_model")]
    pub model: String,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_azure_model(),
            api_version: default_azure_api_version(),
        }
    }
}

fn default_anthropic_model() -> String {
    oncoplan_llm::anthropic::DEFAULT_MODEL.into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnthropicConfig {
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: default_anthropic_model(),
            base_url: None,
        }
    }
}

/// What a pipeline does when the LLM call for one row fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Write the row with error placeholders, report it, continue.
    #[default]
    Skip,
    /// Stop at the first failed row. Earlier rows stay written.
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown failure policy {other:?}, expected skip or abort")),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_cross_case_max_records() -> usize {
    50
}

fn default_per_doctor_max_records() -> usize {
    100
}

fn default_guidelines_dir() -> PathBuf {
    PathBuf::from("NCCN_Guidelines")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub on_error: FailurePolicy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Overrides the provider's default spacing between LLM calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_secs: Option<u64>,
    #[serde(default = "default_cross_case_max_records")]
    pub cross_case_max_records: usize,
    #[serde(default = "default_per_doctor_max_records")]
    pub per_doctor_max_records: usize,
    /// Directory of `*.txt` guideline files for grounded plans.
    #[serde(default = "default_guidelines_dir")]
    pub guidelines_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_error: FailurePolicy::default(),
            concurrency: default_concurrency(),
            request_delay_secs: None,
            cross_case_max_records: default_cross_case_max_records(),
            per_doctor_max_records: default_per_doctor_max_records(),
            guidelines_dir: default_guidelines_dir(),
        }
    }
}

fn default_patient_id_column() -> String {
    "PatId".into()
}

fn default_disease_column() -> String {
    "Current_Disease".into()
}

fn default_summary_column() -> String {
    "Summary_Conclusions".into()
}

fn default_recommendations_column() -> String {
    "Recommendations".into()
}

fn default_doctor_patient_id_column() -> String {
    "PatID".into()
}

fn default_doctor_first_name_column() -> String {
    "Doc_First_Name".into()
}

fn default_doctor_last_name_column() -> String {
    "Doc_Last_Name".into()
}

/// Column names of the upstream spreadsheet export.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnsConfig {
    #[serde(default = "default_patient_id_column")]
    pub patient_id: String,
    #[serde(default = "default_disease_column")]
    pub disease: String,
    #[serde(default = "default_summary_column")]
    pub summary: String,
    #[serde(default = "default_recommendations_column")]
    pub recommendations: String,
    #[serde(default = "default_doctor_patient_id_column")]
    pub doctor_patient_id: String,
    #[serde(default = "default_doctor_first_name_column")]
    pub doctor_first_name: String,
    #[serde(default = "default_doctor_last_name_column")]
    pub doctor_last_name: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            patient_id: default_patient_id_column(),
            disease: default_disease_column(),
            summary: default_summary_column(),
            recommendations: default_recommendations_column(),
            doctor_patient_id: default_doctor_patient_id_column(),
            doctor_first_name: default_doctor_first_name_column(),
            doctor_last_name: default_doctor_last_name_column(),
        }
    }
}

impl ColumnsConfig {
    /// The three free-text columns every case pipeline needs.
    #[must_use]
    pub fn case_text_columns(&self) -> [&str; 3] {
        [&self.disease, &self.summary, &self.recommendations]
    }
}

#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub aws_access_key_id: Option<Secret>,
    pub aws_secret_access_key: Option<Secret>,
    pub aws_session_token: Option<Secret>,
    pub azure_openai_api_key: Option<Secret>,
    pub anthropic_api_key: Option<Secret>,
}
