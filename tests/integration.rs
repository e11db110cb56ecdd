use std::path::Path;

use oncoplan_core::analysis::{RunOptions, cross_case, guideline, single_case};
use oncoplan_core::bootstrap::create_provider;
use oncoplan_core::cases::CaseTable;
use oncoplan_core::config::{ColumnsConfig, Config, FailurePolicy, ProviderKind};
use oncoplan_core::vault::{EnvVaultProvider, Secret};
use oncoplan_llm::mock::MockProvider;
use oncoplan_llm::{AnyProvider, LlmError, LlmProvider, Prompt};
use serde_json::json;
use serial_test::serial;
use wiremock::matchers::{header, header_exists, header_regex, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CASES: &str = "PatId,Current_Disease,Summary_Conclusions,Recommendations\n\
                     101,NSCLC stage IV,PD-L1 80%,pembrolizumab\n\
                     102,SCLC extensive,PS 1,carboplatin etoposide atezolizumab\n\
                     103,Melanoma,BRAF wild type,nivolumab ipilimumab\n";

fn write_cases(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("cases.csv");
    std::fs::write(&input, CASES).unwrap();
    input
}

fn anthropic_body(text: &str) -> serde_json::Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "usage": {"input_tokens": 10, "output_tokens": 3}
    })
}

#[tokio::test]
async fn single_case_end_to_end_with_stub() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_cases(dir.path());
    let output = dir.path().join("results/analysis.csv");
    let provider = MockProvider::fixed("stub answer");

    let summary = single_case::run(
        &provider,
        &input,
        &output,
        &ColumnsConfig::default(),
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 3);
    assert!(summary.failed.is_empty());
    assert_eq!(provider.call_count(), 6);

    let written = CaseTable::from_path(&output).unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written.headers().len(), 7);
    for row in 0..3 {
        assert_eq!(written.get(row, single_case::PLAN_COLUMN), Some("stub answer"));
        assert_eq!(written.get(row, single_case::COMPARISON_COLUMN), Some("stub answer"));
        assert_eq!(written.get(row, single_case::SCORE_COLUMN), Some("0.0"));
    }
    assert_eq!(written.get(2, "PatId"), Some("103"));
}

#[tokio::test]
async fn single_case_concurrent_run_keeps_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_cases(dir.path());
    let output = dir.path().join("analysis.csv");
    let provider = MockProvider::with_handler(|p: &Prompt| {
        let user = &p.messages[1].content;
        user.lines().next().unwrap_or_default().to_owned()
    })
    .with_delay(20);

    let options = RunOptions {
        concurrency: 3,
        ..RunOptions::default()
    };
    single_case::run(&provider, &input, &output, &ColumnsConfig::default(), options)
        .await
        .unwrap();

    let written = CaseTable::from_path(&output).unwrap();
    let plans: Vec<&str> = (0..3)
        .map(|r| written.get(r, single_case::PLAN_COLUMN).unwrap())
        .collect();
    assert_eq!(plans, vec!["NSCLC stage IV", "SCLC extensive", "Melanoma"]);
}

#[tokio::test]
async fn cross_case_with_limit_embeds_exactly_two_cases() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_cases(dir.path());
    let output = dir.path().join("cross.txt");
    let provider = MockProvider::fixed("shared patterns");

    let report = cross_case::run(&provider, &input, &output, &ColumnsConfig::default(), 2)
        .await
        .unwrap();

    assert_eq!(report.cases_used, 2);
    let prompts = provider.recorded_prompts();
    assert_eq!(prompts.len(), 1);
    let user = &prompts[0].messages[1].content;
    assert!(user.contains("NSCLC stage IV"));
    assert!(user.contains("SCLC extensive"));
    assert!(!user.contains("Melanoma"));
    assert_eq!(user.matches("--- סוף מקרה").count(), 2);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "shared patterns");
}

#[tokio::test]
async fn guideline_plan_and_descriptions_share_a_library() {
    let dir = tempfile::tempdir().unwrap();
    let library = dir.path().join("NCCN_Guidelines");
    std::fs::create_dir(&library).unwrap();
    std::fs::write(library.join("all-patient.txt"), "General guidance").unwrap();
    std::fs::write(library.join("sclc.txt"), "Small Cell Lung Cancer\nplatinum etoposide").unwrap();
    let patient = dir.path().join("patient.txt");
    std::fs::write(&patient, "58M, extensive-stage SCLC").unwrap();

    let provider = MockProvider::with_handler(|p: &Prompt| {
        let system = p.system_text().unwrap_or_default();
        if system.contains("GUIDELINE FILE:") {
            "sclc.txt".to_owned()
        } else if system.contains("platinum etoposide") {
            "grounded".to_owned()
        } else {
            "plain".to_owned()
        }
    });
    let plan_path = dir.path().join("plan.txt");
    let result = guideline::run(&provider, &patient, &library, &plan_path, true)
        .await
        .unwrap();
    assert_eq!(result.guideline.name, "sclc.txt");
    assert_eq!(result.plan, "grounded");
    assert_eq!(result.baseline.as_deref(), Some("plain"));

    let json_path = dir.path().join("guidelines_descriptions.json");
    let report = guideline::run_describe(&provider, &library, &json_path, FailurePolicy::Skip)
        .await
        .unwrap();
    assert_eq!(report.descriptions.len(), 2);
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["sclc.txt"], "plain");
}

#[tokio::test]
async fn anthropic_selector_delegates_to_anthropic_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body("from anthropic")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::Anthropic;
    config.llm.anthropic.base_url = Some(server.uri());
    config.secrets.anthropic_api_key = Some(Secret::new("sk-ant"));

    let provider = create_provider(&config).unwrap();
    assert!(matches!(provider, AnyProvider::Anthropic(_)));
    assert_eq!(provider.complete(&Prompt::from("q")).await.unwrap(), "from anthropic");
}

#[tokio::test]
#[serial]
async fn bedrock_selector_delegates_to_signed_invoke() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/model/.+/invoke$"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body("from bedrock")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::Bedrock;
    config.llm.bedrock.endpoint_url = Some(server.uri());
    config.secrets.aws_access_key_id = Some(Secret::new("AKIDEXAMPLE"));
    config.secrets.aws_secret_access_key = Some(Secret::new("secret"));

    let provider = create_provider(&config).unwrap();
    assert!(matches!(provider, AnyProvider::Bedrock(_)));
    assert_eq!(provider.complete(&Prompt::from("q")).await.unwrap(), "from bedrock");
}

const AWS_ENV: [&str; 8] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "AWS_PROFILE",
    "AWS_SHARED_CREDENTIALS_FILE",
    "AWS_CONFIG_FILE",
    "AWS_EC2_METADATA_DISABLED",
    "AWS_ENDPOINT_URL",
];

fn clear_aws_env() {
    for key in AWS_ENV {
        unsafe { std::env::remove_var(key) };
    }
}

#[tokio::test]
#[serial]
async fn bedrock_reads_shared_credentials_file() {
    let dir = tempfile::tempdir().unwrap();
    let credentials = dir.path().join("credentials");
    std::fs::write(
        &credentials,
        "[default]\naws_access_key_id = AKIDFROMFILE\naws_secret_access_key = filesecret\n",
    )
    .unwrap();

    clear_aws_env();
    unsafe {
        std::env::set_var("AWS_SHARED_CREDENTIALS_FILE", &credentials);
        std::env::set_var("AWS_CONFIG_FILE", dir.path().join("config"));
        std::env::set_var("AWS_PROFILE", "default");
        std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/model/.+/invoke$"))
        .and(header_regex("authorization", r"Credential=AKIDFROMFILE/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(anthropic_body("from profile")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::Bedrock;
    config.llm.bedrock.endpoint_url = Some(server.uri());
    config.resolve_secrets(&EnvVaultProvider).await.unwrap();

    let provider = create_provider(&config).unwrap();
    let result = provider.complete(&Prompt::from("q")).await;
    clear_aws_env();

    assert_eq!(result.unwrap(), "from profile");
}

#[tokio::test]
async fn azure_selector_delegates_to_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/openai/deployments/[^/]+/chat/completions$"))
        .and(header("api-key", "az-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "from azure"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::from("something-else".to_owned());
    config.llm.azure.endpoint = Some(server.uri());
    config.secrets.azure_openai_api_key = Some(Secret::new("az-key"));

    let provider = create_provider(&config).unwrap();
    assert!(matches!(provider, AnyProvider::AzureOpenAi(_)));
    assert_eq!(provider.complete(&Prompt::from("q")).await.unwrap(), "from azure");
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::Anthropic;
    config.llm.anthropic.base_url = Some(server.uri());

    let err = create_provider(&config).unwrap_err();
    assert!(matches!(
        err,
        LlmError::MissingConfig {
            provider: "anthropic",
            field: "ANTHROPIC_API_KEY"
        }
    ));
}

#[tokio::test]
async fn provider_error_fails_the_row_not_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.llm.provider = ProviderKind::Anthropic;
    config.llm.anthropic.base_url = Some(server.uri());
    config.secrets.anthropic_api_key = Some(Secret::new("sk-ant"));
    let provider = create_provider(&config).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let input = write_cases(dir.path());
    let output = dir.path().join("analysis.csv");
    let summary = single_case::run(
        &provider,
        &input,
        &output,
        &ColumnsConfig::default(),
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed_rows(), vec![0, 1, 2]);
    assert!(summary.failed[0].error.contains("anthropic completion failed"));
    let written = CaseTable::from_path(&output).unwrap();
    assert_eq!(
        written.get(1, single_case::PLAN_COLUMN),
        Some(oncoplan_core::analysis::LLM_FAILED)
    );
}
