use super::{Config, FailurePolicy, ProviderKind};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_pipeline();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = ProviderKind::from(v);
        }
        if let Ok(v) = std::env::var("LLM_TIMEOUT_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.llm.timeout_secs = secs;
        }
        if let Ok(v) = std::env::var("AWS_REGION")
            && !v.is_empty()
        {
            self.llm.bedrock.region = v;
        }
        if let Ok(v) = std::env::var("BEDROCK_MODEL_ID")
            && !v.is_empty()
        {
            self.llm.bedrock.model = v;
        }
        if let Ok(v) = std::env::var("BEDROCK_ENDPOINT_URL")
            && !v.is_empty()
        {
            self.llm.bedrock.endpoint_url = Some(v);
        }
        if let Ok(v) = std::env::var("AZURE_OPENAI_ENDPOINT")
            && !v.is_empty()
        {
            self.llm.azure.endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("OPEN_AI_MODEL")
            && !v.is_empty()
        {
            self.llm.azure.model = v;
        }
        if let Ok(v) = std::env::var("AZURE_OPENAI_API_VERSION")
            && !v.is_empty()
        {
            self.llm.azure.api_version = v;
        }
        if let Ok(v) = std::env::var("ANTHROPIC_MODEL")
            && !v.is_empty()
        {
            self.llm.anthropic.model = v;
        }
        if let Ok(v) = std::env::var("ANTHROPIC_BASE_URL")
            && !v.is_empty()
        {
            self.llm.anthropic.base_url = Some(v);
        }
    }

    fn apply_env_overrides_pipeline(&mut self) {
        if let Ok(v) = std::env::var("LLM_REQUEST_DELAY_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.pipeline.request_delay_secs = Some(secs);
        }
        if let Ok(v) = std::env::var("ONCOPLAN_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.pipeline.concurrency = n;
        }
        if let Ok(v) = std::env::var("ONCOPLAN_ON_ERROR") {
            match v.parse::<FailurePolicy>() {
                Ok(policy) => self.pipeline.on_error = policy,
                Err(e) => tracing::warn!("ignoring ONCOPLAN_ON_ERROR: {e}"),
            }
        }
        if let Ok(v) = std::env::var("CROSS_ANALYSIS_MAX_RECORDS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.pipeline.cross_case_max_records = n;
        }
        if let Ok(v) = std::env::var("ONCOPLAN_GUIDELINES_DIR")
            && !v.trim().is_empty()
        {
            self.pipeline.guidelines_dir = v.into();
        }
    }
}
