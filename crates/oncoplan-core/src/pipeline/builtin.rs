use std::marker::PhantomData;

use oncoplan_llm::{LlmProvider, Prompt};

use super::{PipelineError, Step};

/// Sends its input as the user message, under a fixed system instruction.
pub struct LlmStep<'a, P> {
    provider: &'a P,
    system_prompt: Option<String>,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl<'a, P> LlmStep<'a, P> {
    #[must_use]
    pub fn new(provider: &'a P, max_tokens: u32) -> Self {
        Self {
            provider,
            system_prompt: None,
            max_tokens,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl<P: LlmProvider> Step for LlmStep<'_, P> {
    type Input = String;
    type Output = String;

    fn name(&self) -> &'static str {
        "llm"
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        let mut prompt = Prompt::new(input, self.max_tokens);
        if let Some(sys) = &self.system_prompt {
            prompt = prompt.with_system(sys.clone());
        }
        if let Some(t) = self.temperature {
            prompt = prompt.with_temperature(t);
        }
        self.provider
            .complete(&prompt)
            .await
            .map_err(PipelineError::Llm)
    }
}

/// Cuts a model reply down to the span between its first `{` and last `}`.
///
/// Models often wrap JSON in prose or code fences; this discards the wrapping.
pub struct JsonObjectStep;

impl Step for JsonObjectStep {
    type Input = String;
    type Output = String;

    fn name(&self) -> &'static str {
        "json_object"
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        json_object_span(&input)
            .map(str::to_owned)
            .ok_or_else(|| PipelineError::Extract("no JSON object in response".into()))
    }
}

#[must_use]
pub fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub struct ExtractStep<T> {
    _marker: PhantomData<T>,
}

impl<T> ExtractStep<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for ExtractStep<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: serde::de::DeserializeOwned + Send + Sync> Step for ExtractStep<T> {
    type Input = String;
    type Output = T;

    fn name(&self) -> &'static str {
        "extract"
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        serde_json::from_str(&input).map_err(|e| PipelineError::Extract(e.to_string()))
    }
}

pub struct MapStep<F, In, Out> {
    f: F,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<F, In, Out> MapStep<F, In, Out> {
    #[must_use]
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<F, In, Out> Step for MapStep<F, In, Out>
where
    F: Fn(In) -> Out + Send + Sync,
    In: Send,
    Out: Send,
{
    type Input = In;
    type Output = Out;

    fn name(&self) -> &'static str {
        "map"
    }

    async fn run(&self, input: Self::Input) -> Result<Self::Output, PipelineError> {
        Ok((self.f)(input))
    }
}
