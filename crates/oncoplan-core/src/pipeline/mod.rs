//! Typed step composition for multi-stage LLM calls.

use std::future::Future;

pub mod builder;
pub mod builtin;

pub use builder::Pipeline;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] oncoplan_llm::LlmError),

    #[error("extraction failed: {0}")]
    Extract(String),
}

/// A step failure together with where in the chain it happened.
#[derive(Debug, thiserror::Error)]
#[error("stage {stage} ({step}) failed: {source}")]
pub struct StageError {
    /// 1-based position of the failing step.
    pub stage: usize,
    pub step: &'static str,
    #[source]
    pub source: PipelineError,
}

pub trait Step: Send + Sync {
    type Input: Send;
    type Output: Send;

    /// Short label used in [`StageError`].
    fn name(&self) -> &'static str;

    fn run(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, PipelineError>> + Send;
}
