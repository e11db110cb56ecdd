//! The case pipelines and their shared ordered row driver.

pub mod classify;
pub mod cohort;
pub mod cross_case;
pub mod guideline;
pub mod per_doctor;
pub mod reasoning;
pub mod single_case;

use std::future::Future;
use std::path::PathBuf;
use std::pin::pin;

use futures::StreamExt as _;
use oncoplan_llm::LlmError;

use crate::cases::{CaseError, CaseRecord};
use crate::config::{FailurePolicy, PipelineConfig};

/// Placeholder written in place of a generated text when its call failed.
pub const LLM_FAILED: &str = "Error: LLM call failed or no content.";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Case(#[from] CaseError),

    #[error("row {row} failed: {source}")]
    RowFailed {
        row: usize,
        #[source]
        source: LlmError,
    },

    #[error("analysis for {doctor} failed: {source}")]
    DoctorFailed {
        doctor: String,
        #[source]
        source: LlmError,
    },

    #[error("no usable cases in input")]
    NoCases,

    #[error("no guideline files (*.txt) in {}", dir.display())]
    NoGuidelines { dir: PathBuf },

    #[error("guideline {name} not found in {}", dir.display())]
    GuidelineNotFound { name: String, dir: PathBuf },

    #[error("description of {name} failed: {source}")]
    GuidelineFailed {
        name: String,
        #[source]
        source: LlmError,
    },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub policy: FailurePolicy,
    pub concurrency: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::Skip,
            concurrency: 1,
        }
    }
}

impl From<&PipelineConfig> for RunOptions {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            policy: cfg.on_error,
            concurrency: cfg.concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFailure {
    pub row: usize,
    pub error: String,
}

/// Outcome of a per-row run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: Vec<RowFailure>,
}

impl RunSummary {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    #[must_use]
    pub fn failed_rows(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.row).collect()
    }
}

/// A row's result. `value` is always writable: on failure it carries the
/// error placeholders.
pub(crate) struct RowOutcome<T> {
    pub value: T,
    pub error: Option<LlmError>,
}

impl<T> RowOutcome<T> {
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    pub fn failed(value: T, error: LlmError) -> Self {
        Self {
            value,
            error: Some(error),
        }
    }
}

/// Run `process` over `records` with at most `options.concurrency` rows in
/// flight, handing results to `write` strictly in input order.
///
/// Under [`FailurePolicy::Abort`] the first failed row stops the run; every
/// earlier row has already been passed to `write`.
pub(crate) async fn drive_rows<T, F, Fut, W>(
    records: Vec<CaseRecord>,
    options: RunOptions,
    process: F,
    mut write: W,
) -> Result<RunSummary, AnalysisError>
where
    F: Fn(CaseRecord) -> Fut,
    Fut: Future<Output = RowOutcome<T>>,
    W: FnMut(usize, T) -> Result<(), AnalysisError>,
{
    let total = records.len();
    let mut summary = RunSummary::default();
    let mut results = pin!(
        futures::stream::iter(records)
            .map(|record| {
                let row = record.index;
                let fut = process(record);
                async move { (row, fut.await) }
            })
            .buffered(options.concurrency.max(1))
    );

    while let Some((row, outcome)) = results.next().await {
        match outcome.error {
            None => {
                write(row, outcome.value)?;
                summary.succeeded += 1;
                tracing::info!(row = row + 1, total, "row complete");
            }
            Some(err) => {
                tracing::error!(row = row + 1, total, "row failed: {err}");
                if options.policy == FailurePolicy::Abort {
                    return Err(AnalysisError::RowFailed { row, source: err });
                }
                write(row, outcome.value)?;
                summary.failed.push(RowFailure {
                    row,
                    error: err.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

/// Count occurrences, most common first; ties keep first-seen order.
pub(crate) fn tally<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for item in items {
        if let Some(entry) = counts.iter_mut().find(|(k, _)| *k == item) {
            entry.1 += 1;
        } else {
            counts.push((item, 1));
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}
