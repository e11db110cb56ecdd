//! Per-row treatment plan generation and comparison with the physician.

use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use oncoplan_llm::{LlmError, LlmProvider, Prompt};
use regex::Regex;

use super::{AnalysisError, LLM_FAILED, RowOutcome, RunOptions, RunSummary, drive_rows};
use crate::cases::{CaseRecord, CaseTable, create_writer};
use crate::config::ColumnsConfig;
use crate::prompts;

pub const PLAN_COLUMN: &str = "Llm_Summary_Conclusions";
pub const COMPARISON_COLUMN: &str = "Llm_Vs_Doctor_Comparision";
pub const SCORE_COLUMN: &str = "Llm_Vs_Doctor_Comparison_Score";

pub const COMPARISON_FAILED: &str = "Error: Comparison call failed or no content.";
pub const DEFAULT_SCORE: f64 = 0.0;

const PLAN_MAX_TOKENS: u32 = 1000;
const COMPARISON_MAX_TOKENS: u32 = 3000;

static SCORE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ציון דמיון מספרי\s*\(0-1\)\s*:").unwrap());
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]*\.?[0-9]+").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub plan: String,
    pub comparison: String,
    pub score: Option<f64>,
}

impl AnalysisResult {
    fn placeholders() -> Self {
        Self {
            plan: LLM_FAILED.to_owned(),
            comparison: COMPARISON_FAILED.to_owned(),
            score: None,
        }
    }

    /// Score column text; `0.0` when no score was parsed.
    #[must_use]
    pub fn score_text(&self) -> String {
        format_score(self.score.unwrap_or(DEFAULT_SCORE))
    }
}

#[allow(clippy::float_cmp)]
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.1}")
    } else {
        format!("{score}")
    }
}

/// Split a comparison reply into its text and similarity score.
///
/// The score comes from the last line carrying the score label followed by a
/// number in `[0, 1]`; that line is removed. Without such a line the text is
/// returned unchanged and the score is `None`.
#[must_use]
pub fn parse_score(text: &str) -> (String, Option<f64>) {
    let lines: Vec<&str> = text.lines().collect();
    let found = lines.iter().enumerate().rev().find_map(|(i, line)| {
        let label = SCORE_LABEL_RE.find(line)?;
        let num = NUMBER_RE.find(&line[label.end()..])?;
        let score: f64 = num.as_str().parse().ok()?;
        (0.0..=1.0).contains(&score).then_some((i, score))
    });

    match found {
        Some((line_no, score)) => {
            let kept: Vec<&str> = lines
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != line_no)
                .map(|(_, l)| *l)
                .collect();
            (kept.join("\n").trim().to_owned(), Some(score))
        }
        None => (text.to_owned(), None),
    }
}

/// Both calls for one case. A failed comparison keeps the generated plan.
///
/// The returned result always carries writable values; the error is set when
/// either call failed.
pub async fn analyze_case<P: LlmProvider>(
    provider: &P,
    case: &CaseRecord,
) -> (AnalysisResult, Option<LlmError>) {
    let outcome = process(provider, case).await;
    (outcome.value, outcome.error)
}

async fn process<P: LlmProvider>(provider: &P, case: &CaseRecord) -> RowOutcome<AnalysisResult> {
    let plan_prompt = Prompt::new(case.disease.clone(), PLAN_MAX_TOKENS)
        .with_system(prompts::TREATMENT_PLAN_SYSTEM)
        .with_temperature(0.0);
    let plan = match provider.complete(&plan_prompt).await {
        Ok(plan) => plan,
        Err(e) => return RowOutcome::failed(AnalysisResult::placeholders(), e),
    };

    let comparison_prompt = Prompt::new(
        prompts::comparison_user(&plan, &case.summary, &case.recommendations),
        COMPARISON_MAX_TOKENS,
    )
    .with_system(prompts::COMPARISON_SYSTEM)
    .with_temperature(0.0);
    match provider.complete(&comparison_prompt).await {
        Ok(raw) => {
            let (comparison, score) = parse_score(&raw);
            if score.is_none() {
                tracing::warn!(
                    row = case.index + 1,
                    "similarity score line not found, using {DEFAULT_SCORE}"
                );
            }
            RowOutcome::ok(AnalysisResult {
                plan,
                comparison,
                score,
            })
        }
        Err(e) => RowOutcome::failed(
            AnalysisResult {
                plan,
                ..AnalysisResult::placeholders()
            },
            e,
        ),
    }
}

/// Analyze every row of `table`, writing the input columns plus the three
/// result columns to `out`, one flushed row at a time.
///
/// # Errors
///
/// Fails before any LLM call when required columns are missing; fails on
/// write errors; under the abort policy fails with the first failed row.
pub async fn analyze_table<P, W>(
    provider: &P,
    table: &CaseTable,
    columns: &ColumnsConfig,
    options: RunOptions,
    out: &mut csv::Writer<W>,
) -> Result<RunSummary, AnalysisError>
where
    P: LlmProvider,
    W: Write,
{
    let records = table.records(columns)?;

    let mut header: Vec<&str> = table.headers().iter().map(String::as_str).collect();
    header.extend([PLAN_COLUMN, COMPARISON_COLUMN, SCORE_COLUMN]);
    out.write_record(&header)?;
    out.flush()?;

    drive_rows(
        records,
        options,
        |case| async move { process(provider, &case).await },
        |row, result: AnalysisResult| {
            let mut record = table.rows()[row].clone();
            let score = result.score_text();
            record.extend([result.plan, result.comparison, score]);
            out.write_record(&record)?;
            out.flush()?;
            Ok(())
        },
    )
    .await
}

/// # Errors
///
/// See [`analyze_table`]; also fails if the input cannot be read or the
/// output cannot be created.
pub async fn run<P: LlmProvider>(
    provider: &P,
    input: &Path,
    output: &Path,
    columns: &ColumnsConfig,
    options: RunOptions,
) -> Result<RunSummary, AnalysisError> {
    let table = CaseTable::from_path(input)?;
    table.require(&columns.case_text_columns())?;
    tracing::info!(rows = table.len(), input = %input.display(), "starting single-case analysis");
    let mut out = create_writer(output)?;
    let summary = analyze_table(provider, &table, columns, options, &mut out).await?;
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        output = %output.display(),
        "single-case analysis finished"
    );
    Ok(summary)
}
