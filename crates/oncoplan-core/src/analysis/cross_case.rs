//! One aggregate analysis over a bounded set of cases.

use std::path::Path;

use oncoplan_llm::{LlmProvider, Prompt};

use super::AnalysisError;
use crate::cases::{CaseRecord, CaseTable, write_text};
use crate::config::ColumnsConfig;
use crate::prompts;

const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCaseReport {
    pub cases_used: usize,
    pub skipped: Vec<usize>,
}

/// Take the first `max_records` rows and keep those with all three text
/// fields. Incomplete rows inside the window are reported, not replaced.
#[must_use]
pub fn select_cases(records: Vec<CaseRecord>, max_records: usize) -> (Vec<CaseRecord>, Vec<usize>) {
    let mut skipped = Vec::new();
    let selected = records
        .into_iter()
        .take(max_records)
        .filter(|r| {
            let keep = r.is_complete();
            if !keep {
                tracing::warn!(row = r.index + 1, "skipping case with missing text fields");
                skipped.push(r.index);
            }
            keep
        })
        .collect();
    (selected, skipped)
}

/// # Errors
///
/// Returns [`AnalysisError::NoCases`] for an empty slice, or the LLM error.
pub async fn analyze_cases<P: LlmProvider>(
    provider: &P,
    cases: &[CaseRecord],
) -> Result<String, AnalysisError> {
    if cases.is_empty() {
        return Err(AnalysisError::NoCases);
    }
    let prompt = Prompt::new(prompts::cross_case_user(cases), MAX_TOKENS)
        .with_system(prompts::CROSS_CASE_SYSTEM)
        .with_temperature(TEMPERATURE);
    tracing::info!(cases = cases.len(), "sending cross-case analysis request");
    Ok(provider.complete(&prompt).await?)
}

/// Analyze up to `max_records` cases from `input` and write the reply to
/// `output` verbatim.
///
/// # Errors
///
/// Fails when the input is unreadable or lacks columns, when no complete case
/// remains, or when the call fails. Nothing is written on failure.
pub async fn run<P: LlmProvider>(
    provider: &P,
    input: &Path,
    output: &Path,
    columns: &ColumnsConfig,
    max_records: usize,
) -> Result<CrossCaseReport, AnalysisError> {
    let table = CaseTable::from_path(input)?;
    let (cases, skipped) = select_cases(table.records(columns)?, max_records);
    let analysis = analyze_cases(provider, &cases).await?;
    write_text(output, &analysis)?;
    tracing::info!(cases = cases.len(), output = %output.display(), "cross-case analysis written");
    Ok(CrossCaseReport {
        cases_used: cases.len(),
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use oncoplan_llm::mock::MockProvider;

    use super::*;

    fn record(index: usize, disease: &str) -> CaseRecord {
        CaseRecord {
            index,
            patient_id: None,
            disease: disease.into(),
            summary: format!("s{index}"),
            recommendations: format!("r{index}"),
        }
    }

    #[test]
    fn window_applies_before_skipping() {
        let records = vec![record(0, "a"), record(1, " "), record(2, "c"), record(3, "d")];
        let (cases, skipped) = select_cases(records, 3);
        let diseases: Vec<&str> = cases.iter().map(|c| c.disease.as_str()).collect();
        assert_eq!(diseases, vec!["a", "c"]);
        assert_eq!(skipped, vec![1]);
    }

    #[tokio::test]
    async fn empty_selection_makes_no_call() {
        let provider = MockProvider::fixed("x");
        let err = analyze_cases(&provider, &[]).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NoCases));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn single_request_embeds_numbered_cases() {
        let provider = MockProvider::fixed("ANALYSIS");
        let cases = vec![record(0, "lung"), record(1, "breast")];
        let text = analyze_cases(&provider, &cases).await.unwrap();
        assert_eq!(text, "ANALYSIS");

        let prompts = provider.recorded_prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].max_tokens, 4000);
        assert_eq!(prompts[0].temperature, Some(0.1));
        let user = &prompts[0].messages[1].content;
        assert!(user.contains("--- מקרה 1 ---") && user.contains("--- סוף מקרה 2 ---"));
        assert!(!user.contains("--- מקרה 3 ---"));
    }

    #[tokio::test]
    async fn run_writes_reply_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cases.csv");
        std::fs::write(
            &input,
            "Current_Disease,Summary_Conclusions,Recommendations\n\
             d1,s1,r1\nd2,s2,r2\nd3,s3,r3\n",
        )
        .unwrap();
        let output = dir.path().join("out/cross.txt");
        let provider = MockProvider::fixed("line one\nline two");

        let report = run(&provider, &input, &output, &ColumnsConfig::default(), 2)
            .await
            .unwrap();
        assert_eq!(report.cases_used, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "line one\nline two");
    }

    #[tokio::test]
    async fn failed_call_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("cases.csv");
        std::fs::write(&input, "Current_Disease,Summary_Conclusions,Recommendations\nd,s,r\n")
            .unwrap();
        let output = dir.path().join("cross.txt");
        let err = run(
            &MockProvider::failing(),
            &input,
            &output,
            &ColumnsConfig::default(),
            50,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::Llm(_)));
        assert!(!output.exists());
    }
}
