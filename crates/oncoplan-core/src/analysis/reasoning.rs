//! Treatment type and ranked reasons behind each physician decision.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use oncoplan_llm::{LlmProvider, Prompt};

use super::{AnalysisError, LLM_FAILED, RowOutcome, RunOptions, RunSummary, drive_rows, tally};
use crate::cases::{CaseRecord, CaseTable, create_writer};
use crate::config::ColumnsConfig;
use crate::prompts;

pub const OUTPUT_COLUMNS: [&str; 5] = ["treatment_type", "reason_1", "reason_2", "reason_3", "reason_4"];

const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreatmentReasons {
    pub treatment_type: String,
    pub reasons: [String; 4],
}

impl TreatmentReasons {
    fn failed() -> Self {
        Self {
            treatment_type: LLM_FAILED.to_owned(),
            ..Self::default()
        }
    }

    fn into_row(self) -> [String; 5] {
        let [r1, r2, r3, r4] = self.reasons;
        [self.treatment_type, r1, r2, r3, r4]
    }
}

/// Read lines numbered `1.` through `5.` (also `1)` and `1-`). Line 1 is the
/// treatment type, lines 2 to 5 the reasons. Later lines with the same number
/// win; unnumbered lines and empty items are ignored.
#[must_use]
pub fn parse_reasons(text: &str) -> TreatmentReasons {
    let mut slots: [String; 5] = Default::default();
    for line in text.lines().map(str::trim) {
        for (slot, digit) in slots.iter_mut().zip('1'..='5') {
            let Some(rest) = line.strip_prefix(digit) else {
                continue;
            };
            let item = [". ", ") ", "- "]
                .iter()
                .find_map(|sep| rest.strip_prefix(sep))
                .map(str::trim);
            if let Some(item) = item
                && !item.is_empty()
            {
                *slot = item.to_owned();
            }
        }
    }
    let [treatment_type, r1, r2, r3, r4] = slots;
    TreatmentReasons {
        treatment_type,
        reasons: [r1, r2, r3, r4],
    }
}

async fn process<P: LlmProvider>(provider: &P, case: &CaseRecord) -> RowOutcome<TreatmentReasons> {
    let prompt = Prompt::new(prompts::reasoning_user(case), MAX_TOKENS)
        .with_system(prompts::reasoning_system())
        .with_temperature(0.0);
    match provider.complete(&prompt).await {
        Ok(text) => {
            let parsed = parse_reasons(&text);
            if parsed.treatment_type.is_empty() {
                tracing::warn!(row = case.index + 1, "no numbered treatment line in response");
            }
            RowOutcome::ok(parsed)
        }
        Err(e) => RowOutcome::failed(TreatmentReasons::failed(), e),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasonsReport {
    pub summary: RunSummary,
    /// Every non-empty reason with its count, most common first.
    pub frequencies: Vec<(String, usize)>,
}

/// # Errors
///
/// Fails on missing columns before any call, on write errors, and under the
/// abort policy on the first failed row.
pub async fn reason_table<P, W>(
    provider: &P,
    table: &CaseTable,
    columns: &ColumnsConfig,
    options: RunOptions,
    out: &mut csv::Writer<W>,
) -> Result<ReasonsReport, AnalysisError>
where
    P: LlmProvider,
    W: Write,
{
    let records = table.records(columns)?;

    let mut header: Vec<&str> = table.headers().iter().map(String::as_str).collect();
    header.extend(OUTPUT_COLUMNS);
    out.write_record(&header)?;
    out.flush()?;

    let mut all_reasons: Vec<String> = Vec::new();
    let summary = drive_rows(
        records,
        options,
        |case| async move { process(provider, &case).await },
        |row, result: TreatmentReasons| {
            all_reasons.extend(result.reasons.iter().filter(|r| !r.is_empty()).cloned());
            let mut record = table.rows()[row].clone();
            record.extend(result.into_row());
            out.write_record(&record)?;
            out.flush()?;
            Ok(())
        },
    )
    .await?;

    let frequencies = tally(all_reasons.iter().map(String::as_str))
        .into_iter()
        .map(|(reason, count)| (reason.to_owned(), count))
        .collect();
    Ok(ReasonsReport {
        summary,
        frequencies,
    })
}

#[must_use]
pub fn render_frequencies(frequencies: &[(String, usize)]) -> String {
    let mut out = String::from("Reason frequencies:\n");
    for (reason, count) in frequencies {
        let _ = writeln!(out, "- \"{reason}\": {count} occurrences");
    }
    out
}

/// # Errors
///
/// See [`reason_table`]; also fails when the input or output cannot be
/// opened.
pub async fn run<P: LlmProvider>(
    provider: &P,
    input: &Path,
    output: &Path,
    columns: &ColumnsConfig,
    options: RunOptions,
) -> Result<ReasonsReport, AnalysisError> {
    let table = CaseTable::from_path(input)?;
    table.require(&columns.case_text_columns())?;
    tracing::info!(rows = table.len(), input = %input.display(), "starting treatment reasoning");
    let mut out = create_writer(output)?;
    let report = reason_table(provider, &table, columns, options, &mut out).await?;
    tracing::info!(
        succeeded = report.summary.succeeded,
        failed = report.summary.failed.len(),
        distinct_reasons = report.frequencies.len(),
        "treatment reasoning finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use oncoplan_llm::mock::MockProvider;
    use proptest::prelude::*;

    use super::*;

    const RESPONSE: &str = "התשובה:\n\
                            1. אימונו וכימו\n\
                            2) PS Good 0-1\n\
                            3- PDL-1 low\n\
                            4. High disease burden\n\
                            5. Palliative\n";

    #[test]
    fn parses_all_three_numbering_styles() {
        let parsed = parse_reasons(RESPONSE);
        assert_eq!(parsed.treatment_type, "אימונו וכימו");
        assert_eq!(
            parsed.reasons,
            ["PS Good 0-1", "PDL-1 low", "High disease burden", "Palliative"]
        );
    }

    #[test]
    fn later_duplicates_win_and_empty_items_are_ignored() {
        let parsed = parse_reasons("1. first\n1. second\n2. \n2. kept\n6. ignored\n10. nope");
        assert_eq!(parsed.treatment_type, "second");
        assert_eq!(parsed.reasons[0], "kept");
        assert_eq!(parsed.reasons[3], "");
    }

    #[test]
    fn unnumbered_text_yields_empty_slots() {
        assert_eq!(parse_reasons("free text only"), TreatmentReasons::default());
    }

    #[test]
    fn frequencies_render_most_common_first() {
        let text = render_frequencies(&[("Palliative".into(), 3), ("Curative".into(), 1)]);
        assert_eq!(
            text,
            "Reason frequencies:\n- \"Palliative\": 3 occurrences\n- \"Curative\": 1 occurrences\n"
        );
    }

    #[tokio::test]
    async fn table_rows_and_frequencies() {
        let table = CaseTable::from_reader(
            "PatId,Current_Disease,Summary_Conclusions,Recommendations\nP1,d1,s1,r1\nP2,d2,s2,r2\nP3,d3,s3,r3\n"
                .as_bytes(),
            "t",
        )
        .unwrap();
        let provider = MockProvider::fixed(RESPONSE).failing_on([1]);
        let mut out = csv::Writer::from_writer(Vec::new());
        let report = reason_table(
            &provider,
            &table,
            &ColumnsConfig::default(),
            RunOptions::default(),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(report.summary.failed_rows(), vec![1]);
        assert_eq!(report.frequencies.len(), 4);
        assert!(report.frequencies.iter().all(|(_, n)| *n == 2));

        let written = CaseTable::from_reader(out.into_inner().unwrap().as_slice(), "out").unwrap();
        assert_eq!(
            written.headers(),
            [
                "PatId",
                "Current_Disease",
                "Summary_Conclusions",
                "Recommendations",
                "treatment_type",
                "reason_1",
                "reason_2",
                "reason_3",
                "reason_4"
            ]
        );
        assert_eq!(written.get(0, "PatId"), Some("P1"));
        assert_eq!(written.get(1, "Current_Disease"), Some("d2"));
        assert_eq!(written.get(1, "PatId"), Some("P2"));
        assert_eq!(written.get(1, "treatment_type"), Some(LLM_FAILED));
        assert_eq!(written.get(1, "reason_1"), Some(""));
        assert_eq!(written.get(2, "reason_4"), Some("Palliative"));

        let prompt = &provider.recorded_prompts()[0];
        assert_eq!(prompt.max_tokens, 1000);
        assert!(prompt.messages[0].content.contains("Awaiting NGS"));
        assert!(prompt.messages[1].content.contains("r1 s1"));
    }

    proptest! {
        #[test]
        fn parser_never_panics_and_slots_are_trimmed(text in "\\PC{0,200}") {
            let parsed = parse_reasons(&text);
            prop_assert_eq!(parsed.treatment_type.trim(), parsed.treatment_type.as_str());
            for r in &parsed.reasons {
                prop_assert_eq!(r.trim(), r.as_str());
            }
        }

        #[test]
        fn numbered_items_land_in_their_slot(items in proptest::collection::vec("[a-zA-Z][a-zA-Z ]{0,10}[a-zA-Z]", 5)) {
            let text: String = items
                .iter()
                .enumerate()
                .map(|(i, item)| format!("{}. {item}\n", i + 1))
                .collect();
            let parsed = parse_reasons(&text);
            prop_assert_eq!(&parsed.treatment_type, &items[0]);
            prop_assert_eq!(&parsed.reasons[..], &items[1..]);
        }
    }
}
