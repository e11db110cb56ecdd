//! Structured patient profiles extracted from free-text case notes.

use std::io::Write;
use std::path::Path;

use oncoplan_llm::LlmProvider;
use serde::Deserialize;
use serde_json::Value;

use super::{AnalysisError, RowOutcome, RunOptions, RunSummary, cohort, drive_rows};
use crate::cases::{CaseRecord, CaseTable, create_writer, write_text};
use crate::config::ColumnsConfig;
use crate::pipeline::builtin::{ExtractStep, JsonObjectStep, LlmStep, MapStep};
use crate::pipeline::{Pipeline, PipelineError, StageError};
use crate::prompts;

pub const IMMUNO_ONLY: &str = "Immunotherapy Only";
pub const COMBO: &str = "Immunotherapy and Chemotherapy";

pub const LLM_FAILED_MARK: &str = "Error: LLM Failed";
pub const PARSE_FAILED_MARK: &str = "Error: JSON Parse Failed";

pub const PROFILE_COLUMNS: [&str; 10] = [
    "cancer_type",
    "metastasized",
    "age",
    "background_illnesses",
    "treatment_type",
    "reason_for_treatment_choice",
    "pdl1_score",
    "dosage_change",
    "chemotherapy_medication_type",
    "performance_status",
];

const MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    ImmunoOnly,
    Combo,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientProfile {
    pub cancer_type: String,
    pub metastasized: Option<bool>,
    pub age: Option<u32>,
    pub background_illnesses: Vec<String>,
    pub treatment_type: String,
    pub reason: String,
    pub pdl1_score: Option<f64>,
    pub dosage_change: Option<f64>,
    pub medication: String,
    pub performance_status: Option<u8>,
}

impl PatientProfile {
    /// Profile whose text fields all carry `mark`.
    #[must_use]
    pub fn marked(mark: &str) -> Self {
        Self {
            cancer_type: mark.to_owned(),
            metastasized: None,
            age: None,
            background_illnesses: Vec::new(),
            treatment_type: mark.to_owned(),
            reason: mark.to_owned(),
            pdl1_score: None,
            dosage_change: None,
            medication: mark.to_owned(),
            performance_status: None,
        }
    }

    #[must_use]
    pub fn treatment(&self) -> Treatment {
        match self.treatment_type.as_str() {
            IMMUNO_ONLY => Treatment::ImmunoOnly,
            COMBO => Treatment::Combo,
            _ => Treatment::Other,
        }
    }

    fn to_row(&self) -> Vec<String> {
        fn opt<T: ToString>(v: Option<&T>) -> String {
            v.map(ToString::to_string).unwrap_or_default()
        }
        vec![
            self.cancer_type.clone(),
            opt(self.metastasized.as_ref()),
            opt(self.age.as_ref()),
            self.background_illnesses.join("; "),
            self.treatment_type.clone(),
            self.reason.clone(),
            opt(self.pdl1_score.as_ref()),
            opt(self.dosage_change.as_ref()),
            self.medication.clone(),
            opt(self.performance_status.as_ref()),
        ]
    }
}

/// The extraction reply as sent. Every key is optional and loosely typed;
/// conversion to [`PatientProfile`] applies the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawProfile {
    cancer_type: Option<Value>,
    metastasized: Option<Value>,
    age: Option<Value>,
    background_illnesses: Option<Value>,
    treatment_type: Option<Value>,
    reason_for_treatment_choice: Option<Value>,
    pdl1_score: Option<Value>,
    dosage_change: Option<Value>,
    chemotherapy_medication_type: Option<Value>,
    performance_status: Option<Value>,
}

fn text_or(value: Option<Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_owned(),
        Some(Value::String(s)) if s.trim().is_empty() => default.to_owned(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: Option<&Value>) -> Option<u32> {
    number(value)
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n.round() as u32)
}

fn list(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_owned()],
        _ => Vec::new(),
    }
}

impl From<RawProfile> for PatientProfile {
    fn from(raw: RawProfile) -> Self {
        let performance_status = whole(raw.performance_status.as_ref())
            .and_then(|ps| u8::try_from(ps).ok())
            .filter(|ps| *ps <= 4);
        Self {
            metastasized: flag(raw.metastasized.as_ref()),
            age: whole(raw.age.as_ref()),
            pdl1_score: number(raw.pdl1_score.as_ref()),
            dosage_change: number(raw.dosage_change.as_ref()),
            performance_status,
            cancer_type: text_or(raw.cancer_type, "Unknown"),
            background_illnesses: list(raw.background_illnesses),
            treatment_type: text_or(raw.treatment_type, "Other/Unclear"),
            reason: text_or(raw.reason_for_treatment_choice, "Not Specified"),
            medication: text_or(raw.chemotherapy_medication_type, "N/A"),
        }
    }
}

/// One extraction call for `case`. A failed call yields the LLM-failed
/// profile and a row error; an unparsable reply yields the parse-failed
/// profile and counts as success.
pub(crate) async fn extract_profile<P: LlmProvider>(
    provider: &P,
    case: &CaseRecord,
) -> RowOutcome<PatientProfile> {
    let pipeline = Pipeline::start(
        LlmStep::new(provider, MAX_TOKENS)
            .with_system_prompt(prompts::EXTRACTION_SYSTEM)
            .with_temperature(0.0),
    )
    .step(JsonObjectStep)
    .step(ExtractStep::<RawProfile>::new())
    .step(MapStep::new(<PatientProfile as From<RawProfile>>::from));

    match pipeline.run(prompts::extraction_user(case)).await {
        Ok(profile) => {
            if profile.treatment() == Treatment::Other {
                tracing::warn!(
                    row = case.index + 1,
                    treatment_type = %profile.treatment_type,
                    "unexpected treatment type, storing as is"
                );
            }
            RowOutcome::ok(profile)
        }
        Err(StageError {
            source: PipelineError::Llm(e),
            ..
        }) => RowOutcome::failed(PatientProfile::marked(LLM_FAILED_MARK), e),
        Err(e) => {
            tracing::warn!(row = case.index + 1, "could not parse extraction reply: {e}");
            RowOutcome::ok(PatientProfile::marked(PARSE_FAILED_MARK))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyReport {
    pub summary: RunSummary,
    pub profiles: Vec<PatientProfile>,
}

/// Extract a profile per row and write them, prefixed by the patient id
/// column, to `out`.
///
/// # Errors
///
/// Fails on missing columns before any call, on write errors, and under the
/// abort policy on the first failed row.
pub async fn classify_table<P, W>(
    provider: &P,
    table: &CaseTable,
    columns: &ColumnsConfig,
    options: RunOptions,
    out: &mut csv::Writer<W>,
) -> Result<ClassifyReport, AnalysisError>
where
    P: LlmProvider,
    W: Write,
{
    let records = table.records(columns)?;
    let mut header = vec![columns.patient_id.as_str()];
    header.extend(PROFILE_COLUMNS);
    out.write_record(&header)?;
    out.flush()?;

    let ids: Vec<String> = records
        .iter()
        .map(|r| r.patient_id.clone().unwrap_or_default())
        .collect();
    let mut profiles = Vec::with_capacity(records.len());
    let summary = drive_rows(
        records,
        options,
        |case| async move { extract_profile(provider, &case).await },
        |row, profile: PatientProfile| {
            let mut record = vec![ids[row].clone()];
            record.extend(profile.to_row());
            out.write_record(&record)?;
            out.flush()?;
            profiles.push(profile);
            Ok(())
        },
    )
    .await?;

    Ok(ClassifyReport { summary, profiles })
}

/// Classify every row of `input`, write the profiles to `output` and the
/// cohort report to `report_path`.
///
/// # Errors
///
/// See [`classify_table`]; also fails when any file cannot be opened or
/// written.
pub async fn run<P: LlmProvider>(
    provider: &P,
    input: &Path,
    output: &Path,
    report_path: &Path,
    columns: &ColumnsConfig,
    options: RunOptions,
) -> Result<ClassifyReport, AnalysisError> {
    let table = CaseTable::from_path(input)?;
    table.require(&columns.case_text_columns())?;
    tracing::info!(rows = table.len(), input = %input.display(), "starting patient classification");
    let mut out = create_writer(output)?;
    let report = classify_table(provider, &table, columns, options, &mut out).await?;
    write_text(report_path, &cohort::render_report(&report.profiles))?;
    tracing::info!(
        patients = report.profiles.len(),
        failed = report.summary.failed.len(),
        report = %report_path.display(),
        "cohort report written"
    );
    Ok(report)
}
