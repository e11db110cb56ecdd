//! Decision-pattern analysis for each treating physician.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use oncoplan_llm::{LlmProvider, Prompt};

use super::AnalysisError;
use crate::cases::{CaseError, CaseTable, write_table_with_bom, write_text};
use crate::config::{ColumnsConfig, FailurePolicy};
use crate::prompts;

const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f32 = 0.2;

/// One physician's joined case rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorGroup {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DoctorGroup {
    #[must_use]
    pub fn raw_data_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}_raw_data.csv", file_stem(&self.name)))
    }

    #[must_use]
    pub fn analysis_path(&self, out_dir: &Path) -> PathBuf {
        out_dir.join(format!("{}_analysis.txt", file_stem(&self.name)))
    }
}

/// Spaces become underscores; path separators and other characters that are
/// unsafe in file names become `-`.
#[must_use]
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// Inner-join `cases` with `doctors` on the patient id and group the joined
/// rows by `first + " " + last`, sorted by name. Each group keeps at most
/// `max_per_doctor` rows, in case order.
///
/// The case side joins on the doctor table's id column when it has one,
/// otherwise on the configured patient id column. Other columns present on
/// both sides get `_x` (case) and `_y` (doctor) suffixes.
///
/// # Errors
///
/// Returns [`CaseError::MissingColumns`] when either table lacks its key or
/// the doctor table lacks a name column.
pub fn join_and_group(
    cases: &CaseTable,
    doctors: &CaseTable,
    columns: &ColumnsConfig,
    max_per_doctor: usize,
) -> Result<Vec<DoctorGroup>, CaseError> {
    doctors.require(&[
        columns.doctor_patient_id.as_str(),
        columns.doctor_first_name.as_str(),
        columns.doctor_last_name.as_str(),
    ])?;
    let case_key = [&columns.doctor_patient_id, &columns.patient_id]
        .into_iter()
        .find_map(|k| cases.column_index(k))
        .ok_or_else(|| CaseError::MissingColumns {
            missing: vec![columns.doctor_patient_id.clone()],
        })?;
    let col = |name: &str| {
        doctors.column_index(name).ok_or_else(|| CaseError::MissingColumns {
            missing: vec![name.to_owned()],
        })
    };
    let doctor_key = col(&columns.doctor_patient_id)?;
    let first = col(&columns.doctor_first_name)?;
    let last = col(&columns.doctor_last_name)?;

    let headers = joined_headers(cases.headers(), case_key, doctors.headers(), doctor_key);

    let mut by_patient: HashMap<&str, Vec<&Vec<String>>> = HashMap::new();
    for row in doctors.rows() {
        by_patient.entry(row[doctor_key].as_str()).or_default().push(row);
    }

    let mut groups: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();
    for case in cases.rows() {
        let Some(matches) = by_patient.get(case[case_key].as_str()) else {
            continue;
        };
        for doctor in matches {
            if doctor[first].is_empty() || doctor[last].is_empty() {
                continue;
            }
            let name = format!("{} {}", doctor[first], doctor[last]);
            let rows = groups.entry(name).or_default();
            if rows.len() >= max_per_doctor {
                continue;
            }
            let mut joined = case.clone();
            joined.extend(
                doctor
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != doctor_key)
                    .map(|(_, v)| v.clone()),
            );
            rows.push(joined);
        }
    }

    Ok(groups
        .into_iter()
        .map(|(name, rows)| DoctorGroup {
            name,
            headers: headers.clone(),
            rows,
        })
        .collect())
}

fn joined_headers(
    cases: &[String],
    case_key: usize,
    doctors: &[String],
    doctor_key: usize,
) -> Vec<String> {
    let shared = |h: &String, other: &[String], skip: usize| {
        other
            .iter()
            .enumerate()
            .any(|(i, o)| i != skip && o == h)
    };
    let mut headers: Vec<String> = cases
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i != case_key && shared(h, doctors, doctor_key) {
                format!("{h}_x")
            } else {
                h.clone()
            }
        })
        .collect();
    headers.extend(
        doctors
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != doctor_key)
            .map(|(_, h)| {
                if shared(h, cases, case_key) {
                    format!("{h}_y")
                } else {
                    h.clone()
                }
            }),
    );
    headers
}

/// # Errors
///
/// Returns the LLM error for the call.
pub async fn analyze_doctor<P: LlmProvider>(
    provider: &P,
    group: &DoctorGroup,
) -> Result<String, AnalysisError> {
    let prompt = Prompt::new(
        prompts::per_doctor_user(&group.name, &group.headers, &group.rows),
        MAX_TOKENS,
    )
    .with_system(prompts::PER_DOCTOR_SYSTEM)
    .with_temperature(TEMPERATURE);
    Ok(provider.complete(&prompt).await?)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerDoctorReport {
    pub analyzed: Vec<String>,
    /// Physician name and error text for each failed call.
    pub failed: Vec<(String, String)>,
}

/// For every physician: write the joined rows, run one analysis call, and
/// write its reply. Physicians are processed one at a time in name order.
///
/// # Errors
///
/// Fails when either input is unreadable or lacks columns, when no case
/// matches a physician, on write errors, and under the abort policy on the
/// first failed call.
pub async fn run<P: LlmProvider>(
    provider: &P,
    cases_path: &Path,
    doctors_path: &Path,
    out_dir: &Path,
    columns: &ColumnsConfig,
    max_per_doctor: usize,
    policy: FailurePolicy,
) -> Result<PerDoctorReport, AnalysisError> {
    let cases = CaseTable::from_path(cases_path)?;
    let doctors = CaseTable::from_path(doctors_path)?;
    let groups = join_and_group(&cases, &doctors, columns, max_per_doctor)?;
    if groups.is_empty() {
        return Err(AnalysisError::NoCases);
    }
    tracing::info!(
        cases = cases.len(),
        doctors = groups.len(),
        "joined cases with physicians"
    );

    let mut report = PerDoctorReport::default();
    for group in &groups {
        let raw = group.raw_data_path(out_dir);
        write_table_with_bom(&raw, &group.headers, &group.rows)?;
        tracing::info!(doctor = %group.name, cases = group.rows.len(), path = %raw.display(), "raw data written");

        match analyze_doctor(provider, group).await {
            Ok(text) => {
                write_text(&group.analysis_path(out_dir), &text)?;
                tracing::info!(doctor = %group.name, "physician analysis written");
                report.analyzed.push(group.name.clone());
            }
            Err(AnalysisError::Llm(source)) => {
                tracing::error!(doctor = %group.name, "physician analysis failed: {source}");
                if policy == FailurePolicy::Abort {
                    return Err(AnalysisError::DoctorFailed {
                        doctor: group.name.clone(),
                        source,
                    });
                }
                report.failed.push((group.name.clone(), source.to_string()));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}
