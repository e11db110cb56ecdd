//! CSV case tables: loading, column checks, and writers.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::ColumnsConfig;

const BOM: char = '\u{feff}';

#[derive(Debug, thiserror::Error)]
pub enum CaseError {
    #[error("{source_name} is empty or has no header row")]
    EmptyInput { source_name: String },

    #[error("missing required columns: {}", missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One input row's free-text fields. `index` is the zero-based row position
/// after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRecord {
    pub index: usize,
    pub patient_id: Option<String>,
    pub disease: String,
    pub summary: String,
    pub recommendations: String,
}

impl CaseRecord {
    /// All three text fields carry content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        [&self.disease, &self.summary, &self.recommendations]
            .iter()
            .all(|f| !f.trim().is_empty())
    }
}

/// A header plus rows, each row padded to the header width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CaseTable {
    /// # Errors
    ///
    /// Returns [`CaseError::Open`] if the file cannot be opened and
    /// [`CaseError::EmptyInput`] if it has no header.
    pub fn from_path(path: &Path) -> Result<Self, CaseError> {
        let file = File::open(path).map_err(|source| CaseError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    /// # Errors
    ///
    /// Returns [`CaseError::EmptyInput`] when no header row is present, or a
    /// CSV error for malformed input.
    pub fn from_reader<R: Read>(reader: R, source_name: &str) -> Result<Self, CaseError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = if i == 0 { h.trim_start_matches(BOM) } else { h };
                h.trim().to_owned()
            })
            .collect();
        if headers.iter().all(String::is_empty) {
            return Err(CaseError::EmptyInput {
                source_name: source_name.to_owned(),
            });
        }

        let width = headers.len();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().take(width).map(str::to_owned).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        tracing::debug!(source = source_name, rows = rows.len(), "case table loaded");
        Ok(Self { headers, rows })
    }

    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// # Errors
    ///
    /// Returns [`CaseError::MissingColumns`] listing every absent name.
    pub fn require(&self, names: &[&str]) -> Result<(), CaseError> {
        let missing: Vec<String> = names
            .iter()
            .filter(|n| self.column_index(n).is_none())
            .map(|n| (*n).to_owned())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CaseError::MissingColumns { missing })
        }
    }

    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row).map(|r| r[col].as_str())
    }

    /// Project every row onto the configured text columns.
    ///
    /// # Errors
    ///
    /// Returns [`CaseError::MissingColumns`] if a text column is absent. The
    /// patient id column is optional.
    pub fn records(&self, columns: &ColumnsConfig) -> Result<Vec<CaseRecord>, CaseError> {
        self.require(&columns.case_text_columns())?;
        let col = |name: &str| {
            self.column_index(name)
                .ok_or_else(|| CaseError::MissingColumns {
                    missing: vec![name.to_owned()],
                })
        };
        let disease = col(&columns.disease)?;
        let summary = col(&columns.summary)?;
        let recs = col(&columns.recommendations)?;
        let patient = self.column_index(&columns.patient_id);

        Ok(self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| CaseRecord {
                index,
                patient_id: patient.map(|p| row[p].clone()).filter(|v| !v.is_empty()),
                disease: row[disease].clone(),
                summary: row[summary].clone(),
                recommendations: row[recs].clone(),
            })
            .collect())
    }
}

fn ensure_parent(path: &Path) -> Result<(), CaseError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Open a CSV writer, creating missing parent directories.
///
/// # Errors
///
/// Returns an I/O error if the file or its directory cannot be created.
pub fn create_writer(path: &Path) -> Result<csv::Writer<File>, CaseError> {
    ensure_parent(path)?;
    Ok(csv::Writer::from_path(path)?)
}

/// Write a CSV file that opens cleanly in spreadsheet tools: UTF-8 with a
/// leading byte-order mark.
///
/// # Errors
///
/// Returns an I/O or CSV error on write failure.
pub fn write_table_with_bom(
    path: &Path,
    headers: &[String],
    rows: &[Vec<String>],
) -> Result<(), CaseError> {
    use std::io::Write as _;

    ensure_parent(path)?;
    let mut file = File::create(path)?;
    file.write_all(BOM.to_string().as_bytes())?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(headers)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// # Errors
///
/// Returns an I/O error if the file or its directory cannot be written.
pub fn write_text(path: &Path, text: &str) -> Result<(), CaseError> {
    ensure_parent(path)?;
    std::fs::write(path, text)?;
    Ok(())
}
