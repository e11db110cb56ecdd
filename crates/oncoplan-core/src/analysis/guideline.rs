//! Guideline-grounded treatment plans and short guideline descriptions.
//!
//! A guideline library is a directory of plain-text guideline files. Plans
//! are generated in two calls: the model first picks the file that matches
//! the patient from previews of every file, then writes the plan with that
//! file's full text in its system prompt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use oncoplan_llm::{LlmProvider, Prompt};
use regex::Regex;

use super::AnalysisError;
use crate::cases::write_text;
use crate::config::FailurePolicy;
use crate::prompts;

/// Used when the model names a file the library does not hold.
pub const FALLBACK_GUIDELINE: &str = "all-patient.txt";
pub const PREVIEW_LINES: usize = 300;

const SELECTION_MAX_TOKENS: u32 = 20;
const PLAN_MAX_TOKENS: u32 = 2500;
const BASELINE_MAX_TOKENS: u32 = 1000;
const DESCRIPTION_MAX_TOKENS: u32 = 100;

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(" +").unwrap());

fn collapse_spaces(text: &str) -> String {
    SPACES_RE.replace_all(text, " ").into_owned()
}

/// The first [`PREVIEW_LINES`] lines joined by spaces.
#[must_use]
pub fn preview(text: &str) -> String {
    let lines: Vec<&str> = text.lines().take(PREVIEW_LINES).collect();
    collapse_spaces(&lines.join(" "))
}

/// Full text on one line.
#[must_use]
pub fn flatten(text: &str) -> String {
    collapse_spaces(&text.replace(['\r', '\n'], " "))
}

#[derive(Debug, Clone)]
pub struct GuidelineLibrary {
    dir: PathBuf,
    previews: Vec<(String, String)>,
}

impl GuidelineLibrary {
    /// Index every `*.txt` file directly under `dir`, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or a file cannot be read, and
    /// [`AnalysisError::NoGuidelines`] if no `.txt` file is present.
    pub fn load(dir: &Path) -> Result<Self, AnalysisError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file()
                && path.extension().is_some_and(|ext| ext == "txt")
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_owned());
            }
        }
        if names.is_empty() {
            return Err(AnalysisError::NoGuidelines {
                dir: dir.to_path_buf(),
            });
        }
        names.sort();

        let mut previews = Vec::with_capacity(names.len());
        for name in names {
            let text = std::fs::read_to_string(dir.join(&name))?;
            previews.push((name, preview(&text)));
        }
        tracing::debug!(dir = %dir.display(), files = previews.len(), "guideline library loaded");
        Ok(Self {
            dir: dir.to_path_buf(),
            previews,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn previews(&self) -> &[(String, String)] {
        &self.previews
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.previews.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.previews.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.previews.iter().any(|(n, _)| n == name)
    }

    /// Full flattened text of a file in the library.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::GuidelineNotFound`] for a name outside the
    /// library, or the read error.
    pub fn read(&self, name: &str) -> Result<String, AnalysisError> {
        if !self.contains(name) {
            return Err(AnalysisError::GuidelineNotFound {
                name: name.to_owned(),
                dir: self.dir.clone(),
            });
        }
        let text = std::fs::read_to_string(self.dir.join(name))?;
        Ok(flatten(&text))
    }

    /// Map the model's reply to a file in the library. Only exact names
    /// listed in the library are accepted.
    fn resolve(&self, reply: &str) -> Option<&str> {
        let name = reply.trim().trim_matches(['`', '"', '\'']).trim();
        self.previews
            .iter()
            .map(|(n, _)| n.as_str())
            .find(|n| *n == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidelineChoice {
    pub name: String,
    pub fell_back: bool,
}

/// Ask the model which guideline file matches `patient`.
///
/// # Errors
///
/// Returns the LLM error, or [`AnalysisError::GuidelineNotFound`] when the
/// reply names no known file and the library has no fallback file.
pub async fn select_guideline<P: LlmProvider>(
    provider: &P,
    library: &GuidelineLibrary,
    patient: &str,
) -> Result<GuidelineChoice, AnalysisError> {
    let prompt = Prompt::new(patient, SELECTION_MAX_TOKENS)
        .with_system(prompts::guideline_selection_system(library.previews()))
        .with_temperature(0.0);
    let reply = provider.complete(&prompt).await?;

    if let Some(name) = library.resolve(&reply) {
        tracing::info!(guideline = name, "guideline selected");
        return Ok(GuidelineChoice {
            name: name.to_owned(),
            fell_back: false,
        });
    }
    tracing::warn!(
        reply = reply.trim(),
        "recommended guideline not found, using {FALLBACK_GUIDELINE}"
    );
    if !library.contains(FALLBACK_GUIDELINE) {
        return Err(AnalysisError::GuidelineNotFound {
            name: FALLBACK_GUIDELINE.to_owned(),
            dir: library.dir().to_path_buf(),
        });
    }
    Ok(GuidelineChoice {
        name: FALLBACK_GUIDELINE.to_owned(),
        fell_back: true,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidedPlan {
    pub guideline: GuidelineChoice,
    pub plan: String,
    /// Plan from the base prompt alone, for comparison.
    pub baseline: Option<String>,
}

impl GuidedPlan {
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "Guideline: {}\n\nLLM+RAG\n\n{}\n",
            self.guideline.name, self.plan
        );
        if let Some(baseline) = &self.baseline {
            text.push_str("\n\nLLM\n\n");
            text.push_str(baseline);
            text.push('\n');
        }
        text
    }
}

/// Select a guideline and generate a plan grounded in it. With
/// `with_baseline`, a third call answers from the base prompt alone.
///
/// # Errors
///
/// Returns [`AnalysisError::NoCases`] for a blank patient description, or
/// the first failing step's error.
pub async fn plan<P: LlmProvider>(
    provider: &P,
    library: &GuidelineLibrary,
    patient: &str,
    with_baseline: bool,
) -> Result<GuidedPlan, AnalysisError> {
    if patient.trim().is_empty() {
        return Err(AnalysisError::NoCases);
    }
    let guideline = select_guideline(provider, library, patient).await?;
    let text = library.read(&guideline.name)?;

    let prompt = Prompt::new(patient, PLAN_MAX_TOKENS)
        .with_system(prompts::guided_plan_system(&text))
        .with_temperature(0.0);
    let plan = provider.complete(&prompt).await?;

    let baseline = if with_baseline {
        let prompt = Prompt::new(patient, BASELINE_MAX_TOKENS)
            .with_system(prompts::GUIDED_PLAN_SYSTEM)
            .with_temperature(0.0);
        Some(provider.complete(&prompt).await?)
    } else {
        None
    };

    Ok(GuidedPlan {
        guideline,
        plan,
        baseline,
    })
}

/// Read the patient description from `patient`, plan against the library
/// in `guidelines`, and write the rendered result to `output`.
///
/// # Errors
///
/// Fails on unreadable inputs or a failed call. Nothing is written on
/// failure.
pub async fn run<P: LlmProvider>(
    provider: &P,
    patient: &Path,
    guidelines: &Path,
    output: &Path,
    with_baseline: bool,
) -> Result<GuidedPlan, AnalysisError> {
    let description = std::fs::read_to_string(patient)?;
    let library = GuidelineLibrary::load(guidelines)?;
    let result = plan(provider, &library, &description, with_baseline).await?;
    write_text(output, &result.render())?;
    tracing::info!(
        guideline = %result.guideline.name,
        output = %output.display(),
        "guideline-grounded plan written"
    );
    Ok(result)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionReport {
    pub descriptions: BTreeMap<String, String>,
    pub failed: Vec<(String, String)>,
}

/// One short description per guideline file, in file-name order.
///
/// # Errors
///
/// Under [`FailurePolicy::Abort`] the first failed call is returned as
/// [`AnalysisError::GuidelineFailed`]; under `Skip` it is reported and the
/// file is left out.
pub async fn describe<P: LlmProvider>(
    provider: &P,
    library: &GuidelineLibrary,
    policy: FailurePolicy,
) -> Result<DescriptionReport, AnalysisError> {
    let total = library.len();
    let mut report = DescriptionReport::default();
    for (i, (name, preview)) in library.previews().iter().enumerate() {
        tracing::info!(file = i + 1, total, guideline = %name, "describing guideline");
        let user = prompts::guideline_description_user(preview);
        let prompt = Prompt::new(user, DESCRIPTION_MAX_TOKENS).with_temperature(0.0);
        match provider.complete(&prompt).await {
            Ok(text) => {
                report.descriptions.insert(name.clone(), text.trim().to_owned());
            }
            Err(source) if policy == FailurePolicy::Abort => {
                return Err(AnalysisError::GuidelineFailed {
                    name: name.clone(),
                    source,
                });
            }
            Err(e) => {
                tracing::error!(guideline = %name, "description failed: {e}");
                report.failed.push((name.clone(), e.to_string()));
            }
        }
    }
    Ok(report)
}

/// Describe every guideline in `guidelines` and write the name to
/// description map to `output` as pretty-printed JSON.
///
/// # Errors
///
/// Fails on an unreadable library or as [`describe`] does.
pub async fn run_describe<P: LlmProvider>(
    provider: &P,
    guidelines: &Path,
    output: &Path,
    policy: FailurePolicy,
) -> Result<DescriptionReport, AnalysisError> {
    let library = GuidelineLibrary::load(guidelines)?;
    let report = describe(provider, &library, policy).await?;
    write_text(output, &serde_json::to_string_pretty(&report.descriptions)?)?;
    tracing::info!(
        described = report.descriptions.len(),
        output = %output.display(),
        "guideline descriptions written"
    );
    Ok(report)
}
