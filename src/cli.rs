use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use oncoplan_core::config::{Config, FailurePolicy};

/// LLM-assisted treatment-plan generation and analysis over oncology cases.
#[derive(Debug, Parser)]
#[command(name = "oncoplan", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// What to do when an LLM call for a row fails
    #[arg(long, global = true, value_enum)]
    pub on_error: Option<OnError>,

    /// Maximum number of rows processed at once
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnError {
    /// Write placeholders for the failed row and continue
    Skip,
    /// Stop at the first failed row
    Abort,
}

impl From<OnError> for FailurePolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Skip => Self::Skip,
            OnError::Abort => Self::Abort,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a treatment plan per case and compare it with the physician's
    Analyze {
        input: PathBuf,
        output: PathBuf,
    },

    /// One aggregate analysis across many cases
    Cross {
        input: PathBuf,
        output: PathBuf,
        /// Number of input rows considered (default from config: 50)
        #[arg(long, value_name = "N")]
        max_records: Option<usize>,
    },

    /// Treatment type and ranked reasons per case
    Reasons {
        input: PathBuf,
        output: PathBuf,
        /// Also write the reason frequency table to this file
        #[arg(long, value_name = "FILE")]
        frequencies: Option<PathBuf>,
    },

    /// Extract patient profiles and write a cohort report
    Classify {
        input: PathBuf,
        output: PathBuf,
        /// Cohort report path (default: `<output stem>_cohort_report.txt`)
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Treatment plan grounded in the best-matching guideline file
    Guideline {
        /// Patient description (plain text)
        patient: PathBuf,
        output: PathBuf,
        /// Directory of `*.txt` guideline files (default from config)
        #[arg(long, value_name = "DIR")]
        guidelines: Option<PathBuf>,
        /// Skip the comparison plan generated without guideline text
        #[arg(long)]
        no_baseline: bool,
    },

    /// Write a short description of every guideline file as JSON
    #[command(name = "describe-guidelines")]
    DescribeGuidelines {
        output: PathBuf,
        /// Directory of `*.txt` guideline files (default from config)
        #[arg(long, value_name = "DIR")]
        guidelines: Option<PathBuf>,
    },

    /// Decision-pattern analysis per treating physician
    #[command(name = "per-doctor")]
    PerDoctor {
        cases: PathBuf,
        doctors: PathBuf,
        out_dir: PathBuf,
        /// Cases analyzed per physician (default from config: 100)
        #[arg(long, value_name = "N")]
        max_records_per_doctor: Option<usize>,
    },
}

impl Cli {
    /// Command-line flags take precedence over file and environment values.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(policy) = self.on_error {
            config.pipeline.on_error = policy.into();
        }
        if let Some(n) = self.concurrency {
            config.pipeline.concurrency = n;
        }
        match &self.command {
            Command::Cross {
                max_records: Some(n),
                ..
            } => config.pipeline.cross_case_max_records = *n,
            Command::PerDoctor {
                max_records_per_doctor: Some(n),
                ..
            } => config.pipeline.per_doctor_max_records = *n,
            Command::Guideline {
                guidelines: Some(dir),
                ..
            }
            | Command::DescribeGuidelines {
                guidelines: Some(dir),
                ..
            } => config.pipeline.guidelines_dir.clone_from(dir),
            _ => {}
        }
    }
}

pub fn default_report_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map_or_else(|| "classify".into(), |s| s.to_string_lossy());
    output.with_file_name(format!("{stem}_cohort_report.txt"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("oncoplan").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_takes_two_paths() {
        let cli = parse(&["analyze", "in.csv", "out.csv"]);
        let Command::Analyze { input, output } = cli.command else {
            panic!("expected analyze");
        };
        assert_eq!(input, PathBuf::from("in.csv"));
        assert_eq!(output, PathBuf::from("out.csv"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["cross", "a.csv", "b.txt", "--max-records", "3", "--on-error", "abort"]);
        assert_eq!(cli.on_error, Some(OnError::Abort));
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.pipeline.cross_case_max_records, 3);
        assert_eq!(config.pipeline.on_error, FailurePolicy::Abort);
        assert_eq!(config.pipeline.per_doctor_max_records, 100);
    }

    #[test]
    fn per_doctor_overrides() {
        let cli = parse(&[
            "--concurrency",
            "4",
            "per-doctor",
            "cases.csv",
            "doctors.csv",
            "raw_data",
            "--max-records-per-doctor",
            "7",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.pipeline.per_doctor_max_records, 7);
        assert_eq!(config.pipeline.concurrency, 4);
    }

    #[test]
    fn guideline_commands_override_library_dir() {
        let cli = parse(&["guideline", "patient.txt", "plan.txt", "--no-baseline"]);
        let Command::Guideline { no_baseline, .. } = cli.command else {
            panic!("expected guideline");
        };
        assert!(no_baseline);

        let cli = parse(&["describe-guidelines", "out.json", "--guidelines", "nccn"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.pipeline.guidelines_dir, PathBuf::from("nccn"));
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["oncoplan", "analyze", "only-one.csv"]).is_err());
        assert!(Cli::try_parse_from(["oncoplan", "--on-error", "maybe", "analyze", "a", "b"]).is_err());
    }

    #[test]
    fn report_path_sits_next_to_output() {
        assert_eq!(
            default_report_path(Path::new("out/profiles.csv")),
            PathBuf::from("out/profiles_cohort_report.txt")
        );
    }
}
