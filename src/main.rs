mod cli;

use anyhow::Context;
use clap::Parser;
use oncoplan_core::analysis::{
    RunOptions, RunSummary, classify, cross_case, guideline, per_doctor, reasoning, single_case,
};
use oncoplan_core::bootstrap::{AppBuilder, resolve_config_path};
use oncoplan_core::cases::write_text;
use oncoplan_core::config::Config;
use oncoplan_llm::LlmProvider;

use crate::cli::{Cli, Command, default_report_path};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_subscriber();

    let mut app = AppBuilder::load(resolve_config_path(cli.config.clone())).await?;
    cli.apply_overrides(app.config_mut());
    app.config().validate()?;

    let provider = app.build_provider()?;
    run(cli.command, app.config(), &provider).await
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run<P: LlmProvider>(command: Command, config: &Config, provider: &P) -> anyhow::Result<()> {
    let options = RunOptions::from(&config.pipeline);
    let columns = &config.columns;

    match command {
        Command::Analyze { input, output } => {
            let summary = single_case::run(provider, &input, &output, columns, options)
                .await
                .with_context(|| format!("single-case analysis of {} failed", input.display()))?;
            print_summary(&summary);
            println!("Results written to {}", output.display());
        }
        Command::Cross { input, output, .. } => {
            let report = cross_case::run(
                provider,
                &input,
                &output,
                columns,
                config.pipeline.cross_case_max_records,
            )
            .await
            .with_context(|| format!("cross-case analysis of {} failed", input.display()))?;
            println!(
                "Analyzed {} cases ({} skipped); analysis written to {}",
                report.cases_used,
                report.skipped.len(),
                output.display()
            );
        }
        Command::Reasons {
            input,
            output,
            frequencies,
        } => {
            let report = reasoning::run(provider, &input, &output, columns, options)
                .await
                .with_context(|| format!("treatment reasoning for {} failed", input.display()))?;
            print_summary(&report.summary);
            let table = reasoning::render_frequencies(&report.frequencies);
            print!("{table}");
            if let Some(path) = frequencies {
                write_text(&path, &table)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
        }
        Command::Classify {
            input,
            output,
            report,
        } => {
            let report_path = report.unwrap_or_else(|| default_report_path(&output));
            let result = classify::run(provider, &input, &output, &report_path, columns, options)
                .await
                .with_context(|| format!("classification of {} failed", input.display()))?;
            print_summary(&result.summary);
            println!(
                "Profiles written to {}; cohort report written to {}",
                output.display(),
                report_path.display()
            );
        }
        Command::Guideline {
            patient,
            output,
            no_baseline,
            ..
        } => {
            let dir = &config.pipeline.guidelines_dir;
            let result = guideline::run(provider, &patient, dir, &output, !no_baseline)
                .await
                .with_context(|| format!("guideline plan for {} failed", patient.display()))?;
            if result.guideline.fell_back {
                println!("No matching guideline; used {}", result.guideline.name);
            }
            println!(
                "Plan grounded in {} written to {}",
                result.guideline.name,
                output.display()
            );
        }
        Command::DescribeGuidelines { output, .. } => {
            let dir = &config.pipeline.guidelines_dir;
            let report = guideline::run_describe(provider, dir, &output, options.policy)
                .await
                .with_context(|| format!("describing guidelines in {} failed", dir.display()))?;
            println!(
                "Described {} guidelines into {}",
                report.descriptions.len(),
                output.display()
            );
            for (name, error) in &report.failed {
                println!("  failed: {name}: {error}");
            }
        }
        Command::PerDoctor {
            cases,
            doctors,
            out_dir,
            ..
        } => {
            let report = per_doctor::run(
                provider,
                &cases,
                &doctors,
                &out_dir,
                columns,
                config.pipeline.per_doctor_max_records,
                options.policy,
            )
            .await
            .context("per-physician analysis failed")?;
            println!(
                "Analyzed {} physicians into {}",
                report.analyzed.len(),
                out_dir.display()
            );
            for (doctor, error) in &report.failed {
                println!("  failed: {doctor}: {error}");
            }
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Processed {} rows: {} succeeded, {} failed",
        summary.total(),
        summary.succeeded,
        summary.failed.len()
    );
    for failure in &summary.failed {
        println!("  row {}: {}", failure.row + 1, failure.error);
    }
}
