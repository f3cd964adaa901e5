use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod analysis;
mod charts;
mod loader;
mod models;
mod report;
mod stats;

const SEMESTER_AVERAGES_FILE: &str = "average_grades_by_semester.csv";
const SUBJECT_CHART_FILE: &str = "average_score_per_subject.svg";
const SEMESTER_CHART_FILE: &str = "average_overall_score_by_semester.svg";

#[derive(Parser)]
#[command(name = "student-grade-analyzer")]
#[command(about = "Summary statistics and charts for student grades", long_about = None)]
struct Cli {
    /// Grade table with Student, Semester and one column per subject
    #[arg(long, global = true, default_value = "student_scores_random_names.csv")]
    csv: PathBuf,
    /// Directory the CSV and chart artifacts are written to
    #[arg(long, global = true, default_value = ".")]
    out_dir: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the grade report and write every artifact
    Analyze {
        #[arg(long, default_value_t = 10)]
        failing_limit: usize,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Skip rendering the two charts
        #[arg(long)]
        no_charts: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long, default_value_t = 10)]
        failing_limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

fn write_averages(out_dir: &Path, summary: &models::Summary) -> anyhow::Result<()> {
    let path = out_dir.join(SEMESTER_AVERAGES_FILE);
    report::write_semester_averages(&path, &summary.semester_averages)?;
    info!(path = %path.display(), rows = summary.semester_averages.len(), "semester averages written");
    Ok(())
}

fn render_charts(out_dir: &Path, summary: &models::Summary) -> anyhow::Result<()> {
    let path = out_dir.join(SUBJECT_CHART_FILE);
    if charts::subject_averages_chart(&path, &summary.subject_averages)? {
        info!(path = %path.display(), "subject averages chart written");
    }

    let path = out_dir.join(SEMESTER_CHART_FILE);
    if charts::semester_trend_chart(&path, &summary.semester_overall)? {
        info!(path = %path.display(), "semester trend chart written");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let table = loader::load_grades(&cli.csv)?;
    info!(path = %cli.csv.display(), records = table.len(), "grade table loaded");
    if table.is_empty() {
        warn!("grade table has no rows, results will be empty");
    }

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("failed to create {}", cli.out_dir.display()))?;

    let summary = analysis::summarize(&table);

    match cli.command.unwrap_or(Commands::Analyze {
        failing_limit: 10,
        format: Format::Text,
        no_charts: false,
    }) {
        Commands::Analyze {
            failing_limit,
            format,
            no_charts,
        } => {
            write_averages(&cli.out_dir, &summary)?;

            match format {
                Format::Text => print!("{}", report::render_console(&summary, failing_limit)),
                Format::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }

            if !no_charts {
                render_charts(&cli.out_dir, &summary)?;
            }
        }
        Commands::Report { out, failing_limit } => {
            write_averages(&cli.out_dir, &summary)?;
            let source = cli.csv.display().to_string();
            let report = report::build_report(&source, &summary, failing_limit);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    if let Some(err) = &summary.improving_error {
        anyhow::bail!("improving-students query failed: {err}");
    }

    Ok(())
}
