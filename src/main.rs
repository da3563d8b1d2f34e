use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod analysis;
mod cells;
mod error;
mod header;
mod metadata;
mod models;
mod normalize;
mod pipeline;
mod report;
mod rows;
mod sheet;

use analysis::{class_ranks, filter_students, StudentFilter};
use models::{CombinedDataset, StudentKey};

#[derive(Parser)]
#[command(name = "grade-report")]
#[command(about = "Normalize and compare semester grade-report spreadsheets", long_about = None)]
struct Cli {
    /// Log parsing decisions (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Grade-report workbooks (.xlsx, .xls, .ods), processed in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the combined dataset
    Analyze {
        #[command(flatten)]
        inputs: Inputs,
        /// Write the combined dataset as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// List students with averages and class ranks
    Students {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long)]
        grade: Option<u32>,
        #[arg(long)]
        class: Option<u32>,
        #[arg(long)]
        name: Option<String>,
        /// Export the listed students as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show one student's marks by term and by category
    Student {
        #[command(flatten)]
        inputs: Inputs,
        /// Student key as GRADE-CLASS-NUMBER, e.g. 1-3-5
        #[arg(long)]
        key: StudentKey,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn load(inputs: &Inputs) -> anyhow::Result<CombinedDataset> {
    let dataset = pipeline::analyze_files(&inputs.files).await?;
    Ok(dataset)
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze { inputs, json } => {
            let dataset = load(&inputs).await?;
            print!("{}", report::render_summary(&dataset));
            if let Some(path) = json {
                report::write_dataset_json(create(&path)?, &dataset)?;
                println!("Dataset written to {}.", path.display());
            }
        }
        Commands::Students {
            inputs,
            grade,
            class,
            name,
            csv,
        } => {
            let dataset = load(&inputs).await?;
            let filter = StudentFilter { grade, class, name };
            let students = filter_students(&dataset.students, &filter);
            let ranks = class_ranks(&dataset.students);
            print!("{}", report::render_students(&students, &ranks));
            if let Some(path) = csv {
                report::write_students_csv(create(&path)?, &dataset, &students)?;
                println!("Exported {} students to {}.", students.len(), path.display());
            }
        }
        Commands::Student { inputs, key } => {
            let dataset = load(&inputs).await?;
            let student = dataset
                .student(key)
                .with_context(|| format!("no student {key} in the input files"))?;
            print!("{}", report::render_student(&dataset, student));
        }
        Commands::Report { inputs, out } => {
            let dataset = load(&inputs).await?;
            let report = report::build_report(&dataset, chrono::Local::now().naive_local());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
