mod commands;
mod input;
mod output;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use commands::options::{InsurersArgs, LinesArgs, MetricsArgs, QuartersArgs};
use commands::run::RunArgs;

/// Russian insurance market analytics
#[derive(Parser)]
#[command(
    name = "ima",
    version,
    about = "Russian insurance market analytics",
    long_about = "Builds ranked insurer tables from the 0420162 and 0420158 regulatory \
                  reporting forms: derived metrics, period transforms, top-N cohorts, \
                  market share and growth, with decimal precision."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Directory holding the raw tables and dictionaries
    #[arg(long, env = "IMA_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analytics pipeline for one request
    Run(RunArgs),
    /// List metric dropdown options for a reporting form
    Metrics(MetricsArgs),
    /// List insurance lines of a reporting form
    Lines(LinesArgs),
    /// List quarters available in a reporting form
    Quarters(QuartersArgs),
    /// List insurers ranked by a metric in the latest quarter
    Insurers(InsurersArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::run::run_pipeline(args, &cli.data_dir),
        Commands::Metrics(args) => commands::options::run_metrics(args),
        Commands::Lines(args) => commands::options::run_lines(args, &cli.data_dir),
        Commands::Quarters(args) => commands::options::run_quarters(args, &cli.data_dir),
        Commands::Insurers(args) => commands::options::run_insurers(args, &cli.data_dir),
        Commands::Version => {
            println!("ima {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
