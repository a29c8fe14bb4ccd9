use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Clean and enrich bus-fleet fuel-load spreadsheets",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the enrichment pipeline and write the enriched table
    Enrich(EnrichArgs),
    /// Print summary counters, diagnostics and terminal/driver/clerk rollups
    Summary(SummaryArgs),
    /// Write the default pipeline configuration as YAML
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Args)]
pub struct InputArgs {
    /// Fuel-load file (.xlsx, .xls, .csv, .txt); `-` reads stdin
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// File type to assume instead of the input's extension
    #[arg(long = "extension")]
    pub extension: Option<String>,
    /// YAML file overriding pipeline thresholds
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct EnrichArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long = "format", value_enum, default_value = "csv")]
    pub format: OutputFormat,
    /// Print the first N enriched rows as a table instead of writing output
    #[arg(long = "preview")]
    pub preview: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Number of terminals, drivers and clerks to list
    #[arg(long = "top", default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination YAML file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}
