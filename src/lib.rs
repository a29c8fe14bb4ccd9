pub mod bad_load;
pub mod cache;
pub mod cli;
pub mod config;
pub mod efficiency;
pub mod enrichment;
pub mod error;
pub mod io_utils;
pub mod model;
pub mod numeric;
pub mod outlier;
pub mod output;
pub mod overconsumption;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod schema;
pub mod stats;
pub mod table;
pub mod temporal;

use std::{
    env,
    fs,
    io::{Read, Write},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::cli::{Cli, Commands, InputArgs, OutputFormat};

pub use crate::{
    cache::PipelineCache,
    config::PipelineConfig,
    error::{Diagnostic, PipelineError, Stage},
    pipeline::{enrich, enrich_path},
    record::{EnrichedTable, FuelLoad, Summary},
};

static LOGGER: OnceLock<()> = OnceLock::new();

pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("fuel_loads", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Enrich(args) => handle_enrich(&args),
        Commands::Summary(args) => handle_summary(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn load_config(args: &InputArgs) -> Result<PipelineConfig> {
    match &args.config {
        Some(path) => {
            PipelineConfig::load(path).with_context(|| format!("Loading configuration {path:?}"))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn run_pipeline(args: &InputArgs) -> Result<EnrichedTable> {
    let config = load_config(args)?;
    let bytes = if io_utils::is_dash(&args.input) {
        let mut buffer = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buffer)
            .context("Reading fuel loads from stdin")?;
        buffer
    } else {
        fs::read(&args.input).with_context(|| format!("Reading {:?}", args.input))?
    };
    let extension = args
        .extension
        .clone()
        .or_else(|| {
            args.input
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_string)
        })
        .unwrap_or_default();
    info!(
        "Enriching '{}' as '{}'",
        args.input.display(),
        extension
    );
    enrich(&bytes, &extension, &config).with_context(|| format!("Enriching {:?}", args.input))
}

fn handle_enrich(args: &cli::EnrichArgs) -> Result<()> {
    let table = run_pipeline(&args.input)?;
    if let Some(limit) = args.preview {
        output::preview(&table, limit).print();
        return Ok(());
    }
    let destination = args.output.as_deref();
    let written = match args.format {
        OutputFormat::Csv => output::write_csv(&table, destination),
        OutputFormat::Json => output::write_json(&table, destination),
    };
    written.with_context(|| match destination {
        Some(path) => format!("Writing enriched table to {path:?}"),
        None => "Writing enriched table to stdout".to_string(),
    })?;
    info!(
        "Wrote {} enriched row(s) with {} diagnostic(s)",
        table.len(),
        table.diagnostics.len()
    );
    Ok(())
}

fn handle_summary(args: &cli::SummaryArgs) -> Result<()> {
    let table = run_pipeline(&args.input)?;
    print!("{}", report::render_summary(&table, args.top));
    Ok(())
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    let yaml = PipelineConfig::default().to_yaml()?;
    let mut writer = io_utils::open_output(args.output.as_deref())?;
    writer
        .write_all(yaml.as_bytes())
        .context("Writing default configuration")?;
    writer.flush().context("Flushing configuration output")?;
    Ok(())
}
