use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use sysbio_kg::adapter::{validate_data_source, SbgnAdapter};
use sysbio_kg::settings::{OutputMode, PipelineConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "sysbio-kg")]
#[command(about = "Load SBGN-ML pathway maps into a knowledge graph")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default when no subcommand is given)
    Run(RunArgs),
    /// Validate an SBGN-ML file and print its metadata
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Pipeline configuration YAML
    #[arg(short, long, default_value = sysbio_kg::config::DEFAULT_PIPELINE_CONFIG)]
    config: PathBuf,

    /// SBGN-ML file to load instead of the configured one
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output mode instead of the configured one
    #[arg(long, value_enum)]
    mode: Option<OutputMode>,

    /// CSV output directory instead of the configured one
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            config: PathBuf::from(sysbio_kg::config::DEFAULT_PIPELINE_CONFIG),
            input: None,
            mode: None,
            output: None,
        }
    }
}

#[derive(Args)]
struct InspectArgs {
    /// Path to the SBGN-ML file (.sbgn, .xml, or .bz2)
    #[arg(short, long)]
    input: PathBuf,
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::load(&args.config)?;
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(mode) = args.mode {
        config.output.mode = mode;
    }
    if let Some(output) = args.output {
        config.output.directory = output;
    }
    info!(
        input = %config.input.display(),
        mode = ?config.output.mode,
        "Starting pipeline"
    );

    let summary = sysbio_kg::pipeline::run_pipeline(&config)?;

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", summary.elapsed.as_secs_f64());
    println!();
    for (label, count) in &summary.nodes_by_label {
        println!("Nodes {label:<28} {count}");
    }
    for (label, count) in &summary.edges_by_label {
        println!("Edges {label:<28} {count}");
    }
    println!();
    println!("Nodes written:      {}", summary.sink.nodes_written);
    println!("Edges written:      {}", summary.sink.edges_written);
    println!("Duplicates dropped: {}", summary.sink.duplicates_dropped);
    println!("Skipped glyphs:     {}", summary.skipped_glyphs);
    println!("Skipped arcs:       {}", summary.skipped_arcs);
    if config.output.mode == OutputMode::Csv {
        println!();
        println!("CSV files in:       {}", config.output.directory.display());
    }

    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let start = Instant::now();
    if !validate_data_source(&args.input) {
        anyhow::bail!("Not a valid SBGN-ML file: {}", args.input.display());
    }

    let adapter = SbgnAdapter::open(&args.input)?;
    let metadata = serde_json::to_string_pretty(&adapter.metadata())
        .context("Failed to serialize adapter metadata")?;
    println!("{metadata}");

    let records = adapter.into_records()?;
    let stats = records.stats();
    for record in records {
        record?;
    }

    println!();
    println!("=== Summary ===");
    println!("Total time:         {:.2}s", start.elapsed().as_secs_f64());
    println!("Glyphs seen:        {}", stats.glyphs());
    println!("Arcs seen:          {}", stats.arcs());
    println!("Nodes:              {}", stats.nodes());
    println!("Edges:              {}", stats.edges());
    println!("Skipped glyphs:     {}", stats.skipped_glyphs());
    println!("Skipped arcs:       {}", stats.skipped_arcs());

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Inspect(args)) => inspect(args),
        None => run(RunArgs::default()),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
