use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use qs2rdf::parser::Delimiter;
use qs2rdf::pipeline::{self, ConvertOptions, ErrorPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "qs2rdf")]
#[command(about = "Convert QuickStatements batches into Wikidata RDF (N-Triples)")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert QuickStatements files into one N-Triples file
    Convert(ConvertArgs),
    /// Parse QuickStatements files and report malformed rows
    Check(CheckArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// QuickStatements input files (plain or .bz2); repeat for several
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// N-Triples output file
    #[arg(short, long)]
    output: PathBuf,

    /// CSV of `property,datatype` pairs
    #[arg(long)]
    property_types: Option<PathBuf>,

    /// Field delimiter
    #[arg(long, value_enum, default_value_t = Delimiter::Tab)]
    delimiter: Delimiter,

    /// What to do with rows that fail
    #[arg(long, value_enum, default_value_t = ErrorPolicy::Skip)]
    on_error: ErrorPolicy,

    /// Write rejected rows to this CSV file
    #[arg(long)]
    error_report: Option<PathBuf>,

    /// Node id cache, loaded if present and saved after the run
    #[arg(long)]
    node_cache: Option<PathBuf>,

    /// Write a JSON run summary to this file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Number of inputs converted in parallel
    #[arg(long, default_value_t = 1)]
    jobs: usize,
}

#[derive(Args)]
struct CheckArgs {
    /// QuickStatements input files (plain or .bz2)
    #[arg(short, long, required = true)]
    input: Vec<PathBuf>,

    /// CSV of `property,datatype` pairs
    #[arg(long)]
    property_types: Option<PathBuf>,

    /// Field delimiter
    #[arg(long, value_enum, default_value_t = Delimiter::Tab)]
    delimiter: Delimiter,
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let options = ConvertOptions {
        inputs: args.input,
        output: args.output,
        property_types: args.property_types,
        delimiter: args.delimiter,
        on_error: args.on_error,
        error_report: args.error_report,
        node_cache: args.node_cache,
        summary: args.summary,
        jobs: args.jobs.max(1),
    };

    let summary = pipeline::run_convert(&options)?;

    println!();
    println!("=== Summary ===");
    println!("Inputs:             {}", summary.inputs);
    println!("Total time:         {:.2}s", summary.elapsed_secs);
    println!();
    println!("Rows read:          {}", summary.stats.rows_read);
    println!("Rows failed:        {}", summary.stats.rows_failed);
    println!("Items created:      {}", summary.stats.items_created);
    println!("Statements:         {}", summary.stats.statements);
    println!("Terms:              {}", summary.stats.terms);
    println!("Sitelinks:          {}", summary.stats.sitelinks);
    println!("Triples written:    {}", summary.stats.triples_written);
    println!("Nodes known:        {}", summary.nodes_known);

    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let report = pipeline::run_check(&args.input, args.property_types.as_deref(), args.delimiter)?;

    for record in &report.errors {
        println!("{}:{}: {}", record.input, record.line, record.message);
    }
    println!("{} rows checked, {} malformed", report.rows, report.errors.len());

    if !report.errors.is_empty() {
        bail!("{} malformed rows", report.errors.len());
    }
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
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Check(args) => run_check(args),
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
