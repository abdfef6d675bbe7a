//! Conversion driver: inputs in, one N-Triples file out.
//!
//! Each input is read line by line, grouped, parsed and emitted in a single
//! pass. Inputs are independent: each gets its own parse session and emitter,
//! while node ids are checked against one cache for the whole run. Statement
//! ranks and the truthy layer are merged across inputs in input order and
//! written once, after the last input.

use crate::config::{OUTPUT_BUFFER_SIZE, PROGRESS_INTERVAL};
use crate::datatypes::PropertyTypes;
use crate::emit::{RdfEmitter, StatementLedger};
use crate::error::LineError;
use crate::minter::{LocalCache, NodeCache, NodeMinter, NodeTable, SharedCache};
use crate::node_cache;
use crate::parser::{CommandParser, Delimiter, LineGroups, ParseSession};
use crate::report::{ErrorRecord, ErrorReport};
use crate::stats::{ConversionStats, StatsSummary};
use anyhow::{bail, Context, Result};
use bzip2::read::MultiBzDecoder;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use oxrdf::Triple;
use rayon::prelude::*;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What to do with a row that fails to parse or emit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ErrorPolicy {
    /// Log it, report it, emit nothing for it and carry on
    #[default]
    Skip,
    /// Stop at the first failing row
    Abort,
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub property_types: Option<PathBuf>,
    pub delimiter: Delimiter,
    pub on_error: ErrorPolicy,
    pub error_report: Option<PathBuf>,
    pub node_cache: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub jobs: usize,
}

impl ConvertOptions {
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf) -> Self {
        Self {
            inputs,
            output,
            property_types: None,
            delimiter: Delimiter::default(),
            on_error: ErrorPolicy::default(),
            error_report: None,
            node_cache: None,
            summary: None,
            jobs: 1,
        }
    }
}

/// Result of a whole run, also written as the JSON summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub inputs: usize,
    pub elapsed_secs: f64,
    pub nodes_known: usize,
    #[serde(flatten)]
    pub stats: StatsSummary,
}

/// Shared, read-only state of one run.
struct RunContext<'a> {
    types: &'a PropertyTypes,
    delimiter: Delimiter,
    on_error: ErrorPolicy,
    stats: &'a ConversionStats,
    progress: &'a ProgressBar,
}

/// Opens a plain or `.bz2` input for line reading.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    let compressed = path.extension().is_some_and(|ext| ext == "bz2");
    if compressed {
        Ok(Box::new(BufReader::new(MultiBzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn write_triples<W: Write>(writer: &mut W, triples: &[Triple]) -> io::Result<()> {
    for triple in triples {
        writeln!(writer, "{} .", triple)?;
    }
    Ok(())
}

fn make_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}] {pos} rows")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(msg.to_string());
    pb
}

/// What one input leaves behind for the rest of the run.
struct InputOutcome<C> {
    cache: C,
    ledger: StatementLedger,
    errors: Vec<ErrorRecord>,
}

/// Converts one input into `out`. Its statements' ranks are returned in the
/// ledger, not written.
fn convert_input<C: NodeCache, W: Write>(
    input: &Path,
    scope: u32,
    cache: C,
    out: W,
    ctx: &RunContext,
) -> Result<InputOutcome<C>> {
    let reader = open_input(input)?;
    let mut parser = CommandParser::new(ctx.types, ctx.delimiter, ParseSession::scoped(scope));
    let mut emitter = RdfEmitter::new(NodeMinter::new(cache));
    let mut writer = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, out);
    let mut errors = Vec::new();

    info!(input = ?input, scope, "Converting input");

    for group in LineGroups::new(reader.lines(), ctx.delimiter) {
        let group = group.with_context(|| format!("Failed to read input: {:?}", input))?;
        ctx.stats.inc_rows();
        if ctx.stats.rows() % PROGRESS_INTERVAL == 0 {
            ctx.progress.set_position(ctx.stats.rows());
        }

        let line = group.first_line();
        let converted = parser.parse(&group).and_then(|command| {
            emitter
                .emit(&command)
                .map(|triples| (command, triples))
                .map_err(|e| LineError::new(line, e))
        });

        match converted {
            Ok((command, triples)) => {
                ctx.stats.record_command(&command);
                write_triples(&mut writer, &triples)
                    .with_context(|| format!("Failed to write triples for {:?}", input))?;
                ctx.stats.add_triples(triples.len() as u64);
            }
            Err(err) => {
                ctx.stats.inc_failed();
                if err.error.is_fatal() || ctx.on_error == ErrorPolicy::Abort {
                    return Err(anyhow::Error::new(err)
                        .context(format!("Conversion of {:?} stopped", input)));
                }
                warn!(
                    input = ?input,
                    line = err.line,
                    kind = err.error.kind(),
                    error = %err.error,
                    "Skipping row"
                );
                errors.push(ErrorRecord::new(input, &err));
            }
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to flush output for {:?}", input))?;

    let ledger = emitter.finish();
    debug!(
        input = ?input,
        created = parser.session().created(),
        statements = ledger.len(),
        failed = errors.len(),
        "Input converted"
    );

    Ok(InputOutcome {
        cache: emitter.into_minter().into_cache(),
        ledger,
        errors,
    })
}

/// Writes the run's ranks and truthy layer after the last input.
fn write_ledger<W: Write>(out: &mut W, ledger: StatementLedger, ctx: &RunContext) -> Result<()> {
    let triples = ledger.into_triples();
    write_triples(out, &triples).context("Failed to write statement ranks")?;
    ctx.stats.add_triples(triples.len() as u64);
    Ok(())
}

fn part_path(output: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(format!(".{}.part", index));
    PathBuf::from(name)
}

fn convert_sequential(
    options: &ConvertOptions,
    table: NodeTable,
    ctx: &RunContext,
) -> Result<(NodeTable, Vec<ErrorRecord>)> {
    let file = File::create(&options.output)
        .with_context(|| format!("Failed to create output file: {:?}", options.output))?;
    let mut out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);
    let mut cache = LocalCache::from_table(table);
    let mut ledger = StatementLedger::new();
    let mut errors = Vec::new();

    for (index, input) in options.inputs.iter().enumerate() {
        let outcome = convert_input(input, index as u32, cache, &mut out, ctx)?;
        cache = outcome.cache;
        ledger.merge(outcome.ledger);
        errors.extend(outcome.errors);
    }
    write_ledger(&mut out, ledger, ctx)?;
    out.flush().context("Failed to flush output file")?;

    Ok((cache.into_table(), errors))
}

/// Converts inputs on a rayon pool into part files, then concatenates them in input order.
fn convert_parallel(
    options: &ConvertOptions,
    table: NodeTable,
    ctx: &RunContext,
) -> Result<(NodeTable, Vec<ErrorRecord>)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .context("Failed to build worker pool")?;
    let cache = SharedCache::from_table(table);

    let results: Vec<Result<(StatementLedger, Vec<ErrorRecord>)>> = pool.install(|| {
        options
            .inputs
            .par_iter()
            .enumerate()
            .map(|(index, input)| {
                let part = part_path(&options.output, index);
                let file = File::create(&part)
                    .with_context(|| format!("Failed to create part file: {:?}", part))?;
                let outcome = convert_input(input, index as u32, cache.clone(), file, ctx)?;
                Ok((outcome.ledger, outcome.errors))
            })
            .collect()
    });

    let mut ledger = StatementLedger::new();
    let mut errors = Vec::new();
    let mut failure = None;
    for result in results {
        match result {
            Ok((input_ledger, input_errors)) => {
                ledger.merge(input_ledger);
                errors.extend(input_errors);
            }
            Err(e) if failure.is_none() => failure = Some(e),
            Err(e) => warn!(error = %e, "Another input failed too"),
        }
    }

    let parts: Vec<PathBuf> = (0..options.inputs.len())
        .map(|index| part_path(&options.output, index))
        .collect();
    if let Some(e) = failure {
        for part in &parts {
            let _ = fs::remove_file(part);
        }
        return Err(e);
    }

    let file = File::create(&options.output)
        .with_context(|| format!("Failed to create output file: {:?}", options.output))?;
    let mut out = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file);
    for part in &parts {
        let mut reader = File::open(part)
            .with_context(|| format!("Failed to open part file: {:?}", part))?;
        io::copy(&mut reader, &mut out)
            .with_context(|| format!("Failed to append part file: {:?}", part))?;
        fs::remove_file(part).with_context(|| format!("Failed to remove part file: {:?}", part))?;
    }
    write_ledger(&mut out, ledger, ctx)?;
    out.flush().context("Failed to flush output file")?;

    Ok((cache.to_table(), errors))
}

pub fn run_convert(options: &ConvertOptions) -> Result<RunSummary> {
    if options.inputs.is_empty() {
        bail!("No input files given");
    }
    let start = Instant::now();

    let types = match &options.property_types {
        Some(path) => PropertyTypes::load(path)?,
        None => PropertyTypes::new(),
    };

    let table = match &options.node_cache {
        Some(path) => node_cache::try_load(path)?.unwrap_or_else(|| {
            info!(path = ?path, "Starting with an empty node cache");
            NodeTable::default()
        }),
        None => NodeTable::default(),
    };

    if let Some(parent) = options.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }

    let stats = ConversionStats::new();
    let progress = make_spinner("Converting");
    let ctx = RunContext {
        types: &types,
        delimiter: options.delimiter,
        on_error: options.on_error,
        stats: &stats,
        progress: &progress,
    };

    let converted = if options.jobs > 1 && options.inputs.len() > 1 {
        convert_parallel(options, table, &ctx)
    } else {
        convert_sequential(options, table, &ctx)
    };
    progress.finish_and_clear();
    let (table, errors) = converted?;

    if let Some(path) = &options.error_report {
        let mut report = ErrorReport::create(path)?;
        for record in &errors {
            report.write(record)?;
        }
        let written = report.finish()?;
        info!(rows = written, path = ?path, "Error report written");
    }

    if let Some(path) = &options.node_cache {
        node_cache::save(&table, path)?;
    }

    let summary = RunSummary {
        inputs: options.inputs.len(),
        elapsed_secs: start.elapsed().as_secs_f64(),
        nodes_known: table.len(),
        stats: stats.summary(),
    };

    if let Some(path) = &options.summary {
        let file = File::create(path)
            .with_context(|| format!("Failed to create summary file: {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)
            .context("Failed to write summary")?;
    }

    info!(
        rows = summary.stats.rows_read,
        failed = summary.stats.rows_failed,
        triples = summary.stats.triples_written,
        duration_secs = summary.elapsed_secs,
        "Conversion complete"
    );

    Ok(summary)
}

/// Outcome of parsing inputs without emitting anything.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    pub rows: u64,
    pub errors: Vec<ErrorRecord>,
}

pub fn run_check(
    inputs: &[PathBuf],
    property_types: Option<&Path>,
    delimiter: Delimiter,
) -> Result<CheckReport> {
    let types = match property_types {
        Some(path) => PropertyTypes::load(path)?,
        None => PropertyTypes::new(),
    };
    let mut report = CheckReport::default();

    for (index, input) in inputs.iter().enumerate() {
        let reader = open_input(input)?;
        let mut parser = CommandParser::new(&types, delimiter, ParseSession::scoped(index as u32));
        for group in LineGroups::new(reader.lines(), delimiter) {
            let group = group.with_context(|| format!("Failed to read input: {:?}", input))?;
            report.rows += 1;
            if let Err(err) = parser.parse(&group) {
                report.errors.push(ErrorRecord::new(input, &err));
            }
        }
    }

    info!(rows = report.rows, errors = report.errors.len(), "Check complete");
    Ok(report)
}
