use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use is_terminal::IsTerminal;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use csstats::pipeline::config::DEFAULT_OUTPUT_DIR;
use csstats::{
    load_releases, logging, read_records, AggregateConfig, Aggregator, CountryIndex, EditorFilter,
    ErrorStrategy, ExtractConfig, MatchMode, RecordFormat, StreamPipeline,
};

#[derive(Parser)]
#[command(name = "csstats")]
#[command(about = "Contribution statistics for an OpenStreetMap editor, from changeset dumps to charts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug mode - show processing details
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Filter a changeset XML stream down to one editor's normalized records
    Extract(ExtractArgs),
    /// Turn normalized records into chart and table artifacts
    Aggregate(AggregateArgs),
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Editor name compared with the `created_by` tag (empty matches everything)
    #[arg(short = 'e', long = "editor", default_value = "OpenStop")]
    editor: String,

    /// How the editor name is compared
    #[arg(long = "match", value_enum, default_value_t = MatchMode::Prefix)]
    match_mode: MatchMode,

    /// GeoJSON country boundaries used to resolve each changeset's country
    #[arg(long, value_name = "FILE")]
    countries: Option<PathBuf>,

    /// Record format written to the output
    #[arg(long, value_enum, default_value_t = RecordFormat::Jsonl)]
    format: RecordFormat,

    /// Input file (default: stdin)
    #[arg(short = 'i', long = "input")]
    input_file: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long = "output")]
    output_file: Option<PathBuf>,

    /// Fail on first malformed changeset instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Show progress every N changesets
    #[arg(long, value_name = "N")]
    progress: Option<usize>,

    /// Buffer size for I/O
    #[arg(long, default_value = "65536")] // 64KB
    buffer_size: usize,
}

#[derive(clap::Args)]
struct AggregateArgs {
    /// GeoJSON country boundaries for the maps and country names
    #[arg(long, value_name = "FILE")]
    countries: Option<PathBuf>,

    /// Editor releases (GitHub releases JSON) marked on the time charts
    #[arg(long, value_name = "FILE")]
    releases: Option<PathBuf>,

    /// Directory receiving the artifacts
    #[arg(short = 'd', long = "output-dir", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Record format of the input
    #[arg(long, value_enum, default_value_t = RecordFormat::Jsonl)]
    format: RecordFormat,

    /// Input file (default: stdin)
    #[arg(short = 'i', long = "input")]
    input_file: Option<PathBuf>,

    /// Number of countries in the timeline chart
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..))]
    top_countries: u16,

    /// Fail on first malformed record instead of skipping it
    #[arg(long)]
    fail_fast: bool,
}

fn error_strategy(fail_fast: bool) -> ErrorStrategy {
    if fail_fast {
        ErrorStrategy::FailFast
    } else {
        ErrorStrategy::Skip
    }
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let result = match cli.command {
        Command::Extract(args) => extract(args),
        Command::Aggregate(args) => aggregate(args),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_countries(path: Option<&Path>) -> Result<CountryIndex> {
    let Some(path) = path else {
        return Ok(CountryIndex::empty());
    };
    let countries = CountryIndex::from_file(path)
        .with_context(|| format!("Failed to load country boundaries '{}'", path.display()))?;
    info!(countries = countries.len(), "country boundaries loaded");
    Ok(countries)
}

fn open_input(path: Option<&Path>, buffer_size: usize) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file '{}'", path.display()))?;
            Ok(Box::new(BufReader::with_capacity(buffer_size, file)))
        }
        None => {
            if io::stdin().is_terminal() {
                warn!("reading from an interactive terminal; pipe data into stdin or use --input");
            }
            Ok(Box::new(BufReader::with_capacity(buffer_size, io::stdin())))
        }
    }
}

fn extract(args: ExtractArgs) -> Result<i32> {
    let countries = load_countries(args.countries.as_deref())?;
    if countries.is_empty() {
        info!("no country boundaries loaded, records will carry no country");
    }

    let config = ExtractConfig {
        error_strategy: error_strategy(args.fail_fast),
        editor: EditorFilter::new(args.editor, args.match_mode),
        buffer_size: args.buffer_size,
        progress_interval: args.progress.unwrap_or(0),
        output_format: args.format,
    };

    info!(
        editor = config.editor.editor(),
        mode = ?config.editor.mode(),
        "filtering changesets by editor"
    );

    let input = open_input(args.input_file.as_deref(), config.buffer_size)?;
    let mut output: Box<dyn Write> = match &args.output_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file '{}'", path.display()))?;
            Box::new(io::BufWriter::with_capacity(config.buffer_size, file))
        }
        None => Box::new(io::BufWriter::with_capacity(config.buffer_size, io::stdout())),
    };

    let mut pipeline = StreamPipeline::new(config, countries);
    let result = pipeline.process_stream(input, &mut output);
    pipeline.get_stats().log_summary();
    result.context("Extraction failed")?;

    Ok(0)
}

fn aggregate(args: AggregateArgs) -> Result<i32> {
    let countries = load_countries(args.countries.as_deref())?;
    let releases = match &args.releases {
        Some(path) => load_releases(path)
            .with_context(|| format!("Failed to load releases '{}'", path.display()))?,
        None => Vec::new(),
    };

    let config = AggregateConfig {
        error_strategy: error_strategy(args.fail_fast),
        input_format: args.format,
        output_dir: args.output_dir,
        top_countries: usize::from(args.top_countries),
        ..Default::default()
    };

    let input = open_input(args.input_file.as_deref(), ExtractConfig::default().buffer_size)?;
    let (records, skipped) = read_records(input, &config).context("Reading records failed")?;
    info!(records = records.len(), skipped, "records loaded");

    let report = Aggregator::new(config, countries, releases).run(&records);
    Ok(if report.is_success() { 0 } else { 1 })
}
