//! Cohort Predicates CLI Application
//!
//! This is the command-line interface for the cohort predicate engine.
//! It uses the cohort-predicates library and adds:
//! - TOML configuration loading
//! - Logging setup
//! - Thread pool sizing
//! - Trigger row selection
//! - Summary and TSV/JSON output

use anyhow::{Context, Result};
use clap::Parser;
use cohort_predicates::{EventSource, JsonLinesSource, PredicateEngine};
use std::path::PathBuf;

mod config;
mod report;

use config::OutputFormat;

/// Cohort Predicates - Extract predicate columns from patient event logs
#[derive(Parser, Debug)]
#[command(name = "cohort-cli")]
#[command(about = "Extract predicate columns from patient event logs", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Path to JSON-lines event log (overrides input.events)
    #[arg(short, long, value_name = "FILE")]
    events: Option<PathBuf>,

    /// Output file for the predicate table (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (overrides output.format)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Number of worker threads (overrides options.threads)
    #[arg(long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Keep only rows where this predicate is set (overrides options.trigger)
    #[arg(long, value_name = "PREDICATE")]
    trigger: Option<String>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("Cohort Predicates CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using predicates library v{}", cohort_predicates::VERSION);

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    log::info!("Loading configuration from: {:?}", args.config);
    let app_config = config::load_config(&args.config)?;

    // Validate the predicate configuration before touching any data
    let predicates = app_config.predicates_config()?;
    let engine = PredicateEngine::new(&predicates).context("Invalid predicate configuration")?;
    log::debug!("Output columns: {:?}", engine.columns());

    if let Some(threads) = args.threads.or(app_config.options.threads) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
        log::debug!("Using {} worker threads", threads);
    }

    let events_path = args
        .events
        .clone()
        .or_else(|| app_config.input.events.clone())
        .context("No event log given: pass --events or set input.events in the config")?;

    let event_log = JsonLinesSource::open(&events_path)
        .and_then(|mut source| source.read_events())
        .with_context(|| format!("Failed to read event log: {:?}", events_path))?;

    let mut table = engine.extract(&event_log)?;

    if let Some(trigger) = args.trigger.as_ref().or(app_config.options.trigger.as_ref()) {
        table = table.filter_by(trigger)?;
    }

    if !args.quiet {
        report::print_summary(event_log.schema(), &table);
    }

    let output = args.output.as_deref().or(app_config.output.path.as_deref());
    let format = args.format.unwrap_or(app_config.output.format);
    report::write_table(&table, output, format)?;

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
