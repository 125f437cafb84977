use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use archive_qc::report::{render_summary, write_diagnostics, write_rows};
use archive_qc::{ArchiveLayout, BatchOutcome, BatchScheduler, QcConfig};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "archive-qc",
    about = "Quality-control triage for archived sequencing submissions"
)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a diagnostic block for every identifier that raised a warning.
    Check(RunArgs),
    /// Write every metric and warning as CSV rows.
    Extract(RunArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["egaf", "file"])))]
struct RunArgs {
    /// Single identifier to analyze.
    #[arg(long)]
    egaf: Option<String>,
    /// File with one identifier per line.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Output file (overwritten).
    #[arg(long)]
    output: PathBuf,
    /// Root of the archive directory tree.
    #[arg(long, env = "ARCHIVE_QC_ROOT")]
    archive_root: Option<PathBuf>,
    /// JSON file with thresholds and run settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Worker threads (0 = serial). Defaults to 4.
    #[arg(long)]
    threads: Option<usize>,
    /// Per-identifier time budget in seconds (0 disables it).
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Do not warn when the species screening report is missing.
    #[arg(long)]
    no_species_warning: bool,
    /// Skip decryption of the encrypted stats file.
    #[arg(long)]
    no_crypt: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check(args) => run_check(args)?,
        Commands::Extract(args) => run_extract(args)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_check(args: RunArgs) -> Result<()> {
    let output = args.output.clone();
    let outcome = run_batch(args)?;

    let mut writer = BufWriter::new(
        File::create(&output)
            .with_context(|| format!("failed to create output file {}", output.display()))?,
    );
    write_diagnostics(&mut writer, &outcome.reports)
        .with_context(|| format!("failed to write diagnostics to {}", output.display()))?;

    log_summary(&outcome);
    Ok(())
}

fn run_extract(args: RunArgs) -> Result<()> {
    let output = args.output.clone();
    let outcome = run_batch(args)?;

    let mut writer = BufWriter::new(
        File::create(&output)
            .with_context(|| format!("failed to create output file {}", output.display()))?,
    );
    write_rows(&mut writer, &outcome.reports)
        .with_context(|| format!("failed to write CSV rows to {}", output.display()))?;

    log_summary(&outcome);
    Ok(())
}

fn run_batch(args: RunArgs) -> Result<BatchOutcome> {
    let identifiers = match (&args.egaf, &args.file) {
        (Some(identifier), _) => vec![identifier.trim().to_string()],
        (None, Some(path)) => read_identifier_file(path)?,
        (None, None) => anyhow::bail!("provide either --egaf or --file"),
    };
    let config = build_config(&args)?;
    let root = config.archive_root.clone().context(
        "no archive root: pass --archive-root, set ARCHIVE_QC_ROOT or set archive_root in --config",
    )?;

    info!(
        identifiers = identifiers.len(),
        root = %root.display(),
        include_crypt = config.include_crypt,
        "checking archive"
    );
    let scheduler = BatchScheduler::new(config);
    Ok(scheduler.run(Arc::new(ArchiveLayout::new(root)), identifiers))
}

fn build_config(args: &RunArgs) -> Result<QcConfig> {
    let mut config = match &args.config {
        Some(path) => QcConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => QcConfig::default(),
    };

    if let Some(root) = &args.archive_root {
        config = config.with_archive_root(root);
    }
    if let Some(threads) = args.threads {
        let scheduler = config.scheduler.clone().with_worker_count(threads);
        config = config.with_scheduler(scheduler);
    }
    if let Some(secs) = args.timeout_secs {
        let timeout = (secs > 0).then(|| Duration::from_secs(secs));
        let scheduler = config.scheduler.clone().with_unit_timeout(timeout);
        config = config.with_scheduler(scheduler);
    }
    if args.no_species_warning {
        config = config.with_warn_missing_species(false);
    }
    if args.no_crypt {
        config = config.with_include_crypt(false);
    }
    Ok(config)
}

fn read_identifier_file(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(
        File::open(path)
            .with_context(|| format!("failed to open identifier file {}", path.display()))?,
    );

    let mut identifiers = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line =
            line.with_context(|| format!("failed to read line {} of {}", idx + 1, path.display()))?;
        let identifier = line.trim();
        if !identifier.is_empty() {
            identifiers.push(identifier.to_string());
        }
    }
    Ok(identifiers)
}

fn log_summary(outcome: &BatchOutcome) {
    for line in render_summary(&outcome.summary).lines() {
        info!("{line}");
    }
}
