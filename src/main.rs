use analytics::{MetricResult, MetricValue, MetricsEngine, MetricsTable, merge_results};
use anyhow::{Context, bail};
use api_client::{ComposerClient, SymphonyApi};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{Config, OosAlignment, init_tracing, load_config_from};
use core_types::StrategyId;
use data_processing::{SymphonyMeta, load_symphonies, oos_start_from_symphony, reshape_batch};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Metrics shown in the terminal summary; the JSON output has all of them.
const HEADLINE_METRICS: [&str; 10] = [
    "cagr",
    "max_drawdown",
    "sharpe",
    "sortino",
    "volatility",
    "win_rate",
    "oos_cagr",
    "oos_max_drawdown",
    "oos_sharpe",
    "oos_sortino",
];

/// The main entry point for the Maestro backtest analysis tool.
#[tokio::main]
async fn main() -> ExitCode {
    // A .env file is optional; it only supplies MAESTRO__* overrides.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = match load_config_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = match init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Execute the appropriate command
    let result = match cli.command {
        Commands::Extract(args) => handle_extract(args),
        Commands::Run(args) => handle_run(args, config).await,
        Commands::Analyze(args) => handle_analyze(args, config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Fetches Composer symphony backtests and computes their performance statistics.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file. Missing files are fine; MAESTRO__* variables override it.
    #[arg(long, global = true, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the symphonies shared in a Discord channel export.
    Extract(ExtractArgs),
    /// Backtest every symphony in a list and compute full and out-of-sample metrics.
    Run(RunArgs),
    /// Compute metrics for backtest responses saved on disk.
    Analyze(AnalyzeArgs),
}

#[derive(Parser)]
struct ExtractArgs {
    /// The Discord export (JSON).
    #[arg(long)]
    export: PathBuf,

    /// Where to write the symphony list.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser)]
struct RunArgs {
    /// A symphony list as written by `extract`.
    #[arg(long)]
    symphonies: PathBuf,

    /// The backtest start date (format: YYYY-MM-DD). Defaults to `backtest.start_date`.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// The backtest end date (format: YYYY-MM-DD). Defaults to `backtest.end_date`, or today.
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Overrides `metrics.oos_alignment`.
    #[arg(long, value_enum)]
    oos_alignment: Option<OosAlignment>,
}

#[derive(Parser)]
struct AnalyzeArgs {
    /// Saved backtest responses; each file stem is used as the symphony id.
    #[arg(long = "backtest", required = true, num_args = 1..)]
    backtests: Vec<PathBuf>,

    /// Also compute metrics from this date on (format: YYYY-MM-DD).
    #[arg(long)]
    oos_start: Option<NaiveDate>,

    /// Overrides `metrics.oos_alignment`.
    #[arg(long, value_enum)]
    oos_alignment: Option<OosAlignment>,

    /// Write the merged metrics to this file.
    #[arg(long)]
    out: Option<PathBuf>,
}

// ==============================================================================
// Extract Command Logic
// ==============================================================================

fn handle_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let symphonies = load_symphonies(&args.export)
        .with_context(|| format!("Failed to extract symphonies from {}", args.export.display()))?;

    write_json(&args.out, &symphonies)?;
    tracing::info!(count = symphonies.len(), out = %args.out.display(), "Wrote symphony list");
    Ok(())
}

// ==============================================================================
// Run Command Logic
// ==============================================================================

/// Everything fetched for one symphony. `None` marks a failed request.
struct Fetched {
    id: StrategyId,
    oos_start: Option<NaiveDate>,
    backtest: Option<Value>,
}

async fn fetch_symphony_data(
    client: &ComposerClient,
    id: StrategyId,
    from: NaiveDate,
    to: NaiveDate,
    oos_fallback: NaiveDate,
) -> Fetched {
    let oos_start = match client.fetch_symphony(id.as_str()).await {
        Ok(outcome) if outcome.success => Some(oos_start_from_symphony(&outcome.document, oos_fallback)),
        Ok(outcome) => {
            tracing::warn!(symphony = %id, status = outcome.status, "No symphony details, skipping out-of-sample metrics");
            None
        }
        Err(e) => {
            tracing::warn!(symphony = %id, error = %e, "No symphony details, skipping out-of-sample metrics");
            None
        }
    };

    let backtest = match client.fetch_backtest(id.as_str(), from, to).await {
        Ok(outcome) if outcome.success => Some(outcome.document),
        Ok(outcome) => {
            tracing::warn!(symphony = %id, status = outcome.status, "Backtest failed");
            None
        }
        Err(e) => {
            tracing::warn!(symphony = %id, error = %e, "Backtest failed");
            None
        }
    };

    Fetched { id, oos_start, backtest }
}

/// Handles the orchestration of a full run: fetch, reshape, compute, report.
async fn handle_run(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    let from = args.from.unwrap_or(config.backtest.start_date);
    let to = args.to.unwrap_or_else(|| config.backtest.end_date_or_today());
    if from > to {
        bail!("--from {from} is after --to {to}");
    }
    if let Some(alignment) = args.oos_alignment {
        config.metrics.oos_alignment = alignment;
    }

    let symphonies: BTreeMap<StrategyId, SymphonyMeta> = read_json(&args.symphonies)?;
    if symphonies.is_empty() {
        bail!("{} lists no symphonies", args.symphonies.display());
    }
    tracing::info!(count = symphonies.len(), %from, %to, "Starting run");

    let client = ComposerClient::new(&config.api, &config.backtest)?;
    let fetched = fetch_all(&client, symphonies.keys().cloned(), from, to, &config).await?;

    let mut oos_starts = BTreeMap::new();
    let mut documents = Vec::new();
    for item in fetched {
        if let Some(start) = item.oos_start {
            oos_starts.insert(item.id.clone(), start);
        }
        if let Some(document) = item.backtest {
            documents.push((item.id, document));
        }
    }

    let names: Vec<(StrategyId, Option<String>)> = symphonies
        .values()
        .map(|meta| (meta.id.clone(), Some(meta.title.clone())))
        .collect();
    let (metrics, oos_metrics) = compute_all(documents, &oos_starts, &config);

    let run_dir = config.output.run_dir(to);
    write_json(&run_dir.join("metrics.json"), &metrics)?;
    write_json(&run_dir.join("oos_metrics.json"), &oos_metrics)?;

    print_table(&names, metrics, oos_metrics);
    tracing::info!(dir = %run_dir.display(), "Run complete");
    Ok(())
}

/// Fetches details and backtests with a bounded number of requests in flight.
async fn fetch_all(
    client: &ComposerClient,
    ids: impl Iterator<Item = StrategyId>,
    from: NaiveDate,
    to: NaiveDate,
    config: &Config,
) -> anyhow::Result<Vec<Fetched>> {
    let ids: Vec<StrategyId> = ids.collect();
    let oos_fallback = config.metrics.oos_fallback_start;

    // Set up the progress bar
    let progress_bar = ProgressBar::new(ids.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let fetched: Vec<Fetched> = stream::iter(ids)
        .map(|id| {
            let pb = progress_bar.clone();
            async move {
                pb.set_message(format!("Fetching {id}..."));
                let fetched = fetch_symphony_data(client, id, from, to, oos_fallback).await;
                pb.inc(1);
                fetched
            }
        })
        .buffer_unordered(config.api.max_concurrent_requests)
        .collect()
        .await;

    let backtests = fetched.iter().filter(|f| f.backtest.is_some()).count();
    progress_bar.finish_with_message(format!("Fetched {backtests}/{} backtests", fetched.len()));
    Ok(fetched)
}

/// Reshapes the documents and computes full-window metrics (merged with the
/// API's own stats) and out-of-sample metrics.
fn compute_all(
    documents: Vec<(StrategyId, Value)>,
    oos_starts: &BTreeMap<StrategyId, NaiveDate>,
    config: &Config,
) -> (BTreeMap<StrategyId, MetricResult>, BTreeMap<StrategyId, MetricResult>) {
    let reshaped = reshape_batch(documents);

    let mut stats = BTreeMap::new();
    let mut frames = BTreeMap::new();
    for (id, backtest) in reshaped {
        stats.insert(id.clone(), MetricResult::from_stats(&backtest.stats));
        frames.insert(id, backtest.portfolio_values);
    }

    let engine = MetricsEngine::new(&config.metrics);
    let metrics = merge_results(stats, engine.compute_metrics(&frames));
    let oos_metrics = engine.compute_oos_metrics(&frames, oos_starts);
    (metrics, oos_metrics)
}

// ==============================================================================
// Analyze Command Logic
// ==============================================================================

fn handle_analyze(args: AnalyzeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(alignment) = args.oos_alignment {
        config.metrics.oos_alignment = alignment;
    }

    let mut documents = Vec::new();
    for path in &args.backtests {
        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(StrategyId::from)
            .with_context(|| format!("Cannot derive a symphony id from {}", path.display()))?;
        documents.push((id, read_json::<Value>(path)?));
    }

    let names: Vec<(StrategyId, Option<String>)> =
        documents.iter().map(|(id, _)| (id.clone(), None)).collect();
    let oos_starts: BTreeMap<StrategyId, NaiveDate> = match args.oos_start {
        Some(start) => names.iter().map(|(id, _)| (id.clone(), start)).collect(),
        None => BTreeMap::new(),
    };

    let (metrics, oos_metrics) = compute_all(documents, &oos_starts, &config);
    if metrics.is_empty() {
        bail!("None of the backtests could be analyzed");
    }

    if let Some(out) = &args.out {
        let merged = merge_results(metrics.clone(), prefix_oos(&oos_metrics));
        write_json(out, &merged)?;
    }
    print_table(&names, metrics, oos_metrics);
    Ok(())
}

// ==============================================================================
// Output
// ==============================================================================

fn prefix_oos(results: &BTreeMap<StrategyId, MetricResult>) -> BTreeMap<StrategyId, MetricResult> {
    results
        .iter()
        .map(|(id, result)| (id.clone(), result.prefixed("oos_")))
        .collect()
}

fn print_table(
    names: &[(StrategyId, Option<String>)],
    metrics: BTreeMap<StrategyId, MetricResult>,
    oos_metrics: BTreeMap<StrategyId, MetricResult>,
) {
    let merged = merge_results(metrics, prefix_oos(&oos_metrics));
    let table = MetricsTable::from_results(names, &merged);
    if table.is_empty() {
        tracing::warn!("No metrics to display");
        return;
    }
    println!("{}", render_table(&table));
}

fn render_table(table: &MetricsTable) -> Table {
    let shown: Vec<(usize, &String)> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| HEADLINE_METRICS.contains(&column.as_str()))
        .collect();

    let mut header = vec!["Symphony".to_string(), "Name".to_string()];
    header.extend(shown.iter().map(|(_, column)| (*column).clone()));

    let mut rendered = Table::new();
    rendered
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    for row in &table.rows {
        let mut cells = vec![row.id.to_string(), row.name.clone().unwrap_or_default()];
        cells.extend(shown.iter().map(|(i, _)| format_cell(row.values[*i].as_ref())));
        rendered.add_row(cells);
    }
    rendered
}

fn format_cell(value: Option<&MetricValue>) -> String {
    match value {
        Some(MetricValue::Scalar(v)) => format!("{v:.4}"),
        Some(MetricValue::Series(values)) => format!("[{} values]", values.len()),
        None => "-".to_string(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))
}
