//! mexbundle CLI: ingest, cache and calendar commands.
//!
//! Commands:
//! - `ingest`: fetch BitMEX bars and metadata and write a Parquet bundle
//! - `cache status`: report cached series, their ranges and sizes
//! - `cache clear`: drop cached series for a symbol
//! - `calendar sessions`: list the sessions in a date range

use anyhow::{bail, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use mexbundle_core::bundle::ParquetBundleWriter;
use mexbundle_core::calendar::{CalendarRegistry, BITMEX_CALENDAR};
use mexbundle_core::config::{CoverageSeverity, IngestConfig};
use mexbundle_core::data::{
    ingest, BitmexClient, IngestProgress, IngestRequest, NoProgress, ParquetStore,
    StdoutProgress,
};
use mexbundle_core::domain::{BinSize, SeriesKey};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mexbundle", about = "mexbundle: BitMEX OHLCV bundle ingester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch bars and instrument metadata and write a bundle.
    Ingest(IngestArgs),
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Trading calendar commands.
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Symbols to ingest (e.g., XBTUSD ETHUSD). Overrides the config file.
    symbols: Vec<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// First session (YYYY-MM-DD).
    #[arg(long)]
    start: Option<String>,

    /// Last session (YYYY-MM-DD).
    #[arg(long)]
    end: Option<String>,

    /// Series cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Bundle output directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Buckets requested per page.
    #[arg(long)]
    page_size: Option<usize>,

    /// Coverage check severity: fatal, warn or ignore.
    #[arg(long)]
    coverage: Option<String>,

    /// Suppress per-series progress lines.
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report cached series, their ranges and sizes.
    Status {
        /// Cache directory. Defaults to ./cache.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,
    },
    /// Drop cached series for a symbol.
    Clear {
        /// Symbol to clear.
        symbol: String,

        /// Only clear this bin size (1m or 1d).
        #[arg(long)]
        bin_size: Option<String>,

        /// Cache directory. Defaults to ./cache.
        #[arg(long, default_value = "cache")]
        cache_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum CalendarAction {
    /// List the sessions in a date range, both ends inclusive.
    Sessions {
        /// First date (YYYY-MM-DD).
        #[arg(long)]
        start: String,

        /// Last date (YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Registered calendar name.
        #[arg(long, default_value = BITMEX_CALENDAR)]
        calendar: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Cache { action } => match action {
            CacheAction::Status { cache_dir } => run_cache_status(&cache_dir),
            CacheAction::Clear {
                symbol,
                bin_size,
                cache_dir,
            } => run_cache_clear(&cache_dir, &symbol, bin_size.as_deref()),
        },
        Commands::Calendar { action } => match action {
            CalendarAction::Sessions {
                start,
                end,
                calendar,
            } => run_calendar_sessions(&start, &end, &calendar),
        },
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")?)
}

/// Load the config file (if any) and apply command-line overrides.
fn resolve_config(args: &IngestArgs) -> Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };

    if !args.symbols.is_empty() {
        config.bundle.symbols = args.symbols.clone();
    }
    if let Some(start) = args.start.as_deref() {
        config.bundle.start = Some(parse_date(start)?);
    }
    if let Some(end) = args.end.as_deref() {
        config.bundle.end = Some(parse_date(end)?);
    }
    if let Some(dir) = &args.cache_dir {
        config.bundle.cache_dir = dir.clone();
    }
    if let Some(dir) = &args.output_dir {
        config.bundle.output_dir = dir.clone();
    }
    if let Some(page_size) = args.page_size {
        config.upstream.page_size = page_size;
    }
    if let Some(coverage) = args.coverage.as_deref() {
        config.validation.coverage = coverage.parse::<CoverageSeverity>()?;
    }

    config.validate()?;
    Ok(config)
}

fn run_ingest(args: IngestArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let request = IngestRequest::from_config(&config)?;

    let registry = CalendarRegistry::with_defaults();
    let calendar = registry.get(BITMEX_CALENDAR)?;

    let client = BitmexClient::new(&config.upstream)?;
    let mut store = ParquetStore::new(&config.bundle.cache_dir);
    let mut writer = ParquetBundleWriter::new(&config.bundle.output_dir)?;
    let progress: Box<dyn IngestProgress> = if args.no_progress {
        Box::new(NoProgress)
    } else {
        Box::new(StdoutProgress)
    };

    info!(
        cache = %config.bundle.cache_dir.display(),
        output = %config.bundle.output_dir.display(),
        "resolved directories"
    );

    let summary = ingest(
        &request,
        &client,
        &mut store,
        &mut writer,
        calendar,
        progress.as_ref(),
    )?;

    println!(
        "Bundle written to: {} ({} table(s))",
        writer.root().display(),
        summary.manifest.tables.len()
    );
    Ok(())
}

fn run_cache_status(cache_dir: &Path) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    let store = ParquetStore::new(cache_dir);
    let metas = store.status()?;
    if metas.is_empty() {
        println!("Cache is empty: {}", cache_dir.display());
        return Ok(());
    }

    let mut total_size: u64 = 0;
    let mut rows: Vec<(String, String, String, u64)> = Vec::new();
    for meta in &metas {
        let key = SeriesKey::new(meta.symbol.clone(), meta.bin_size);
        let size = std::fs::metadata(store.series_path(&key))
            .map(|m| m.len())
            .unwrap_or(0);
        total_size += size;

        let range = match (meta.first, meta.last) {
            (Some(first), Some(last)) => format!(
                "{} to {}",
                first.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            ),
            _ => "(empty)".into(),
        };
        rows.push((key.to_string(), range, format!("{} bars", meta.bar_count), size));
    }

    println!("Cache: {}", cache_dir.display());
    println!("Series: {}", metas.len());
    println!("Total size: {}", format_size(total_size));
    println!();
    println!("{:<14} {:<36} {:<14} {:>10}", "Series", "Range", "Bars", "Size");
    println!("{}", "-".repeat(77));
    for (key, range, bars, size) in &rows {
        println!("{:<14} {:<36} {:<14} {:>10}", key, range, bars, format_size(*size));
    }

    Ok(())
}

fn run_cache_clear(cache_dir: &Path, symbol: &str, bin_size: Option<&str>) -> Result<()> {
    let store = ParquetStore::new(cache_dir);

    let removed = match bin_size {
        Some(bin) => {
            let key = SeriesKey::new(symbol, bin.parse::<BinSize>()?);
            let removed = store.remove(&key)?;
            if removed {
                println!("Removed: {key}");
            }
            removed
        }
        None => {
            let removed = store.clear_symbol(symbol)?;
            if removed {
                println!("Removed: {symbol} (all bin sizes)");
            }
            removed
        }
    };

    if !removed {
        println!("Nothing cached for {symbol}.");
    }
    Ok(())
}

fn run_calendar_sessions(start: &str, end: &str, name: &str) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if start > end {
        bail!("--start {start} is after --end {end}");
    }

    let registry = CalendarRegistry::with_defaults();
    let calendar = registry.get(name)?;
    let sessions = calendar.sessions_in_range(start, end);

    println!(
        "Calendar: {} ({}), {} session(s)",
        calendar.name,
        calendar.timezone,
        sessions.len()
    );
    for session in &sessions {
        println!(
            "{}  {} - {}",
            session,
            calendar.session_open(*session).format("%H:%M"),
            calendar.session_close(*session).format("%H:%M")
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
