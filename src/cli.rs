//! CLI implementation for namedex

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

use namedex::config::Config;
use namedex::feed::FeedReader;
use namedex::fetch::Fetcher;
use namedex::refresh::{run_cycle, Refresher};
use namedex::store::Store;

// Exit codes: 0 success, 1 error (via anyhow), 2 no matches
const EXIT_NO_RESULTS: i32 = 2;

// Signal handling
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn setup_signal_handler() {
    ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Second Ctrl+C: force exit
            std::process::exit(130);
        }
        eprintln!("\nInterrupted. Shutting down...");
    })
    .expect("Failed to set Ctrl+C handler");
}

#[derive(Parser)]
#[command(name = "namedex")]
#[command(about = "Prefix-searchable local index of registry names")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Name prefix to search for
    #[arg(trailing_var_arg = true)]
    prefix: Vec<String>,

    /// Max results (0 = unbounded)
    #[arg(short = 'n', long, default_value = "10")]
    limit: usize,

    /// Database location (overrides config)
    #[arg(long, env = "NAMEDEX_DB", global = true)]
    db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the index for names with the given prefix
    Find {
        prefix: String,
        /// Max results (0 = unbounded)
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// Run one reconciliation cycle against the remote feed
    Refresh {
        /// Feed URL (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Force a fetch strategy: curl, wget or http
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Refresh on a schedule until interrupted
    Daemon {
        /// Feed URL (overrides config)
        #[arg(long)]
        url: Option<String>,
        /// Force a fetch strategy: curl, wget or http
        #[arg(long)]
        strategy: Option<String>,
        /// Interval between cycles in milliseconds (overrides config)
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Skip the immediate cycle on startup
        #[arg(long)]
        no_refresh_on_start: bool,
    },
    /// Show index statistics
    Stats,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&std::env::current_dir()?);
    let quiet = cli.quiet || config.quiet_or_default();

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.database_path_or_default());

    match cli.command {
        Some(Commands::Find { ref prefix, limit }) => {
            cmd_find(&db_path, prefix, limit, cli.json)
        }
        Some(Commands::Refresh { ref url, ref strategy }) => {
            cmd_refresh(&db_path, &config, url.as_deref(), strategy.as_deref(), quiet)
        }
        Some(Commands::Daemon {
            ref url,
            ref strategy,
            interval_ms,
            no_refresh_on_start,
        }) => cmd_daemon(
            &db_path,
            &config,
            url.as_deref(),
            strategy.as_deref(),
            interval_ms,
            no_refresh_on_start,
            quiet,
        ),
        Some(Commands::Stats) => cmd_stats(&db_path),
        None => {
            // Bare invocation: treat trailing args as a find
            if cli.prefix.is_empty() {
                anyhow::bail!("No prefix given. Try 'namedex find <prefix>' or 'namedex --help'.");
            }
            let prefix = cli.prefix.join(" ");
            cmd_find(&db_path, &prefix, cli.limit, cli.json)
        }
    }
}

fn open_store(db_path: &Path) -> Result<Store> {
    Store::open(db_path)
        .with_context(|| format!("Failed to open index at {}", db_path.display()))
}

fn cmd_find(db_path: &Path, prefix: &str, limit: usize, json: bool) -> Result<()> {
    let store = open_store(db_path)?;
    let limit = if limit == 0 { None } else { Some(limit) };
    let results = store.find(prefix, limit).context("Search failed")?;

    if json {
        // The shape the autocomplete widget consumes: {name, desc}
        let rows: Vec<_> = results
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "desc": e.description.as_deref().unwrap_or(""),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&rows)?);
    } else {
        for entry in &results {
            match &entry.description {
                Some(desc) => println!("{}  {}", entry.name.bold(), desc.dimmed()),
                None => println!("{}", entry.name.bold()),
            }
        }
    }

    if results.is_empty() {
        std::process::exit(EXIT_NO_RESULTS);
    }
    Ok(())
}

fn build_feed(config: &Config, url: Option<&str>, strategy: Option<&str>) -> Result<FeedReader> {
    let url = url
        .map(str::to_string)
        .unwrap_or_else(|| config.remote_url_or_default());
    let preferred = strategy
        .map(str::to_string)
        .or_else(|| config.preferred_fetch_strategy.clone());

    // Strategy resolution fails here, at startup, not on the first cycle
    let fetcher = Fetcher::new(preferred.as_deref()).context("No usable fetch strategy")?;
    Ok(FeedReader::new(url, fetcher, config.snapshot_path.clone()))
}

fn cmd_refresh(
    db_path: &Path,
    config: &Config,
    url: Option<&str>,
    strategy: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let store = open_store(db_path)?;
    let feed = build_feed(config, url, strategy)?;

    let report = run_cycle(&store, &feed).context("Refresh cycle failed")?;
    if !quiet {
        println!(
            "Refreshed: {} remote records, {} put(s), {} delete(s)",
            report.remote_records, report.puts, report.deletes
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_daemon(
    db_path: &Path,
    config: &Config,
    url: Option<&str>,
    strategy: Option<&str>,
    interval_ms: Option<u64>,
    no_refresh_on_start: bool,
    quiet: bool,
) -> Result<()> {
    setup_signal_handler();

    let store = Arc::new(open_store(db_path)?);
    let feed = build_feed(config, url, strategy)?;
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.refresh_interval());
    let refresh_on_start = !no_refresh_on_start && config.refresh_on_start_or_default();

    if !quiet {
        println!(
            "Refreshing every {:?} from startup (Ctrl+C to stop)...",
            interval
        );
    }

    let refresher = Refresher::spawn(Arc::clone(&store), feed, interval, refresh_on_start);

    while !INTERRUPTED.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    refresher.shutdown();
    store.close();
    if !quiet {
        println!("Stopped.");
    }
    Ok(())
}

fn cmd_stats(db_path: &Path) -> Result<()> {
    let store = open_store(db_path)?;
    let stats = store.stats()?;

    println!("{}", "Index statistics".bold());
    println!("  Entries:       {}", stats.total_entries);
    println!("  Size:          {} bytes", stats.index_size_bytes);
    println!("  Schema:        v{}", stats.schema_version);
    println!("  Created:       {}", stats.created_at);
    println!("  Updated:       {}", stats.updated_at);
    println!(
        "  Last refresh:  {}",
        stats.last_refresh.as_deref().unwrap_or("never")
    );
    Ok(())
}
