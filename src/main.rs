//! # Series Resolver CLI (`sres`)
//!
//! Resolves free-text requests for economic indicators to catalogued data
//! series, and turns time references into observation date ranges.
//!
//! ## Usage
//!
//! ```bash
//! sres --config ./config/sres.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sres resolve "<query>"` | Extract query metadata and resolve the series |
//! | `sres dates --start <ref> --end <ref>` | Resolve a date range against today |
//! | `sres seed` | Enrich and store the core series in the semantic index |
//! | `sres serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! sres resolve "US inflation over the last 10 years"
//! sres resolve "eurozone unemployment" --json
//! sres dates --start 10:year --end current
//! sres dates --start exact:01-01-2020 --end exact:11-19-2023
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use series_resolver::config::{self, Config};
use series_resolver::dates::{resolve_date_range, Clock, SystemClock, TimeReference};
use series_resolver::pipeline::{Resolution, SeriesResolver};
use series_resolver::server;

/// Series Resolver CLI.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sres.example.toml` for a full example. API keys are read
/// from the environment (or a `.env` file).
#[derive(Parser)]
#[command(
    name = "sres",
    about = "Resolve economic indicator requests to data series",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/sres.toml`. When that default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = "./config/sres.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a free-text query.
    ///
    /// Extracts region, concept and date range, then finds the best series:
    /// semantic index first, live catalog search as fallback.
    Resolve {
        /// The query, e.g. "US unemployment since 2015".
        query: String,

        /// Print the resolution as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Resolve a date range against today's date.
    ///
    /// References: `current`, `exact:MM-DD-YYYY`, or `<n>:<day|week|month|year>`.
    Dates {
        #[arg(long)]
        start: TimeReference,
        #[arg(long)]
        end: TimeReference,
    },

    /// Seed the semantic index with the core series.
    ///
    /// Series already present are skipped.
    Seed,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Dates { start, end } = &cli.command {
        println!("{}", describe_dates(start, end, &SystemClock)?);
        return Ok(());
    }

    let cfg = load_or_default(&cli.config)?;
    let resolver = Arc::new(SeriesResolver::from_config(&cfg).await?);

    match cli.command {
        Commands::Resolve { query, json } => {
            let resolution = resolver.resolve_query(&query).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                print_resolution(&resolution);
            }
        }
        Commands::Seed => {
            let report = resolver.seed().await;
            println!(
                "Seeded {} series, {} already present, {} failed.",
                report.stored.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (series_id, error) in &report.failed {
                println!("  {}: {}", series_id, error);
            }
            if !report.is_complete() {
                anyhow::bail!("seeding incomplete");
            }
        }
        Commands::Serve => {
            server::run_server(&cfg, resolver).await?;
        }
        Commands::Dates { .. } => {
            // Handled above (before config loading)
        }
    }

    Ok(())
}

/// Load the config file; a missing file at the default path means defaults.
fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        return config::load_config(path);
    }
    if path == Path::new("./config/sres.toml") {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    Err(anyhow::anyhow!("config file does not exist"))
        .with_context(|| format!("Failed to read config file: {}", path.display()))
}

/// Resolve a date pair against `clock` and render it for the terminal.
fn describe_dates(
    start: &TimeReference,
    end: &TimeReference,
    clock: &dyn Clock,
) -> anyhow::Result<String> {
    let range = resolve_date_range(start, end, clock.today())?;
    Ok(format!(
        "start: {}\nend:   {}",
        range.start.as_deref().unwrap_or("earliest"),
        range.end
    ))
}

fn print_resolution(resolution: &Resolution) {
    println!("Query: {}", resolution.metadata);
    let selection = &resolution.selection;
    match &selection.series_id {
        Some(id) if selection.is_valid() => {
            println!("Series: {} (confidence {:.2})", id, selection.confidence)
        }
        Some(id) => println!(
            "Series: {} (confidence {:.2}, region match: {}; below acceptance)",
            id, selection.confidence, selection.region_match
        ),
        None => println!("Series: none"),
    }
    println!("Reasoning: {}", selection.reasoning);
}
