use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use start_maja::config::Config;
use start_maja::pipeline::{Pipeline, Request, RunOptions};
use start_maja::processor::Maja;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run MAJA over the L1 time series of one tile.
#[derive(Parser, Debug)]
#[command(name = "start_maja", version)]
struct Cli {
    /// Folder definition file
    #[arg(short, long, default_value = "folders.toml")]
    folders: PathBuf,

    /// Tile number, with or without the leading `T`
    #[arg(short, long)]
    tile: String,

    /// Site name, an extra directory level above the tile
    #[arg(short, long)]
    site: Option<String>,

    /// First acquisition date to process (YYYY-MM-DD)
    #[arg(short = 'd', long)]
    start: Option<NaiveDate>,

    /// Last acquisition date to process (YYYY-MM-DD)
    #[arg(short, long)]
    end: Option<NaiveDate>,

    /// Number of products in a Backward run, primary included
    #[arg(long)]
    nbackward: Option<usize>,

    /// Relative orbit of Sentinel-2 native products (`51`, `051` or `R051`)
    #[arg(short, long, value_parser = parse_orbit)]
    orbit: Option<u16>,

    /// Process products that already have an L2 product
    #[arg(long)]
    overwrite: bool,

    /// Keep staging directories after each run
    #[arg(long)]
    keep_staging: bool,

    /// Print the workplan queue and stop
    #[arg(long)]
    dry_run: bool,

    /// Write the workplan queue as JSON
    #[arg(long)]
    plan: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

/// `T31TCH` and `31TCH` name the same tile.
fn normalize_tile(tile: &str) -> String {
    let is_mgrs = tile.is_ascii()
        && tile.len() == 6
        && tile.starts_with('T')
        && tile[1..3].chars().all(|c| c.is_ascii_digit())
        && tile[3..].chars().all(|c| c.is_ascii_alphabetic());
    if is_mgrs {
        tile[1..].to_string()
    } else {
        tile.to_string()
    }
}

fn parse_orbit(value: &str) -> Result<u16, String> {
    let digits = value.strip_prefix('R').unwrap_or(value);
    digits
        .parse()
        .map_err(|_| format!("`{value}` is not a relative orbit"))
}

/// Used when `RUST_LOG` is unset or invalid.
fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "debug" } else { "info" })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(cli.verbose)),
        )
        .init();

    let config = Config::read(&cli.folders)
        .with_context(|| format!("Failed to read {}", cli.folders.display()))?;

    let request = Request {
        tile: normalize_tile(&cli.tile),
        site: cli.site,
        start: cli.start.unwrap_or(NaiveDate::MIN),
        end: cli.end.unwrap_or(NaiveDate::MAX),
        nbackward: cli.nbackward,
        orbit: cli.orbit,
        overwrite: cli.overwrite,
    };
    let options = RunOptions {
        keep_staging: cli.keep_staging,
        dry_run: cli.dry_run,
        plan_out: cli.plan,
    };

    let maja = Maja::new(
        config.paths.processor.clone(),
        config.paths.userconf.clone(),
        cli.verbose,
    );
    let report = Pipeline::new(config, maja).run(&request, &options)?;
    info!(
        "Done: {} processed, {} skipped",
        report.processed.len(),
        report.skipped.len()
    );
    Ok(())
}
