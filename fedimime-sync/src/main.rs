//! fedimime-sync - Refresh the local corpus without generating
//!
//! Fetches whatever the mirrored account has posted since the last run
//! and reports the state of the cache. Useful from cron, and for warming
//! the corpus before the first fedimime-post run.

use std::path::PathBuf;

use clap::Parser;
use libfedimime::{Config, CorpusStats, MimicService, Result};

#[derive(Parser, Debug)]
#[command(name = "fedimime-sync")]
#[command(version)]
#[command(about = "Refresh the local corpus without generating")]
#[command(long_about = "\
fedimime-sync - Refresh the local corpus without generating

DESCRIPTION:
    fedimime-sync resolves the configured handle, fetches any public
    posts newer than the cached ones, and reports how many texts the
    corpus now holds. No LLM provider is contacted and nothing is
    published.

    When the remote account has nothing new, the cache is left untouched
    and the run reports 'cached' instead of 'refreshed'.

USAGE EXAMPLES:
    # Bring the corpus up to date
    fedimime-sync

    # Sync a different account than the configured one
    fedimime-sync --handle someone@example.social

    # JSON output for scripting
    fedimime-sync --format json | jq '.texts'

CONFIGURATION:
    Configuration file: ~/.config/fedimime/config.toml
    Corpus cache:       ~/.local/share/fedimime/

    Override with environment variables:
        FEDIMIME_CONFIG - Path to config file

EXIT CODES:
    0 - Success
    1 - Runtime error (fetch or configuration failure)
    2 - Authentication error
    3 - Account could not be resolved

For more information, visit: https://github.com/fedimime/fedimime
")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, value_name = "FILE")]
    #[arg(help = "Path to the config file (default: ~/.config/fedimime/config.toml)")]
    config: Option<PathBuf>,

    /// Sync this handle instead of the configured one
    #[arg(long, value_name = "HANDLE")]
    #[arg(help = "Sync this handle instead of source.handle from the config")]
    handle: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    #[arg(help = "Output format: text (one summary line) or json (full stats)")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    tracing::debug!("fedimime-sync starting with {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(handle) = cli.handle {
        config.source.handle = handle;
    }

    let service = MimicService::from_config(config)?;
    let stats = service.sync_corpus().await?;

    if cli.format == "json" {
        output_json(&stats);
    } else {
        output_text(&stats);
    }

    Ok(())
}

/// Output the full stats as JSON
fn output_json(stats: &CorpusStats) {
    println!("{}", serde_json::to_string_pretty(stats).unwrap());
}

/// Output a single pipe-separated summary line
fn output_text(stats: &CorpusStats) {
    let latest = stats.latest_id.as_deref().unwrap_or("-");
    let state = if stats.refreshed { "refreshed" } else { "cached" };

    println!(
        "{} | {} texts | latest {} | {}",
        stats.acct, stats.texts, latest, state
    );
}
