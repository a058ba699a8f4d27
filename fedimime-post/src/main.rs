//! fedimime-post - Generate a post in a mirrored account's voice
//!
//! Syncs the configured account's public history into the local corpus,
//! samples it into a prompt, and generates one new post through the
//! configured LLM provider. Publishing is optional.

use std::path::PathBuf;

use clap::Parser;
use libfedimime::{Config, MimicService, Result, RunOutcome};

#[derive(Parser, Debug)]
#[command(name = "fedimime-post")]
#[command(version)]
#[command(about = "Generate a post in a mirrored account's voice")]
#[command(long_about = "\
fedimime-post - Generate a post in a mirrored account's voice

DESCRIPTION:
    fedimime-post mirrors a Mastodon-compatible account's public post
    history into a local corpus, samples that corpus into a prompt, and
    asks the configured LLM provider for one new post in the same voice.

    The generated text is printed to stdout. When the [publish] section
    of the config is enabled the post is also published through the
    configured bot account; --dry-run skips that step.

USAGE EXAMPLES:
    # Generate without publishing
    fedimime-post --dry-run

    # Generate and publish (when [publish] is enabled)
    fedimime-post

    # Mirror a different account than the configured one
    fedimime-post --handle someone@example.social --dry-run

    # JSON output for scripting
    fedimime-post --dry-run --format json | jq -r '.text'

CONFIGURATION:
    Configuration file: ~/.config/fedimime/config.toml
    Corpus cache:       ~/.local/share/fedimime/

    Override with environment variables:
        FEDIMIME_CONFIG - Path to config file

EXIT CODES:
    0 - Success (including an empty corpus)
    1 - Runtime error (fetch, generation, or configuration failure)
    2 - Authentication or credential error
    3 - Account could not be resolved

For more information, visit: https://github.com/fedimime/fedimime
")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, value_name = "FILE")]
    #[arg(help = "Path to the config file (default: ~/.config/fedimime/config.toml)")]
    config: Option<PathBuf>,

    /// Mirror this handle instead of the configured one
    #[arg(long, value_name = "HANDLE")]
    #[arg(help = "Mirror this handle instead of source.handle from the config")]
    handle: Option<String>,

    /// Generate without publishing
    #[arg(short = 'n', long)]
    #[arg(help = "Generate the post but skip the publish step")]
    dry_run: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    #[arg(value_parser = ["text", "json"])]
    #[arg(help = "Output format: text (the post itself) or json (full outcome)")]
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
    tracing::debug!("fedimime-post starting with {:?}", cli);

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(handle) = cli.handle {
        config.source.handle = handle;
    }

    let service = MimicService::from_config(config)?;
    let outcome = service.run(cli.dry_run).await?;

    if cli.format == "json" {
        output_json(&outcome);
    } else {
        output_text(&outcome);
    }

    Ok(())
}

/// Output the full outcome as JSON
fn output_json(outcome: &RunOutcome) {
    println!("{}", serde_json::to_string_pretty(outcome).unwrap());
}

/// Output just the generated text; diagnostics stay on stderr
fn output_text(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Generated { text, .. } => println!("{}", text),
        RunOutcome::EmptyCorpus => {
            eprintln!("No public posts to mimic; the corpus is empty");
        }
    }
}
