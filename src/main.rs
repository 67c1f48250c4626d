//! `embedres` CLI - resolve provider references into playable stream URLs

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use embedres::Config;

#[derive(Parser)]
#[command(name = "embedres")]
#[command(about = "Resolve video embed references into playable stream URLs")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/embedres/config.toml, or $EMBEDRES_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a file code or embed URL to a playable URL and headers
    Resolve {
        /// Provider id from the config (unknown ids work for embed URLs)
        provider: String,

        /// Provider file code or embed page URL
        target: String,

        /// API key for the provider's direct-link API
        #[arg(short = 'k', long)]
        api_key: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Capture the HLS manifest an embed page requests (no fallback)
    Intercept {
        /// Embed page URL
        url: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_filter = if cli.verbose { "embedres=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Resolve {
            provider,
            target,
            api_key,
            json,
        } => {
            cmd::resolve::cmd_resolve(&config, &provider, &target, api_key, json).await?;
        }
        Commands::Intercept { url, json } => {
            cmd::intercept::cmd_intercept(&config, &url, json).await?;
        }
        Commands::Providers => {
            cmd::providers::cmd_providers(&config);
        }
    }

    Ok(())
}
