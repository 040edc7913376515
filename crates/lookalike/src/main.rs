//! Lookalike CLI - image similarity service.
//!
//! Lookalike stores perceptual hashes and CNN embeddings of uploaded images
//! and scores new images against them with cosine similarity.
//!
//! # Usage
//!
//! ```bash
//! # Download the feature extractor
//! lookalike models download --url https://example.com/resnet50-headless.onnx
//!
//! # Run the HTTP API
//! lookalike serve
//!
//! # Bulk-load a directory under a profile
//! lookalike profiles create catalog
//! lookalike import ./photos --profile catalog
//!
//! # Score one image against everything stored
//! lookalike check ./query.jpg --threshold 0.8
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lookalike_core::Config;

mod cli;
mod logging;
mod server;

/// Lookalike - find visually similar images with CNN embeddings.
#[derive(Parser, Debug)]
#[command(name = "lookalike")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "LOOKALIKE_CONFIG")]
    config: Option<PathBuf>,

    /// Override `database.url`
    #[arg(long, global = true, env = "LOOKALIKE_DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve(cli::serve::ServeArgs),

    /// Fingerprint and store every image in a directory
    Import(cli::import::ImportArgs),

    /// Score an image against the stored ones
    Check(cli::check::CheckArgs),

    /// Manage profiles
    Profiles(cli::profiles::ProfilesArgs),

    /// Manage the feature extractor model
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display()))?,
        None => match Config::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to load config: {e}\n  \
                     Using default configuration. Check your config file with `lookalike config path`."
                );
                Config::default()
            }
        },
    };
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Lookalike v{}", lookalike_core::VERSION);

    // Dispatch to the appropriate command handler
    match cli.command {
        Commands::Serve(args) => cli::serve::execute(args, config).await,
        Commands::Import(args) => cli::import::execute(args, config).await,
        Commands::Check(args) => cli::check::execute(args, config).await,
        Commands::Profiles(args) => cli::profiles::execute(args, config).await,
        Commands::Models(args) => cli::models::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
