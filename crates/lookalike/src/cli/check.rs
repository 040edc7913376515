//! The `lookalike check` command: score one image against the store.

use std::path::PathBuf;

use clap::Args;
use lookalike_core::{CheckOptions, Config, ImageService};

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Image file to score
    pub file: PathBuf,

    /// Drop scores below this value
    #[arg(short, long)]
    pub threshold: Option<f32>,

    /// Store the image under this profile when nothing matches
    #[arg(long, value_name = "PROFILE")]
    pub create_under: Option<String>,

    /// Print the full outcome as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the check command.
pub async fn execute(args: CheckArgs, config: Config) -> anyhow::Result<()> {
    if let Some(threshold) = args.threshold {
        anyhow::ensure!(threshold.is_finite(), "--threshold must be a finite number");
    }

    let path = super::expand(&args.file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;

    let engine = super::load_engine(&config)?;
    let (store, blobs) = super::open_stores(&config).await?;
    let images = ImageService::new(&config, engine, store, blobs);

    let options = CheckOptions {
        create_if_unique: args.create_under.is_some(),
        profile: args.create_under,
        threshold: args.threshold,
        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
    };
    let outcome = images.check_image(bytes, options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    if outcome.scores.is_empty() {
        println!("No stored images scored above the threshold.");
    } else {
        println!("  {:>8}  {:>8}  {:>8}", "IMAGE", "PROFILE", "SCORE");
        for scored in &outcome.scores {
            println!(
                "  {:>8}  {:>8}  {:>8.4}",
                scored.image_id, scored.profile_id, scored.score
            );
        }
    }
    for dup in &outcome.duplicates {
        println!(
            "  Near-duplicate: image {} (hamming distance {})",
            dup.image_id, dup.distance
        );
    }
    if let Some(created) = &outcome.created {
        println!("Stored as image {} ({})", created.id, created.storage_key);
    }

    Ok(())
}
