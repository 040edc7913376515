//! The `lookalike models` command for managing the feature extractor.

use std::path::Path;

use clap::{Args, Subcommand};
use lookalike_core::Config;

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the headless ResNet-50 ONNX model
    Download {
        /// Source URL; defaults to `embedding.download_url`
        #[arg(long)]
        url: Option<String>,

        /// Expected BLAKE3 checksum of the file
        #[arg(long)]
        blake3: Option<String>,

        /// Replace an existing model file
        #[arg(long)]
        force: bool,
    },

    /// Show the model file path and whether it is installed
    Path,
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Download { url, blake3, force } => {
            let dest = config.model_path();
            if dest.exists() && !force {
                tracing::info!("Model already exists at {:?}", dest);
                println!("{}", dest.display());
                return Ok(());
            }

            let url = url.or_else(|| config.embedding.download_url.clone()).ok_or_else(|| {
                anyhow::anyhow!(
                    "No model URL. Pass --url or set embedding.download_url in {}",
                    Config::default_path().display()
                )
            })?;

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }

            tracing::info!("Downloading {} feature extractor...", config.embedding.model);
            tracing::info!("  Source: {}", url);
            tracing::info!("  Destination: {:?}", dest);

            let client = reqwest::Client::new();
            download_file(&client, &url, &dest, blake3.as_deref()).await?;

            let file_size = std::fs::metadata(&dest)?.len();
            tracing::info!(
                "  Download complete ({:.1} MB)",
                file_size as f64 / (1024.0 * 1024.0)
            );
            println!("{}", dest.display());
        }

        ModelsCommand::Path => {
            let path = config.model_path();
            let status = if path.exists() {
                "ready"
            } else {
                "not installed"
            };
            println!("{}  ({})", path.display(), status);
        }
    }

    Ok(())
}

/// Download a file from a URL to a local path, streaming to disk.
///
/// The body lands in `<dest>.partial` and is renamed into place only after
/// the checksum (when given) matches.
async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_blake3: Option<&str>,
) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    let pb = match total_size {
        Some(size) => indicatif::ProgressBar::new(size),
        None => indicatif::ProgressBar::new_spinner(),
    };
    pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let mut partial = dest.as_os_str().to_owned();
    partial.push(".partial");
    let partial = std::path::PathBuf::from(partial);

    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = blake3::Hasher::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);
    pb.finish_and_clear();

    if let Some(expected) = expected_blake3 {
        verify_blake3(&partial, &hasher.finalize().to_hex(), expected)?;
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(())
}

/// Compare a downloaded file's BLAKE3 checksum with the expected one.
///
/// On mismatch, removes the corrupt file so the next run re-downloads.
fn verify_blake3(path: &Path, actual: &str, expected: &str) -> anyhow::Result<()> {
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        let _ = std::fs::remove_file(path);
        anyhow::bail!(
            "Checksum mismatch for {}:\n  expected: {}\n  actual:   {}\n\
             Corrupt file removed, try downloading again.",
            path.display(),
            expected,
            actual
        );
    }

    tracing::debug!("  Checksum verified: {}...", &actual[..16.min(actual.len())]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    #[test]
    fn verify_blake3_correct_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx.partial");
        std::fs::write(&path, b"hello lookalike").unwrap();
        let actual = digest(b"hello lookalike");

        assert!(verify_blake3(&path, &actual, &actual.to_uppercase()).is_ok());
        assert!(
            path.exists(),
            "file should still exist after successful verify"
        );
    }

    #[test]
    fn verify_blake3_wrong_hash_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx.partial");
        std::fs::write(&path, b"hello lookalike").unwrap();
        let wrong_hash = "0000000000000000000000000000000000000000000000000000000000000000";

        let result = verify_blake3(&path, &digest(b"hello lookalike"), wrong_hash);

        let err_msg = result.unwrap_err().to_string();
        assert!(
            err_msg.contains("Checksum mismatch"),
            "error should mention mismatch: {err_msg}"
        );
        assert!(
            err_msg.contains("Corrupt file removed"),
            "error should mention removal: {err_msg}"
        );
        assert!(!path.exists(), "corrupt file should be deleted");
    }
}
