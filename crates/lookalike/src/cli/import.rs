//! The `lookalike import` command: bulk-load a directory under a profile.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use futures_util::StreamExt;
use lookalike_core::{Config, ImageService, LookalikeError};
use walkdir::WalkDir;

/// Extensions picked up by directory discovery.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

/// Arguments for the `import` command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Image file or directory to import
    pub input: PathBuf,

    /// Profile the images are stored under
    #[arg(short, long)]
    pub profile: String,

    /// Create the profile if it does not exist
    #[arg(long)]
    pub create_profile: bool,

    /// Number of images fingerprinted concurrently
    #[arg(long, default_value = "4")]
    pub parallel: usize,
}

/// A file found during discovery.
#[derive(Debug, Clone)]
struct DiscoveredFile {
    path: PathBuf,
    size: u64,
}

/// Execute the import command.
pub async fn execute(args: ImportArgs, config: Config) -> anyhow::Result<()> {
    let input = super::expand(&args.input);
    let files = discover(&input);
    if files.is_empty() {
        anyhow::bail!("No supported images found at {}", input.display());
    }

    let engine = super::load_engine(&config)?;
    let (store, blobs) = super::open_stores(&config).await?;

    let images = ImageService::new(&config, engine, store, blobs);
    let profiles = images.profiles();
    match profiles.get_profile(&args.profile).await {
        Ok(_) => {}
        Err(LookalikeError::NotFound(_)) if args.create_profile => {
            profiles.create_profile(&args.profile).await?;
        }
        Err(LookalikeError::NotFound(_)) => anyhow::bail!(
            "Profile {:?} does not exist. Create it first or pass --create-profile.",
            args.profile
        ),
        Err(e) => return Err(e.into()),
    }

    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    tracing::info!(
        "Importing {} images ({:.1} MB) into profile {:?}",
        files.len(),
        total_bytes as f64 / 1_000_000.0,
        args.profile
    );

    let pb = create_progress_bar(files.len() as u64);
    let start = Instant::now();
    let mut succeeded = 0u64;
    let mut failed = 0u64;

    let mut results = futures_util::stream::iter(files.iter())
        .map(|file| import_one(&images, file, &args.profile))
        .buffer_unordered(args.parallel.max(1));

    while let Some((file, result)) = results.next().await {
        match result {
            Ok(id) => {
                succeeded += 1;
                pb.set_message(format!("image {id}"));
            }
            Err(e) => {
                failed += 1;
                pb.suspend(|| tracing::error!("{}: {}", file.path.display(), e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let elapsed = start.elapsed();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        succeeded as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    print_summary(succeeded, failed, total_bytes, elapsed, rate);

    if failed > 0 && succeeded == 0 {
        anyhow::bail!("All {failed} images failed to import");
    }
    Ok(())
}

async fn import_one<'a>(
    images: &ImageService,
    file: &'a DiscoveredFile,
    profile: &str,
) -> (&'a DiscoveredFile, Result<i64, LookalikeError>) {
    let result = async {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| LookalikeError::InvalidImage(format!("Cannot read file: {e}")))?;
        let file_name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let record = images.create_image(bytes, file_name, profile).await?;
        Ok::<_, LookalikeError>(record.id)
    }
    .await;
    (file, result)
}

/// Find supported images at `path`: the file itself, or every supported
/// file below a directory, sorted by path.
fn discover(path: &Path) -> Vec<DiscoveredFile> {
    if path.is_file() {
        return match std::fs::metadata(path) {
            Ok(meta) if is_supported(path) => vec![DiscoveredFile {
                path: path.to_path_buf(),
                size: meta.len(),
            }],
            _ => vec![],
        };
    }

    let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .filter_map(|e| {
            let size = e.metadata().ok()?.len();
            Some(DiscoveredFile {
                path: e.into_path(),
                size,
            })
        })
        .collect();

    // Sort by path for deterministic ordering
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after an import.
fn print_summary(
    succeeded: u64,
    failed: u64,
    total_bytes: u64,
    elapsed: std::time::Duration,
    rate: f64,
) {
    let total = succeeded + failed;
    let mb_processed = total_bytes as f64 / 1_000_000.0;
    let throughput = if elapsed.as_secs_f64() > 0.0 {
        mb_processed / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Imported:     {:>8}", succeeded);
    if failed > 0 {
        eprintln!("    Failed:       {:>8}", failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", total);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("    Throughput:   {:>7.1} MB/sec", throughput);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("test.jpg")));
        assert!(is_supported(Path::new("test.JPG")));
        assert!(is_supported(Path::new("test.jpeg")));
        assert!(is_supported(Path::new("test.png")));
        assert!(is_supported(Path::new("test.webp")));
        assert!(!is_supported(Path::new("test.txt")));
        assert!(!is_supported(Path::new("test")));
    }

    #[test]
    fn test_discover_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.png"), b"12").unwrap();
        std::fs::write(dir.path().join("sub").join("a.JPG"), b"1234").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let files = discover(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("b.png"), PathBuf::from("sub").join("a.JPG")]
        );
        assert_eq!(files.iter().map(|f| f.size).sum::<u64>(), 6);
    }

    #[test]
    fn test_discover_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("one.webp");
        let text = dir.path().join("one.txt");
        std::fs::write(&image, b"x").unwrap();
        std::fs::write(&text, b"x").unwrap();

        assert_eq!(discover(&image).len(), 1);
        assert!(discover(&text).is_empty());
        assert!(discover(&dir.path().join("missing")).is_empty());
    }
}
