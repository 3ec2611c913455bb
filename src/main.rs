use anyhow::{bail, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use true_page::{collect_image_files, run_batch, BatchOptions, Cli, SegmentParams};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let files = collect_image_files(&cli.input_dir)?;
    if files.is_empty() {
        bail!("no image files found in {}", cli.input_dir.display());
    }
    eprintln!("Processing {} pages from {:?}", files.len(), cli.input_dir);

    let opts = BatchOptions {
        params: SegmentParams::Automatic {
            mode: cli.threshold,
            backing: cli.backing,
        },
        fill: cli.fill,
    };

    let output_dir = cli.output_dir();
    let summary = run_batch(&files, &output_dir, &opts)?;

    eprintln!();
    eprintln!("Saved to {:?}", output_dir);
    eprintln!(
        "Rectified: {}, saved unchanged: {}, placeholders: {}, failed: {}",
        summary.rectified, summary.no_contour, summary.degenerate, summary.failed
    );

    if summary.failed == summary.total() {
        bail!("every page failed");
    }
    Ok(())
}
