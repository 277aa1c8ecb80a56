mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use cli::{Cli, Commands};
use ext4_snapback::io::ImageReader;
use ext4_snapback::metadata::FilesystemMetadata;
use ext4_snapback::snapshot::{self, Snapshot};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Create {
            image,
            output,
            depth,
        } => {
            let output = output.unwrap_or_else(|| cli::default_snapshot_path(&image));
            run_create(&image, &output, depth)
        }
        Commands::Recover {
            image,
            snapshot,
            file_path,
            output,
            force,
        } => {
            let output = output.unwrap_or_else(|| cli::default_output_path(&file_path));
            run_recover(&image, &snapshot, &file_path, &output, force)
        }
        Commands::Ls { image, snapshot } => run_ls(&image, &snapshot),
    }
}

fn open_image(image: &Path) -> Result<(ImageReader, FilesystemMetadata)> {
    let mut reader =
        ImageReader::open(image).context(format!("Failed to open image: {image:?}"))?;
    let meta = FilesystemMetadata::load(&mut reader)
        .context(format!("Failed to read filesystem metadata from {image:?}"))?;
    Ok((reader, meta))
}

fn run_create(image: &Path, output: &PathBuf, depth: u32) -> Result<()> {
    let (mut reader, meta) = open_image(image)?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} inodes {msg}")?
            .progress_chars("=>-"),
    );

    let progress = |done: usize, total: usize| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    };

    let cancel = AtomicBool::new(false);
    let snapshot = snapshot::generate(&mut reader, &meta, depth, &cancel, Some(&progress))
        .context("Snapshot generation failed")?;
    pb.finish_and_clear();

    snapshot
        .save(output)
        .context(format!("Failed to write snapshot to {output:?}"))?;

    println!(
        "{} {} files, {} paths -> {:?}",
        style("Snapshot created:").green().bold(),
        snapshot.inodes.len(),
        snapshot.dirs.len(),
        output
    );
    Ok(())
}

fn run_recover(
    image: &Path,
    snapshot_path: &Path,
    file_path: &str,
    output: &PathBuf,
    force: bool,
) -> Result<()> {
    let (mut reader, meta) = open_image(image)?;
    let snapshot = Snapshot::load(snapshot_path)
        .context(format!("Failed to load snapshot {snapshot_path:?}"))?;

    let written = snapshot::recover(&mut reader, &meta, &snapshot, file_path, output, force)
        .context(format!("Failed to recover {file_path}"))?;

    println!(
        "{} {} bytes -> {:?}",
        style("Recovered:").green().bold(),
        written,
        output
    );
    Ok(())
}

fn run_ls(image: &Path, snapshot_path: &Path) -> Result<()> {
    let (mut reader, meta) = open_image(image)?;
    let snapshot = Snapshot::load(snapshot_path)
        .context(format!("Failed to load snapshot {snapshot_path:?}"))?;

    let rows = snapshot::list(&mut reader, &meta, &snapshot)
        .context("Failed to check snapshot entries")?;

    for row in rows {
        let status = if row.recoverable {
            style("OK ").green()
        } else {
            style("ERR").red()
        };
        println!("{status} {:>12} {}", row.size, row.path);
    }
    Ok(())
}
