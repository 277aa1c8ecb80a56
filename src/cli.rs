use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ext4-snapback")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Snapshot EXT4 inode data pointers & recover deleted files", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a metadata snapshot of the filesystem image
    Create {
        /// Filesystem image
        #[arg(short, long)]
        image: PathBuf,

        /// Snapshot output file (defaults to <image>.snapshot.out)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum depth of directory traversal
        #[arg(long, default_value = "100")]
        depth: u32,
    },

    /// Recover one file from a metadata snapshot
    Recover {
        /// Filesystem image
        #[arg(short, long)]
        image: PathBuf,

        /// Metadata snapshot generated with "create"
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Absolute path of the wanted file inside the filesystem
        file_path: String,

        /// Output file (defaults to the file's base name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the deleted/reallocated validation and extract regardless
        #[arg(short, long)]
        force: bool,
    },

    /// List snapshot entries with their current recoverability
    Ls {
        /// Filesystem image
        #[arg(short, long)]
        image: PathBuf,

        /// Metadata snapshot generated with "create"
        #[arg(short, long)]
        snapshot: PathBuf,
    },
}

/// Default snapshot path: the image's base name plus `.snapshot.out`.
pub fn default_snapshot_path(image: &Path) -> PathBuf {
    let base = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    PathBuf::from(format!("{base}.snapshot.out"))
}

/// Default recovery output: the base name of the in-filesystem path.
pub fn default_output_path(file_path: &str) -> PathBuf {
    let base = file_path.rsplit('/').next().filter(|s| !s.is_empty());
    PathBuf::from(base.unwrap_or("recovered.out"))
}
