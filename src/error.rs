use std::io;
use thiserror::Error;

/// Errors produced while decoding filesystem structures or recovering files.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Filesystem metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Unsupported inode: {0}")]
    UnsupportedInode(String),

    #[error("Malformed extent tree: {0}")]
    MalformedExtentTree(String),

    #[error("Malformed pointer region: expected 60 bytes, got {0}")]
    MalformedPointerRegion(usize),

    #[error("Malformed directory block: {0}")]
    MalformedDirectoryBlock(String),

    #[error("File was not found in snapshot: {0}")]
    PathNotFound(String),

    #[error("File is not deleted")]
    NotDeleted,

    #[error("File cannot be fully recovered: some of its blocks are already in use")]
    BlocksReallocated,

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Operation interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    IoFailure(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
