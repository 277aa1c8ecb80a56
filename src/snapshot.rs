use crate::chunks;
use crate::dir::{self, StagedDirs};
use crate::error::{RecoveryError, Result};
use crate::inode::{self, FIRST_NON_RESERVED_INODE};
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::{Chunk, Filetype};
use crate::validate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Size and ordered data chunks of one regular file, serialized as a
/// 2-element array `[size, chunks]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry(pub u64, pub Vec<Chunk>);

impl FileEntry {
    pub fn size(&self) -> u64 {
        self.0
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.1
    }
}

/// The persisted path/inode/chunk metadata captured while files still
/// exist. Built once by [`generate`], immutable thereafter.
///
/// Inode ids key the `inodes` map; JSON stores them as strings and serde
/// coerces them back to integers on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Absolute path inside the filesystem to inode id.
    pub dirs: BTreeMap<String, u64>,
    /// Inode id to `(size, chunks)` for every regular file seen.
    pub inodes: BTreeMap<u64, FileEntry>,
}

impl Snapshot {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| RecoveryError::MalformedSnapshot(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| RecoveryError::MalformedSnapshot(e.to_string()))
    }

    /// Looks up a recovery target, resolving path to its stored entry.
    pub fn entry(&self, file_path: &str) -> Result<(u64, &FileEntry)> {
        let inode_id = *self
            .dirs
            .get(file_path)
            .ok_or_else(|| RecoveryError::PathNotFound(file_path.to_string()))?;

        let entry = self.inodes.get(&inode_id).ok_or_else(|| {
            RecoveryError::MalformedSnapshot(format!(
                "no chunk data for inode {inode_id} ({file_path})"
            ))
        })?;

        Ok((inode_id, entry))
    }
}

/// Builds a snapshot of the filesystem: decodes every initialized inode,
/// stores `(size, chunks)` for regular files beyond the reserved range,
/// and walks the directory tree for the path map.
///
/// `progress` is invoked as `(decoded, total)` while inodes are processed.
/// The cancel flag is checked between inode iterations and between
/// directory levels.
pub fn generate(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    dirs_max_depth: u32,
    cancel: &AtomicBool,
    progress: Option<&dyn Fn(usize, usize)>,
) -> Result<Snapshot> {
    let locations = inode::enumerate_inodes(reader, meta)?;
    let total = locations.len();
    info!(total, "enumerated initialized inodes");

    let mut files: BTreeMap<u64, FileEntry> = BTreeMap::new();
    let mut staged: StagedDirs = StagedDirs::new();

    for (done, location) in locations.into_iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(RecoveryError::Interrupted);
        }

        let node = inode::read_inode(reader, meta, location)?;

        match node.filetype {
            Some(Filetype::Regular) if node.id > FIRST_NON_RESERVED_INODE => {
                let (size, chunks) = inode::resolve_chunks(reader, meta, &node)?;
                files.insert(node.id, FileEntry(size, chunks));
            }
            Some(Filetype::Directory) => {
                let (size, chunks) = inode::resolve_chunks(reader, meta, &node)?;
                staged.insert(node.id, (size, chunks));
            }
            _ => {}
        }

        if let Some(progress) = progress {
            progress(done + 1, total);
        }
    }

    debug!(files = files.len(), dirs = staged.len(), "inode pass complete");

    let paths = dir::walk_tree(reader, meta, staged, dirs_max_depth, cancel)?;
    info!(paths = paths.len(), "directory walk complete");

    Ok(Snapshot {
        dirs: paths.into_iter().collect(),
        inodes: files,
    })
}

/// Recovers one file from the snapshot into `output`.
///
/// Unless `force` is set, the file must currently be deleted and none of
/// its data blocks may have been reallocated; `force` bypasses both checks
/// together. Returns the number of bytes written.
pub fn recover(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    snapshot: &Snapshot,
    file_path: &str,
    output: &Path,
    force: bool,
) -> Result<u64> {
    let (inode_id, entry) = snapshot.entry(file_path)?;

    if !force {
        if !validate::is_inode_deleted(reader, meta, inode_id)? {
            return Err(RecoveryError::NotDeleted);
        }
        if !validate::conflicting_chunks(reader, meta, entry.chunks())?.is_empty() {
            return Err(RecoveryError::BlocksReallocated);
        }
    }

    info!(file_path, inode_id, size = entry.size(), "recovering file");
    chunks::extract_to_file(reader, entry.chunks(), Some(entry.size()), output)
}

/// One row of the listing: a snapshot path with its size and whether it
/// currently satisfies the deleted and non-conflicting criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub size: u64,
    pub recoverable: bool,
}

/// Reports recoverability for every path in the snapshot without
/// extracting anything.
pub fn list(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    snapshot: &Snapshot,
) -> Result<Vec<ListEntry>> {
    let used = validate::used_block_ranges(reader, meta)?;

    let mut rows = Vec::with_capacity(snapshot.dirs.len());
    for (path, &inode_id) in &snapshot.dirs {
        let entry = snapshot.inodes.get(&inode_id);

        let recoverable = match entry {
            Some(entry) => {
                validate::is_inode_deleted(reader, meta, inode_id)?
                    && entry.chunks().iter().all(|chunk| {
                        chunk.len == 0
                            || validate::chunk_conflicts(chunk, meta.block_size, &used).is_empty()
                    })
            }
            None => false,
        };

        rows.push(ListEntry {
            path: path.clone(),
            size: entry.map(FileEntry::size).unwrap_or(0),
            recoverable,
        });
    }

    Ok(rows)
}
