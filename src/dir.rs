use crate::chunks;
use crate::error::{RecoveryError, Result};
use crate::inode::ROOT_INODE;
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::{Chunk, Filetype};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// One live directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u64,
    pub filetype: Option<Filetype>,
    pub name: String,
}

/// Decodes a buffer of directory records.
///
/// Records are walked by their declared record length and must land exactly
/// on the buffer end. Two layouts exist: with the filetype feature the name
/// length is one byte followed by a file-type byte; without it the name
/// length is a two-byte field and the type is unknown. Entries with inode 0
/// are deleted slots and are skipped.
pub fn decode_dir_block(meta: &FilesystemMetadata, data: &[u8]) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        if offset + 8 > data.len() {
            return Err(RecoveryError::MalformedDirectoryBlock(format!(
                "record header at offset {offset} exceeds block of {} bytes",
                data.len()
            )));
        }

        let inode = LittleEndian::read_u32(&data[offset..offset + 4]) as u64;
        let rec_len = LittleEndian::read_u16(&data[offset + 4..offset + 6]) as usize;

        let (name_len, filetype) = if meta.filetype_feature {
            (
                data[offset + 6] as usize,
                Filetype::from_dirent(data[offset + 7]),
            )
        } else {
            (
                LittleEndian::read_u16(&data[offset + 6..offset + 8]) as usize,
                None,
            )
        };

        if offset + 8 + name_len > data.len() {
            return Err(RecoveryError::MalformedDirectoryBlock(format!(
                "name of {name_len} bytes at offset {offset} exceeds block"
            )));
        }

        if inode != 0 {
            let name = String::from_utf8_lossy(&data[offset + 8..offset + 8 + name_len]);
            entries.push(DirEntry {
                inode,
                filetype,
                name: name.into_owned(),
            });
        }

        if rec_len == 0 {
            return Err(RecoveryError::MalformedDirectoryBlock(format!(
                "zero-length record at offset {offset}"
            )));
        }
        offset += rec_len;
    }

    if offset != data.len() {
        return Err(RecoveryError::MalformedDirectoryBlock(format!(
            "records overrun block end by {} bytes",
            offset - data.len()
        )));
    }

    Ok(entries)
}

/// Reads a directory's content from its resolved chunks and decodes all
/// entries. The trailing allocation padding past `size` is dropped first.
pub fn read_dir(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    chunks: &[Chunk],
    size: u64,
) -> Result<Vec<DirEntry>> {
    let data = chunks::read_chunks(reader, chunks, Some(size))?;
    decode_dir_block(meta, &data)
}

/// A directory staged for traversal: its resolved size and chunks.
pub type StagedDirs = HashMap<u64, (u64, Vec<Chunk>)>;

/// Breadth-first directory traversal producing an absolute-path to inode-id
/// map for every regular-file entry.
///
/// Starts at the root inode with prefix `/` and descends at most
/// `max_depth` levels. Each staged directory is consumed at most once, so
/// cyclic structures cannot loop; unknown directories (outside the staged
/// set) are skipped. The cancel flag is checked between depth levels.
pub fn walk_tree(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    mut staged: StagedDirs,
    max_depth: u32,
    cancel: &AtomicBool,
) -> Result<HashMap<String, u64>> {
    let mut paths = HashMap::new();
    let mut frontier = vec![(String::from("/"), ROOT_INODE)];

    for depth in 0..max_depth {
        if frontier.is_empty() {
            break;
        }
        if cancel.load(Ordering::Relaxed) {
            return Err(RecoveryError::Interrupted);
        }

        let mut next = Vec::new();
        for (prefix, inode) in frontier {
            // Already consumed (cycle) or never staged.
            let Some((size, chunks)) = staged.remove(&inode) else {
                continue;
            };

            for entry in read_dir(reader, meta, &chunks, size)? {
                if entry.name == "." || entry.name == ".." {
                    continue;
                }

                match entry.filetype {
                    Some(Filetype::Regular) => {
                        paths.insert(format!("{prefix}{}", entry.name), entry.inode);
                    }
                    Some(Filetype::Directory) => {
                        next.push((format!("{prefix}{}/", entry.name), entry.inode));
                    }
                    _ => {}
                }
            }
        }

        debug!(depth, pending = next.len(), files = paths.len(), "walked directory level");
        frontier = next;
    }

    Ok(paths)
}
