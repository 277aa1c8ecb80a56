use crate::error::{RecoveryError, Result};
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::{Chunk, join_u32};
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

const EXTENT_MAGIC: u16 = 0xF30A;
const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 12;

/// Extent tree block header.
#[derive(Debug, Clone, Copy)]
struct ExtentHeader {
    entries: u16,
    depth: u16,
}

/// One record of an extent tree node. Leaves describe data runs, indexes
/// point one level down.
#[derive(Debug, Clone, Copy)]
enum ExtentRecord {
    Leaf {
        logical_block: u32,
        len: u16,
        physical_start: u64,
    },
    Index {
        child_block: u64,
    },
}

fn parse_header(data: &[u8]) -> Result<ExtentHeader> {
    if data.len() < HEADER_LEN {
        return Err(RecoveryError::MalformedExtentTree(format!(
            "header truncated ({} bytes)",
            data.len()
        )));
    }

    let magic = LittleEndian::read_u16(&data[0..2]);
    if magic != EXTENT_MAGIC {
        return Err(RecoveryError::MalformedExtentTree(format!(
            "bad magic 0x{magic:04X}"
        )));
    }

    Ok(ExtentHeader {
        entries: LittleEndian::read_u16(&data[2..4]),
        depth: LittleEndian::read_u16(&data[6..8]),
    })
}

/// Decodes one extent tree node: header plus `entries` records, interpreted
/// as leaves at depth 0 and as indexes above.
fn parse_node(data: &[u8]) -> Result<(u16, Vec<ExtentRecord>)> {
    let header = parse_header(data)?;

    let needed = HEADER_LEN + header.entries as usize * RECORD_LEN;
    if data.len() < needed {
        return Err(RecoveryError::MalformedExtentTree(format!(
            "node truncated: {} entries need {needed} bytes, got {}",
            header.entries,
            data.len()
        )));
    }

    let mut records = Vec::with_capacity(header.entries as usize);
    for i in 0..header.entries as usize {
        let rec = &data[HEADER_LEN + i * RECORD_LEN..HEADER_LEN + (i + 1) * RECORD_LEN];

        if header.depth == 0 {
            let start_hi = LittleEndian::read_u16(&rec[6..8]);
            let start_lo = LittleEndian::read_u32(&rec[8..12]);
            records.push(ExtentRecord::Leaf {
                logical_block: LittleEndian::read_u32(&rec[0..4]),
                len: LittleEndian::read_u16(&rec[4..6]),
                physical_start: join_u32(start_hi as u32, start_lo),
            });
        } else {
            let leaf_hi = LittleEndian::read_u16(&rec[8..10]);
            let leaf_lo = LittleEndian::read_u32(&rec[4..8]);
            records.push(ExtentRecord::Index {
                child_block: join_u32(leaf_hi as u32, leaf_lo),
            });
        }
    }

    Ok((header.depth, records))
}

/// Walks the extent tree rooted in the inode's 60-byte region down to its
/// leaf extents, expanding one level of the frontier per iteration.
fn collect_leaves(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    root: &[u8],
) -> Result<Vec<ExtentRecord>> {
    let (depth, mut frontier) = parse_node(root)?;

    for _ in 0..depth {
        let mut next = Vec::new();

        for record in &frontier {
            let child_block = match record {
                ExtentRecord::Index { child_block } => *child_block,
                // A leaf above depth 0 means sibling subtrees of uneven
                // height; the node's own header is authoritative.
                ExtentRecord::Leaf { .. } => {
                    next.push(*record);
                    continue;
                }
            };

            let data = reader.read_blocks(meta.block_size, child_block, 1)?;
            let (_, records) = parse_node(&data)?;
            next.extend(records);
        }

        frontier = next;
    }

    Ok(frontier)
}

/// Resolves an extent-mapped inode's data region to ordered byte chunks.
///
/// Leaves are sorted by logical block and must cover the file contiguously
/// from block 0; a hole or overlap is a fatal decode error.
pub fn resolve_extent_chunks(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    root: &[u8],
) -> Result<Vec<Chunk>> {
    let mut leaves = collect_leaves(reader, meta, root)?;

    leaves.sort_by_key(|record| match record {
        ExtentRecord::Leaf { logical_block, .. } => *logical_block,
        ExtentRecord::Index { .. } => u32::MAX,
    });

    let block_size = meta.block_size as u64;
    let mut expected_block = 0u32;
    let mut chunks = Vec::with_capacity(leaves.len());

    for record in leaves {
        let ExtentRecord::Leaf {
            logical_block,
            len,
            physical_start,
        } = record
        else {
            return Err(RecoveryError::MalformedExtentTree(
                "index record left at leaf depth".to_string(),
            ));
        };

        if logical_block != expected_block {
            return Err(RecoveryError::MalformedExtentTree(format!(
                "non-contiguous extents: expected logical block {expected_block}, got {logical_block}"
            )));
        }

        expected_block += len as u32;
        chunks.push(Chunk::new(
            physical_start * block_size,
            len as u64 * block_size,
        ));
    }

    debug!(extents = chunks.len(), "extent tree resolved");
    Ok(chunks)
}
