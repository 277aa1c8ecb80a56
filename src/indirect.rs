use crate::chunks::compact_ranges;
use crate::error::{RecoveryError, Result};
use crate::inode::BLOCK_REGION_LEN;
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::Chunk;
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

const DIRECT_POINTERS: usize = 12;
const SINGLE_INDIRECT: usize = 12;
const DOUBLE_INDIRECT: usize = 13;
const TRIPLE_INDIRECT: usize = 14;

/// Unpacks a buffer of little-endian 32-bit block pointers, skipping
/// zeroes (unallocated holes).
fn unpack_pointers(data: &[u8]) -> Vec<u64> {
    data.chunks_exact(4)
        .map(LittleEndian::read_u32)
        .filter(|&p| p != 0)
        .map(u64::from)
        .collect()
}

fn pointer_at(region: &[u8], index: usize) -> u64 {
    LittleEndian::read_u32(&region[index * 4..index * 4 + 4]) as u64
}

/// Expands one indirection chain level by level: each iteration replaces
/// the frontier of pointer blocks with the pointers they contain. After
/// `levels` iterations the frontier holds data block numbers.
fn expand_levels(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    start: u64,
    levels: u32,
) -> Result<Vec<u64>> {
    let mut frontier = vec![start];

    for _ in 0..levels {
        let mut next = Vec::new();
        for block in frontier {
            let data = reader.read_blocks(meta.block_size, block, 1)?;
            next.extend(unpack_pointers(&data));
        }
        frontier = next;
    }

    Ok(frontier)
}

/// Resolves a legacy block-pointer inode region to ordered byte chunks.
///
/// Pointers 0-11 address data directly; pointers 12, 13 and 14 go through
/// one, two and three levels of indirection. Contiguous block runs are
/// compacted before conversion to byte chunks.
pub fn resolve_indirect_chunks(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    region: &[u8],
) -> Result<Vec<Chunk>> {
    if region.len() != BLOCK_REGION_LEN {
        return Err(RecoveryError::MalformedPointerRegion(region.len()));
    }

    let mut blocks = unpack_pointers(&region[..DIRECT_POINTERS * 4]);

    for (index, levels) in [
        (SINGLE_INDIRECT, 1),
        (DOUBLE_INDIRECT, 2),
        (TRIPLE_INDIRECT, 3),
    ] {
        let pointer = pointer_at(region, index);
        if pointer != 0 {
            blocks.extend(expand_levels(reader, meta, pointer, levels)?);
        }
    }

    let chunks: Vec<Chunk> = compact_ranges(&blocks)
        .iter()
        .map(|range| range.to_chunk(meta.block_size))
        .collect();

    debug!(blocks = blocks.len(), runs = chunks.len(), "indirect chain resolved");
    Ok(chunks)
}
