use crate::bitmap;
use crate::chunks::compact_ranges;
use crate::error::{RecoveryError, Result};
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::{BlockRange, Chunk};

/// Whether the inode is currently deleted.
///
/// An inode in an entirely uninitialized group never existed on disk, which
/// counts as deleted; otherwise the inode-bitmap bit decides.
pub fn is_inode_deleted(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    inode_id: u64,
) -> Result<bool> {
    let group_index = ((inode_id - 1) / meta.inodes_per_group as u64) as usize;
    let bitmap_index = ((inode_id - 1) % meta.inodes_per_group as u64) as usize;

    let bg = meta.groups.get(group_index).ok_or_else(|| {
        RecoveryError::MetadataUnavailable(format!(
            "inode {inode_id} maps to group {group_index}, but only {} groups exist",
            meta.groups.len()
        ))
    })?;

    if bg.flags.inode_uninit {
        return Ok(true);
    }

    let bitmap = reader.read_blocks(meta.block_size, bg.inode_bitmap, 1)?;
    Ok(bitmap::bit(&bitmap, bitmap_index) == 0)
}

/// Compacted ranges of all currently-allocated block ids, taken from the
/// block bitmaps of every initialized group. Block ids are global and
/// 1-based.
pub fn used_block_ranges(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
) -> Result<Vec<BlockRange>> {
    let mut used = Vec::new();

    for bg in &meta.groups {
        if bg.flags.block_uninit {
            continue;
        }

        let bitmap = reader.read_blocks(meta.block_size, bg.block_bitmap, 1)?;
        for index in bitmap::set_indices(&bitmap, Some(meta.blocks_per_group as usize)) {
            used.push(index as u64 + meta.blocks_per_group as u64 * bg.group + 1);
        }
    }

    Ok(compact_ranges(&used))
}

/// Intersects one chunk's closed block interval with every used range,
/// reporting each exact overlap.
pub fn chunk_conflicts(chunk: &Chunk, block_size: u32, used: &[BlockRange]) -> Vec<BlockRange> {
    let block_size = block_size as u64;
    let file_first = chunk.addr / block_size;
    let file_last = (chunk.addr + chunk.len - 1) / block_size;

    let mut conflicts = Vec::new();
    for range in used {
        let lo = file_first.max(range.first);
        let hi = file_last.min(range.last());
        if lo <= hi {
            conflicts.push(BlockRange::new(lo, hi - lo + 1));
        }
    }

    conflicts
}

/// Blocks of the candidate chunks that are currently allocated to live
/// data. Recovery must refuse when this is non-empty, unless forced.
pub fn conflicting_chunks(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    chunks: &[Chunk],
) -> Result<Vec<BlockRange>> {
    let used = used_block_ranges(reader, meta)?;

    let mut conflicts = Vec::new();
    for chunk in chunks {
        if chunk.len == 0 {
            continue;
        }
        conflicts.extend(chunk_conflicts(chunk, meta.block_size, &used));
    }

    Ok(conflicts)
}
