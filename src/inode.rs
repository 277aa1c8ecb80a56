use crate::bitmap;
use crate::error::{RecoveryError, Result};
use crate::io::ImageReader;
use crate::metadata::FilesystemMetadata;
use crate::types::{Chunk, Filetype, InodeFlags, join_u32};
use byteorder::{ByteOrder, LittleEndian};

/// Inodes 1-11 are reserved by the filesystem itself.
pub const FIRST_NON_RESERVED_INODE: u64 = 11;

/// Root directory inode id.
pub const ROOT_INODE: u64 = 2;

/// Byte length of the block/extent-root region embedded in an inode.
pub const BLOCK_REGION_LEN: usize = 60;

/// Decoded view of one raw inode record.
#[derive(Debug, Clone)]
pub struct Inode {
    /// 1-based global inode id.
    pub id: u64,
    pub filetype: Option<Filetype>,
    pub flags: InodeFlags,
    pub links_count: u16,
    pub size: u64,
    /// The 60-byte region holding either the extent-tree root or the
    /// direct/indirect block pointers, depending on `flags.extents`.
    pub block_region: [u8; BLOCK_REGION_LEN],
}

impl Inode {
    /// Decodes the fixed-offset fields of a raw inode record.
    pub fn parse(id: u64, data: &[u8]) -> Result<Self> {
        if data.len() < 112 {
            return Err(RecoveryError::UnsupportedInode(format!(
                "inode {id}: record too short ({} bytes)",
                data.len()
            )));
        }

        let mode = LittleEndian::read_u16(&data[0x00..0x02]);
        let size_lo = LittleEndian::read_u32(&data[0x04..0x08]);
        let links_count = LittleEndian::read_u16(&data[0x1A..0x1C]);
        let flags = LittleEndian::read_u32(&data[0x20..0x24]);
        let size_hi = LittleEndian::read_u32(&data[0x6C..0x70]);

        let mut block_region = [0u8; BLOCK_REGION_LEN];
        block_region.copy_from_slice(&data[0x28..0x28 + BLOCK_REGION_LEN]);

        Ok(Self {
            id,
            filetype: Filetype::from_mode(mode),
            flags: InodeFlags::from_raw(flags),
            links_count,
            size: join_u32(size_hi, size_lo),
            block_region,
        })
    }
}

/// Resolves an inode's data location to its ordered byte chunks, picking
/// the extent or legacy pointer scheme from the inode flags.
pub fn resolve_chunks(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    inode: &Inode,
) -> Result<(u64, Vec<Chunk>)> {
    if inode.flags.inline_data {
        return Err(RecoveryError::UnsupportedInode(format!(
            "inode {} carries inline data",
            inode.id
        )));
    }

    let chunks = if inode.flags.extents {
        crate::extent::resolve_extent_chunks(reader, meta, &inode.block_region)?
    } else {
        crate::indirect::resolve_indirect_chunks(reader, meta, &inode.block_region)?
    };

    Ok((inode.size, chunks))
}

/// Location of one allocated inode record on the device.
#[derive(Debug, Clone, Copy)]
pub struct InodeLocation {
    pub id: u64,
    pub byte_addr: u64,
}

/// Enumerates every initialized inode across all block groups, in id order
/// within each group. Groups flagged inode-uninitialized are skipped.
pub fn enumerate_inodes(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
) -> Result<Vec<InodeLocation>> {
    let mut locations = Vec::new();

    for bg in &meta.groups {
        if bg.flags.inode_uninit {
            continue;
        }

        let bitmap = reader.read_blocks(meta.block_size, bg.inode_bitmap, 1)?;
        let indices = bitmap::set_indices(&bitmap, Some(meta.inodes_per_group as usize));

        let table_base = bg.inode_table * meta.block_size as u64;
        for index in indices {
            locations.push(InodeLocation {
                id: index as u64 + meta.inodes_per_group as u64 * bg.group + 1,
                byte_addr: table_base + index as u64 * meta.inode_size as u64,
            });
        }
    }

    Ok(locations)
}

/// Reads and decodes one inode record by its table location.
pub fn read_inode(
    reader: &mut ImageReader,
    meta: &FilesystemMetadata,
    location: InodeLocation,
) -> Result<Inode> {
    let data = reader.read_at(location.byte_addr, meta.inode_size as usize)?;
    Inode::parse(location.id, &data)
}
