use crate::error::{RecoveryError, Result};
use crate::io::ImageReader;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::debug;

const EXT4_SUPER_MAGIC: u16 = 0xEF53;
const SUPERBLOCK_OFFSET: u64 = 1024;
const SUPERBLOCK_SIZE: usize = 1024;

const INCOMPAT_FILETYPE: u32 = 0x2;
const INCOMPAT_64BIT: u32 = 0x80;

const BG_INODE_UNINIT: u16 = 0x1;
const BG_BLOCK_UNINIT: u16 = 0x2;

/// Per-group allocation flags from the group descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupFlags {
    pub inode_uninit: bool,
    pub block_uninit: bool,
}

/// One block-group descriptor: bitmap and inode-table locations plus flags.
#[derive(Debug, Clone)]
pub struct BlockGroup {
    pub group: u64,
    pub block_bitmap: u64,
    pub inode_bitmap: u64,
    pub inode_table: u64,
    pub flags: GroupFlags,
}

/// Structured filesystem metadata consumed by every resolver.
#[derive(Debug, Clone)]
pub struct FilesystemMetadata {
    pub block_size: u32,
    pub inode_size: u16,
    pub inodes_count: u32,
    pub blocks_count: u64,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    /// Whether directory entries carry an explicit file-type byte.
    pub filetype_feature: bool,
    pub groups: Vec<BlockGroup>,
}

impl FilesystemMetadata {
    /// Parses the superblock and group descriptor table from the image.
    pub fn load(reader: &mut ImageReader) -> Result<Self> {
        let data = reader
            .read_at(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)
            .map_err(|e| RecoveryError::MetadataUnavailable(e.to_string()))?;

        let mut meta = Self::parse_superblock(&data)?;
        meta.load_group_descriptors(reader, &data)?;

        debug!(
            block_size = meta.block_size,
            inode_size = meta.inode_size,
            groups = meta.groups.len(),
            "filesystem metadata loaded"
        );
        Ok(meta)
    }

    fn parse_superblock(data: &[u8]) -> Result<Self> {
        let invalid = |e: std::io::Error| RecoveryError::MetadataUnavailable(e.to_string());

        let mut cursor = Cursor::new(data);
        let inodes_count = cursor.read_u32::<LittleEndian>().map_err(invalid)?;
        let blocks_count_lo = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

        cursor.set_position(24);
        let log_block_size = cursor.read_u32::<LittleEndian>().map_err(invalid)?;
        if log_block_size > 6 {
            return Err(RecoveryError::MetadataUnavailable(format!(
                "implausible log block size {log_block_size}"
            )));
        }
        let block_size = 1024u32 << log_block_size;

        cursor.set_position(32);
        let blocks_per_group = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

        cursor.set_position(40);
        let inodes_per_group = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

        cursor.set_position(56);
        let magic = cursor.read_u16::<LittleEndian>().map_err(invalid)?;
        if magic != EXT4_SUPER_MAGIC {
            return Err(RecoveryError::MetadataUnavailable(format!(
                "bad superblock magic 0x{magic:04X}"
            )));
        }

        cursor.set_position(88);
        let inode_size = cursor.read_u16::<LittleEndian>().map_err(invalid)?;

        if block_size > 65536 || inode_size < 128 || blocks_per_group == 0 || inodes_per_group == 0
        {
            return Err(RecoveryError::MetadataUnavailable(
                "implausible superblock geometry".to_string(),
            ));
        }

        cursor.set_position(96);
        let feature_incompat = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

        Ok(Self {
            block_size,
            inode_size,
            inodes_count,
            blocks_count: blocks_count_lo as u64,
            blocks_per_group,
            inodes_per_group,
            filetype_feature: feature_incompat & INCOMPAT_FILETYPE != 0,
            groups: Vec::new(),
        })
    }

    fn load_group_descriptors(&mut self, reader: &mut ImageReader, sb: &[u8]) -> Result<()> {
        let invalid = |e: std::io::Error| RecoveryError::MetadataUnavailable(e.to_string());

        let mut cursor = Cursor::new(sb);
        cursor.set_position(96);
        let feature_incompat = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

        // Descriptors grow to 64 bytes with the 64-bit feature; only the
        // low 32-bit halves are consumed either way.
        let desc_size = if feature_incompat & INCOMPAT_64BIT != 0 {
            cursor.set_position(254);
            (cursor.read_u16::<LittleEndian>().map_err(invalid)? as usize).max(32)
        } else {
            32
        };

        let group_count = self.blocks_count.div_ceil(self.blocks_per_group as u64);

        // The descriptor table occupies the first block after the superblock.
        let gdt_block = if self.block_size == 1024 { 2 } else { 1 };
        let table = reader
            .read_at(
                gdt_block * self.block_size as u64,
                group_count as usize * desc_size,
            )
            .map_err(|e| RecoveryError::MetadataUnavailable(e.to_string()))?;

        for group in 0..group_count {
            let mut cursor = Cursor::new(&table[group as usize * desc_size..]);
            let block_bitmap = cursor.read_u32::<LittleEndian>().map_err(invalid)?;
            let inode_bitmap = cursor.read_u32::<LittleEndian>().map_err(invalid)?;
            let inode_table = cursor.read_u32::<LittleEndian>().map_err(invalid)?;

            cursor.set_position(18);
            let flags = cursor.read_u16::<LittleEndian>().map_err(invalid)?;

            self.groups.push(BlockGroup {
                group,
                block_bitmap: block_bitmap as u64,
                inode_bitmap: inode_bitmap as u64,
                inode_table: inode_table as u64,
                flags: GroupFlags {
                    inode_uninit: flags & BG_INODE_UNINIT != 0,
                    block_uninit: flags & BG_BLOCK_UNINIT != 0,
                },
            });
        }

        Ok(())
    }
}
