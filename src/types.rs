use serde::{Deserialize, Serialize};

/// A contiguous run of device bytes holding part of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Physical byte offset on the device.
    pub addr: u64,
    /// Length in bytes.
    pub len: u64,
}

impl Chunk {
    pub fn new(addr: u64, len: u64) -> Self {
        Self { addr, len }
    }
}

/// A compacted run of contiguous block ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub first: u64,
    pub count: u64,
}

impl BlockRange {
    pub fn new(first: u64, count: u64) -> Self {
        Self { first, count }
    }

    /// Last block id covered by this range (inclusive).
    pub fn last(&self) -> u64 {
        self.first + self.count - 1
    }

    pub fn to_chunk(&self, block_size: u32) -> Chunk {
        Chunk::new(self.first * block_size as u64, self.count * block_size as u64)
    }
}

/// Filetype carried in the top 4 bits of an inode's mode field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filetype {
    Fifo,
    CharDevice,
    Directory,
    BlockDevice,
    Regular,
    Symlink,
    Socket,
}

impl Filetype {
    /// Maps the mode's filetype nibble. Unknown combinations yield `None`.
    pub fn from_mode(mode: u16) -> Option<Self> {
        match mode & 0xF000 {
            0x1000 => Some(Filetype::Fifo),
            0x2000 => Some(Filetype::CharDevice),
            0x4000 => Some(Filetype::Directory),
            0x6000 => Some(Filetype::BlockDevice),
            0x8000 => Some(Filetype::Regular),
            0xA000 => Some(Filetype::Symlink),
            0xC000 => Some(Filetype::Socket),
            _ => None,
        }
    }

    /// Maps the one-byte file type carried by directory entries when the
    /// filesystem declares filetype support. Zero means unknown.
    pub fn from_dirent(byte: u8) -> Option<Self> {
        match byte {
            0x1 => Some(Filetype::Regular),
            0x2 => Some(Filetype::Directory),
            0x3 => Some(Filetype::CharDevice),
            0x4 => Some(Filetype::BlockDevice),
            0x5 => Some(Filetype::Fifo),
            0x6 => Some(Filetype::Socket),
            0x7 => Some(Filetype::Symlink),
            _ => None,
        }
    }
}

/// Inode flags relevant to data-location resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InodeFlags {
    pub hashed_index: bool,
    pub huge_file: bool,
    pub extents: bool,
    pub inline_data: bool,
}

impl InodeFlags {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            hashed_index: raw & 0x1000 != 0,
            huge_file: raw & 0x4_0000 != 0,
            extents: raw & 0x8_0000 != 0,
            inline_data: raw & 0x1000_0000 != 0,
        }
    }
}

/// Joins a high/low 32-bit pair into one 64-bit value.
#[inline]
pub fn join_u32(hi: u32, lo: u32) -> u64 {
    ((hi as u64) << 32) | lo as u64
}
