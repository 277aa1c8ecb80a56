use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read-only random-access reader over a filesystem image.
///
/// All resolution and recovery paths go through this; nothing ever writes
/// back to the image.
pub struct ImageReader {
    file: File,
    size: u64,
}

impl ImageReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut size = file.metadata()?.len();

        if size == 0 {
            // Block devices report zero metadata length; fall back to seeking.
            let mut file = file;
            size = file.seek(SeekFrom::End(0))?;
            file.seek(SeekFrom::Start(0))?;
            return Ok(Self { file, size });
        }

        Ok(Self { file, size })
    }

    /// Reads exactly `len` bytes starting at byte `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `count` whole blocks starting at block `addr`.
    pub fn read_blocks(&mut self, block_size: u32, addr: u64, count: u64) -> io::Result<Vec<u8>> {
        self.read_at(addr * block_size as u64, (count * block_size as u64) as usize)
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}
