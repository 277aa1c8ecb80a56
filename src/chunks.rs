use crate::error::Result;
use crate::io::ImageReader;
use crate::types::{BlockRange, Chunk};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Merges block ids into minimal contiguous runs, preserving input order.
/// `[5, 6, 7, 9, 10]` becomes `[{first: 5, count: 3}, {first: 9, count: 2}]`.
pub fn compact_ranges(ids: &[u64]) -> Vec<BlockRange> {
    let mut ranges: Vec<BlockRange> = Vec::new();

    for &id in ids {
        match ranges.last_mut() {
            Some(last) if id == last.last() + 1 => last.count += 1,
            _ => ranges.push(BlockRange::new(id, 1)),
        }
    }

    ranges
}

/// Copies chunk contents in order to `out`, trimming the tail so the total
/// written equals `size` when given. The final chunk may overshoot the file
/// size by block-size rounding; the excess is zero padding and is dropped.
pub fn copy_chunks(
    reader: &mut ImageReader,
    chunks: &[Chunk],
    size: Option<u64>,
    out: &mut impl Write,
) -> Result<u64> {
    let mut written = 0u64;

    for chunk in chunks {
        let mut take = chunk.len;
        if let Some(size) = size {
            if written >= size {
                break;
            }
            take = take.min(size - written);
        }

        let data = reader.read_at(chunk.addr, take as usize)?;
        out.write_all(&data)?;
        written += take;
    }

    Ok(written)
}

/// Materializes chunk contents into an in-memory buffer, trimmed identically
/// to [`copy_chunks`].
pub fn read_chunks(
    reader: &mut ImageReader,
    chunks: &[Chunk],
    size: Option<u64>,
) -> Result<Vec<u8>> {
    let capacity = size.unwrap_or_else(|| chunks.iter().map(|c| c.len).sum());
    let mut buf = Vec::with_capacity(capacity as usize);
    copy_chunks(reader, chunks, size, &mut buf)?;
    Ok(buf)
}

/// Streams chunk contents into `output`, writing through a temporary sibling
/// file that is renamed on full success and removed on failure. A failed
/// recovery never leaves a partial output file behind.
pub fn extract_to_file(
    reader: &mut ImageReader,
    chunks: &[Chunk],
    size: Option<u64>,
    output: &Path,
) -> Result<u64> {
    let tmp = output.with_extension("part");

    let result: Result<u64> = (|| {
        let mut file = fs::File::create(&tmp)?;
        let written = copy_chunks(reader, chunks, size, &mut file)?;
        file.sync_all()?;
        Ok(written)
    })();

    match result {
        Ok(written) => {
            fs::rename(&tmp, output)?;
            Ok(written)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}
