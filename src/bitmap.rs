/// Returns the n-th bit of a byte sequence, little-endian within each byte.
#[inline]
pub fn bit(data: &[u8], n: usize) -> u8 {
    (data[n / 8] >> (n % 8)) & 1
}

/// Returns the ordered indices of all set bits, truncated to `limit` if given.
pub fn set_indices(data: &[u8], limit: Option<usize>) -> Vec<usize> {
    let total = data.len() * 8;
    let total = match limit {
        Some(limit) => total.min(limit),
        None => total,
    };

    (0..total).filter(|&i| bit(data, i) == 1).collect()
}
