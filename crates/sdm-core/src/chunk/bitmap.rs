//! Chunk completion bitmap.

/// One bit per chunk index (LSB of byte 0 = index 0).
///
/// The write sink uses it so that each chunk is counted toward progress at
/// most once, even if the same index were handed over twice.
#[derive(Debug, Clone, Default)]
pub struct ChunkBitmap {
    bytes: Vec<u8>,
    count: usize,
}

impl ChunkBitmap {
    /// New empty bitmap with capacity for `chunk_count` bits.
    pub fn new(chunk_count: usize) -> Self {
        ChunkBitmap {
            bytes: vec![0u8; (chunk_count + 7) / 8],
            count: 0,
        }
    }

    /// Marks `index` as completed. Returns false if it was already set.
    pub fn set_completed(&mut self, index: usize) -> bool {
        let byte_idx = index / 8;
        let bit = 1u8 << (index % 8);
        if byte_idx >= self.bytes.len() {
            self.bytes.resize(byte_idx + 1, 0);
        }
        if self.bytes[byte_idx] & bit != 0 {
            return false;
        }
        self.bytes[byte_idx] |= bit;
        self.count += 1;
        true
    }

    /// True if chunk at `index` is marked completed.
    #[cfg(test)]
    pub fn is_completed(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .map(|&b| b & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    /// Number of distinct indices marked so far.
    pub fn completed_count(&self) -> usize {
        self.count
    }

    /// True if all chunks in `[0, chunk_count)` are completed.
    #[cfg(test)]
    pub fn all_completed(&self, chunk_count: usize) -> bool {
        (0..chunk_count).all(|i| self.is_completed(i))
    }
}
