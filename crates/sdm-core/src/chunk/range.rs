//! Chunk type and chunk list planning.

/// A single chunk: byte range `[start, end]` (both inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl Chunk {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(end >= start, "chunk end {} before start {}", end, start);
        Chunk { start, end }
    }

    /// Length of this chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Builds the chunk list for a resource of `total_length` bytes.
///
/// Every chunk is `chunk_size` bytes except possibly the last, which is shorter.
/// Returns an empty vec if `total_length` or `chunk_size` is 0.
pub fn plan_chunks(total_length: u64, chunk_size: u64) -> Vec<Chunk> {
    if total_length == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = (total_length + chunk_size - 1) / chunk_size;
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;

    while offset < total_length {
        let end = (offset + chunk_size).min(total_length) - 1;
        out.push(Chunk::new(offset, end));
        offset = end + 1;
    }

    out
}

/// Selects the inclusive chunk index window `[start_chunk, end_chunk]` used to
/// resume a download in segments. `end_chunk = None` means "to the last chunk";
/// an end past the last chunk is clamped. A start past the end yields nothing.
pub fn select_span(chunks: &[Chunk], start_chunk: usize, end_chunk: Option<usize>) -> Vec<Chunk> {
    let Some(last) = chunks.len().checked_sub(1) else {
        return Vec::new();
    };
    let end = end_chunk.map_or(last, |e| e.min(last));
    if start_chunk > end {
        return Vec::new();
    }
    chunks[start_chunk..=end].to_vec()
}

/// Total number of bytes covered by `chunks`.
pub fn span_len(chunks: &[Chunk]) -> u64 {
    chunks.iter().map(Chunk::len).sum()
}
