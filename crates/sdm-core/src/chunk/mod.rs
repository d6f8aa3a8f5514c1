//! Chunk planning and completion tracking.
//!
//! Splits a resource into fixed-size chunks (the unit of scheduling and retry),
//! selects the chunk window of a segmented resume, and tracks which chunk
//! indices have already been accounted for.

mod bitmap;
mod range;

pub use bitmap::ChunkBitmap;
pub use range::{plan_chunks, select_span, span_len, Chunk};
