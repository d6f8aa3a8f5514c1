//! Output file I/O: open-or-create without truncation, preallocation and
//! positional writes.

mod writer;

pub use writer::StorageWriter;
