//! Positional writer for the output file.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Handle on the output file. Cheap to clone; each `write_at` is independent
/// (pwrite-style) so clones may be used from blocking tasks concurrently.
#[derive(Clone)]
pub struct StorageWriter {
    file: Arc<File>,
    path: PathBuf,
}

impl StorageWriter {
    /// Opens `path` for writing, creating it if missing. Existing content is
    /// kept so a partial earlier run can be continued in place.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to open output file: {}", path.display()))?;
        Ok(StorageWriter {
            file: Arc::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata().context("stat output file")?.len())
    }

    /// Grows the file to at least `size` bytes. On Unix tries
    /// `posix_fallocate` for real block allocation, falling back to `set_len`.
    /// Never shrinks.
    pub fn ensure_len(&self, size: u64) -> Result<()> {
        if self.len()? >= size {
            return Ok(());
        }
        #[cfg(unix)]
        {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file
            .set_len(size)
            .context("failed to preallocate output file")?;
        Ok(())
    }

    /// Cuts or extends the file to exactly `size` bytes.
    pub fn set_len(&self, size: u64) -> Result<()> {
        self.file
            .set_len(size)
            .with_context(|| format!("failed to resize {}", self.path.display()))
    }

    /// Write `data` at `offset`. Does not move the file cursor.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.file
            .write_all_at(data, offset)
            .with_context(|| {
                format!(
                    "write of {} bytes at {} to {} failed",
                    data.len(),
                    offset,
                    self.path.display()
                )
            })
    }

    /// Non-Unix: seek + write on a cloned handle. Not safe for concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = (*self.file).try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .with_context(|| format!("sync of {} failed", self.path.display()))
    }
}
