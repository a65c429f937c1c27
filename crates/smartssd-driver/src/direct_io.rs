//! Positioned direct I/O against NVMe block devices and files
//!
//! Files are opened through `std::fs::OpenOptions` with `O_DIRECT` supplied
//! as a custom flag from `rustix::fs::OFlags`. Reads and writes go through
//! `rustix::io::{pread, pwrite}`, so one descriptor can be shared by
//! several threads without a seek position to race on.

use crate::error::{Result, SsdError};
use rustix::fd::AsFd;
use rustix::fs::OFlags;
use rustix::io::{pread, pwrite};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Logical block alignment required by `O_DIRECT` transfers
pub const DIRECT_IO_ALIGN: usize = 512;

/// How to open a [`DirectFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectOptions {
    /// Bypass the page cache (`O_DIRECT`)
    pub direct: bool,
    /// Create the file if missing (`O_CREAT`, mode 0644)
    pub create: bool,
}

impl Default for DirectOptions {
    fn default() -> Self {
        Self {
            direct: true,
            create: false,
        }
    }
}

impl DirectOptions {
    /// Same options, but with page-cache I/O
    #[must_use]
    pub const fn buffered(mut self) -> Self {
        self.direct = false;
        self
    }

    /// Same options, creating the file if needed
    #[must_use]
    pub const fn create(mut self) -> Self {
        self.create = true;
        self
    }
}

/// Read-write handle on an SSD block device or a file on it
///
/// Closed on drop.
#[derive(Debug)]
pub struct DirectFile {
    file: File,
    path: PathBuf,
    direct: bool,
}

impl DirectFile {
    /// Open `path` read-write
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the open fails (missing file, no permission,
    /// or `O_DIRECT` unsupported by the filesystem).
    pub fn open(path: impl AsRef<Path>, options: DirectOptions) -> Result<Self> {
        let path = path.as_ref();

        // OFlags bits are small positive values
        #[allow(clippy::cast_possible_wrap)]
        let custom = if options.direct {
            OFlags::DIRECT.bits() as i32
        } else {
            0
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create)
            .mode(0o644)
            .custom_flags(custom)
            .open(path)?;

        tracing::debug!(
            "Opened {} (direct={}, create={})",
            path.display(),
            options.direct,
            options.create
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            direct: options.direct,
        })
    }

    /// Path this handle was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the page cache is bypassed
    pub const fn is_direct(&self) -> bool {
        self.direct
    }

    /// Read into `buf` from byte `offset`
    ///
    /// # Errors
    ///
    /// Returns a transfer error if `pread` fails.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.warn_unaligned(buf.as_ptr(), buf.len(), offset);
        pread(self.file.as_fd(), buf, offset).map_err(|e| {
            SsdError::transfer_failed(format!("pread {} @ {offset}: {e}", self.path.display()))
        })
    }

    /// Write `buf` at byte `offset`
    ///
    /// # Errors
    ///
    /// Returns a transfer error if `pwrite` fails.
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        self.warn_unaligned(buf.as_ptr(), buf.len(), offset);
        pwrite(self.file.as_fd(), buf, offset).map_err(|e| {
            SsdError::transfer_failed(format!("pwrite {} @ {offset}: {e}", self.path.display()))
        })
    }

    fn warn_unaligned(&self, ptr: *const u8, len: usize, offset: u64) {
        if self.direct && !is_direct_aligned(ptr, len, offset) {
            tracing::warn!(
                "Unaligned direct I/O on {}: ptr={ptr:p} len={len} offset={offset}",
                self.path.display()
            );
        }
    }
}

/// Flush every filesystem's dirty data to media (`sync(2)`)
pub fn sync_all_filesystems() {
    rustix::fs::sync();
}

/// Whether a transfer satisfies [`DIRECT_IO_ALIGN`] on pointer, length and offset
pub fn is_direct_aligned(ptr: *const u8, len: usize, offset: u64) -> bool {
    let align = DIRECT_IO_ALIGN as u64;
    (ptr as usize) % DIRECT_IO_ALIGN == 0 && len % DIRECT_IO_ALIGN == 0 && offset % align == 0
}
