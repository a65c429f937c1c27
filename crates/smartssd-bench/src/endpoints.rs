//! Transfer endpoints for each benchmarked path
//!
//! | Endpoint        | Source            | Destination        |
//! |-----------------|-------------------|--------------------|
//! | [`SsdWrite`]    | host / P2P memory | SSD (`pwrite`)     |
//! | [`SsdRead`]     | SSD (`pread`)     | host / P2P memory  |
//! | [`BufferWrite`] | host memory       | buffer object      |
//! | [`BufferRead`]  | buffer object     | host memory        |
//!
//! SSD endpoints reopen the target for every sweep size and close it when
//! the size is done.

use crate::harness::Transfer;
use crate::verify;
use smartssd_driver::{
    sync_all_filesystems, BufferObject, DirectFile, DirectOptions, Result, SsdError, SyncDirection,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

fn span(offset: u64, len: usize, capacity: usize) -> Result<std::ops::Range<usize>> {
    let start = usize::try_from(offset).map_err(|_| SsdError::OutOfRange {
        offset: usize::MAX,
        len,
        capacity,
    })?;
    SsdError::check_range(start, len, capacity)?;
    Ok(start..start + len)
}

fn short(op: &str, moved: usize, len: usize, offset: u64) -> SsdError {
    SsdError::transfer_failed(format!("{op} moved {moved} of {len} bytes at offset {offset}"))
}

fn not_open(path: &Path) -> SsdError {
    SsdError::transfer_failed(format!("{} is not open", path.display()))
}

/// Host or P2P memory → SSD, one `pwrite` per transfer
///
/// Cloning shares the open descriptor, so clones can write concurrently.
#[derive(Debug, Clone)]
pub struct SsdWrite<'a> {
    path: PathBuf,
    options: DirectOptions,
    file: Option<Arc<DirectFile>>,
    src: &'a [u8],
}

impl<'a> SsdWrite<'a> {
    /// Write `src` to `path`, opened with `options` at each size
    pub fn new(path: impl Into<PathBuf>, options: DirectOptions, src: &'a [u8]) -> Self {
        Self {
            path: path.into(),
            options,
            file: None,
            src,
        }
    }
}

impl Transfer for SsdWrite<'_> {
    fn open(&mut self, size: usize) -> Result<()> {
        debug!("SsdWrite: opening {} for {size} B", self.path.display());
        self.file = Some(Arc::new(DirectFile::open(&self.path, self.options)?));
        Ok(())
    }

    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
        let file = self.file.as_ref().ok_or_else(|| not_open(&self.path))?;
        let range = span(offset, len, self.src.len())?;
        let moved = file.write_at(&self.src[range], offset)?;
        if moved != len {
            return Err(short("pwrite", moved, len, offset));
        }
        Ok(moved)
    }

    fn finish_pass(&mut self) -> Result<()> {
        sync_all_filesystems();
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// SSD → host or P2P memory, one `pread` per transfer
#[derive(Debug)]
pub struct SsdRead<'a> {
    path: PathBuf,
    options: DirectOptions,
    file: Option<DirectFile>,
    dst: &'a mut [u8],
    expected: Option<&'a [u8]>,
}

impl<'a> SsdRead<'a> {
    /// Read `path` into `dst`, opened with `options` at each size
    pub fn new(path: impl Into<PathBuf>, options: DirectOptions, dst: &'a mut [u8]) -> Self {
        Self {
            path: path.into(),
            options,
            file: None,
            dst,
            expected: None,
        }
    }

    /// Compare `dst` against `expected` after each size
    #[must_use]
    pub fn expecting(mut self, expected: &'a [u8]) -> Self {
        self.expected = Some(expected);
        self
    }
}

impl Transfer for SsdRead<'_> {
    fn open(&mut self, size: usize) -> Result<()> {
        debug!("SsdRead: opening {} for {size} B", self.path.display());
        self.file = Some(DirectFile::open(&self.path, self.options)?);
        Ok(())
    }

    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
        let file = self.file.as_ref().ok_or_else(|| not_open(&self.path))?;
        let range = span(offset, len, self.dst.len())?;
        let moved = file.read_at(&mut self.dst[range], offset)?;
        if moved != len {
            return Err(short("pread", moved, len, offset));
        }
        Ok(moved)
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn mismatches(&self) -> Vec<usize> {
        self.expected
            .map(|expected| verify::mismatches(expected, &*self.dst))
            .unwrap_or_default()
    }
}

/// Host memory → buffer object (write, then sync to device)
#[derive(Debug)]
pub struct BufferWrite<'a, B: BufferObject> {
    bo: &'a mut B,
    src: &'a [u8],
}

impl<'a, B: BufferObject> BufferWrite<'a, B> {
    /// Write `src` into `bo` at matching offsets
    pub fn new(bo: &'a mut B, src: &'a [u8]) -> Self {
        Self { bo, src }
    }
}

impl<B: BufferObject> Transfer for BufferWrite<'_, B> {
    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
        let range = span(offset, len, self.src.len())?;
        let start = range.start;
        self.bo.write(&self.src[range], start)?;
        self.bo.sync(SyncDirection::ToDevice, len, start)?;
        Ok(len)
    }
}

/// Buffer object → host memory (sync from device, then read)
#[derive(Debug)]
pub struct BufferRead<'a, B: BufferObject> {
    bo: &'a mut B,
    dst: &'a mut [u8],
    expected: Option<&'a [u8]>,
}

impl<'a, B: BufferObject> BufferRead<'a, B> {
    /// Read `bo` into `dst` at matching offsets
    pub fn new(bo: &'a mut B, dst: &'a mut [u8]) -> Self {
        Self {
            bo,
            dst,
            expected: None,
        }
    }

    /// Compare `dst` against `expected` after each size
    #[must_use]
    pub fn expecting(mut self, expected: &'a [u8]) -> Self {
        self.expected = Some(expected);
        self
    }

    /// The buffer object being read
    pub fn buffer_mut(&mut self) -> &mut B {
        self.bo
    }
}

impl<B: BufferObject> Transfer for BufferRead<'_, B> {
    fn transfer(&mut self, offset: u64, len: usize) -> Result<usize> {
        let range = span(offset, len, self.dst.len())?;
        let start = range.start;
        self.bo.sync(SyncDirection::FromDevice, len, start)?;
        self.bo.read(&mut self.dst[range], start)?;
        Ok(len)
    }

    fn mismatches(&self) -> Vec<usize> {
        self.expected
            .map(|expected| verify::mismatches(expected, &*self.dst))
            .unwrap_or_default()
    }
}
