//! Page-aligned host buffers
//!
//! Direct I/O rejects buffers that are not aligned to the device's logical
//! block size, so every host buffer used by the benchmarks is allocated on
//! a page boundary and zero-initialised.

use crate::error::{Result, SsdError};
use std::alloc::Layout;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Alignment of every [`AlignedBuffer`] (one page)
pub const PAGE_SIZE: usize = 4096;

/// Fill pattern for benchmark payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// 27-byte period: `\n` then `b..z{` (byte `k` of a period is `b'a' + k`),
    /// last byte `\n`
    TextLines,
    /// Byte `i` holds `i & 0xFF`
    ByteRamp,
    /// All zeroes
    Zero,
}

impl Pattern {
    /// Byte at `index` of a pattern buffer of length `len`
    pub const fn byte_at(self, index: usize, len: usize) -> u8 {
        match self {
            Self::TextLines => {
                if index % 27 == 0 || index + 1 == len {
                    b'\n'
                } else {
                    b'a' + (index % 27) as u8
                }
            }
            #[allow(clippy::cast_possible_truncation)]
            Self::ByteRamp => (index & 0xFF) as u8,
            Self::Zero => 0,
        }
    }

    /// Write the pattern over all of `bytes`
    pub fn fill(self, bytes: &mut [u8]) {
        let len = bytes.len();
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = self.byte_at(index, len);
        }
    }
}

/// Zeroed heap allocation aligned to [`PAGE_SIZE`]
///
/// Dereferences to `[u8]`, so it can be handed straight to positioned I/O
/// or buffer-object calls.
#[derive(Debug)]
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes on a page boundary
    ///
    /// # Errors
    ///
    /// Returns an allocation error if `len` is zero, the layout is invalid,
    /// or the allocator is out of memory.
    pub fn new(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(SsdError::allocation(0, "zero-length buffer"));
        }
        let layout = Self::layout(len)?;

        // SAFETY: layout has non-zero size (checked above) and a power-of-two
        // alignment; the pointer is released in Drop with the same layout.
        let raw = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| SsdError::allocation(len, "out of memory"))?;

        tracing::debug!("Allocated aligned buffer: {ptr:p}, {len:#x} bytes");
        Ok(Self { ptr, len })
    }

    /// Allocate and fill with `pattern`
    ///
    /// # Errors
    ///
    /// Same as [`AlignedBuffer::new`].
    pub fn filled(len: usize, pattern: Pattern) -> Result<Self> {
        let mut buffer = Self::new(len)?;
        buffer.fill(pattern);
        Ok(buffer)
    }

    /// Overwrite the whole buffer with `pattern`
    pub fn fill(&mut self, pattern: Pattern) {
        pattern.fill(self);
    }

    /// Capacity in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; zero-length buffers cannot be constructed
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn layout(len: usize) -> Result<Layout> {
        Layout::from_size_align(len, PAGE_SIZE)
            .map_err(|e| SsdError::allocation(len, format!("invalid layout: {e}")))
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len initialised bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: &mut self gives exclusive access; ptr is valid for len bytes.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: ptr came from alloc_zeroed with this exact layout in new().
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

// SAFETY: AlignedBuffer owns its allocation exclusively.
unsafe impl Send for AlignedBuffer {}

// SAFETY: shared access only hands out &[u8]; mutation requires &mut self.
unsafe impl Sync for AlignedBuffer {}
