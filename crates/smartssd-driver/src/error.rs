//! Error types for SmartSSD driver operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SmartSSD operations
pub type Result<T> = std::result::Result<T, SsdError>;

/// Errors that can occur while driving the SSD or its accelerator
#[derive(Debug, Error)]
pub enum SsdError {
    /// No accelerator at the requested index
    #[error("Accelerator device {index} not found")]
    DeviceNotFound {
        /// Requested device index
        index: u32,
    },

    /// Bitstream could not be read or programmed
    #[error("Failed to load bitstream {path}: {reason}")]
    BitstreamLoad {
        /// Bitstream path
        path: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Operation needs a programmed bitstream
    #[error("No bitstream loaded on device")]
    BitstreamNotLoaded,

    /// Kernel name not present in the loaded bitstream
    #[error("Kernel not found: {name}")]
    KernelNotFound {
        /// Kernel name that was looked up
        name: String,
    },

    /// I/O error during file or device communication
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// Data transfer failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// Access outside a buffer's capacity
    #[error("Access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfRange {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Buffer capacity
        capacity: usize,
    },

    /// Host or device allocation failed
    #[error("Failed to allocate {size} bytes: {reason}")]
    Allocation {
        /// Requested size in bytes
        size: usize,
        /// Reason for failure
        reason: String,
    },

    /// Benchmark or device configuration rejected
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// Error reported by the accelerator runtime
    #[error("Hardware error: {reason}")]
    HardwareError {
        /// Reason for failure
        reason: String,
    },
}

impl SsdError {
    /// Create a bitstream load error
    pub fn bitstream_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BitstreamLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a kernel not found error
    pub fn kernel_not_found(name: impl Into<String>) -> Self {
        Self::KernelNotFound { name: name.into() }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create an allocation error
    pub fn allocation(size: usize, reason: impl Into<String>) -> Self {
        Self::Allocation {
            size,
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a hardware error
    pub fn hardware_error(reason: impl Into<String>) -> Self {
        Self::HardwareError {
            reason: reason.into(),
        }
    }

    /// Check that `[offset, offset + len)` lies within `capacity`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` when the range overflows or exceeds the capacity.
    pub fn check_range(offset: usize, len: usize, capacity: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(Self::OutOfRange {
                offset,
                len,
                capacity,
            }),
        }
    }
}
