//! Host-side access to a SmartSSD: NVMe direct I/O plus the FPGA behind it.
//!
//! The crate covers the three things a transfer benchmark needs:
//!
//! - page-aligned host buffers ([`AlignedBuffer`])
//! - positioned direct I/O on the SSD ([`DirectFile`])
//! - the accelerator's runtime object model ([`Accelerator`],
//!   [`BufferObject`], [`Kernel`])
//!
//! # Backend hierarchy
//!
//! ```text
//! Hardware (cargo feature `xrt`):
//!   XrtDevice          - Xilinx runtime C API, P2P buffer objects
//!
//! Development / CI:
//!   SoftwareAccelerator - host-memory emulation, no device required
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use smartssd_driver::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<()> {
//! let mut dev = SoftwareAccelerator::open(0)?;
//! let id = dev.load_bitstream(Path::new("bandwidth.xclbin"))?;
//! let krnl = dev.kernel(&id, "bandwidth")?;
//! let mut p2p = dev.alloc(1 << 20, BufferKind::P2p, krnl.group_id(0)?)?;
//!
//! let ssd = DirectFile::open("/dev/nvme0n1", DirectOptions::default())?;
//! ssd.read_at(p2p.map()?, 0)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod accel;
mod buffer;
mod direct_io;
mod error;

pub use accel::software::{SoftwareAccelerator, SoftwareBuffer, SoftwareKernel};
#[cfg(feature = "xrt")]
pub use accel::xrt::{XrtBuffer, XrtDevice, XrtKernel};
pub use accel::{
    Accelerator, BackendSelection, BackendType, BitstreamId, BufferKind, BufferObject, DeviceInfo,
    Kernel, MemoryGroup, SyncDirection,
};
pub use buffer::{AlignedBuffer, Pattern, PAGE_SIZE};
pub use direct_io::{
    is_direct_aligned, sync_all_filesystems, DirectFile, DirectOptions, DIRECT_IO_ALIGN,
};
pub use error::{Result, SsdError};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Accelerator, AlignedBuffer, BitstreamId, BufferKind, BufferObject, DirectFile,
        DirectOptions, Kernel, MemoryGroup, Pattern, Result, SoftwareAccelerator, SsdError,
        SyncDirection,
    };
}
