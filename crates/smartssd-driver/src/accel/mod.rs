//! FPGA accelerator abstraction
//!
//! The accelerator is driven through the vendor runtime's object model:
//! a device handle, a programmed bitstream, named kernels, and buffer
//! objects that are moved between host and device by explicit syncs.
//! These traits expose exactly that surface and nothing more.
//!
//! Two backends are available:
//! - **Software**: in-process emulation, no hardware required (CI, tests)
//! - **XRT**: the Xilinx runtime C API (`xrt` cargo feature)

pub mod software;
#[cfg(feature = "xrt")]
pub mod xrt;

use crate::error::Result;
use std::fmt::{self, Debug, Display};
use std::path::Path;

/// Accelerator device handle
///
/// Generic code takes `A: Accelerator`; the binaries pick the backend at
/// runtime from a [`BackendSelection`].
pub trait Accelerator: Debug + Sized {
    /// Buffer object type of this backend
    type Buffer: BufferObject;

    /// Kernel handle type of this backend
    type Kernel: Kernel<Buffer = Self::Buffer>;

    /// Acquire the device at `index`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no device exists at that index.
    fn open(index: u32) -> Result<Self>;

    /// Identification of the opened device
    fn info(&self) -> &DeviceInfo;

    /// Program the device with a bitstream file
    ///
    /// # Errors
    ///
    /// Returns `BitstreamLoad` if the file cannot be read or programmed.
    fn load_bitstream(&mut self, path: &Path) -> Result<BitstreamId>;

    /// Look up a kernel by name in a loaded bitstream
    ///
    /// # Errors
    ///
    /// Returns `BitstreamNotLoaded` or `KernelNotFound`.
    fn kernel(&self, bitstream: &BitstreamId, name: &str) -> Result<Self::Kernel>;

    /// Allocate a buffer object of `size` bytes in memory bank `group`
    ///
    /// # Errors
    ///
    /// Returns an allocation error if the runtime refuses the request.
    fn alloc(&self, size: usize, kind: BufferKind, group: MemoryGroup) -> Result<Self::Buffer>;
}

/// Runtime-managed memory region
pub trait BufferObject: Debug + Send {
    /// Size in bytes
    fn size(&self) -> usize;

    /// Allocation kind
    fn kind(&self) -> BufferKind;

    /// Copy `src` into the host side of the buffer at `offset`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` or a runtime transfer error.
    fn write(&mut self, src: &[u8], offset: usize) -> Result<()>;

    /// Copy from the host side of the buffer at `offset` into `dst`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` or a runtime transfer error.
    fn read(&self, dst: &mut [u8], offset: usize) -> Result<()>;

    /// Synchronise `len` bytes at `offset` between host and device
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` or a runtime transfer error.
    fn sync(&mut self, direction: SyncDirection, len: usize, offset: usize) -> Result<()>;

    /// Host mapping of the buffer
    ///
    /// For P2P buffers this is device memory exposed on the PCIe BAR, so
    /// an SSD transfer into it lands on the FPGA without touching host RAM.
    ///
    /// # Errors
    ///
    /// Returns a hardware error if the runtime cannot map the buffer.
    fn map(&mut self) -> Result<&mut [u8]>;
}

/// Compute kernel in a loaded bitstream
pub trait Kernel: Debug {
    /// Buffer object type accepted as arguments
    type Buffer: BufferObject;

    /// Kernel name
    fn name(&self) -> &str;

    /// Memory bank connected to argument `arg`
    ///
    /// # Errors
    ///
    /// Returns a hardware error if the argument does not exist.
    fn group_id(&self, arg: u32) -> Result<MemoryGroup>;

    /// Launch `kernel(input, output, n_elements)` and wait for completion
    ///
    /// # Errors
    ///
    /// Returns a hardware error if the launch fails or the run does not
    /// complete successfully.
    fn run(&self, input: &Self::Buffer, output: &mut Self::Buffer, n_elements: u32) -> Result<()>;
}

/// Buffer object allocation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Device memory with a host shadow, moved by sync
    Normal,
    /// Device memory exposed for peer-to-peer DMA
    P2p,
    /// Host memory visible to the device
    HostOnly,
}

/// Direction of a buffer object sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Host shadow → device memory
    ToDevice,
    /// Device memory → host shadow
    FromDevice,
}

/// Memory bank index a kernel argument is connected to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryGroup(pub u32);

/// Identifier of a programmed bitstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitstreamId(pub [u8; 16]);

impl Display for BitstreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Identification of an opened accelerator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device index
    pub index: u32,
    /// Device or platform name
    pub name: String,
    /// Backend driving the device
    pub backend: BackendType,
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// In-process emulation
    Software,
    /// Xilinx runtime
    Xrt,
}

impl Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => write!(f, "Software (emulated FPGA)"),
            Self::Xrt => write!(f, "XRT"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// XRT when compiled in, otherwise software
    #[default]
    Auto,
    /// Force the software emulation
    Software,
    /// Force the Xilinx runtime
    Xrt,
}

impl BackendSelection {
    /// Backend this selection resolves to in the current build
    ///
    /// # Errors
    ///
    /// Returns an invalid configuration error when `Xrt` is requested but
    /// the crate was built without the `xrt` feature.
    pub fn resolve(self) -> Result<BackendType> {
        match self {
            Self::Software => Ok(BackendType::Software),
            Self::Auto if cfg!(feature = "xrt") => Ok(BackendType::Xrt),
            Self::Auto => Ok(BackendType::Software),
            Self::Xrt if cfg!(feature = "xrt") => Ok(BackendType::Xrt),
            Self::Xrt => Err(crate::SsdError::invalid_config(
                "XRT backend requested but smartssd-driver was built without the `xrt` feature",
            )),
        }
    }
}
