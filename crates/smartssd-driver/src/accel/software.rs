// SPDX-License-Identifier: AGPL-3.0-only

//! Software (emulated FPGA) backend
//!
//! Implements the accelerator traits with plain host memory so that every
//! benchmark phase can run without a SmartSSD:
//!
//! 1. **CI without hardware**: the harness, the endpoints and both
//!    programs are exercised end to end against this backend.
//! 2. **Reference behaviour**: buffer semantics follow the runtime's
//!    model, so a phase that is wrong here is wrong on hardware too.
//!
//! ## Memory model
//!
//! ```text
//! Normal    host shadow ──sync(ToDevice)──▶ device storage
//!           host shadow ◀─sync(FromDevice)─ device storage
//! P2p       map() == device storage (sync is a no-op)
//! HostOnly  map() == host storage   (sync is a no-op)
//! ```
//!
//! The emulated bitstream provides the two pass-through kernels the
//! benchmarks use, `bandwidth` and `read_bandwidth`. Both copy
//! `n_elements` 32-bit words from the input to the output buffer.

use super::{
    Accelerator, BackendType, BitstreamId, BufferKind, BufferObject, DeviceInfo, Kernel,
    MemoryGroup, SyncDirection,
};
use crate::error::{Result, SsdError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::{debug, info};

/// Number of emulated devices (indices `0..SOFTWARE_DEVICE_COUNT`)
pub const SOFTWARE_DEVICE_COUNT: u32 = 1;

/// Kernels present in every emulated bitstream
pub const SOFTWARE_KERNELS: &[&str] = &["bandwidth", "read_bandwidth"];

/// Emulated accelerator device
#[derive(Debug)]
pub struct SoftwareAccelerator {
    info: DeviceInfo,
    loaded: Option<BitstreamId>,
}

impl Accelerator for SoftwareAccelerator {
    type Buffer = SoftwareBuffer;
    type Kernel = SoftwareKernel;

    fn open(index: u32) -> Result<Self> {
        if index >= SOFTWARE_DEVICE_COUNT {
            return Err(SsdError::DeviceNotFound { index });
        }
        info!("Opened emulated accelerator {index}");
        Ok(Self {
            info: DeviceInfo {
                index,
                name: format!("smartssd_sw_emu_{index}"),
                backend: BackendType::Software,
            },
            loaded: None,
        })
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn load_bitstream(&mut self, path: &Path) -> Result<BitstreamId> {
        let image = std::fs::read(path).map_err(|e| SsdError::bitstream_load(path, e.to_string()))?;
        if image.is_empty() {
            return Err(SsdError::bitstream_load(path, "empty bitstream image"));
        }

        let id = image_id(&image);
        info!("Loaded bitstream {} ({} bytes) as {id}", path.display(), image.len());
        self.loaded = Some(id);
        Ok(id)
    }

    fn kernel(&self, bitstream: &BitstreamId, name: &str) -> Result<SoftwareKernel> {
        if self.loaded.as_ref() != Some(bitstream) {
            return Err(SsdError::BitstreamNotLoaded);
        }
        if !SOFTWARE_KERNELS.contains(&name) {
            return Err(SsdError::kernel_not_found(name));
        }
        Ok(SoftwareKernel {
            name: name.to_string(),
        })
    }

    fn alloc(&self, size: usize, kind: BufferKind, group: MemoryGroup) -> Result<SoftwareBuffer> {
        if size == 0 {
            return Err(SsdError::allocation(0, "zero-size buffer object"));
        }
        let storage = zeroed(size)?;
        let shadow = match kind {
            BufferKind::Normal => Some(zeroed(size)?),
            BufferKind::P2p | BufferKind::HostOnly => None,
        };
        debug!("Allocated {kind:?} buffer object: {size:#x} bytes in bank {}", group.0);
        Ok(SoftwareBuffer {
            kind,
            group,
            storage,
            shadow,
        })
    }
}

/// Emulated buffer object
#[derive(Debug)]
pub struct SoftwareBuffer {
    kind: BufferKind,
    group: MemoryGroup,
    /// Device memory (host memory for `HostOnly`)
    storage: Vec<u8>,
    /// Host shadow, `Normal` buffers only
    shadow: Option<Vec<u8>>,
}

impl SoftwareBuffer {
    /// Memory bank the buffer was allocated in
    pub const fn group(&self) -> MemoryGroup {
        self.group
    }

    /// Device-side contents, bypassing sync
    pub fn device_bytes(&self) -> &[u8] {
        &self.storage
    }

    fn host(&self) -> &[u8] {
        self.shadow.as_deref().unwrap_or(&self.storage)
    }

    fn host_mut(&mut self) -> &mut [u8] {
        match self.shadow.as_mut() {
            Some(shadow) => shadow,
            None => &mut self.storage,
        }
    }
}

impl BufferObject for SoftwareBuffer {
    fn size(&self) -> usize {
        self.storage.len()
    }

    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<()> {
        SsdError::check_range(offset, src.len(), self.size())?;
        self.host_mut()[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        SsdError::check_range(offset, dst.len(), self.size())?;
        dst.copy_from_slice(&self.host()[offset..offset + dst.len()]);
        Ok(())
    }

    fn sync(&mut self, direction: SyncDirection, len: usize, offset: usize) -> Result<()> {
        SsdError::check_range(offset, len, self.size())?;
        let Some(shadow) = self.shadow.as_mut() else {
            return Ok(());
        };
        let range = offset..offset + len;
        match direction {
            SyncDirection::ToDevice => self.storage[range.clone()].copy_from_slice(&shadow[range]),
            SyncDirection::FromDevice => shadow[range.clone()].copy_from_slice(&self.storage[range]),
        }
        Ok(())
    }

    fn map(&mut self) -> Result<&mut [u8]> {
        Ok(self.host_mut())
    }
}

/// Emulated pass-through kernel
#[derive(Debug)]
pub struct SoftwareKernel {
    name: String,
}

impl Kernel for SoftwareKernel {
    type Buffer = SoftwareBuffer;

    fn name(&self) -> &str {
        &self.name
    }

    fn group_id(&self, arg: u32) -> Result<MemoryGroup> {
        // args 0 and 1 are the buffers, arg 2 is the scalar element count
        match arg {
            0 | 1 => Ok(MemoryGroup(0)),
            _ => Err(SsdError::hardware_error(format!(
                "kernel {} has no buffer argument {arg}",
                self.name
            ))),
        }
    }

    fn run(&self, input: &SoftwareBuffer, output: &mut SoftwareBuffer, n_elements: u32) -> Result<()> {
        let bytes = n_elements as usize * 4;
        SsdError::check_range(0, bytes, input.size())?;
        SsdError::check_range(0, bytes, output.size())?;
        output.storage[..bytes].copy_from_slice(&input.storage[..bytes]);
        debug!("Kernel {} copied {bytes} bytes", self.name);
        Ok(())
    }
}

fn zeroed(size: usize) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|e| SsdError::allocation(size, e.to_string()))?;
    bytes.resize(size, 0);
    Ok(bytes)
}

fn image_id(image: &[u8]) -> BitstreamId {
    let mut id = [0u8; 16];
    for (seed, half) in id.chunks_exact_mut(8).enumerate() {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        image.hash(&mut hasher);
        half.copy_from_slice(&hasher.finish().to_le_bytes());
    }
    BitstreamId(id)
}
