//! Xilinx runtime (XRT) backend
//!
//! Thin binding over the XRT C API in `libxrt_coreutil`. Every handle is
//! owned by exactly one Rust value and released in `Drop`.
//!
//! # Requirements
//!
//! 1. XRT installed (`/opt/xilinx/xrt`) and `setup.sh` sourced so the
//!    linker finds `libxrt_coreutil.so`
//! 2. SmartSSD platform shell flashed and the device visible in `xbutil examine`
//! 3. P2P BAR enabled (`xbutil configure --p2p enable`) for `BufferKind::P2p`

// FFI casts are intentional - the C API takes int/size_t/unsigned
#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use super::{
    Accelerator, BackendType, BitstreamId, BufferKind, BufferObject, DeviceInfo, Kernel,
    MemoryGroup, SyncDirection,
};
use crate::error::{Result, SsdError};
use std::ffi::{c_int, c_uint, c_void, CString};
use std::path::Path;
use std::ptr::NonNull;

mod ffi {
    use std::ffi::{c_char, c_int, c_uint, c_void};

    pub type XrtDeviceHandle = *mut c_void;
    pub type XrtKernelHandle = *mut c_void;
    pub type XrtRunHandle = *mut c_void;
    pub type XrtBufferHandle = *mut c_void;

    pub const XRT_BO_FLAGS_NONE: u32 = 0;
    pub const XRT_BO_FLAGS_HOST_ONLY: u32 = 1 << 29;
    pub const XRT_BO_FLAGS_P2P: u32 = 1 << 30;

    pub const XCL_BO_SYNC_BO_TO_DEVICE: c_int = 0;
    pub const XCL_BO_SYNC_BO_FROM_DEVICE: c_int = 1;

    pub const ERT_CMD_STATE_COMPLETED: c_int = 4;

    #[link(name = "xrt_coreutil")]
    extern "C" {
        pub fn xrtDeviceOpen(index: c_uint) -> XrtDeviceHandle;
        pub fn xrtDeviceClose(dhdl: XrtDeviceHandle) -> c_int;
        pub fn xrtDeviceLoadXclbinFile(dhdl: XrtDeviceHandle, xclbin_fnm: *const c_char) -> c_int;
        pub fn xrtDeviceGetXclbinUUID(dhdl: XrtDeviceHandle, out: *mut u8) -> c_int;

        pub fn xrtPLKernelOpen(
            dhdl: XrtDeviceHandle,
            xclbin_uuid: *const u8,
            name: *const c_char,
        ) -> XrtKernelHandle;
        pub fn xrtKernelClose(khdl: XrtKernelHandle) -> c_int;
        pub fn xrtKernelArgGroupId(khdl: XrtKernelHandle, argno: c_int) -> c_int;
        pub fn xrtKernelRun(khdl: XrtKernelHandle, ...) -> XrtRunHandle;
        pub fn xrtRunWait(rhdl: XrtRunHandle) -> c_int;
        pub fn xrtRunClose(rhdl: XrtRunHandle) -> c_int;

        pub fn xrtBOAlloc(
            dhdl: XrtDeviceHandle,
            size: usize,
            flags: u32,
            grp: u32,
        ) -> XrtBufferHandle;
        pub fn xrtBOFree(bhdl: XrtBufferHandle) -> c_int;
        pub fn xrtBOMap(bhdl: XrtBufferHandle) -> *mut c_void;
        pub fn xrtBOSync(bhdl: XrtBufferHandle, dir: c_int, size: usize, offset: usize) -> c_int;
        pub fn xrtBOWrite(bhdl: XrtBufferHandle, src: *const c_void, size: usize, seek: usize)
            -> c_int;
        pub fn xrtBORead(bhdl: XrtBufferHandle, dst: *mut c_void, size: usize, skip: usize)
            -> c_int;
    }
}

fn check(ret: c_int, what: &str) -> Result<()> {
    if ret == 0 {
        Ok(())
    } else {
        Err(SsdError::hardware_error(format!(
            "{what} failed: {} (ret={ret})",
            std::io::Error::last_os_error()
        )))
    }
}

/// XRT device handle
#[derive(Debug)]
pub struct XrtDevice {
    handle: NonNull<c_void>,
    info: DeviceInfo,
    loaded: Option<BitstreamId>,
}

impl Accelerator for XrtDevice {
    type Buffer = XrtBuffer;
    type Kernel = XrtKernel;

    fn open(index: u32) -> Result<Self> {
        // SAFETY: plain FFI call; a null return means no device at this index.
        let raw = unsafe { ffi::xrtDeviceOpen(index as c_uint) };
        let handle = NonNull::new(raw).ok_or(SsdError::DeviceNotFound { index })?;
        tracing::info!("Opened XRT device {index}");
        Ok(Self {
            handle,
            info: DeviceInfo {
                index,
                name: format!("xrt device {index}"),
                backend: BackendType::Xrt,
            },
            loaded: None,
        })
    }

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn load_bitstream(&mut self, path: &Path) -> Result<BitstreamId> {
        let c_path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|e| SsdError::bitstream_load(path, e.to_string()))?;

        // SAFETY: handle is a live device handle; c_path is NUL-terminated and
        // outlives the call.
        let ret = unsafe { ffi::xrtDeviceLoadXclbinFile(self.handle.as_ptr(), c_path.as_ptr()) };
        if ret != 0 {
            return Err(SsdError::bitstream_load(
                path,
                format!("xrtDeviceLoadXclbinFile returned {ret}"),
            ));
        }

        let mut uuid = [0u8; 16];
        // SAFETY: uuid is a 16-byte writable buffer, the size of xuid_t.
        let ret = unsafe { ffi::xrtDeviceGetXclbinUUID(self.handle.as_ptr(), uuid.as_mut_ptr()) };
        check(ret, "xrtDeviceGetXclbinUUID")?;

        let id = BitstreamId(uuid);
        tracing::info!("Loaded bitstream {} as {id}", path.display());
        self.loaded = Some(id);
        Ok(id)
    }

    fn kernel(&self, bitstream: &BitstreamId, name: &str) -> Result<XrtKernel> {
        if self.loaded.as_ref() != Some(bitstream) {
            return Err(SsdError::BitstreamNotLoaded);
        }
        let c_name = CString::new(name).map_err(|_| SsdError::kernel_not_found(name))?;

        // SAFETY: handle is live; uuid points at 16 bytes; c_name is NUL-terminated.
        let raw = unsafe {
            ffi::xrtPLKernelOpen(self.handle.as_ptr(), bitstream.0.as_ptr(), c_name.as_ptr())
        };
        let handle = NonNull::new(raw).ok_or_else(|| SsdError::kernel_not_found(name))?;
        Ok(XrtKernel {
            handle,
            name: name.to_string(),
        })
    }

    fn alloc(&self, size: usize, kind: BufferKind, group: MemoryGroup) -> Result<XrtBuffer> {
        let flags = match kind {
            BufferKind::Normal => ffi::XRT_BO_FLAGS_NONE,
            BufferKind::P2p => ffi::XRT_BO_FLAGS_P2P,
            BufferKind::HostOnly => ffi::XRT_BO_FLAGS_HOST_ONLY,
        };

        // SAFETY: handle is a live device handle.
        let raw = unsafe { ffi::xrtBOAlloc(self.handle.as_ptr(), size, flags, group.0) };
        let handle = NonNull::new(raw)
            .ok_or_else(|| SsdError::allocation(size, format!("xrtBOAlloc({kind:?}) failed")))?;

        tracing::debug!("Allocated {kind:?} buffer object: {size:#x} bytes in bank {}", group.0);
        Ok(XrtBuffer {
            handle,
            size,
            kind,
            mapped: None,
        })
    }
}

impl Drop for XrtDevice {
    fn drop(&mut self) {
        // SAFETY: handle came from xrtDeviceOpen and is closed exactly once.
        unsafe {
            ffi::xrtDeviceClose(self.handle.as_ptr());
        }
        tracing::info!("Closed XRT device {}", self.info.index);
    }
}

/// XRT buffer object
#[derive(Debug)]
pub struct XrtBuffer {
    handle: NonNull<c_void>,
    size: usize,
    kind: BufferKind,
    mapped: Option<NonNull<u8>>,
}

impl BufferObject for XrtBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<()> {
        SsdError::check_range(offset, src.len(), self.size)?;
        // SAFETY: handle is live; src is valid for src.len() bytes; range checked above.
        let ret = unsafe {
            ffi::xrtBOWrite(self.handle.as_ptr(), src.as_ptr().cast(), src.len(), offset)
        };
        check(ret, "xrtBOWrite")
    }

    fn read(&self, dst: &mut [u8], offset: usize) -> Result<()> {
        SsdError::check_range(offset, dst.len(), self.size)?;
        // SAFETY: handle is live; dst is writable for dst.len() bytes; range checked above.
        let ret = unsafe {
            ffi::xrtBORead(self.handle.as_ptr(), dst.as_mut_ptr().cast(), dst.len(), offset)
        };
        check(ret, "xrtBORead")
    }

    fn sync(&mut self, direction: SyncDirection, len: usize, offset: usize) -> Result<()> {
        SsdError::check_range(offset, len, self.size)?;
        let dir = match direction {
            SyncDirection::ToDevice => ffi::XCL_BO_SYNC_BO_TO_DEVICE,
            SyncDirection::FromDevice => ffi::XCL_BO_SYNC_BO_FROM_DEVICE,
        };
        // SAFETY: handle is live; range checked above.
        let ret = unsafe { ffi::xrtBOSync(self.handle.as_ptr(), dir, len, offset) };
        check(ret, "xrtBOSync")
    }

    fn map(&mut self) -> Result<&mut [u8]> {
        let ptr = match self.mapped {
            Some(ptr) => ptr,
            None => {
                // SAFETY: handle is live; the mapping stays valid until xrtBOFree.
                let raw = unsafe { ffi::xrtBOMap(self.handle.as_ptr()) };
                let ptr = NonNull::new(raw.cast::<u8>())
                    .ok_or_else(|| SsdError::hardware_error("xrtBOMap returned null"))?;
                self.mapped = Some(ptr);
                ptr
            }
        };
        // SAFETY: the mapping covers size bytes and lives as long as the buffer
        // object; &mut self gives exclusive access.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.size) })
    }
}

impl Drop for XrtBuffer {
    fn drop(&mut self) {
        // SAFETY: handle came from xrtBOAlloc and is freed exactly once; any
        // mapping handed out borrowed &mut self and has ended.
        unsafe {
            ffi::xrtBOFree(self.handle.as_ptr());
        }
    }
}

// SAFETY: the runtime's buffer handles are not tied to the allocating thread.
unsafe impl Send for XrtBuffer {}

/// XRT kernel handle
#[derive(Debug)]
pub struct XrtKernel {
    handle: NonNull<c_void>,
    name: String,
}

impl Kernel for XrtKernel {
    type Buffer = XrtBuffer;

    fn name(&self) -> &str {
        &self.name
    }

    fn group_id(&self, arg: u32) -> Result<MemoryGroup> {
        // SAFETY: handle is a live kernel handle.
        let group = unsafe { ffi::xrtKernelArgGroupId(self.handle.as_ptr(), arg as c_int) };
        u32::try_from(group).map(MemoryGroup).map_err(|_| {
            SsdError::hardware_error(format!("kernel {} has no buffer argument {arg}", self.name))
        })
    }

    fn run(&self, input: &XrtBuffer, output: &mut XrtBuffer, n_elements: u32) -> Result<()> {
        // SAFETY: kernel and buffer handles are live; the argument list matches
        // the kernel signature (int*, int*, const int).
        let run = unsafe {
            ffi::xrtKernelRun(
                self.handle.as_ptr(),
                input.handle.as_ptr(),
                output.handle.as_ptr(),
                n_elements as c_int,
            )
        };
        let run = NonNull::new(run)
            .ok_or_else(|| SsdError::hardware_error(format!("xrtKernelRun({}) failed", self.name)))?;

        // SAFETY: run is a live run handle, closed exactly once below.
        let state = unsafe { ffi::xrtRunWait(run.as_ptr()) };
        // SAFETY: as above.
        unsafe {
            ffi::xrtRunClose(run.as_ptr());
        }

        if state == ffi::ERT_CMD_STATE_COMPLETED {
            Ok(())
        } else {
            Err(SsdError::hardware_error(format!(
                "kernel {} finished in state {state}",
                self.name
            )))
        }
    }
}

impl Drop for XrtKernel {
    fn drop(&mut self) {
        // SAFETY: handle came from xrtPLKernelOpen and is closed exactly once.
        unsafe {
            ffi::xrtKernelClose(self.handle.as_ptr());
        }
    }
}
