//! TAP-Windows device: overlapped file I/O on the adapter's device file.
//!
//! # Ownership of in-flight transfers
//!
//! While a transfer is pending the kernel holds raw pointers to the
//! operation's `OVERLAPPED` block and its buffer.  Both are boxed inside
//! [`WindowsOperation`], so their addresses never change when the operation
//! moves, and an operation that is dropped while still pending first cancels
//! its transfer and waits for the kernel to release them.  The device file
//! itself is reference-counted and shared with every operation, so it stays
//! open until the last operation is gone.
//!
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::sync::Arc;

use tap_core::device::session::SessionError;
use tap_core::{
    AsyncOperation, DeviceError, DeviceHandle, DeviceIdentifier, DeviceOpener, DriverVersion,
    Submission, TransferError,
};
use tracing::{debug, warn};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_IO_PENDING, ERROR_NOT_FOUND, ERROR_OPERATION_ABORTED, GENERIC_READ,
    GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadFile, WriteFile, FILE_ATTRIBUTE_SYSTEM, FILE_FLAG_OVERLAPPED,
    FILE_SHARE_MODE, OPEN_EXISTING,
};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent};
use windows::Win32::System::IO::{CancelIoEx, DeviceIoControl, GetOverlappedResult, OVERLAPPED};

use super::{device_path, TAP_IOCTL_GET_VERSION, TAP_IOCTL_SET_MEDIA_STATUS};

// ── Handles ───────────────────────────────────────────────────────────────────

/// Kernel object handle closed on drop.
#[derive(Debug)]
struct OwnedHandle(HANDLE);

// SAFETY: a kernel handle is a process-wide value; every API used on it here
// is safe to call from any thread.
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        // SAFETY: `self.0` was returned by `CreateFileW`/`CreateEventW` and is
        // closed exactly once.
        if let Err(e) = unsafe { CloseHandle(self.0) } {
            warn!("failed to close handle: {e}");
        }
    }
}

fn is_code(e: &windows::core::Error, code: windows::Win32::Foundation::WIN32_ERROR) -> bool {
    e.code() == code.to_hresult()
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

// ── Opener ────────────────────────────────────────────────────────────────────

/// Opens TAP-Windows adapters by instance GUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsOpener;

impl WindowsOpener {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceOpener for WindowsOpener {
    type Handle = TapDevice;

    fn open(&self, id: &DeviceIdentifier) -> Result<TapDevice, SessionError> {
        let path = device_path(id);
        let wide = to_wide(&path);
        // SAFETY: `wide` is NUL-terminated and outlives the call.  Exclusive
        // (share mode 0) overlapped duplex access, as the driver expects.
        let handle = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                (GENERIC_READ | GENERIC_WRITE).0,
                FILE_SHARE_MODE(0),
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_SYSTEM | FILE_FLAG_OVERLAPPED,
                None,
            )
        }
        .map_err(|e| SessionError::OpenFailed {
            id: id.clone(),
            source: e.into(),
        })?;

        debug!("opened {path}");
        Ok(TapDevice {
            file: Arc::new(OwnedHandle(handle)),
        })
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// An open TAP-Windows device file.
#[derive(Debug)]
pub struct TapDevice {
    file: Arc<OwnedHandle>,
}

impl TapDevice {
    fn raw(&self) -> HANDLE {
        self.file.0
    }

    /// Issues a buffered control request with `buffer` as both input and
    /// output.
    fn control(
        &self,
        request: &'static str,
        code: u32,
        buffer: &mut [u32],
    ) -> Result<(), DeviceError> {
        let size = std::mem::size_of_val(buffer) as u32;
        let mut returned = 0u32;
        // SAFETY: `buffer` is valid for `size` bytes in both directions for
        // the duration of this synchronous call.
        unsafe {
            DeviceIoControl(
                self.raw(),
                code,
                Some(buffer.as_ptr().cast()),
                size,
                Some(buffer.as_mut_ptr().cast()),
                size,
                Some(&mut returned),
                None,
            )
        }
        .map_err(|e| DeviceError::Control {
            request,
            source: e.into(),
        })
    }

    /// Turns the result of `ReadFile`/`WriteFile` into a [`Submission`].
    fn submitted(
        &self,
        op: &mut WindowsOperation,
        issued: windows::core::Result<()>,
    ) -> Result<Submission, TransferError> {
        match issued {
            Ok(()) => {
                let mut transferred = 0u32;
                // SAFETY: the transfer has completed; this only reads its byte
                // count from the operation's OVERLAPPED block.
                unsafe { GetOverlappedResult(self.raw(), &*op.overlapped, &mut transferred, false) }
                    .map_err(|e| TransferError::Io(e.into()))?;
                // SAFETY: `op.event` is a live event handle owned by `op`.
                if let Err(e) = unsafe { ResetEvent(op.event.0) } {
                    warn!("failed to reset completion event: {e}");
                }
                Ok(Submission::Completed(transferred as usize))
            }
            Err(e) if is_code(&e, ERROR_IO_PENDING) => {
                op.pending = true;
                Ok(Submission::Pending)
            }
            Err(e) if is_code(&e, ERROR_OPERATION_ABORTED) => Err(TransferError::Cancelled),
            Err(e) => Err(TransferError::Io(e.into())),
        }
    }
}

impl DeviceHandle for TapDevice {
    type Operation = WindowsOperation;

    fn driver_version(&self) -> Result<DriverVersion, DeviceError> {
        let mut info = [0u32; 3];
        self.control("GET_VERSION", TAP_IOCTL_GET_VERSION, &mut info)?;
        Ok(DriverVersion {
            major: info[0],
            minor: info[1],
            debug: info[2] != 0,
        })
    }

    fn set_media_status(&self, connected: bool) -> Result<(), DeviceError> {
        let mut status = [u32::from(connected)];
        self.control("SET_MEDIA_STATUS", TAP_IOCTL_SET_MEDIA_STATUS, &mut status)?;
        Ok(())
    }

    fn new_operation(&self, capacity: usize) -> Result<WindowsOperation, DeviceError> {
        // Manual-reset, initially non-signalled.
        // SAFETY: no security attributes and no name; the returned handle is
        // owned by the operation.
        let event = unsafe { CreateEventW(None, true, false, PCWSTR::null()) }
            .map_err(|e| DeviceError::Operation(e.into()))?;
        let event = OwnedHandle(event);

        let overlapped = Box::new(OVERLAPPED {
            hEvent: event.0,
            ..Default::default()
        });
        Ok(WindowsOperation {
            overlapped,
            buffer: vec![0u8; capacity].into_boxed_slice(),
            pending: false,
            event,
            file: Arc::clone(&self.file),
        })
    }

    fn issue_read(&self, op: &mut WindowsOperation) -> Result<Submission, TransferError> {
        op.rearm();
        // SAFETY: the buffer and OVERLAPPED block are boxed inside `op` and
        // stay put until the transfer completes or `op`'s Drop has waited it
        // out.
        let issued = unsafe {
            ReadFile(
                self.raw(),
                Some(&mut op.buffer[..]),
                None,
                Some(&mut *op.overlapped),
            )
        };
        self.submitted(op, issued)
    }

    fn issue_write(
        &self,
        op: &mut WindowsOperation,
        frame: &[u8],
    ) -> Result<Submission, TransferError> {
        let len = frame.len().min(op.buffer.len());
        op.buffer[..len].copy_from_slice(&frame[..len]);
        op.rearm();
        // SAFETY: as for `issue_read`; the kernel only reads `buffer[..len]`.
        let issued = unsafe {
            WriteFile(
                self.raw(),
                Some(&op.buffer[..len]),
                None,
                Some(&mut *op.overlapped),
            )
        };
        self.submitted(op, issued)
    }

    fn wait(&self, op: &mut WindowsOperation) -> Result<usize, TransferError> {
        if !op.pending {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no transfer in flight").into());
        }
        let mut transferred = 0u32;
        // SAFETY: `op.overlapped` belongs to the transfer in flight on this
        // handle; waiting keeps it alive until the kernel is done with it.
        let result =
            unsafe { GetOverlappedResult(self.raw(), &*op.overlapped, &mut transferred, true) };
        op.pending = false;
        match result {
            Ok(()) => Ok(transferred as usize),
            Err(e) if is_code(&e, ERROR_OPERATION_ABORTED) => Err(TransferError::Cancelled),
            Err(e) => Err(TransferError::Io(e.into())),
        }
    }

    fn cancel_all(&self) -> Result<(), DeviceError> {
        // SAFETY: cancels every transfer issued on this handle by any thread.
        match unsafe { CancelIoEx(self.raw(), None) } {
            Ok(()) => Ok(()),
            // Nothing was in flight.
            Err(e) if is_code(&e, ERROR_NOT_FOUND) => Ok(()),
            Err(e) => Err(DeviceError::Cancel(e.into())),
        }
    }
}

// ── Operation ─────────────────────────────────────────────────────────────────

/// Completion context: an `OVERLAPPED` block, its manual-reset event, and the
/// transfer buffer.
pub struct WindowsOperation {
    overlapped: Box<OVERLAPPED>,
    buffer: Box<[u8]>,
    pending: bool,
    event: OwnedHandle,
    file: Arc<OwnedHandle>,
}

// SAFETY: the raw pointers inside OVERLAPPED refer only to kernel state owned
// by this operation.  The operation is used by one thread at a time (it is
// borrowed mutably for every transfer).
unsafe impl Send for WindowsOperation {}

impl WindowsOperation {
    /// Clears the OVERLAPPED block for a new transfer, keeping its event.
    fn rearm(&mut self) {
        *self.overlapped = OVERLAPPED {
            hEvent: self.event.0,
            ..Default::default()
        };
    }
}

impl AsyncOperation for WindowsOperation {
    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn is_pending(&self) -> bool {
        self.pending
    }
}

impl Drop for WindowsOperation {
    fn drop(&mut self) {
        if !self.pending {
            return;
        }
        let mut transferred = 0u32;
        // SAFETY: cancels only this operation's transfer, then blocks until the
        // kernel has released the OVERLAPPED block and buffer.
        unsafe {
            let _ = CancelIoEx(self.file.0, Some(&*self.overlapped));
            let _ = GetOverlappedResult(self.file.0, &*self.overlapped, &mut transferred, true);
        }
    }
}
