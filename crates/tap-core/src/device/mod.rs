//! Device-facing traits: opening a TAP device, overlapped transfers, and the
//! downstream frame consumer.
//!
//! # Overlapped I/O model
//!
//! A transfer is issued against an [`AsyncOperation`] (a completion context
//! that owns the transfer buffer).  Issuing either completes immediately
//! ([`Submission::Completed`]) or leaves the transfer in flight
//! ([`Submission::Pending`]); an in-flight transfer is finished by a blocking
//! [`DeviceHandle::wait`].  [`DeviceHandle::cancel_all`] may be called from
//! any thread and makes every outstanding wait return
//! [`TransferError::Cancelled`].
//!
//! Because the operation owns its buffer, the buffer cannot be freed or
//! reused while the device is still writing into it: the borrow checker keeps
//! the operation exclusively borrowed by whoever issued it.
//!
//! The native implementation lives in the host application; tests use
//! [`simulated::SimulatedDevice`].

use std::io;

use thiserror::Error;

use crate::domain::device::{DeviceIdentifier, DriverVersion};

pub mod session;
pub mod simulated;

/// Error type for device control calls (version query, media status, setup).
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A device-control request failed.
    #[error("device control {request} failed: {source}")]
    Control {
        request: &'static str,
        #[source]
        source: io::Error,
    },
    /// A completion context could not be created.
    #[error("failed to create completion context: {0}")]
    Operation(#[source] io::Error),
    /// Cancelling outstanding operations failed.
    #[error("failed to cancel outstanding I/O: {0}")]
    Cancel(#[source] io::Error),
}

/// Error type for an individual read or write.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer was aborted by [`DeviceHandle::cancel_all`].
    #[error("operation cancelled")]
    Cancelled,
    /// Any other OS-level failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of issuing an overlapped transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The transfer finished synchronously, moving this many bytes.
    Completed(usize),
    /// The transfer is in flight; call [`DeviceHandle::wait`] to finish it.
    Pending,
}

/// A completion context for one direction of overlapped I/O.
pub trait AsyncOperation: Send + 'static {
    /// The transfer buffer.  For reads, the first `n` bytes are valid after a
    /// completion reporting `n`.
    fn buffer(&self) -> &[u8];

    /// `true` between a [`Submission::Pending`] issue and the matching wait.
    fn is_pending(&self) -> bool;
}

/// An open TAP device handle.
pub trait DeviceHandle: Send + Sync + 'static {
    /// The completion context type this device hands out.
    type Operation: AsyncOperation;

    /// Queries the driver version.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Control`] if the driver rejects the query.
    fn driver_version(&self) -> Result<DriverVersion, DeviceError>;

    /// Sets the virtual link's media status.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Control`] if the driver refuses the change.
    fn set_media_status(&self, connected: bool) -> Result<(), DeviceError>;

    /// Allocates a completion context with a `capacity`-byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Operation`] if the wait primitive cannot be
    /// created.
    fn new_operation(&self, capacity: usize) -> Result<Self::Operation, DeviceError>;

    /// Issues a read into `op`'s buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the read could not be queued.
    fn issue_read(&self, op: &mut Self::Operation) -> Result<Submission, TransferError>;

    /// Copies `frame` into `op`'s buffer and issues a write of it.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the write could not be queued.
    fn issue_write(&self, op: &mut Self::Operation, frame: &[u8])
        -> Result<Submission, TransferError>;

    /// Blocks until the transfer pending on `op` completes or is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Cancelled`] after [`cancel_all`](Self::cancel_all),
    /// or [`TransferError::Io`] if the transfer failed.
    fn wait(&self, op: &mut Self::Operation) -> Result<usize, TransferError>;

    /// Cancels every outstanding transfer on this handle, from any thread.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Cancel`] if the OS rejects the request.
    fn cancel_all(&self) -> Result<(), DeviceError>;
}

/// Opens devices by identifier.
pub trait DeviceOpener: Send + Sync {
    type Handle: DeviceHandle;

    /// Opens `id` for overlapped, duplex access.
    ///
    /// # Errors
    ///
    /// Returns [`session::SessionError::OpenFailed`] if the device cannot be
    /// opened.
    fn open(&self, id: &DeviceIdentifier) -> Result<Self::Handle, session::SessionError>;
}

/// Downstream consumer of adapter traffic.
///
/// Both callbacks run synchronously: `on_frame_received` on the read thread
/// (no further frame is read until it returns), `on_send_complete` on the
/// thread that called `send`.
pub trait FrameSink: Send + Sync {
    /// A frame arrived while receive was enabled.  `frame.len()` is the number
    /// of bytes the device transferred.
    fn on_frame_received(&self, frame: &[u8]);

    /// A frame was accepted by `send`.
    ///
    /// This marks a queued write, not a delivered frame.
    fn on_send_complete(&self) {}
}

impl<F> FrameSink for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn on_frame_received(&self, frame: &[u8]) {
        self(frame)
    }
}
