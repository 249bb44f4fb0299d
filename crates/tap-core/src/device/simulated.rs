//! Simulated TAP device for tests and driverless hosts.
//!
//! [`SimulatedDevice`] models the overlapped semantics of a real TAP driver:
//!
//! - A read completes immediately if an inbound frame is already queued,
//!   otherwise it stays pending until [`SimulatedDevice::push_frame`] (or an
//!   injected error / spurious cancellation) arrives.
//! - A write completes immediately, stays pending until
//!   [`SimulatedDevice::complete_write`], or fails to queue, depending on the
//!   configured [`WriteMode`].
//! - [`DeviceHandle::cancel_all`] aborts every transfer that was pending when
//!   it was called, exactly like cancelling all I/O on a file handle.
//!
//! Every interaction is recorded as a [`DeviceEvent`] so tests can assert on
//! ordering.  The device is cheap to clone; clones share state, so a test
//! keeps one clone for inspection and hands another to the adapter.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::session::SessionError;
use super::{
    AsyncOperation, DeviceError, DeviceHandle, DeviceOpener, Submission, TransferError,
};
use crate::domain::device::{DeviceIdentifier, DriverVersion};

/// How the simulated device treats writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Writes complete synchronously.
    Immediate,
    /// Writes stay pending until [`SimulatedDevice::complete_write`].
    Pending,
    /// Writes fail to queue.
    Reject,
}

/// A recorded device interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    MediaStatus(bool),
    ReadIssued,
    WriteIssued(usize),
    WriteRejected(usize),
    /// A pending write's completion was observed by a wait.
    WriteCompleted(usize),
    CancelAll,
}

enum Inbound {
    Frame(Vec<u8>),
    Error(io::ErrorKind),
    SpuriousCancel,
}

struct State {
    version: DriverVersion,
    version_query_fails: bool,
    media_accepts: bool,
    media_connected: bool,
    operation_fails: bool,
    write_mode: WriteMode,
    inbound: VecDeque<Inbound>,
    write_completions: usize,
    cancel_epoch: u64,
    reads_issued: usize,
    written: Vec<Vec<u8>>,
    events: Vec<DeviceEvent>,
}

struct Inner {
    state: Mutex<State>,
    changed: Condvar,
    open_handles: AtomicUsize,
    live_operations: AtomicUsize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared, scriptable stand-in for a TAP device.
#[derive(Clone)]
pub struct SimulatedDevice {
    inner: Arc<Inner>,
}

impl SimulatedDevice {
    /// Creates a device reporting version 9.21 that accepts media status and
    /// completes writes immediately.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    version: DriverVersion::new(9, 21),
                    version_query_fails: false,
                    media_accepts: true,
                    media_connected: false,
                    operation_fails: false,
                    write_mode: WriteMode::Immediate,
                    inbound: VecDeque::new(),
                    write_completions: 0,
                    cancel_epoch: 0,
                    reads_issued: 0,
                    written: Vec::new(),
                    events: Vec::new(),
                }),
                changed: Condvar::new(),
                open_handles: AtomicUsize::new(0),
                live_operations: AtomicUsize::new(0),
            }),
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    /// Sets the driver version the device reports.
    pub fn with_version(self, version: DriverVersion) -> Self {
        self.inner.lock().version = version;
        self
    }

    /// Makes the version query fail.
    pub fn failing_version_query(self) -> Self {
        self.inner.lock().version_query_fails = true;
        self
    }

    /// Makes the device refuse the "connected" media status.
    pub fn rejecting_media_status(self) -> Self {
        self.inner.lock().media_accepts = false;
        self
    }

    /// Makes completion-context allocation fail.
    pub fn failing_operations(self) -> Self {
        self.inner.lock().operation_fails = true;
        self
    }

    /// Sets how writes are handled.
    pub fn with_write_mode(self, mode: WriteMode) -> Self {
        self.set_write_mode(mode);
        self
    }

    /// Changes how subsequent writes are handled.
    pub fn set_write_mode(&self, mode: WriteMode) {
        self.inner.lock().write_mode = mode;
    }

    /// Returns a handle on this device, as if it had been opened.
    pub fn handle(&self) -> SimulatedHandle {
        self.inner.open_handles.fetch_add(1, Ordering::SeqCst);
        SimulatedHandle {
            device: self.clone(),
        }
    }

    // ── Scripting ─────────────────────────────────────────────────────────────

    /// Queues an inbound frame for the next read.
    pub fn push_frame(&self, frame: impl Into<Vec<u8>>) {
        self.push(Inbound::Frame(frame.into()));
    }

    /// Makes the next read fail with `kind`.
    pub fn push_read_error(&self, kind: io::ErrorKind) {
        self.push(Inbound::Error(kind));
    }

    /// Aborts the next read as cancelled, without any shutdown being requested.
    pub fn push_spurious_cancel(&self) {
        self.push(Inbound::SpuriousCancel);
    }

    /// Completes one pending write.
    pub fn complete_write(&self) {
        self.inner.lock().write_completions += 1;
        self.inner.changed.notify_all();
    }

    fn push(&self, item: Inbound) {
        self.inner.lock().inbound.push_back(item);
        self.inner.changed.notify_all();
    }

    // ── Inspection ────────────────────────────────────────────────────────────

    /// `true` once the media status has been set to connected.
    pub fn media_connected(&self) -> bool {
        self.inner.lock().media_connected
    }

    /// Number of reads issued so far.
    pub fn reads_issued(&self) -> usize {
        self.inner.lock().reads_issued
    }

    /// Every frame the device accepted for writing, in issue order.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.inner.lock().written.clone()
    }

    /// Inbound items not yet consumed by a read.
    pub fn pending_inbound(&self) -> usize {
        self.inner.lock().inbound.len()
    }

    /// Full interaction log.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.inner.lock().events.clone()
    }

    /// Handles currently open on this device.
    pub fn open_handles(&self) -> usize {
        self.inner.open_handles.load(Ordering::SeqCst)
    }

    /// Completion contexts currently allocated on this device.
    pub fn live_operations(&self) -> usize {
        self.inner.live_operations.load(Ordering::SeqCst)
    }

    /// Blocks until at least `count` reads have been issued.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub fn wait_for_reads_issued(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.reads_issued >= count)
    }

    /// Blocks until at least `count` writes have been accepted.
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.written.len() >= count)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&State) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.lock();
        while !done(&state) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .inner
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// An open handle on a [`SimulatedDevice`].  Dropping it closes the handle.
pub struct SimulatedHandle {
    device: SimulatedDevice,
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        self.device.inner.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Read,
    Write(usize),
}

/// Completion context handed out by [`SimulatedHandle`].
pub struct SimulatedOperation {
    buffer: Vec<u8>,
    in_flight: Option<InFlight>,
    epoch: u64,
    inner: Arc<Inner>,
}

impl Drop for SimulatedOperation {
    fn drop(&mut self) {
        self.inner.live_operations.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncOperation for SimulatedOperation {
    fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }
}

impl SimulatedOperation {
    fn fill(&mut self, frame: &[u8]) -> usize {
        let len = frame.len().min(self.buffer.len());
        self.buffer[..len].copy_from_slice(&frame[..len]);
        len
    }
}

impl DeviceHandle for SimulatedHandle {
    type Operation = SimulatedOperation;

    fn driver_version(&self) -> Result<DriverVersion, DeviceError> {
        let state = self.device.inner.lock();
        if state.version_query_fails {
            return Err(DeviceError::Control {
                request: "GET_VERSION",
                source: io::Error::new(io::ErrorKind::Unsupported, "version query rejected"),
            });
        }
        Ok(state.version)
    }

    fn set_media_status(&self, connected: bool) -> Result<(), DeviceError> {
        let mut state = self.device.inner.lock();
        if !state.media_accepts {
            return Err(DeviceError::Control {
                request: "SET_MEDIA_STATUS",
                source: io::Error::new(io::ErrorKind::PermissionDenied, "media status rejected"),
            });
        }
        state.media_connected = connected;
        state.events.push(DeviceEvent::MediaStatus(connected));
        Ok(())
    }

    fn new_operation(&self, capacity: usize) -> Result<SimulatedOperation, DeviceError> {
        if self.device.inner.lock().operation_fails {
            return Err(DeviceError::Operation(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "event creation failed",
            )));
        }
        self.device.inner.live_operations.fetch_add(1, Ordering::SeqCst);
        Ok(SimulatedOperation {
            buffer: vec![0u8; capacity],
            in_flight: None,
            epoch: 0,
            inner: Arc::clone(&self.device.inner),
        })
    }

    fn issue_read(&self, op: &mut SimulatedOperation) -> Result<Submission, TransferError> {
        let mut state = self.device.inner.lock();
        state.reads_issued += 1;
        state.events.push(DeviceEvent::ReadIssued);
        self.device.inner.changed.notify_all();

        match state.inbound.pop_front() {
            Some(Inbound::Frame(frame)) => Ok(Submission::Completed(op.fill(&frame))),
            Some(Inbound::Error(kind)) => Err(io::Error::new(kind, "simulated read failure").into()),
            Some(Inbound::SpuriousCancel) => Err(TransferError::Cancelled),
            None => {
                op.in_flight = Some(InFlight::Read);
                op.epoch = state.cancel_epoch;
                Ok(Submission::Pending)
            }
        }
    }

    fn issue_write(
        &self,
        op: &mut SimulatedOperation,
        frame: &[u8],
    ) -> Result<Submission, TransferError> {
        let len = op.fill(frame);
        let mut state = self.device.inner.lock();

        let submission = match state.write_mode {
            WriteMode::Reject => {
                state.events.push(DeviceEvent::WriteRejected(len));
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure").into());
            }
            WriteMode::Immediate => Submission::Completed(len),
            WriteMode::Pending => {
                op.in_flight = Some(InFlight::Write(len));
                op.epoch = state.cancel_epoch;
                Submission::Pending
            }
        };

        state.written.push(op.buffer[..len].to_vec());
        state.events.push(DeviceEvent::WriteIssued(len));
        self.device.inner.changed.notify_all();
        Ok(submission)
    }

    fn wait(&self, op: &mut SimulatedOperation) -> Result<usize, TransferError> {
        let Some(in_flight) = op.in_flight else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no transfer in flight").into());
        };

        let mut state = self.device.inner.lock();
        loop {
            if state.cancel_epoch != op.epoch {
                op.in_flight = None;
                return Err(TransferError::Cancelled);
            }

            match in_flight {
                InFlight::Read => match state.inbound.pop_front() {
                    Some(Inbound::Frame(frame)) => {
                        drop(state);
                        op.in_flight = None;
                        return Ok(op.fill(&frame));
                    }
                    Some(Inbound::Error(kind)) => {
                        op.in_flight = None;
                        return Err(io::Error::new(kind, "simulated read failure").into());
                    }
                    Some(Inbound::SpuriousCancel) => {
                        op.in_flight = None;
                        return Err(TransferError::Cancelled);
                    }
                    None => {}
                },
                InFlight::Write(len) => {
                    if state.write_completions > 0 {
                        state.write_completions -= 1;
                        state.events.push(DeviceEvent::WriteCompleted(len));
                        op.in_flight = None;
                        self.device.inner.changed.notify_all();
                        return Ok(len);
                    }
                }
            }

            state = self
                .device
                .inner
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn cancel_all(&self) -> Result<(), DeviceError> {
        let mut state = self.device.inner.lock();
        state.cancel_epoch += 1;
        state.events.push(DeviceEvent::CancelAll);
        self.device.inner.changed.notify_all();
        Ok(())
    }
}

// ── Opener ────────────────────────────────────────────────────────────────────

/// Opens [`SimulatedHandle`]s on one shared [`SimulatedDevice`].
pub struct SimulatedOpener {
    device: SimulatedDevice,
    accepted: Option<Vec<String>>,
    attempts: AtomicUsize,
}

impl SimulatedOpener {
    /// Creates an opener that opens every identifier.
    pub fn new(device: SimulatedDevice) -> Self {
        Self {
            device,
            accepted: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Restricts opening to the listed identifiers.
    pub fn accepting(mut self, ids: &[&str]) -> Self {
        self.accepted = Some(ids.iter().map(|id| id.to_string()).collect());
        self
    }

    /// Number of `open` calls so far.
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for SimulatedOpener {
    type Handle = SimulatedHandle;

    fn open(&self, id: &DeviceIdentifier) -> Result<SimulatedHandle, SessionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let allowed = self
            .accepted
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|a| a == id.as_str()));
        if !allowed {
            return Err(SessionError::OpenFailed {
                id: id.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such device"),
            });
        }
        Ok(self.device.handle())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_completes_immediately_when_frame_queued() {
        // Arrange
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let mut op = handle.new_operation(64).unwrap();
        device.push_frame(vec![7u8; 10]);

        // Act
        let submission = handle.issue_read(&mut op).unwrap();

        // Assert
        assert_eq!(submission, Submission::Completed(10));
        assert_eq!(&op.buffer()[..10], &[7u8; 10]);
        assert!(!op.is_pending());
    }

    #[test]
    fn test_pending_read_is_finished_by_a_later_frame() {
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let mut op = handle.new_operation(64).unwrap();

        assert_eq!(handle.issue_read(&mut op).unwrap(), Submission::Pending);
        assert!(op.is_pending());
        device.push_frame(vec![1u8; 20]);

        assert_eq!(handle.wait(&mut op).unwrap(), 20);
        assert!(!op.is_pending());
    }

    #[test]
    fn test_cancel_all_aborts_pending_read_from_another_thread() {
        // Arrange
        let device = SimulatedDevice::new();
        let handle = Arc::new(device.handle());
        let mut op = handle.new_operation(64).unwrap();
        assert_eq!(handle.issue_read(&mut op).unwrap(), Submission::Pending);

        // Act
        let canceller = Arc::clone(&handle);
        let t = std::thread::spawn(move || canceller.cancel_all().unwrap());
        let result = handle.wait(&mut op);
        t.join().unwrap();

        // Assert
        assert!(matches!(result, Err(TransferError::Cancelled)));
    }

    #[test]
    fn test_cancel_does_not_affect_transfers_issued_afterwards() {
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let mut op = handle.new_operation(64).unwrap();

        handle.cancel_all().unwrap();
        assert_eq!(handle.issue_read(&mut op).unwrap(), Submission::Pending);
        device.push_frame(vec![2u8; 5]);

        assert_eq!(handle.wait(&mut op).unwrap(), 5);
    }

    #[test]
    fn test_pending_write_waits_for_completion() {
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Pending);
        let handle = device.handle();
        let mut op = handle.new_operation(64).unwrap();

        assert_eq!(handle.issue_write(&mut op, &[9u8; 12]).unwrap(), Submission::Pending);
        device.complete_write();

        assert_eq!(handle.wait(&mut op).unwrap(), 12);
        assert_eq!(
            device.events(),
            vec![DeviceEvent::WriteIssued(12), DeviceEvent::WriteCompleted(12)]
        );
    }

    #[test]
    fn test_rejected_write_is_not_recorded_as_written() {
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Reject);
        let handle = device.handle();
        let mut op = handle.new_operation(64).unwrap();

        assert!(handle.issue_write(&mut op, &[1, 2, 3]).is_err());
        assert!(device.written_frames().is_empty());
    }

    #[test]
    fn test_handles_and_operations_are_counted() {
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let op = handle.new_operation(8).unwrap();
        assert_eq!(device.open_handles(), 1);
        assert_eq!(device.live_operations(), 1);

        drop(op);
        drop(handle);

        assert_eq!(device.open_handles(), 0);
        assert_eq!(device.live_operations(), 0);
    }

    #[test]
    fn test_opener_rejects_unlisted_identifiers() {
        let opener = SimulatedOpener::new(SimulatedDevice::new()).accepting(&["{A}"]);

        assert!(opener.open(&DeviceIdentifier::from("{A}")).is_ok());
        assert!(matches!(
            opener.open(&DeviceIdentifier::from("{B}")),
            Err(SessionError::OpenFailed { .. })
        ));
        assert_eq!(opener.open_attempts(), 2);
    }
}
