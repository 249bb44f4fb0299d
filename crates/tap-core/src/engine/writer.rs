//! The single write slot.
//!
//! # Delivery contract
//!
//! `send` returning `true` means the write was *queued*, not that the frame
//! reached the device.  Only a write that cannot be queued at all reports
//! `false`.  A write that is still in flight, and whose eventual outcome is
//! unknown, is reported as sent.  Callers needing delivery confirmation must
//! get it from a higher layer.

use tracing::{error, warn};

use crate::device::{AsyncOperation, DeviceHandle, Submission, TransferError};

/// Write completion context plus the write-pending flag.
pub(crate) struct WriteSlot<O> {
    op: O,
    pending: bool,
}

impl<O: AsyncOperation> WriteSlot<O> {
    pub(crate) fn new(op: O) -> Self {
        Self { op, pending: false }
    }

    /// Waits out any previous write, then copies `frame` into the send buffer
    /// and issues it.
    ///
    /// The caller's `frame` may be reused as soon as this returns.  Frames
    /// larger than the send buffer are refused.
    pub(crate) fn send<H>(&mut self, handle: &H, frame: &[u8]) -> bool
    where
        H: DeviceHandle<Operation = O>,
    {
        if frame.len() > self.op.buffer().len() {
            warn!(
                "refusing {}-byte frame (send buffer holds {})",
                frame.len(),
                self.op.buffer().len()
            );
            return false;
        }

        self.settle(handle);

        self.pending = true;
        match handle.issue_write(&mut self.op, frame) {
            Ok(Submission::Completed(_)) => self.pending = false,
            Ok(Submission::Pending) => {}
            Err(e) => {
                error!("TAP write failed: {e}");
                self.pending = false;
                return false;
            }
        }
        true
    }

    /// Blocks until the in-flight write (if any) has completed or been
    /// cancelled.
    pub(crate) fn settle<H>(&mut self, handle: &H)
    where
        H: DeviceHandle<Operation = O>,
    {
        if !self.pending {
            return;
        }
        match handle.wait(&mut self.op) {
            Ok(_) | Err(TransferError::Cancelled) => {}
            Err(e) => error!("TAP write completion failed: {e}"),
        }
        self.pending = false;
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{DeviceEvent, SimulatedDevice, WriteMode};
    use crate::domain::frame::MAX_FRAME_SIZE;

    #[test]
    fn test_send_immediate_completion_leaves_slot_idle() {
        // Arrange
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());

        // Act
        let sent = slot.send(&handle, &[0xAA; 60]);

        // Assert
        assert!(sent);
        assert!(!slot.is_pending());
        assert_eq!(device.written_frames(), vec![vec![0xAA; 60]]);
    }

    #[test]
    fn test_send_pending_write_still_reports_success() {
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Pending);
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());

        assert!(slot.send(&handle, &[1u8; 42]));
        assert!(slot.is_pending());
    }

    #[test]
    fn test_send_rejected_write_clears_pending_and_reports_failure() {
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Reject);
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());

        assert!(!slot.send(&handle, &[1u8; 42]));
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_second_send_waits_for_first_completion() {
        // Arrange: first write stays pending, completion is pre-armed
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Pending);
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());
        assert!(slot.send(&handle, &[1u8; 10]));
        device.complete_write();

        // Act
        assert!(slot.send(&handle, &[2u8; 20]));

        // Assert: completion of #1 observed before #2 was issued
        assert_eq!(
            device.events(),
            vec![
                DeviceEvent::WriteIssued(10),
                DeviceEvent::WriteCompleted(10),
                DeviceEvent::WriteIssued(20),
            ]
        );
    }

    #[test]
    fn test_send_refuses_oversized_frame_without_touching_device() {
        let device = SimulatedDevice::new();
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());

        assert!(!slot.send(&handle, &vec![0u8; MAX_FRAME_SIZE + 1]));
        assert!(device.events().is_empty());
    }

    #[test]
    fn test_settle_after_cancel_releases_pending_write() {
        let device = SimulatedDevice::new().with_write_mode(WriteMode::Pending);
        let handle = device.handle();
        let mut slot = WriteSlot::new(handle.new_operation(MAX_FRAME_SIZE).unwrap());
        assert!(slot.send(&handle, &[3u8; 30]));

        handle.cancel_all().unwrap();
        slot.settle(&handle);

        assert!(!slot.is_pending());
    }
}
