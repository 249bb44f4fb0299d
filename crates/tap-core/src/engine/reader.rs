//! The read thread.
//!
//! Each pass issues one read into the receive buffer.  If the read is left
//! pending, the thread blocks on it with no timeout; the only way out of that
//! wait without a frame is a cancellation from [`super::IoEngine::stop`].
//!
//! A cancellation is advisory: the loop re-checks the shutdown flag and only
//! exits when it is set.  Anything else that aborts a read is treated as
//! spurious and the read is reissued.
//!
//! Delivery is synchronous on this thread, so frames reach the sink in device
//! completion order and no new read is issued while the sink is busy.
//!
//! # Error back-off
//!
//! A device that keeps failing reads would otherwise spin this thread.
//! Consecutive failures sleep for an exponentially growing delay bounded by
//! [`RetryPolicy::max`]; the first successful read resets it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use super::Signals;
use crate::device::{AsyncOperation, DeviceHandle, FrameSink, Submission, TransferError};
use crate::domain::frame::EthernetHeader;

/// Delay policy for consecutive read failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Upper bound on the delay.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
        }
    }
}

/// Exponential back-off state for consecutive failures.
#[derive(Debug)]
pub(crate) struct Backoff {
    policy: RetryPolicy,
    next: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy, next: None }
    }

    /// Records a failure and returns how long to wait before retrying.
    pub(crate) fn failure(&mut self) -> Duration {
        let delay = self.next.unwrap_or(self.policy.initial).min(self.policy.max);
        self.next = Some(delay.saturating_mul(2).min(self.policy.max));
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.next = None;
    }
}

/// Body of the `tap-read` thread.
pub(crate) fn run<H: DeviceHandle>(
    handle: Arc<H>,
    mut op: H::Operation,
    signals: Arc<Signals>,
    sink: Arc<dyn FrameSink>,
    retry: RetryPolicy,
) {
    let mut backoff = Backoff::new(retry);

    while !signals.shutdown_requested() {
        let transferred = match read_one(&*handle, &mut op, &signals) {
            Ok(n) => n,
            Err(TransferError::Cancelled) => {
                if !signals.shutdown_requested() {
                    debug!("read cancelled without shutdown; reissuing");
                }
                continue;
            }
            Err(TransferError::Io(e)) => {
                error!("TAP read failed: {e}");
                let delay = backoff.failure();
                if !delay.is_zero() && !signals.shutdown_requested() {
                    thread::sleep(delay);
                }
                continue;
            }
        };
        backoff.reset();

        if signals.receive_enabled() {
            let frame = &op.buffer()[..transferred];
            if let Some(header) = EthernetHeader::parse(frame) {
                trace!("rx {transferred} bytes: {header}");
            }
            sink.on_frame_received(frame);
        }
    }

    debug!("read thread exiting");
}

/// Issues one read and, if it is left pending, waits for it.
fn read_one<H: DeviceHandle>(
    handle: &H,
    op: &mut H::Operation,
    signals: &Signals,
) -> Result<usize, TransferError> {
    match handle.issue_read(op)? {
        Submission::Completed(n) => Ok(n),
        Submission::Pending => {
            // A cancel raised before this read was queued cannot reach it.
            if signals.shutdown_requested() {
                if let Err(e) = handle.cancel_all() {
                    warn!("{e}");
                }
            }
            handle.wait(op)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        // Arrange
        let mut backoff = Backoff::new(RetryPolicy::default());

        // Act
        let delays: Vec<u64> = (0..9).map(|_| backoff.failure().as_millis() as u64).collect();

        // Assert
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 100, 100]);
    }

    #[test]
    fn test_backoff_reset_starts_over() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        backoff.failure();
        backoff.failure();

        backoff.reset();

        assert_eq!(backoff.failure(), Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_with_zero_initial_never_sleeps() {
        let mut backoff = Backoff::new(RetryPolicy {
            initial: Duration::ZERO,
            max: Duration::from_millis(50),
        });

        assert!(backoff.failure().is_zero());
        assert!(backoff.failure().is_zero());
    }

    #[test]
    fn test_backoff_initial_above_max_is_clamped() {
        let mut backoff = Backoff::new(RetryPolicy {
            initial: Duration::from_secs(5),
            max: Duration::from_millis(100),
        });

        assert_eq!(backoff.failure(), Duration::from_millis(100));
    }
}
