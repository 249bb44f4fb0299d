//! Frame monitor use case.
//!
//! [`FrameMonitor`] is the downstream consumer the bridge hands to the TAP
//! adapter.  It does not interpret frames beyond their Ethernet header; it
//! counts traffic in both directions and logs a one-line summary of every
//! received frame at `debug` level.
//!
//! # Threading
//!
//! `on_frame_received` runs on the adapter's read thread while
//! `on_send_complete` runs on whichever thread called `send`.  All counters
//! are atomics, so [`FrameMonitor::snapshot`] can be called from any thread
//! at any time without blocking either path.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tap_core::{EthernetHeader, FrameSink};
use tracing::debug;

/// Point-in-time copy of the monitor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficStats {
    /// Frames delivered by the adapter's read thread.
    pub frames_received: u64,
    /// Total payload bytes of those frames.
    pub bytes_received: u64,
    /// Received frames too short to carry an Ethernet header.
    pub runt_frames: u64,
    /// Successful `send` calls reported back by the adapter.
    pub sends_completed: u64,
}

impl fmt::Display for TrafficStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx {} frames / {} bytes ({} runt), tx {} completed",
            self.frames_received, self.bytes_received, self.runt_frames, self.sends_completed
        )
    }
}

/// Counts and logs the traffic flowing through the adapter.
#[derive(Debug, Default)]
pub struct FrameMonitor {
    frames_received: AtomicU64,
    bytes_received: AtomicU64,
    runt_frames: AtomicU64,
    sends_completed: AtomicU64,
}

impl FrameMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            runt_frames: self.runt_frames.load(Ordering::Relaxed),
            sends_completed: self.sends_completed.load(Ordering::Relaxed),
        }
    }
}

impl FrameSink for FrameMonitor {
    fn on_frame_received(&self, frame: &[u8]) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(frame.len() as u64, Ordering::Relaxed);

        match EthernetHeader::parse(frame) {
            Some(header) => debug!("received {} bytes: {header}", frame.len()),
            None => {
                self.runt_frames.fetch_add(1, Ordering::Relaxed);
                debug!("received {}-byte runt frame", frame.len());
            }
        }
    }

    fn on_send_complete(&self) {
        self.sends_completed.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
