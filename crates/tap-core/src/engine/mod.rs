//! Asynchronous I/O Engine.
//!
//! Owns the two overlapped directions of an open TAP device:
//!
//! - **Read side** – a dedicated thread (`tap-read`) that loops
//!   issue-read → wait → deliver for the whole time the adapter is active.
//!   See [`reader`].
//! - **Write side** – a single write slot driven from the caller's thread.
//!   At most one write is ever in flight.  See [`writer`].
//!
//! # Thread sharding
//!
//! The read completion context and receive buffer live on the read thread;
//! the write completion context and send buffer live in the engine, which
//! the caller owns.  The only state both threads see is [`Signals`]: two
//! atomic flags (receive enabled, shutdown) plus the device handle itself,
//! whose `cancel_all` is safe to call from any thread.
//!
//! # Shutdown
//!
//! [`IoEngine::stop`] clears receive, raises shutdown, cancels all I/O on the
//! handle (which unblocks the read thread's wait), joins the thread, then
//! observes any write still in flight.  Completion contexts are released
//! before the handle.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::device::{DeviceError, DeviceHandle, FrameSink};
use crate::domain::frame::MAX_FRAME_SIZE;

pub mod reader;
pub mod writer;

use reader::RetryPolicy;
use writer::WriteSlot;

/// Error type for starting the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A completion context could not be allocated.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The read thread could not be spawned.
    #[error("failed to spawn read thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Flags shared between the caller's thread and the read thread.
#[derive(Debug, Default)]
pub struct Signals {
    receive_enabled: AtomicBool,
    shutdown: AtomicBool,
}

impl Signals {
    pub fn receive_enabled(&self) -> bool {
        self.receive_enabled.load(Ordering::SeqCst)
    }

    pub fn set_receive_enabled(&self, enabled: bool) {
        self.receive_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// The running I/O engine for one open device.
pub struct IoEngine<H: DeviceHandle> {
    // Field order is drop order: the write context goes before the handle.
    writer: WriteSlot<H::Operation>,
    reader: Option<JoinHandle<()>>,
    signals: Arc<Signals>,
    sink: Arc<dyn FrameSink>,
    handle: Arc<H>,
}

impl<H: DeviceHandle> IoEngine<H> {
    /// Allocates both completion contexts and starts the read thread.
    ///
    /// Receive starts disabled.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if a completion context cannot be created or
    /// the thread cannot be spawned.  Nothing is left running on error.
    pub fn start(
        handle: Arc<H>,
        sink: Arc<dyn FrameSink>,
        receive_buffer_size: usize,
        retry: RetryPolicy,
    ) -> Result<Self, EngineError> {
        let read_op = handle.new_operation(receive_buffer_size)?;
        let write_op = handle.new_operation(MAX_FRAME_SIZE)?;
        let signals = Arc::new(Signals::default());

        let reader = {
            let handle = Arc::clone(&handle);
            let signals = Arc::clone(&signals);
            let sink = Arc::clone(&sink);
            thread::Builder::new()
                .name("tap-read".to_string())
                .spawn(move || reader::run(handle, read_op, signals, sink, retry))
                .map_err(EngineError::Spawn)?
        };
        debug!("read thread started ({receive_buffer_size}-byte buffer)");

        Ok(Self {
            writer: WriteSlot::new(write_op),
            reader: Some(reader),
            signals,
            sink,
            handle,
        })
    }

    /// Gates delivery of the next completed reads.
    pub fn set_receive_enabled(&self, enabled: bool) {
        self.signals.set_receive_enabled(enabled);
    }

    pub fn is_receiving(&self) -> bool {
        self.signals.receive_enabled()
    }

    /// Queues `frame` for writing.  See [`WriteSlot::send`] for the contract.
    ///
    /// On success the sink's `on_send_complete` is raised before returning.
    pub fn send(&mut self, frame: &[u8]) -> bool {
        let queued = self.writer.send(&*self.handle, frame);
        if queued {
            self.sink.on_send_complete();
        }
        queued
    }

    /// Stops the read thread and settles the write slot.  Idempotent.
    pub fn stop(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };

        self.signals.set_receive_enabled(false);
        self.signals.request_shutdown();

        // Unblocks the read thread's wait and any write still in flight.
        if let Err(e) = self.handle.cancel_all() {
            warn!("{e}");
        }

        if reader.join().is_err() {
            error!("read thread panicked");
        }
        self.writer.settle(&*self.handle);
        debug!("I/O engine stopped");
    }

    /// `true` while the read thread is running.
    pub fn is_running(&self) -> bool {
        self.reader.is_some()
    }
}

impl<H: DeviceHandle> Drop for IoEngine<H> {
    fn drop(&mut self) {
        self.stop();
    }
}
