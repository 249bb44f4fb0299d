//! Adapter Lifecycle Controller.
//!
//! [`TapAdapter`] is the object the emulated network device talks to.  It
//! sequences activation (scan → open → handshake → start I/O), gates receive
//! delivery, forwards sends to the single write slot, and tears everything
//! down in reverse order.
//!
//! ```text
//!            activate() ok
//!  Inactive ───────────────▶ Active ──(recv_start / recv_stop)──▶ Active
//!     │                        │
//!     │ activate() err         │ deactivate() / drop
//!     ▼                        ▼
//!  Inactive               Deactivated ──activate()──▶ Active
//! ```
//!
//! Having an open device handle *is* being active: the engine (and with it
//! the handle) exists exactly while the adapter is [`AdapterState::Active`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::device::session::{self, SessionError};
use crate::device::{DeviceError, DeviceOpener, FrameSink};
use crate::directory::{list_candidates, DeviceDirectory, DirectoryError};
use crate::domain::device::{DeviceIdentifier, DriverIdentity, DriverVersion};
use crate::domain::frame::{MAX_FRAME_SIZE, RECEIVE_BUFFER_SIZE};
use crate::engine::reader::RetryPolicy;
use crate::engine::{EngineError, IoEngine};

/// Errors returned by [`TapAdapter::activate`].
///
/// Every variant leaves the adapter inactive with no device handle open.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The host device registry could not be read.
    #[error("device directory unavailable: {0}")]
    DirectoryUnavailable(#[source] DirectoryError),

    /// No registered adapter matched, or none of the matches could be opened.
    #[error("no {identity} adapter found; install or enable a TAP adapter")]
    NoAdapterFound { identity: DriverIdentity },

    /// The driver is older than the configured minimum.
    #[error(
        "TAP driver version {found} is too old; version {required} or newer is required \
         (a reboot may be needed after upgrading the driver)"
    )]
    VersionTooOld {
        found: DriverVersion,
        required: DriverVersion,
    },

    /// The driver refused to set the link to "connected".
    #[error("TAP driver rejected the connected media status: {0}")]
    MediaStatusRejected(#[source] DeviceError),

    /// The version query failed.
    #[error("TAP driver control request failed: {0}")]
    Device(#[source] DeviceError),

    /// Completion contexts or the read thread could not be set up.
    #[error("failed to start TAP I/O: {0}")]
    Setup(#[from] EngineError),
}

impl ActivationError {
    fn from_session(err: SessionError, identity: &DriverIdentity) -> Self {
        match err {
            SessionError::OpenFailed { .. } => Self::NoAdapterFound {
                identity: identity.clone(),
            },
            SessionError::VersionTooOld { found, required } => {
                Self::VersionTooOld { found, required }
            }
            SessionError::MediaStatusRejected(e) => Self::MediaStatusRejected(e),
            SessionError::Device(e) => Self::Device(e),
        }
    }
}

/// Tunables for activation and I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Component id the directory scan filters on.
    pub identity: DriverIdentity,
    /// Oldest driver version accepted by the handshake.
    pub minimum_version: DriverVersion,
    /// Receive buffer capacity; clamped to at least [`MAX_FRAME_SIZE`].
    pub receive_buffer_size: usize,
    /// Back-off applied to consecutive read failures.
    pub read_retry: RetryPolicy,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            identity: DriverIdentity::TAP_WINDOWS_V9,
            minimum_version: DriverVersion::MINIMUM,
            receive_buffer_size: RECEIVE_BUFFER_SIZE,
            read_retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle state of a [`TapAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// No activation has succeeded yet.
    Inactive,
    /// A device is open and the read thread is running.
    Active,
    /// Torn down by [`TapAdapter::deactivate`].  A failed re-activation
    /// stays here.
    Deactivated,
}

struct ActiveSession<O: DeviceOpener> {
    engine: IoEngine<O::Handle>,
    device_id: DeviceIdentifier,
    version: DriverVersion,
}

/// Bridge between an emulated network device and a host TAP adapter.
pub struct TapAdapter<O: DeviceOpener> {
    directory: Box<dyn DeviceDirectory>,
    opener: O,
    sink: Arc<dyn FrameSink>,
    options: AdapterOptions,
    state: AdapterState,
    session: Option<ActiveSession<O>>,
}

impl<O: DeviceOpener> TapAdapter<O> {
    /// Creates an inactive adapter.
    pub fn new(
        directory: impl DeviceDirectory + 'static,
        opener: O,
        sink: Arc<dyn FrameSink>,
        options: AdapterOptions,
    ) -> Self {
        Self {
            directory: Box::new(directory),
            opener,
            sink,
            options,
            state: AdapterState::Inactive,
            session: None,
        }
    }

    /// Finds, opens, and starts a TAP device.  No-op if already active.
    ///
    /// Candidates are tried in directory order; the first one that opens is
    /// used.  A handshake failure on that device fails the whole activation.
    ///
    /// # Errors
    ///
    /// See [`ActivationError`].  On error no handle is left open.
    pub fn activate(&mut self) -> Result<(), ActivationError> {
        if self.session.is_some() {
            return Ok(());
        }

        let identity = &self.options.identity;
        let candidates = list_candidates(&*self.directory, identity).map_err(|e| {
            error!("failed to read the device directory: {e}");
            ActivationError::DirectoryUnavailable(e)
        })?;
        if candidates.is_empty() {
            error!("no {identity} adapter registered");
            return Err(ActivationError::NoAdapterFound {
                identity: identity.clone(),
            });
        }

        let Some((device_id, handle)) = session::open_first(&self.opener, &candidates) else {
            error!("failed to open any of {} {identity} adapter(s)", candidates.len());
            return Err(ActivationError::NoAdapterFound {
                identity: identity.clone(),
            });
        };

        // `handle` is dropped (closed) on every error path below.
        let version = session::negotiate(&handle, self.options.minimum_version).map_err(|e| {
            error!("{device_id}: {e}");
            ActivationError::from_session(e, identity)
        })?;

        let engine = IoEngine::start(
            Arc::new(handle),
            Arc::clone(&self.sink),
            self.options.receive_buffer_size.max(MAX_FRAME_SIZE),
            self.options.read_retry,
        )
        .map_err(|e| {
            error!("{device_id}: {e}");
            ActivationError::Setup(e)
        })?;

        info!("TAP adapter {device_id} active (driver {version})");
        self.session = Some(ActiveSession {
            engine,
            device_id,
            version,
        });
        self.state = AdapterState::Active;
        Ok(())
    }

    /// Stops the read thread and closes the device.  No-op unless active.
    pub fn deactivate(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.engine.stop();
        let device_id = session.device_id.clone();
        drop(session);

        self.state = AdapterState::Deactivated;
        info!("TAP adapter {device_id} deactivated");
    }

    /// `true` while a device handle is open.
    pub fn is_activated(&self) -> bool {
        self.session.is_some()
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Identifier of the open device, if active.
    pub fn device_id(&self) -> Option<&DeviceIdentifier> {
        self.session.as_ref().map(|s| &s.device_id)
    }

    /// Driver version reported during the handshake, if active.
    pub fn driver_version(&self) -> Option<DriverVersion> {
        self.session.as_ref().map(|s| s.version)
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Queues `frame` for the device.
    ///
    /// Returns `true` when the write was queued, including writes still in
    /// flight; `true` is **not** a delivery confirmation.  Returns `false` if
    /// the adapter is not active, the frame exceeds [`MAX_FRAME_SIZE`], or
    /// the write could not be queued.  Blocks while a previous write is
    /// still in flight.
    pub fn send(&mut self, frame: &[u8]) -> bool {
        match self.session.as_mut() {
            Some(session) => session.engine.send(frame),
            None => false,
        }
    }

    /// Starts delivering received frames to the sink.  No effect unless active.
    pub fn recv_start(&self) {
        if let Some(session) = &self.session {
            session.engine.set_receive_enabled(true);
        }
    }

    /// Stops delivering received frames.  Frames keep being read and are
    /// dropped.  No effect unless active.
    pub fn recv_stop(&self) {
        if let Some(session) = &self.session {
            session.engine.set_receive_enabled(false);
        }
    }

    /// `true` while receive delivery is enabled.
    pub fn is_receiving(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.engine.is_receiving())
    }
}

impl<O: DeviceOpener> Drop for TapAdapter<O> {
    fn drop(&mut self) {
        self.deactivate();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
