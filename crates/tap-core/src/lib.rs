//! # tap-core
//!
//! Platform-independent core of the TAP bridge: it locates a virtual Ethernet
//! (TAP) adapter in the host's device directory, opens it for overlapped I/O,
//! and exchanges raw Ethernet frames with it on behalf of an emulated network
//! device.
//!
//! The crate has zero dependencies on OS APIs.  Everything the host provides
//! (the device registry, the device file, the overlapped read/write surface)
//! is reached through the traits in [`directory`] and [`device`]; the host
//! application plugs in the native implementations, tests plug in
//! [`device::simulated::SimulatedDevice`] and
//! [`directory::memory::InMemoryDirectory`].
//!
//! # Architecture overview
//!
//! ```text
//! TapAdapter::activate()
//!  ├─ directory::list_candidates()   -- scan the registry for TAP instances
//!  ├─ device::session::open_first()  -- open the first candidate that opens
//!  ├─ device::session::negotiate()   -- version check + media status "connected"
//!  └─ engine::IoEngine::start()      -- read thread + single write slot
//! ```
//!
//! Inbound frames flow `device -> read thread -> FrameSink::on_frame_received`
//! (only while receive is enabled).  Outbound frames flow
//! `TapAdapter::send -> write slot -> device`.

pub mod adapter;
pub mod device;
pub mod directory;
pub mod domain;
pub mod engine;

// Re-export the most-used types at the crate root so callers can write
// `tap_core::TapAdapter` instead of `tap_core::adapter::TapAdapter`.
pub use adapter::{ActivationError, AdapterOptions, AdapterState, TapAdapter};
pub use device::{
    AsyncOperation, DeviceError, DeviceHandle, DeviceOpener, FrameSink, Submission, TransferError,
};
pub use directory::{
    list_candidates, AdapterRecord, ConnectionRecord, DeviceDirectory, DirectoryError,
};
pub use domain::device::{DeviceIdentifier, DriverIdentity, DriverVersion};
pub use domain::frame::{EthernetHeader, MacAddress, MAX_FRAME_SIZE, RECEIVE_BUFFER_SIZE};
pub use engine::reader::RetryPolicy;
