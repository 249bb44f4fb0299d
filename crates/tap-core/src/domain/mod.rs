//! Domain types shared by every layer of the bridge.
//!
//! - **`device`** – identifiers for registered device instances, the driver
//!   identity used to filter them, and the driver version reported during the
//!   activation handshake.
//! - **`frame`** – Ethernet frame size limits and a read-only view of the
//!   Ethernet header used for diagnostics.  Frames are otherwise opaque.

pub mod device;
pub mod frame;
