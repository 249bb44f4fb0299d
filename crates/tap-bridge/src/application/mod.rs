//! Application layer for the bridge host.
//!
//! Contains the use cases that consume frames from the TAP adapter.  This
//! layer depends only on `tap_core`; it never imports `infrastructure`.

pub mod frame_monitor;
