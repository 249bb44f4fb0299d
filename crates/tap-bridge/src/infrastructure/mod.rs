//! Infrastructure layer for the bridge host.
//!
//! Contains OS-facing adapters: the registry-backed device directory, the
//! overlapped TAP device, and file-system configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and `tap_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod device;
pub mod directory;
pub mod storage;
