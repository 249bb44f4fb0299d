//! Host TAP device backed by the TAP-Windows kernel driver.
//!
//! A TAP-Windows adapter is opened as a file at
//! `\\.\Global\<instance-guid>.tap` for overlapped duplex access.  Control
//! requests go through `DeviceIoControl`; frames are moved with overlapped
//! `ReadFile`/`WriteFile`, one Ethernet frame per transfer.
//!
//! # Control codes
//!
//! TAP control codes are built like the Windows SDK's `CTL_CODE` macro with
//! `FILE_DEVICE_UNKNOWN`, `METHOD_BUFFERED` and `FILE_ANY_ACCESS`:
//!
//! | Request            | Function | Code       | Payload                       |
//! |--------------------|----------|------------|-------------------------------|
//! | `GET_VERSION`      | 2        | `0x220008` | out: `[u32; 3]` major/minor/debug |
//! | `SET_MEDIA_STATUS` | 6        | `0x220018` | in/out: `u32` (1 = connected)  |
//!
//! # Platform implementations
//!
//! | Module    | OS      | API used                                                   |
//! |-----------|---------|------------------------------------------------------------|
//! | `windows` | Windows | `CreateFileW` + `ReadFile`/`WriteFile` + `GetOverlappedResult` |
//!
//! The Windows opener is re-exported as `NativeOpener`.

use tap_core::DeviceIdentifier;

const FILE_DEVICE_UNKNOWN: u32 = 0x22;
const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;

const fn tap_control_code(function: u32) -> u32 {
    (FILE_DEVICE_UNKNOWN << 16) | (FILE_ANY_ACCESS << 14) | (function << 2) | METHOD_BUFFERED
}

/// Queries `[major, minor, debug]`.
pub const TAP_IOCTL_GET_VERSION: u32 = tap_control_code(2);

/// Sets the adapter's link state.
pub const TAP_IOCTL_SET_MEDIA_STATUS: u32 = tap_control_code(6);

/// Path of the device file for the adapter instance `id`.
pub fn device_path(id: &DeviceIdentifier) -> String {
    format!(r"\\.\Global\{id}.tap")
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the TAP-Windows opener as `NativeOpener` on Windows.
#[cfg(target_os = "windows")]
pub use windows::WindowsOpener as NativeOpener;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_codes_match_the_driver_interface() {
        assert_eq!(TAP_IOCTL_GET_VERSION, 0x0022_0008);
        assert_eq!(TAP_IOCTL_SET_MEDIA_STATUS, 0x0022_0018);
    }

    #[test]
    fn test_device_path_uses_global_namespace_and_tap_suffix() {
        // Arrange
        let id = DeviceIdentifier::from("{A1B2C3D4-0000-0000-0000-000000000001}");

        // Act
        let path = device_path(&id);

        // Assert
        assert_eq!(path, r"\\.\Global\{A1B2C3D4-0000-0000-0000-000000000001}.tap");
    }
}
