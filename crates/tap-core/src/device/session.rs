//! Device Session: open a candidate and run the activation handshake.
//!
//! The handshake has two steps:
//!
//! 1. Query the driver version and reject drivers older than the configured
//!    minimum.
//! 2. Set the media status to "connected" so the host OS sees the link as up.
//!
//! Candidate selection stops at the first device that *opens*.  A handshake
//! failure on that device is terminal for the activation attempt: a matching
//! driver with the wrong version is a configuration problem, and trying the
//! next candidate would only hide it.

use thiserror::Error;
use tracing::{info, warn};

use super::{DeviceError, DeviceHandle, DeviceOpener};
use crate::domain::device::{DeviceIdentifier, DriverVersion};

/// Error type for opening and negotiating a device.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The device could not be opened for overlapped duplex access.
    #[error("failed to open device {id}: {source}")]
    OpenFailed {
        id: DeviceIdentifier,
        #[source]
        source: std::io::Error,
    },
    /// The driver is older than the minimum supported version.
    #[error("driver version {found} is older than required {required}")]
    VersionTooOld {
        found: DriverVersion,
        required: DriverVersion,
    },
    /// The driver refused to mark the link as connected.
    #[error("driver rejected the media status change: {0}")]
    MediaStatusRejected(#[source] DeviceError),
    /// Any other device-control failure (e.g. the version query itself).
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Opens the first candidate that opens successfully.
///
/// Candidates are tried in order; open failures are logged and skipped.
/// Returns `None` when every candidate fails (or there are none).
pub fn open_first<O: DeviceOpener>(
    opener: &O,
    candidates: &[DeviceIdentifier],
) -> Option<(DeviceIdentifier, O::Handle)> {
    for id in candidates {
        match opener.open(id) {
            Ok(handle) => {
                info!("opened TAP device {id}");
                return Some((id.clone(), handle));
            }
            Err(e) => warn!("{e}"),
        }
    }
    None
}

/// Verifies the driver version and sets the media status to connected.
///
/// Returns the reported driver version on success.
///
/// # Errors
///
/// - [`SessionError::VersionTooOld`] if the driver is below `minimum`.
/// - [`SessionError::MediaStatusRejected`] if the driver refuses to connect.
/// - [`SessionError::Device`] if the version query fails.
pub fn negotiate<H: DeviceHandle>(
    handle: &H,
    minimum: DriverVersion,
) -> Result<DriverVersion, SessionError> {
    let version = handle.driver_version()?;
    info!("TAP driver version {version}");

    if !version.meets(minimum) {
        return Err(SessionError::VersionTooOld {
            found: version,
            required: minimum,
        });
    }

    handle
        .set_media_status(true)
        .map_err(SessionError::MediaStatusRejected)?;

    Ok(version)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{SimulatedDevice, SimulatedOpener};

    #[test]
    fn test_open_first_skips_devices_that_fail_to_open() {
        // Arrange
        let device = SimulatedDevice::new();
        let opener = SimulatedOpener::new(device.clone()).accepting(&["{GOOD}"]);
        let candidates = vec![DeviceIdentifier::from("{BAD}"), DeviceIdentifier::from("{GOOD}")];

        // Act
        let opened = open_first(&opener, &candidates);

        // Assert
        let (id, _handle) = opened.expect("second candidate should open");
        assert_eq!(id, DeviceIdentifier::from("{GOOD}"));
        assert_eq!(opener.open_attempts(), 2);
    }

    #[test]
    fn test_open_first_stops_at_first_success() {
        let opener = SimulatedOpener::new(SimulatedDevice::new());
        let candidates = vec![DeviceIdentifier::from("{A}"), DeviceIdentifier::from("{B}")];

        let (id, _handle) = open_first(&opener, &candidates).expect("open");

        assert_eq!(id, DeviceIdentifier::from("{A}"));
        assert_eq!(opener.open_attempts(), 1);
    }

    #[test]
    fn test_open_first_returns_none_when_nothing_opens() {
        let opener = SimulatedOpener::new(SimulatedDevice::new()).accepting(&[]);
        let candidates = vec![DeviceIdentifier::from("{A}")];

        assert!(open_first(&opener, &candidates).is_none());
        assert!(open_first(&opener, &[]).is_none());
    }

    #[test]
    fn test_negotiate_accepts_minimum_version_and_connects_media() {
        // Arrange
        let device = SimulatedDevice::new().with_version(DriverVersion::new(9, 9));

        // Act
        let version = negotiate(&device.handle(), DriverVersion::new(9, 9)).expect("negotiate");

        // Assert
        assert_eq!(version, DriverVersion::new(9, 9));
        assert!(device.media_connected());
    }

    #[test]
    fn test_negotiate_rejects_old_driver_without_touching_media_status() {
        let device = SimulatedDevice::new().with_version(DriverVersion::new(8, 0));

        let result = negotiate(&device.handle(), DriverVersion::new(9, 9));

        assert!(matches!(
            result,
            Err(SessionError::VersionTooOld { found, required })
                if found == DriverVersion::new(8, 0) && required == DriverVersion::new(9, 9)
        ));
        assert!(!device.media_connected());
    }

    #[test]
    fn test_negotiate_reports_media_status_rejection() {
        let device = SimulatedDevice::new().rejecting_media_status();

        let result = negotiate(&device.handle(), DriverVersion::MINIMUM);

        assert!(matches!(result, Err(SessionError::MediaStatusRejected(_))));
    }

    #[test]
    fn test_negotiate_propagates_version_query_failure() {
        let device = SimulatedDevice::new().failing_version_query();

        let result = negotiate(&device.handle(), DriverVersion::MINIMUM);

        assert!(matches!(result, Err(SessionError::Device(DeviceError::Control { .. }))));
    }
}
