//! Device identity types.
//!
//! A TAP adapter is found in two steps: the directory scanner filters the
//! host's network registrations by [`DriverIdentity`] and yields
//! [`DeviceIdentifier`]s; the device session opens one of them and reads back
//! the [`DriverVersion`] the kernel driver reports.

use std::borrow::Cow;
use std::fmt;

/// Opaque token naming one registered network device instance on the host.
///
/// On Windows this is the `NetCfgInstanceId` GUID string (e.g.
/// `{6F8A1B2C-...}`), which is also the name of the device file under
/// `\\.\Global\`.  The core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(String);

impl DeviceIdentifier {
    /// Creates an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceIdentifier {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceIdentifier {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Vendor-defined component id naming the kernel driver behind a device
/// registration.  Compared case-sensitively during the directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DriverIdentity(Cow<'static, str>);

impl DriverIdentity {
    /// Component id of the TAP-Windows (NDIS 6, "tap0901") driver.
    pub const TAP_WINDOWS_V9: DriverIdentity = DriverIdentity(Cow::Borrowed("tap0901"));

    /// Creates an identity from a runtime string (e.g. loaded from config).
    pub fn new(component_id: impl Into<String>) -> Self {
        Self(Cow::Owned(component_id.into()))
    }

    /// Returns the component id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact, case-sensitive comparison against a registry value.
    pub fn matches(&self, component_id: &str) -> bool {
        self.0 == component_id
    }
}

impl Default for DriverIdentity {
    fn default() -> Self {
        Self::TAP_WINDOWS_V9
    }
}

impl fmt::Display for DriverIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Driver version as reported by the version query during activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverVersion {
    pub major: u32,
    pub minor: u32,
    /// `true` when the driver is a checked (debug) build.
    pub debug: bool,
}

impl DriverVersion {
    /// Default minimum driver version accepted by the bridge.
    pub const MINIMUM: DriverVersion = DriverVersion::new(9, 9);

    /// Creates a release-build version.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            debug: false,
        }
    }

    /// Returns `true` if this version is at least `minimum`.
    ///
    /// Only major/minor take part in the comparison; the debug flag does not.
    pub fn meets(&self, minimum: DriverVersion) -> bool {
        self.major > minimum.major || (self.major == minimum.major && self.minor >= minimum.minor)
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.debug {
            f.write_str(" (debug)")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
