//! Host device directory backed by the Windows registry.
//!
//! The TAP-Windows driver registers each adapter instance in two places:
//!
//! | Root                                                 | Per-entry data                              |
//! |------------------------------------------------------|---------------------------------------------|
//! | [`NETWORK_CONNECTIONS_KEY`]`\<guid>\Connection`      | `Name` (display name)                       |
//! | [`ADAPTER_KEY`]`\<nnnn>`                             | `ComponentId`, `NetCfgInstanceId` (the guid)|
//!
//! The connection entries are keyed by instance GUID; the adapter-class
//! entries carry the driver's component id.  Joining the two is the scanner's
//! job (`tap_core::list_candidates`); this module only reads the raw records.
//!
//! # Platform implementations
//!
//! | Module    | OS      | API used                                        |
//! |-----------|---------|-------------------------------------------------|
//! | `windows` | Windows | `RegOpenKeyExW` + `RegEnumKeyExW` + `RegQueryValueExW` |
//!
//! The Windows directory is re-exported as `NativeDirectory`.  Other hosts have
//! no TAP-Windows registry; `tap_core::directory::memory::InMemoryDirectory`
//! stands in for tests.

/// Network adapter device class (`{4D36E972-...}`) registrations.
pub const ADAPTER_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Class\{4D36E972-E325-11CE-BFC1-08002BE10318}";

/// Network connection entries for the same device class, keyed by instance GUID.
pub const NETWORK_CONNECTIONS_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Network\{4D36E972-E325-11CE-BFC1-08002BE10318}";

/// Subkey under each connection entry holding its display name.
pub const CONNECTION_SUBKEY: &str = "Connection";

/// Registry value names read during the walk.
pub mod values {
    pub const NAME: &str = "Name";
    pub const COMPONENT_ID: &str = "ComponentId";
    pub const INSTANCE_ID: &str = "NetCfgInstanceId";
}

/// Path of the `Connection` subkey for one connection entry, relative to
/// [`NETWORK_CONNECTIONS_KEY`].
pub fn connection_subkey(instance: &str) -> String {
    format!(r"{instance}\{CONNECTION_SUBKEY}")
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
pub mod windows;

/// Re-export the registry directory as `NativeDirectory` on Windows.
#[cfg(target_os = "windows")]
pub use windows::RegistryDirectory as NativeDirectory;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_roots_name_the_network_adapter_class() {
        const CLASS: &str = "{4D36E972-E325-11CE-BFC1-08002BE10318}";
        assert!(ADAPTER_KEY.ends_with(CLASS));
        assert!(NETWORK_CONNECTIONS_KEY.ends_with(CLASS));
    }

    #[test]
    fn test_connection_subkey_appends_connection() {
        assert_eq!(
            connection_subkey("{A1B2C3D4-0000-0000-0000-000000000001}"),
            r"{A1B2C3D4-0000-0000-0000-000000000001}\Connection"
        );
    }
}
