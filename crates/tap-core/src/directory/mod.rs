//! Device Directory Scanner.
//!
//! Walks the host's registry of network devices and picks out the instances
//! backed by the expected virtual-adapter driver.
//!
//! # How the host registry is laid out
//!
//! The host keeps two independent lists:
//!
//! 1. **Network connections** – one entry per connection the user sees in
//!    the network settings, keyed by the instance id and carrying a display
//!    name (e.g. `"Ethernet 3"`).
//! 2. **Adapter registrations** – one entry per installed network adapter,
//!    carrying the driver's component id (e.g. `"tap0901"`) and the instance
//!    id of the connection it backs.
//!
//! A connection is a candidate when it has a display name *and* some adapter
//! registration with the target component id points at its instance id.
//!
//! The registry itself is reached through [`DeviceDirectory`] so that tests
//! can supply in-memory fixtures ([`memory::InMemoryDirectory`]).

use thiserror::Error;
use tracing::debug;

use crate::domain::device::{DeviceIdentifier, DriverIdentity};

pub mod memory;

/// Error type for directory queries.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// One of the registry roots could not be opened or enumerated.
    #[error("device directory unavailable: {0}")]
    Unavailable(String),
}

/// One registered network connection.
///
/// A field is `None` when the value is missing or is not a string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub instance_id: Option<String>,
    pub display_name: Option<String>,
}

/// One registered network adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterRecord {
    pub component_id: Option<String>,
    pub instance_id: Option<String>,
}

/// Queryable registry of host network devices.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceDirectory: Send + Sync {
    /// Lists every network connection entry, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the connection root cannot
    /// be opened.  Individual entries that cannot be read are reported with
    /// `None` fields rather than failing the whole call.
    fn network_connections(&self) -> Result<Vec<ConnectionRecord>, DirectoryError>;

    /// Lists every network adapter registration, in enumeration order.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the adapter class root
    /// cannot be opened.
    fn adapter_registrations(&self) -> Result<Vec<AdapterRecord>, DirectoryError>;
}

/// Returns the identifiers of every connection backed by `identity`.
///
/// Candidates come back in connection enumeration order.  An empty result is
/// not an error: it means no matching adapter is installed.
///
/// # Errors
///
/// Propagates [`DirectoryError::Unavailable`] from either registry root.
pub fn list_candidates(
    directory: &dyn DeviceDirectory,
    identity: &DriverIdentity,
) -> Result<Vec<DeviceIdentifier>, DirectoryError> {
    let connections = directory.network_connections()?;
    let adapters = directory.adapter_registrations()?;

    let mut candidates = Vec::new();
    for (index, connection) in connections.iter().enumerate() {
        let Some(instance_id) = connection.instance_id.as_deref() else {
            debug!("skipping connection #{index}: no instance id");
            continue;
        };
        if connection.display_name.is_none() {
            debug!("skipping connection {instance_id}: no display name");
            continue;
        }
        if is_backed_by(&adapters, instance_id, identity) {
            debug!("candidate {instance_id} ({identity})");
            candidates.push(DeviceIdentifier::new(instance_id));
        }
    }

    Ok(candidates)
}

/// `true` if some adapter registration for `identity` points at `instance_id`.
fn is_backed_by(adapters: &[AdapterRecord], instance_id: &str, identity: &DriverIdentity) -> bool {
    adapters.iter().any(|adapter| {
        match (adapter.component_id.as_deref(), adapter.instance_id.as_deref()) {
            (Some(component_id), Some(id)) => identity.matches(component_id) && id == instance_id,
            _ => false,
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
