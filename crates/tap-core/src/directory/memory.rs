//! In-memory device directory.
//!
//! Always compiled (not only under `cfg(test)`) so integration tests and
//! hosts without a native registry can drive the scanner with fixtures.

use super::{AdapterRecord, ConnectionRecord, DeviceDirectory, DirectoryError};

/// A [`DeviceDirectory`] backed by fixed vectors.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    pub connections: Vec<ConnectionRecord>,
    pub adapters: Vec<AdapterRecord>,
    /// When set, both queries fail with [`DirectoryError::Unavailable`].
    pub unavailable: bool,
}

impl InMemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory whose queries always fail.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Adds a named connection backed by an adapter with `component_id`.
    pub fn with_adapter(mut self, instance_id: &str, component_id: &str, name: &str) -> Self {
        self.connections.push(ConnectionRecord {
            instance_id: Some(instance_id.to_string()),
            display_name: Some(name.to_string()),
        });
        self.adapters.push(AdapterRecord {
            component_id: Some(component_id.to_string()),
            instance_id: Some(instance_id.to_string()),
        });
        self
    }

    /// Adds a TAP-Windows ("tap0901") connection.
    pub fn with_tap(self, instance_id: &str, name: &str) -> Self {
        self.with_adapter(instance_id, "tap0901", name)
    }

    /// Adds a raw connection record (fields may be missing).
    pub fn with_connection(mut self, record: ConnectionRecord) -> Self {
        self.connections.push(record);
        self
    }

    /// Adds a raw adapter record (fields may be missing).
    pub fn with_adapter_record(mut self, record: AdapterRecord) -> Self {
        self.adapters.push(record);
        self
    }

    fn check(&self) -> Result<(), DirectoryError> {
        if self.unavailable {
            return Err(DirectoryError::Unavailable(
                "in-memory directory marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl DeviceDirectory for InMemoryDirectory {
    fn network_connections(&self) -> Result<Vec<ConnectionRecord>, DirectoryError> {
        self.check()?;
        Ok(self.connections.clone())
    }

    fn adapter_registrations(&self) -> Result<Vec<AdapterRecord>, DirectoryError> {
        self.check()?;
        Ok(self.adapters.clone())
    }
}
