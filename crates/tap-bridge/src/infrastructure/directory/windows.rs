//! Windows registry implementation of [`DeviceDirectory`].
//!
//! Both roots live under `HKEY_LOCAL_MACHINE` and are opened read-only.  Only
//! a failure to open a root is an error; anything that goes wrong for a single
//! entry (an unreadable subkey, a missing or non-`REG_SZ` value) turns into a
//! `None` field on that entry's record, which the scanner then skips.

use std::ffi::OsStr;
use std::io;
use std::os::windows::ffi::OsStrExt;

use tap_core::{AdapterRecord, ConnectionRecord, DeviceDirectory, DirectoryError};
use tracing::debug;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_NO_MORE_ITEMS, ERROR_SUCCESS};
use windows::Win32::System::Registry::{
    RegCloseKey, RegEnumKeyExW, RegOpenKeyExW, RegQueryInfoKeyW, RegQueryValueExW, HKEY,
    HKEY_LOCAL_MACHINE, KEY_READ, REG_SZ, REG_VALUE_TYPE,
};

use super::{connection_subkey, values, ADAPTER_KEY, NETWORK_CONNECTIONS_KEY};

/// Reads connection and adapter-class records from the local registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryDirectory;

impl RegistryDirectory {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceDirectory for RegistryDirectory {
    fn network_connections(&self) -> Result<Vec<ConnectionRecord>, DirectoryError> {
        let root = open_root(NETWORK_CONNECTIONS_KEY)?;
        let names = subkey_names(&root).map_err(|e| unavailable(NETWORK_CONNECTIONS_KEY, e))?;

        let records = names
            .into_iter()
            .map(|name| {
                let Some(instance) = name else {
                    return ConnectionRecord::default();
                };
                let display_name = match open_key(root.0, &connection_subkey(&instance)) {
                    Ok(connection) => query_string(&connection, values::NAME),
                    Err(e) => {
                        debug!("{instance}: no readable Connection subkey: {e}");
                        None
                    }
                };
                ConnectionRecord {
                    instance_id: Some(instance),
                    display_name,
                }
            })
            .collect();
        Ok(records)
    }

    fn adapter_registrations(&self) -> Result<Vec<AdapterRecord>, DirectoryError> {
        let root = open_root(ADAPTER_KEY)?;
        let names = subkey_names(&root).map_err(|e| unavailable(ADAPTER_KEY, e))?;

        let records = names
            .into_iter()
            .flatten()
            .map(|name| match open_key(root.0, &name) {
                Ok(unit) => AdapterRecord {
                    component_id: query_string(&unit, values::COMPONENT_ID),
                    instance_id: query_string(&unit, values::INSTANCE_ID),
                },
                // Some class subkeys (e.g. "Properties") deny read access.
                Err(e) => {
                    debug!("adapter class entry {name} unreadable: {e}");
                    AdapterRecord::default()
                }
            })
            .collect();
        Ok(records)
    }
}

// ── Registry helpers ──────────────────────────────────────────────────────────

/// Registry key handle closed on drop.
#[derive(Debug)]
struct OwnedHKey(HKEY);

impl Drop for OwnedHKey {
    fn drop(&mut self) {
        // SAFETY: `self.0` was opened by `RegOpenKeyExW` and is closed exactly once.
        unsafe {
            let _ = RegCloseKey(self.0);
        }
    }
}

fn unavailable(path: &str, e: io::Error) -> DirectoryError {
    DirectoryError::Unavailable(format!(r"HKLM\{path}: {e}"))
}

fn open_root(path: &str) -> Result<OwnedHKey, DirectoryError> {
    open_key(HKEY_LOCAL_MACHINE, path).map_err(|e| unavailable(path, e))
}

fn open_key(parent: HKEY, path: &str) -> io::Result<OwnedHKey> {
    let wide = to_wide(path);
    let mut out = HKEY::default();
    // SAFETY: `wide` is NUL-terminated and outlives the call; `out` is a valid
    // out-pointer.
    let status = unsafe { RegOpenKeyExW(parent, PCWSTR(wide.as_ptr()), 0, KEY_READ, &mut out) };
    if status != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(status.0 as i32));
    }
    Ok(OwnedHKey(out))
}

/// Enumerates subkey names in registry order.
///
/// An entry whose name cannot be read yields `None` in its slot.
fn subkey_names(key: &OwnedHKey) -> io::Result<Vec<Option<String>>> {
    let mut max_len = 0u32;
    // SAFETY: `key.0` is an open key; only the max-subkey-length out-pointer
    // is supplied.
    let status = unsafe {
        RegQueryInfoKeyW(
            key.0,
            None,
            None,
            None,
            None,
            Some(&mut max_len),
            None,
            None,
            None,
            None,
            None,
            None,
        )
    };
    if status != ERROR_SUCCESS {
        return Err(io::Error::from_raw_os_error(status.0 as i32));
    }

    let mut names = Vec::new();
    let mut buf = vec![0u16; (max_len + 1) as usize];
    for index in 0.. {
        let mut len = max_len + 1;
        // SAFETY: `buf` holds `len` UTF-16 units and outlives the call.
        let status = unsafe {
            RegEnumKeyExW(
                key.0,
                index,
                PWSTR(buf.as_mut_ptr()),
                &mut len,
                None,
                None,
                None,
                None,
            )
        };
        if status == ERROR_NO_MORE_ITEMS {
            break;
        }
        if status != ERROR_SUCCESS {
            debug!("subkey #{index} unreadable: {}", io::Error::from_raw_os_error(status.0 as i32));
            names.push(None);
            continue;
        }
        names.push(Some(String::from_utf16_lossy(&buf[..len as usize])));
    }
    Ok(names)
}

/// Reads a `REG_SZ` value.  Absent values and values of any other type yield
/// `None`.
fn query_string(key: &OwnedHKey, name: &str) -> Option<String> {
    let name_w = to_wide(name);
    let mut ty = REG_VALUE_TYPE::default();
    let mut data_len = 0u32;
    // SAFETY: size query only; `name_w` is NUL-terminated.
    let status = unsafe {
        RegQueryValueExW(
            key.0,
            PCWSTR(name_w.as_ptr()),
            None,
            Some(&mut ty),
            None,
            Some(&mut data_len),
        )
    };
    if status != ERROR_SUCCESS || ty != REG_SZ {
        return None;
    }

    let mut data = vec![0u8; data_len as usize];
    // SAFETY: `data` holds `data_len` bytes and outlives the call.
    let status = unsafe {
        RegQueryValueExW(
            key.0,
            PCWSTR(name_w.as_ptr()),
            None,
            Some(&mut ty),
            Some(data.as_mut_ptr()),
            Some(&mut data_len),
        )
    };
    if status != ERROR_SUCCESS || ty != REG_SZ {
        return None;
    }
    data.truncate(data_len as usize);
    Some(decode_reg_sz(&data))
}

/// Decodes UTF-16LE registry string data, dropping trailing NULs.
fn decode_reg_sz(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16_lossy(&units)
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reg_sz_strips_terminator() {
        let bytes: Vec<u8> = "tap0901\0"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        assert_eq!(decode_reg_sz(&bytes), "tap0901");
    }

    #[test]
    fn test_to_wide_is_nul_terminated() {
        assert_eq!(to_wide("ab"), vec![b'a' as u16, b'b' as u16, 0]);
    }

    #[test]
    fn test_registry_directory_reads_both_roots() {
        // Every Windows host has the network adapter class key.
        let directory = RegistryDirectory::new();
        assert!(directory.adapter_registrations().is_ok());
        assert!(directory.network_connections().is_ok());
    }
}
