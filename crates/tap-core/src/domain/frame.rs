//! Ethernet frame limits and a diagnostic header view.
//!
//! The bridge treats frames as opaque bytes.  [`EthernetHeader`] exists only
//! so that logging can show who a frame is from and what it carries.

use std::fmt;

/// Largest Ethernet frame the send path copies (14-byte header, 1500-byte
/// payload, 4-byte 802.1Q tag).
pub const MAX_FRAME_SIZE: usize = 1518;

/// Capacity of the receive buffer used by the read thread.
pub const RECEIVE_BUFFER_SIZE: usize = 0x800;

/// Length of an untagged Ethernet II header.
pub const ETHERNET_HEADER_LEN: usize = 14;

/// A 48-bit IEEE 802 MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// `true` for group (multicast or broadcast) addresses.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Destination, source, and EtherType of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ether_type: u16,
}

impl EthernetHeader {
    /// Reads the header from the start of `frame`.
    ///
    /// Returns `None` if the frame is shorter than [`ETHERNET_HEADER_LEN`].
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&frame[0..6]);
        source.copy_from_slice(&frame[6..12]);
        Some(Self {
            destination: MacAddress(destination),
            source: MacAddress(source),
            ether_type: u16::from_be_bytes([frame[12], frame[13]]),
        })
    }

    /// Short protocol name for well-known EtherTypes.
    pub fn protocol_name(&self) -> &'static str {
        match self.ether_type {
            0x0800 => "IPv4",
            0x0806 => "ARP",
            0x8100 => "802.1Q",
            0x86dd => "IPv6",
            t if t <= 1500 => "802.3",
            _ => "other",
        }
    }
}

impl fmt::Display for EthernetHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({} 0x{:04x})",
            self.source,
            self.destination,
            self.protocol_name(),
            self.ether_type
        )
    }
}
