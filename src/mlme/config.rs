use ieee802154::mac::{ExtendedAddress, PanId, ShortAddress};

use crate::events::InterfaceId;

/// Management plane configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interface identifier reported in events
    pub interface: InterfaceId,

    /// Device extended (EUI-64) address
    pub extended_address: ExtendedAddress,

    /// Initial channel (11..=26)
    pub channel: u16,

    /// Initial PAN ID
    pub pan_id: PanId,

    /// Initial short address, 0xfffe indicates none assigned
    pub short_address: ShortAddress,

    /// Time to wait for an association response in milliseconds
    pub assoc_timeout_ms: u64,

    /// Maximum encoded frame length (aMaxPHYPacketSize)
    pub max_frame_len: usize,

    /// Received frames include the 2-byte FCS
    pub rx_has_footer: bool,

    /// Only honour disassociation notifications sent by the stored coordinator
    ///
    /// Disabled by default, in which case any coordinator-initiated
    /// disassociation addressed to us is accepted.
    pub verify_disassociation_source: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: InterfaceId(0),
            extended_address: ExtendedAddress(0),

            channel: 11,
            pan_id: PanId::broadcast(),
            short_address: ShortAddress(0xfffe),

            assoc_timeout_ms: 1000,
            max_frame_len: 127,
            rx_has_footer: false,

            verify_disassociation_source: false,
        }
    }
}
